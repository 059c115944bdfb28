//! K8sMed kubectl plugin
//!
//! A first responder for Kubernetes workloads: collects pod and deployment
//! state, runs the diagnostic rule engines, and prints findings together
//! with a remediation plan.

mod collector;
mod commands;
mod config;
mod llm;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::diagnose::DiagnoseArgs;
use commands::{analyze, analyzers, diagnose};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// K8sMed: Kubernetes first responder
#[derive(Parser)]
#[command(name = "kubectl-k8smed")]
#[command(author, version, about = "K8sMed - Kubernetes first responder", long_about = None)]
pub struct Cli {
    /// Path to kubeconfig file (uses default if not specified)
    #[arg(long, global = true)]
    pub kubeconfig: Option<String>,

    /// Output format (defaults to the configured format)
    #[arg(long, short = 'o', global = true)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Diagnose pods or deployments and print a remediation plan
    Diagnose(DiagnoseArgs),

    /// Ask the AI assistant a troubleshooting question
    Analyze {
        /// The question
        #[arg(required = true)]
        query: Vec<String>,

        /// Print model and token usage
        #[arg(long, short)]
        explain: bool,

        /// Anonymize sensitive information in the query
        #[arg(long, short)]
        anonymize: bool,
    },

    /// List the analyzers a diagnosis runs
    Analyzers,

    /// Print the effective configuration
    Config,

    /// Print the version information
    Version,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let json = std::env::var("K8SMED_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Version needs no configuration
    let config = if matches!(cli.command, Commands::Version) {
        config::Config::default()
    } else {
        config::Config::load()?
    };
    let format = output::OutputFormat::resolve(cli.format, &config.output_format);
    let kubeconfig = cli.kubeconfig.as_deref().or(config.kubeconfig.as_deref());

    match cli.command {
        Commands::Diagnose(args) => {
            diagnose::diagnose(args, kubeconfig, format).await?;
        }
        Commands::Analyze {
            query,
            explain,
            anonymize,
        } => {
            analyze::analyze(&query.join(" "), explain, anonymize, &config, format).await?;
        }
        Commands::Analyzers => {
            analyzers::list_analyzers(format)?;
        }
        Commands::Config => {
            output::print_structured(&config, output::OutputFormat::Json)?;
        }
        Commands::Version => {
            println!("K8sMed v{}", VERSION);
        }
    }

    Ok(())
}
