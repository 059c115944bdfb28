//! Rule-based diagnosis of cluster resources

use anyhow::Result;
use clap::{ArgGroup, Args};
use std::path::PathBuf;
use tracing::info;

use med_lib::{DiagnosticEngine, DiagnosticMetrics, DiagnosticReport, ResourceSnapshot};

use crate::collector::{load_snapshots, CollectionOptions, KubeCollector, Target};
use crate::output::{print_report, print_warning, OutputFormat};

const DEFAULT_POD_LIMIT: u32 = 10;

#[derive(Debug, Args)]
#[command(group(
    ArgGroup::new("target")
        .required(true)
        .args(["pod", "selector", "deployment", "snapshot"])
))]
pub struct DiagnoseArgs {
    /// Free-text description of the problem
    pub query: Vec<String>,

    /// Namespace of the resources
    #[arg(long, short, default_value = "default")]
    pub namespace: String,

    /// Pod name
    #[arg(long)]
    pub pod: Option<String>,

    /// Label selector matching pods (e.g. app=web)
    #[arg(long, short = 'l')]
    pub selector: Option<String>,

    /// Deployment name; its pods are collected too
    #[arg(long)]
    pub deployment: Option<String>,

    /// Read snapshots from a JSON or YAML file instead of the cluster
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Skip event collection
    #[arg(long)]
    pub no_events: bool,

    /// Skip log collection
    #[arg(long)]
    pub no_logs: bool,

    /// Number of log lines per container
    #[arg(long, default_value_t = 100)]
    pub tail_lines: i64,

    /// Only logs newer than this many seconds
    #[arg(long)]
    pub since_seconds: Option<i64>,

    /// Maximum pods collected for a selector or deployment
    #[arg(long, default_value_t = DEFAULT_POD_LIMIT)]
    pub limit: u32,

    /// Run analyzers on worker threads
    #[arg(long)]
    pub parallel: bool,

    /// Print Prometheus metrics for the run to stderr
    #[arg(long)]
    pub metrics: bool,
}

impl DiagnoseArgs {
    pub fn query(&self) -> String {
        self.query.join(" ")
    }

    fn target(&self) -> Option<Target> {
        if let Some(pod) = &self.pod {
            Some(Target::Pod(pod.clone()))
        } else if let Some(selector) = &self.selector {
            Some(Target::Selector(selector.clone()))
        } else {
            self.deployment.clone().map(Target::Deployment)
        }
    }

    pub fn collection_options(&self) -> Option<CollectionOptions> {
        Some(CollectionOptions {
            namespace: self.namespace.clone(),
            target: self.target()?,
            include_events: !self.no_events,
            include_logs: !self.no_logs,
            tail_lines: Some(self.tail_lines).filter(|n| *n > 0),
            since_seconds: self.since_seconds.filter(|n| *n > 0),
            limit: self.limit,
        })
    }
}

/// Run the engine over collected snapshots
pub fn run_engine(args: &DiagnoseArgs, snapshots: Vec<ResourceSnapshot>) -> DiagnosticReport {
    let mut engine = DiagnosticEngine::default().parallel(args.parallel);
    if args.metrics {
        engine = engine.with_metrics(DiagnosticMetrics::new());
    }
    engine.diagnose(args.query(), snapshots)
}

pub async fn diagnose(args: DiagnoseArgs, kubeconfig: Option<&str>, format: OutputFormat) -> Result<()> {
    let snapshots = match (&args.snapshot, args.collection_options()) {
        (Some(path), _) => load_snapshots(path)?,
        (None, Some(options)) => {
            let collector = KubeCollector::connect(kubeconfig).await?;
            collector.collect(&options).await?
        }
        (None, None) => anyhow::bail!("one of --pod, --selector, --deployment or --snapshot is required"),
    };
    info!(event = "snapshots_loaded", count = snapshots.len(), "Snapshots ready");

    if snapshots.is_empty() {
        print_warning("No resources to diagnose");
    }

    let report = run_engine(&args, snapshots);
    print_report(&report, format)?;

    if args.metrics {
        eprintln!("{}", DiagnosticMetrics::new().gather_text());
    }
    Ok(())
}
