//! Sensitive-data redaction for free text sent to third-party services
//!
//! Recognized categories are replaced by fixed tokens. Input that matches
//! nothing is returned unchanged.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

pub const EMAIL_TOKEN: &str = "[EMAIL]";
pub const IP_ADDRESS_TOKEN: &str = "[IP_ADDRESS]";
pub const API_KEY_TOKEN: &str = "[API_KEY]";
pub const UUID_TOKEN: &str = "[UUID]";
pub const NAMESPACE_TOKEN: &str = "[NAMESPACE_NAME]";
pub const BASE64_TOKEN: &str = "[BASE64_DATA]";
pub const REDACTED_TOKEN: &str = "[REDACTED]";

/// Shortest run of base64 alphabet treated as an encoded secret
const MIN_BASE64_LEN: usize = 20;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}")
        .expect("Failed to compile email regex")
});

/// IPv4 dotted quads and full-form IPv6 addresses
static IP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)(\.(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)){3}|([0-9a-fA-F]{1,4}:){7}[0-9a-fA-F]{1,4}",
    )
    .expect("Failed to compile IP address regex")
});

/// `key=value` style credential assignments with a long value
static API_KEY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(api[-_]?key|apikey|token|secret|password)\s*[=:]\s*["']?[a-zA-Z0-9_\-.]{16,}["']?"#,
    )
    .expect("Failed to compile API key regex")
});

static UUID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-([0-9a-fA-F]{4}-){3}[0-9a-fA-F]{12}")
        .expect("Failed to compile UUID regex")
});

static NAMESPACE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?P<prefix>namespace\s+['"]?)(?P<name>[a-z0-9]([-a-z0-9]*[a-z0-9])?)"#)
        .expect("Failed to compile namespace regex")
});

static BASE64_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:[A-Za-z0-9+/]{4})*(?:[A-Za-z0-9+/]{2}==|[A-Za-z0-9+/]{3}=|[A-Za-z0-9+/]{4})")
        .expect("Failed to compile base64 regex")
});

/// Redacts sensitive values from free text
#[derive(Debug, Clone, Default)]
pub struct Anonymizer {
    additional_patterns: Vec<Regex>,
    custom_replacements: Vec<(String, String)>,
}

impl Anonymizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pattern whose matches are replaced by `[REDACTED]`
    pub fn add_pattern(&mut self, pattern: &str) -> Result<(), regex::Error> {
        self.additional_patterns.push(Regex::new(pattern)?);
        Ok(())
    }

    /// Replace every occurrence of `original` before pattern matching runs
    pub fn add_replacement(&mut self, original: impl Into<String>, replacement: impl Into<String>) {
        self.custom_replacements
            .push((original.into(), replacement.into()));
    }

    pub fn anonymize(&self, input: &str) -> String {
        let mut output = input.to_string();

        for (original, replacement) in &self.custom_replacements {
            if !original.is_empty() {
                output = output.replace(original.as_str(), replacement);
            }
        }

        output = EMAIL_REGEX.replace_all(&output, EMAIL_TOKEN).into_owned();
        output = IP_REGEX.replace_all(&output, IP_ADDRESS_TOKEN).into_owned();
        output = API_KEY_REGEX.replace_all(&output, API_KEY_TOKEN).into_owned();
        output = UUID_REGEX.replace_all(&output, UUID_TOKEN).into_owned();
        output = NAMESPACE_REGEX
            .replace_all(&output, |caps: &Captures| {
                format!("{}{}", &caps["prefix"], NAMESPACE_TOKEN)
            })
            .into_owned();

        for pattern in &self.additional_patterns {
            output = pattern.replace_all(&output, REDACTED_TOKEN).into_owned();
        }

        BASE64_REGEX
            .replace_all(&output, |caps: &Captures| {
                let matched = &caps[0];
                if matched.len() >= MIN_BASE64_LEN {
                    BASE64_TOKEN.to_string()
                } else {
                    matched.to_string()
                }
            })
            .into_owned()
    }
}
