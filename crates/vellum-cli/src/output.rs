//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use std::path::Path;

use vellum_core::{ResourceOutcome, SyncReport};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print the result of a push
    pub fn print_report(&self, report: &SyncReport, dry_run: bool) {
        match self.format {
            OutputFormat::Human => {
                let verb = if dry_run { "Would push" } else { "Pushed" };
                println!(
                    "✓ {} {} as version {} to site '{}'",
                    verb, report.document, report.version, report.site
                );
                if report.is_new {
                    println!("  New identity: {}", report.identity);
                }
                if report.created_site {
                    println!("  Created site '{}'", report.site);
                }
                for resource in &report.resources {
                    let marker = match resource {
                        ResourceOutcome::Failed { .. } | ResourceOutcome::Missing { .. } => "⚠",
                        _ => "·",
                    };
                    println!("  {} {}", marker, resource);
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": if dry_run { "dry_run" } else { "pushed" },
                        "report": report,
                    })
                );
            }
            OutputFormat::Quiet => {
                println!("{} {}", report.identity, report.version);
            }
        }
    }

    /// Print a push that stopped at the site prompt
    pub fn print_cancelled(&self, doc: &Path, site: &str) {
        match self.format {
            OutputFormat::Human => {
                println!(
                    "Push of {} cancelled: site '{}' does not exist.",
                    doc.display(),
                    site
                );
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": "cancelled",
                        "document": doc,
                        "site": site,
                    })
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a warning to stderr, even in quiet mode
    pub fn warn(&self, msg: &str) {
        match self.format {
            OutputFormat::Json => {
                eprintln!("{}", serde_json::json!({"status": "warning", "message": msg}));
            }
            _ => eprintln!("⚠ {}", msg),
        }
    }
}

/// Mask a secret, keeping a short prefix so it stays recognizable
pub fn mask(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 8 {
        "********".to_string()
    } else {
        format!("{}********", prefix)
    }
}
