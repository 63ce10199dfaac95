//! Colored console output for discovery results.

use crate::types::{Finding, SourceKind};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Console output handler with colors and formatting.
pub struct ConsoleOutput {
    verbose: bool,
    json_mode: bool,
    quiet: bool,
}

impl ConsoleOutput {
    /// Create a new console output handler.
    pub fn new(verbose: bool, json_mode: bool, quiet: bool) -> Self {
        Self { verbose, json_mode, quiet }
    }

    /// Print discovery start message.
    pub fn print_discover_start(&self, domain: &str) {
        if self.json_mode || self.quiet {
            return;
        }

        println!("{} Discovering: {}", "[*]".bright_blue(), domain.bright_white());
    }

    /// Print info message.
    pub fn print_info(&self, message: &str) {
        if self.json_mode || self.quiet {
            return;
        }

        println!("{} {}", "[*]".bright_blue(), message);
    }

    /// Print a finding: JSON in JSON mode, a readable summary otherwise.
    pub fn print_finding(&self, finding: &Finding) {
        if self.json_mode {
            if let Ok(json) = serde_json::to_string_pretty(finding) {
                println!("{}", json);
            }
            return;
        }

        if self.quiet {
            for endpoint in &finding.endpoints {
                println!("{} {}", endpoint.method, endpoint.path);
            }
            return;
        }

        println!();
        println!("{}", "=== Discovery Summary ===".bright_cyan());
        println!("  Domain:      {}", finding.domain);
        println!("  Confidence:  {}", format_score(finding.confidence));

        println!();
        println!("{}", "Base URLs:".bright_white().bold());
        if finding.base_urls.is_empty() {
            println!("  {}", "(none)".dimmed());
        }
        for url in &finding.base_urls {
            println!("  - {}", url);
        }

        println!("{}", "Docs:".bright_white().bold());
        if finding.doc_urls.is_empty() {
            println!("  {}", "(none)".dimmed());
        }
        for url in &finding.doc_urls {
            println!("  - {}", url);
        }

        println!(
            "{}",
            format!("Endpoints ({}):", finding.endpoints.len()).bright_white().bold()
        );
        if finding.endpoints.is_empty() {
            println!("  {}", "No endpoints found.".yellow());
        }
        for endpoint in &finding.endpoints {
            println!(
                "  {:<7} {}  {}",
                endpoint.method.bright_green(),
                endpoint.path,
                format_score(endpoint.score)
            );
            if self.verbose {
                for evidence in &endpoint.evidence {
                    println!(
                        "          |-- {} {}",
                        format_source(evidence.source),
                        evidence.url.dimmed()
                    );
                }
            }
        }

        println!();
    }

    /// Print the result of a profile save.
    pub fn print_profile_saved(&self, path: &Path, name: &str, finding: &Finding) {
        if self.json_mode || self.quiet {
            return;
        }

        println!("{} Profile saved: {}", "[+]".bright_green(), path.display());
        println!(
            "    Endpoints: {}  Docs: {}  Confidence: {:.2}",
            finding.endpoints.len(),
            finding.doc_urls.len(),
            finding.confidence
        );
        println!("    Next: restless discover {} --save-profile {} --verify", finding.domain, name);
    }

    /// Create a spinner for an in-flight run.
    pub fn create_spinner(&self, message: &str) -> Option<ProgressBar> {
        if self.json_mode || self.quiet {
            return None;
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    }
}

/// Format a score with color by strength.
fn format_score(score: f64) -> colored::ColoredString {
    let text = format!("{:.2}", score);
    if score >= 0.75 {
        text.green()
    } else if score >= 0.4 {
        text.yellow()
    } else {
        text.dimmed()
    }
}

fn format_source(source: SourceKind) -> colored::ColoredString {
    match source {
        SourceKind::Doc => "doc".green(),
        SourceKind::Verify => "verify".bright_green(),
        SourceKind::CommonPath => "common-path".yellow(),
        SourceKind::Fuzz => "fuzz".yellow(),
        SourceKind::Sitemap => "sitemap".blue(),
        SourceKind::Heuristic => "heuristic".dimmed(),
    }
}

impl Default for ConsoleOutput {
    fn default() -> Self {
        Self::new(false, false, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_output_creation() {
        let output = ConsoleOutput::new(true, false, false);
        assert!(output.verbose);
        assert!(!output.json_mode);
    }

    #[test]
    fn test_no_spinner_in_json_or_quiet_mode() {
        assert!(ConsoleOutput::new(false, true, false).create_spinner("x").is_none());
        assert!(ConsoleOutput::new(false, false, true).create_spinner("x").is_none());
    }

    #[test]
    fn test_format_score_text() {
        colored::control::set_override(false);
        assert_eq!(format_score(0.9).to_string(), "0.90");
        assert_eq!(format_score(0.012).to_string(), "0.01");
    }
}
