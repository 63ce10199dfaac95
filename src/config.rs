//! Configuration handling for discovery.

use crate::discovery::verify::VERIFY_PAGES;
use crate::profile::ProfileOptions;
use crate::types::HttpConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default wall-clock budget for one run.
pub const DEFAULT_BUDGET_SECONDS: u64 = 15;

/// Default page budget for one run.
pub const DEFAULT_BUDGET_PAGES: u32 = 6;

/// Domain-first API discovery.
#[derive(Parser, Debug, Clone)]
#[command(name = "restless")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Discover APIs starting from a domain
    Discover(DiscoverConfig),
    /// Self-check and environment hints
    Doctor(DoctorConfig),
}

/// Configuration for the doctor command.
#[derive(Parser, Debug, Clone)]
pub struct DoctorConfig {
    /// Custom profile storage directory
    #[arg(long, env = "RESTLESS_PROFILE_DIR")]
    pub profile_dir: Option<PathBuf>,
}

/// Configuration for the discover command.
#[derive(Parser, Debug, Clone)]
pub struct DiscoverConfig {
    /// Domain to discover, e.g. openai.com
    pub domain: String,

    /// Validate discovered endpoints with live HTTP checks
    #[arg(long)]
    pub verify: bool,

    /// Expand discovery using pattern-based probing of observed paths
    #[arg(long)]
    pub fuzz: bool,

    /// Maximum total discovery time
    #[arg(long, default_value_t = DEFAULT_BUDGET_SECONDS)]
    pub budget_seconds: u64,

    /// Maximum pages to fetch
    #[arg(long, default_value_t = DEFAULT_BUDGET_PAGES)]
    pub budget_pages: u32,

    /// Save discovery results to a named profile
    #[arg(long, value_name = "NAME")]
    pub save_profile: Option<String>,

    /// Replace an existing profile instead of merging (drops hand-edited sections)
    #[arg(long)]
    pub overwrite_profile: bool,

    /// Custom profile storage directory
    #[arg(long, env = "RESTLESS_PROFILE_DIR")]
    pub profile_dir: Option<PathBuf>,

    /// Generate example requests inside the profile
    #[arg(long)]
    pub emit_examples: bool,

    /// Replace literal credentials in saved profile headers with env references
    #[arg(long)]
    pub redact_secrets: bool,

    /// Output machine-readable JSON
    #[arg(long)]
    pub json: bool,

    /// Minimal output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose diagnostic logging
    #[arg(long)]
    pub debug: bool,

    /// Probe these origins instead of https://<domain> and https://api.<domain>
    #[arg(long = "origin", value_name = "URL")]
    pub origins: Vec<String>,

    /// Per-request timeout in seconds (never longer than the remaining budget)
    #[arg(long, default_value = "10")]
    pub timeout: u64,

    /// Rate limit (requests per second)
    #[arg(long, default_value = "10")]
    pub rate_limit: u32,

    /// Custom User-Agent string
    #[arg(long)]
    pub user_agent: Option<String>,
}

impl DiscoverConfig {
    /// Engine options from the command line.
    pub fn options(&self) -> DiscoverOptions {
        let defaults = HttpConfig::default();
        DiscoverOptions {
            budget_seconds: self.budget_seconds,
            budget_pages: self.budget_pages,
            verify: self.verify,
            fuzz: self.fuzz,
            debug: self.debug,
            origins: self.origins.clone(),
            http: HttpConfig {
                timeout_secs: self.timeout,
                rate_limit: self.rate_limit,
                user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent.clone()),
                ..defaults
            },
        }
        .normalized()
    }

    /// Profile writer options from the command line.
    pub fn profile_options(&self) -> ProfileOptions {
        let options = self.options();
        ProfileOptions {
            overwrite: self.overwrite_profile,
            emit_examples: self.emit_examples,
            redact_secrets: self.redact_secrets,
            verify: options.verify,
            fuzz: options.fuzz,
            budget_seconds: options.budget_seconds,
            budget_pages: options.budget_pages,
        }
    }
}

/// Options for one discovery run.
#[derive(Debug, Clone)]
pub struct DiscoverOptions {
    pub budget_seconds: u64,
    pub budget_pages: u32,
    /// Run the verify pass after aggregation.
    pub verify: bool,
    /// Run the fuzz phase when budget remains.
    pub fuzz: bool,
    /// Report extractor failures as warnings instead of debug logs.
    pub debug: bool,
    /// Explicit probe origins; empty means derive them from the domain.
    pub origins: Vec<String>,
    pub http: HttpConfig,
}

impl Default for DiscoverOptions {
    fn default() -> Self {
        Self {
            budget_seconds: DEFAULT_BUDGET_SECONDS,
            budget_pages: DEFAULT_BUDGET_PAGES,
            verify: false,
            fuzz: false,
            debug: false,
            origins: Vec::new(),
            http: HttpConfig::default(),
        }
    }
}

impl DiscoverOptions {
    /// Replace non-positive budgets and limits with defaults.
    pub fn normalized(mut self) -> Self {
        if self.budget_seconds == 0 {
            self.budget_seconds = DEFAULT_BUDGET_SECONDS;
        }
        if self.budget_pages == 0 {
            self.budget_pages = DEFAULT_BUDGET_PAGES;
        }
        if self.http.timeout_secs == 0 {
            self.http.timeout_secs = HttpConfig::default().timeout_secs;
        }
        if self.http.rate_limit == 0 {
            self.http.rate_limit = HttpConfig::default().rate_limit;
        }
        self
    }

    /// Pages held back for the verify pass: a third of the budget, at most
    /// what verify can use, and none when verify is off.
    pub fn verify_reserve(&self) -> u32 {
        if self.verify {
            (self.budget_pages / 3).min(VERIFY_PAGES)
        } else {
            0
        }
    }

    /// Pages the extractors may spend between them.
    pub fn discovery_pages(&self) -> u32 {
        self.budget_pages - self.verify_reserve()
    }

    /// Attempts the documentation phase may spend: half the discovery pages,
    /// rounded up.
    pub fn doc_probe_attempts(&self) -> usize {
        (self.discovery_pages() as usize).div_ceil(2)
    }
}
