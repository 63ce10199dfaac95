//! restless - Domain-first API discovery.
//!
//! This library finds the HTTP API surface behind a domain by:
//! - Probing well-known OpenAPI / Swagger document locations
//! - Reading sitemaps for API namespaces and documentation pages
//! - Trying a curated list of common API paths
//! - Optionally fuzzing variants of observed path shapes
//!
//! Evidence from every source is merged into a scored [`Finding`], and every
//! run is bounded by a time and page [`budget::Budget`].
//!
//! # Example
//!
//! ```no_run
//! use restless::{discover_domain, DiscoverOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let finding = discover_domain("openai.com", DiscoverOptions::default()).await.unwrap();
//!     println!("Found {} endpoints", finding.endpoints.len());
//! }
//! ```

pub mod aggregate;
pub mod budget;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod output;
pub mod profile;
pub mod types;

pub use config::{Commands, Config, DiscoverConfig, DiscoverOptions, DoctorConfig};
pub use engine::{discover_domain, Discoverer};
pub use profile::{ProfileOptions, ProfileWriter};
pub use types::{
    EndpointCandidate, Evidence, Finding, Observation, Outcome, RestlessError, Result, SourceKind,
};
