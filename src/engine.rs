//! Discovery orchestrator running every extractor for one domain.

use crate::aggregate::Aggregator;
use crate::budget::Budget;
use crate::config::DiscoverOptions;
use crate::discovery::doc_probe::DocProber;
use crate::discovery::verify::{self, VERIFY_PAGES};
use crate::discovery::{common_paths, fuzz_probe, heuristic, sitemap_probe, Fetcher, ProbeContext, Target};
use crate::types::{Finding, Observation, RestlessError, Result, SourceKind};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

/// Slack past the deadline before a phase task is aborted.
const PHASE_GRACE: Duration = Duration::from_millis(250);

/// Runs discovery for domains with a fixed set of options.
#[derive(Debug, Clone)]
pub struct Discoverer {
    options: DiscoverOptions,
}

impl Discoverer {
    pub fn new(options: DiscoverOptions) -> Self {
        Self {
            options: options.normalized(),
        }
    }

    /// Discover the API surface of `domain`.
    ///
    /// Fails only for an empty domain. Everything else (unreachable hosts,
    /// broken documents, an exhausted budget) degrades into a partial, possibly
    /// empty, [`Finding`].
    pub async fn discover(&self, domain: &str) -> Result<Finding> {
        let domain = domain.trim();
        if domain.is_empty() {
            return Err(RestlessError::InvalidInput("domain must not be empty".to_string()));
        }

        let start_time = StdInstant::now();
        let options = &self.options;

        let target = if options.origins.is_empty() {
            Target::from_domain(domain)
        } else {
            Target::with_origins(domain, &options.origins)
        };
        let target = Arc::new(target);
        info!("Discovering {} ({} origins)", target.domain, target.origins.len());

        // A fresh fetcher per run keeps the response memo scoped to this run.
        let fetcher = Fetcher::new(options.http.clone())?;
        let budget = Arc::new(Budget::new(
            Duration::from_secs(options.budget_seconds),
            options.budget_pages,
        ));
        let ctx = ProbeContext::new(target.clone(), fetcher, budget.clone());
        let deadline = budget.deadline();
        let debug = options.debug;
        let reserve = options.verify_reserve();

        let mut aggregator = Aggregator::new();

        // Phase 1: heuristics and documentation
        aggregator.fold(heuristic::observe(&target));

        let attempts = options.doc_probe_attempts();
        let prober = DocProber::new(attempts);
        let doc_ctx = ctx.with_budget(Arc::new(Budget::allowance(&budget, attempts as u32)));
        let docs = run_phase("doc-probe", deadline, debug, async move {
            prober.probe(&doc_ctx).await
        })
        .await;
        aggregator.fold(docs);

        // Phase 2: sitemap and common paths, concurrently, on fixed shares of what is left
        let rest = budget.remaining_pages().saturating_sub(reserve);
        let sitemap_pages = rest.div_ceil(2);
        debug!(
            "Splitting {} pages: {} sitemap, {} common paths",
            rest,
            sitemap_pages,
            rest - sitemap_pages
        );
        let sitemap_ctx = ctx.with_budget(Arc::new(Budget::allowance(&budget, sitemap_pages)));
        let common_ctx = ctx.with_budget(Arc::new(Budget::allowance(&budget, rest - sitemap_pages)));
        let (sitemap, common) = tokio::join!(
            run_phase("sitemap", deadline, debug, async move {
                sitemap_probe::probe(&sitemap_ctx).await
            }),
            run_phase("common-paths", deadline, debug, async move {
                common_paths::probe(&common_ctx).await
            }),
        );
        aggregator.fold(sitemap);
        aggregator.fold(common);

        // Phase 3: fuzzing, opt-in and only with budget to spare
        let fuzz_pages = budget.remaining_pages().saturating_sub(reserve);
        if options.fuzz && budget.is_active() && fuzz_pages > 0 {
            let seeds = aggregator.observed_get_paths(&[SourceKind::Doc, SourceKind::Sitemap]);
            if seeds.is_empty() {
                debug!("No observed paths to fuzz");
            } else {
                let fuzz_ctx = ctx.with_budget(Arc::new(Budget::allowance(&budget, fuzz_pages)));
                let fuzzed = run_phase("fuzz", deadline, debug, async move {
                    fuzz_probe::probe(&fuzz_ctx, &seeds).await
                })
                .await;
                aggregator.fold(fuzzed);
            }
        }

        let pre_verify = aggregator.confidence();

        // Verify spends whatever the run has left, never more.
        if options.verify {
            let verify_pages = budget.remaining_pages().min(VERIFY_PAGES);
            let verify_ctx = ctx.with_budget(Arc::new(Budget::allowance(&budget, verify_pages)));
            let bases = aggregator.ranked_base_urls();
            let endpoints: Vec<(String, String)> = aggregator
                .candidates()
                .into_iter()
                .map(|c| (c.method, c.path))
                .collect();

            let verified = run_phase("verify", deadline, debug, async move {
                verify::verify(&verify_ctx, &bases, &endpoints).await
            })
            .await;
            aggregator.fold(verified);
        }
        let pages_used = budget.pages_used();

        let mut finding = aggregator.finish(&target.domain);
        if finding.confidence < pre_verify {
            finding.confidence = pre_verify;
        }

        info!(
            "Discovered {} endpoints, {} base URLs, {} doc URLs for {} (confidence {:.2}, {} pages, {:.1}s)",
            finding.endpoints.len(),
            finding.base_urls.len(),
            finding.doc_urls.len(),
            finding.domain,
            finding.confidence,
            pages_used,
            start_time.elapsed().as_secs_f64()
        );

        Ok(finding)
    }
}

/// Discover `domain` with `options`.
pub async fn discover_domain(domain: &str, options: DiscoverOptions) -> Result<Finding> {
    Discoverer::new(options).discover(domain).await
}

/// Run one extractor as an isolated task bounded by `deadline`.
///
/// Errors, panics and overruns all yield no observations; a task still
/// running at the deadline is aborted and its partial output discarded.
/// Failures are logged as warnings when `debug` is set.
async fn run_phase<F>(name: &'static str, deadline: Instant, debug: bool, phase: F) -> Vec<Observation>
where
    F: Future<Output = Result<Vec<Observation>>> + Send + 'static,
{
    let mut handle = tokio::spawn(phase);
    let hard_stop = deadline.checked_add(PHASE_GRACE).unwrap_or(deadline);

    match timeout_at(hard_stop, &mut handle).await {
        Ok(Ok(Ok(observations))) => {
            debug!("Phase {} produced {} observations", name, observations.len());
            observations
        }
        Ok(Ok(Err(e))) => {
            if debug {
                warn!("Phase {} failed: {}", name, e);
            } else {
                debug!("Phase {} failed: {}", name, e);
            }
            Vec::new()
        }
        Ok(Err(e)) => {
            if debug {
                warn!("Phase {} task failed: {}", name, e);
            } else {
                debug!("Phase {} task failed: {}", name, e);
            }
            Vec::new()
        }
        Err(_) => {
            handle.abort();
            debug!("Phase {} cancelled at the deadline", name);
            Vec::new()
        }
    }
}
