//! Ordered transform collections and the loop that applies them to a site.
pub mod corpus;

use crate::adapter::{Cost, TransformAdapter};
use crate::error::{Error, Result};
use crate::oracle::TypeOracle;
use crate::site::Site;
use crate::templates::TemplateBundle;
use crate::transform::CodeTransform;
use crate::tree::{Fragment, SyntaxNode};
use rayon::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub cost_ceiling: u64,
    /// Passing candidates kept per transform; `None` keeps all.
    pub candidate_quota: Option<usize>,
    pub use_clone_cache: bool,
    pub concurrency: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            cost_ceiling: 5000,
            candidate_quota: None,
            use_clone_cache: true,
            concurrency: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchEntry {
    pub provenance: String,
    pub transform: Arc<CodeTransform>,
}

/// One type-checked candidate and the transform that produced it.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub provenance: String,
    pub transform: Arc<CodeTransform>,
    pub candidate: Fragment,
}

#[derive(Debug)]
pub struct SearchSpace {
    entries: Vec<SearchEntry>,
    options: SearchOptions,
    failed_check_cnt: AtomicU64,
}

impl SearchSpace {
    /// Entries keep their order; a transform equal to an earlier one is
    /// dropped.
    pub fn new(entries: Vec<(String, CodeTransform)>, options: SearchOptions) -> Self {
        let mut kept: Vec<SearchEntry> = Vec::with_capacity(entries.len());
        for (provenance, transform) in entries {
            if kept.iter().any(|entry| *entry.transform == transform) {
                tracing::debug!(%provenance, "dropping duplicate transform");
                continue;
            }
            kept.push(SearchEntry {
                provenance,
                transform: Arc::new(transform),
            });
        }
        Self {
            entries: kept,
            options,
            failed_check_cnt: AtomicU64::new(0),
        }
    }

    pub fn from_corpus_dir(dir: &Path, options: SearchOptions) -> Result<Self> {
        Ok(Self::new(corpus::read_corpus(dir)?, options))
    }

    pub fn from_bundle(bundle: TemplateBundle, options: SearchOptions) -> Result<Self> {
        Ok(Self::new(bundle.transforms()?, options))
    }

    pub fn entries(&self) -> &[SearchEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn options(&self) -> SearchOptions {
        self.options
    }

    /// Candidates rejected by the type oracle so far, across all callers.
    pub fn failed_check_cnt(&self) -> u64 {
        self.failed_check_cnt.load(Ordering::Relaxed)
    }

    /// Drive every transform against `site`. Results come back in entry
    /// order, then enumeration order.
    pub fn apply_to(&self, site: &Site, oracle: &dyn TypeOracle) -> Vec<GenerationResult> {
        let started = Instant::now();
        let mut results = Vec::new();
        let mut rejected = 0u64;
        for entry in &self.entries {
            let mut adapter = TransformAdapter::new(&entry.transform, self.options.cost_ceiling);
            if !adapter.check_inside(&site.scope) || !adapter.apply_to(site) {
                continue;
            }
            if adapter.estimate_cost() == Cost::TooExpensive {
                tracing::debug!(provenance = %entry.provenance, "skipping transform over cost ceiling");
                continue;
            }
            let count = adapter.prepare_generate(self.options.use_clone_cache);
            let mut passed = 0usize;
            for _ in 0..count {
                let Some(candidate) = adapter.generate_one() else {
                    break;
                };
                if adapter.pass_typecheck(oracle, &candidate) {
                    results.push(GenerationResult {
                        provenance: entry.provenance.clone(),
                        transform: Arc::clone(&entry.transform),
                        candidate,
                    });
                    passed += 1;
                    if self.options.candidate_quota.is_some_and(|quota| passed >= quota) {
                        break;
                    }
                } else {
                    self.failed_check_cnt.fetch_add(1, Ordering::Relaxed);
                    rejected += 1;
                }
            }
            tracing::debug!(
                provenance = %entry.provenance,
                enumerated = count,
                passed,
                "applied transform"
            );
        }
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            transforms = self.entries.len(),
            candidates = results.len(),
            rejected,
            "search pass complete"
        );
        results
    }

    /// [`apply_to`](Self::apply_to) over several sites on a dedicated pool
    /// of `concurrency` workers. Output order follows `sites`.
    pub fn apply_to_sites(
        &self,
        sites: &[Site],
        oracle: &dyn TypeOracle,
    ) -> Result<Vec<Vec<GenerationResult>>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.concurrency.max(1))
            .build()
            .map_err(|err| Error::Configuration(format!("build search pool: {err}")))?;
        Ok(pool.install(|| {
            sites
                .par_iter()
                .map(|site| self.apply_to(site, oracle))
                .collect()
        }))
    }

    /// Entries whose transform could have produced `fixed` at `site`.
    pub fn coverage(&self, site: &Site, fixed: &[Arc<SyntaxNode>]) -> Vec<&SearchEntry> {
        self.entries
            .iter()
            .filter(|entry| {
                let mut adapter =
                    TransformAdapter::new(&entry.transform, self.options.cost_ceiling);
                adapter.check_inside(&site.scope) && adapter.apply_to(site) && adapter.covers(fixed)
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "search_tests.rs"]
mod tests;
