//! Stack-trace fault localization.
//!
//! Failing tests are (optionally) re-executed against a scratch copy of the
//! project, the resulting traces are parsed into frames, and every
//! in-project frame spreads a score over the lines around it. Frames nearer
//! the top of the trace and lines nearer the reported one score higher;
//! lines holding a branch, loop, or handler get a fixed boost.
pub mod runner;
pub mod scratch;
pub mod trace;

use crate::error::{Error, Result};
use crate::tree::{kinds, SyntaxNode};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use trace::FrameParser;

/// Penalty for lines after the reported one; execution never reached them.
pub const LATER_LINE_PENALTY: f64 = 0.2;
/// Boost for lines holding a conditional, loop, or exception handler.
pub const CONTROL_FLOW_BOOST: f64 = 0.5;

/// A ranked line. Equality and hashing ignore `score`.
#[derive(Debug, Clone, Serialize)]
pub struct SuspiciousLocation {
    pub path: PathBuf,
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    pub score: f64,
}

impl SuspiciousLocation {
    fn key(&self) -> (&Path, u32, Option<u32>) {
        (self.path.as_path(), self.line, self.column)
    }
}

impl PartialEq for SuspiciousLocation {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for SuspiciousLocation {}

impl Hash for SuspiciousLocation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalizerConfig {
    /// In-project frames considered per failure.
    pub n_locs: usize,
    pub n_surrounding_lines: u32,
    pub line_weight: f64,
    pub rewrite_exception_handlers: bool,
    pub test_timeout: Duration,
}

impl Default for LocalizerConfig {
    fn default() -> Self {
        Self {
            n_locs: 5,
            n_surrounding_lines: 1,
            line_weight: 0.5,
            rewrite_exception_handlers: false,
            test_timeout: Duration::from_secs(60),
        }
    }
}

impl LocalizerConfig {
    fn normalizer(&self) -> f64 {
        self.n_locs as f64 + f64::from(self.n_surrounding_lines) * self.line_weight
    }

    /// Score of the line `offset` lines away from frame `frame_index`,
    /// before the control-flow boost.
    pub fn base_score(&self, frame_index: usize, offset: i64) -> f64 {
        let distance = frame_index as f64 + self.line_weight * offset.unsigned_abs() as f64;
        let mut score = 0.5 - distance / self.normalizer();
        if offset > 0 {
            score -= LATER_LINE_PENALTY;
        }
        score
    }
}

/// Resolves trace frames to project files and reads statements back.
pub trait ProjectIndex {
    /// Project file for a frame, or `None` when the frame lies outside the
    /// project (libraries, the runtime, the test harness).
    fn resolve(&self, owner: &str, file: &str, line: u32) -> Option<PathBuf>;

    /// Statements starting on `line`; empty when the line holds none.
    fn statements_at(&self, path: &Path, line: u32) -> anyhow::Result<Vec<Arc<SyntaxNode>>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub test: String,
    pub passed: bool,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub failure_text: String,
}

/// Executes tests inside a prepared working directory.
pub trait TestRunner {
    fn run(
        &self,
        workdir: &Path,
        tests: &[String],
        timeout: Duration,
    ) -> anyhow::Result<Vec<TestOutcome>>;
}

/// Materializes (and builds) a runnable copy of the project in `scratch`.
pub trait ScratchBuilder {
    fn prepare(&self, scratch: &Path, rewrite_handlers: bool) -> anyhow::Result<()>;
}

/// A failing test and the output captured when it last failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FailureTrace {
    pub test: String,
    #[serde(default)]
    pub text: String,
}

/// Insertion-ordered location set keeping the best score per location.
#[derive(Debug, Default)]
pub struct Ranking {
    locations: Vec<SuspiciousLocation>,
    index: HashMap<(PathBuf, u32, Option<u32>), usize>,
}

impl Ranking {
    pub fn new() -> Self {
        Self::default()
    }

    /// A location seen before keeps its position and the higher score.
    pub fn insert(&mut self, location: SuspiciousLocation) {
        let key = (location.path.clone(), location.line, location.column);
        match self.index.get(&key) {
            Some(&at) => {
                let existing = &mut self.locations[at];
                if location.score > existing.score {
                    existing.score = location.score;
                }
            }
            None => {
                self.index.insert(key, self.locations.len());
                self.locations.push(location);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Descending by score; ties keep first-seen order.
    pub fn into_sorted(self) -> Vec<SuspiciousLocation> {
        let mut locations = self.locations;
        locations.sort_by(|a, b| b.score.total_cmp(&a.score));
        locations
    }
}

pub struct Localizer<'a> {
    config: LocalizerConfig,
    project: &'a dyn ProjectIndex,
    frames: FrameParser,
}

impl<'a> Localizer<'a> {
    pub fn new(config: LocalizerConfig, project: &'a dyn ProjectIndex) -> Result<Self> {
        let normalizer = config.normalizer();
        if normalizer.is_nan() || normalizer <= 0.0 {
            return Err(Error::Configuration(
                "localizer needs n_locs > 0 or a positive surrounding-line weight".to_string(),
            ));
        }
        let frames = FrameParser::new()
            .map_err(|err| Error::Configuration(format!("stack frame pattern: {err}")))?;
        Ok(Self {
            config,
            project,
            frames,
        })
    }

    /// Rank locations from already captured failure output.
    pub fn rank_failures(&self, failures: &[FailureTrace]) -> Result<Vec<SuspiciousLocation>> {
        let started = Instant::now();
        let mut ranking = Ranking::new();
        for failure in failures {
            self.score_trace(&failure.text, &mut ranking)?;
        }
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            failures = failures.len(),
            locations = ranking.len(),
            "localization pass complete"
        );
        Ok(ranking.into_sorted())
    }

    /// Re-execute each failing test in a fresh scratch copy and rank the
    /// traces it produces. A test whose re-execution fails or yields no
    /// failure output falls back to its captured trace.
    pub fn localize(
        &self,
        failures: &[FailureTrace],
        runner: &dyn TestRunner,
        scratch: &dyn ScratchBuilder,
    ) -> Result<Vec<SuspiciousLocation>> {
        let traces: Vec<FailureTrace> = failures
            .iter()
            .map(|failure| match self.rerun(failure, runner, scratch) {
                Ok(Some(text)) => FailureTrace {
                    test: failure.test.clone(),
                    text,
                },
                Ok(None) => {
                    tracing::warn!(
                        test = %failure.test,
                        "re-executed test produced no failure; using captured trace"
                    );
                    failure.clone()
                }
                Err(err) => {
                    tracing::warn!(
                        test = %failure.test,
                        error = %format!("{err:#}"),
                        "re-execution failed; using captured trace"
                    );
                    failure.clone()
                }
            })
            .collect();
        self.rank_failures(&traces)
    }

    fn rerun(
        &self,
        failure: &FailureTrace,
        runner: &dyn TestRunner,
        scratch: &dyn ScratchBuilder,
    ) -> anyhow::Result<Option<String>> {
        let dir = tempfile::Builder::new()
            .prefix("patchgen-scratch-")
            .tempdir()
            .context("create scratch directory")?;
        scratch
            .prepare(dir.path(), self.config.rewrite_exception_handlers)
            .context("prepare scratch copy")?;
        let outcomes = runner
            .run(
                dir.path(),
                std::slice::from_ref(&failure.test),
                self.config.test_timeout,
            )
            .with_context(|| format!("run {}", failure.test))?;
        if let Err(err) = dir.close() {
            tracing::debug!(error = %err, "scratch cleanup failed");
        }
        let outcome = outcomes.into_iter().find(|outcome| outcome.test == failure.test);
        Ok(match outcome {
            Some(outcome) if outcome.timed_out => {
                tracing::warn!(test = %failure.test, "test timed out in scratch copy");
                None
            }
            Some(outcome) if !outcome.passed && !outcome.failure_text.trim().is_empty() => {
                Some(outcome.failure_text)
            }
            _ => None,
        })
    }

    fn score_trace(&self, text: &str, ranking: &mut Ranking) -> Result<()> {
        let in_project = self
            .frames
            .parse(text)
            .into_iter()
            .filter_map(|frame| {
                self.project
                    .resolve(&frame.owner, &frame.file, frame.line)
                    .map(|path| (path, frame.line))
            })
            .take(self.config.n_locs);

        let reach = i64::from(self.config.n_surrounding_lines);
        for (frame_index, (path, line)) in in_project.enumerate() {
            for offset in -reach..=reach {
                let Ok(target) = u32::try_from(i64::from(line) + offset) else {
                    continue;
                };
                if target == 0 {
                    continue;
                }
                let statements = self.project.statements_at(&path, target).map_err(|err| {
                    Error::localization(
                        format!("reading statements at {}:{target}", path.display()),
                        err,
                    )
                })?;
                if statements.is_empty() {
                    continue;
                }
                let mut score = self.config.base_score(frame_index, offset);
                if statements
                    .iter()
                    .any(|stmt| stmt.any(&|node| kinds::is_control_flow(&node.kind)))
                {
                    score += CONTROL_FLOW_BOOST;
                }
                ranking.insert(SuspiciousLocation {
                    path: path.clone(),
                    line: target,
                    column: None,
                    score,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "localize_tests.rs"]
mod tests;
