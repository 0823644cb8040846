use super::*;
use crate::tree::NodeClass;
use std::cell::RefCell;
use std::collections::BTreeMap;

/// In-memory project: `(file, line) -> statement kind`.
#[derive(Default)]
struct FakeProject {
    lines: BTreeMap<(String, u32), &'static str>,
    failing_line: Option<u32>,
}

impl FakeProject {
    fn with(mut self, file: &str, line: u32, kind: &'static str) -> Self {
        self.lines.insert((file.to_string(), line), kind);
        self
    }
}

impl ProjectIndex for FakeProject {
    fn resolve(&self, owner: &str, file: &str, _line: u32) -> Option<PathBuf> {
        owner
            .starts_with("org.example.")
            .then(|| PathBuf::from(format!("src/{file}")))
    }

    fn statements_at(&self, path: &Path, line: u32) -> anyhow::Result<Vec<Arc<SyntaxNode>>> {
        if self.failing_line == Some(line) {
            anyhow::bail!("unreadable line {line}");
        }
        let file = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        Ok(self
            .lines
            .get(&(file, line))
            .map(|kind| vec![Arc::new(SyntaxNode::new(*kind, NodeClass::Stmt))])
            .unwrap_or_default())
    }
}

fn config(n_locs: usize) -> LocalizerConfig {
    LocalizerConfig {
        n_locs,
        n_surrounding_lines: 1,
        line_weight: 0.5,
        ..LocalizerConfig::default()
    }
}

fn trace(frames: &[(&str, &str, u32)]) -> FailureTrace {
    let mut text = String::from("java.lang.AssertionError\n");
    for (owner, file, line) in frames {
        text.push_str(&format!("\tat {owner}.run({file}:{line})\n"));
    }
    FailureTrace {
        test: "CacheTest#evicts".to_string(),
        text,
    }
}

fn close(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() < 1e-4
}

#[test]
fn worked_example_scores_surrounding_lines() {
    let project = FakeProject::default()
        .with("Cache.java", 49, kinds::EXPR_STMT)
        .with("Cache.java", 50, kinds::EXPR_STMT)
        .with("Cache.java", 51, kinds::EXPR_STMT);
    let localizer = Localizer::new(config(1), &project).expect("localizer");
    let ranked = localizer
        .rank_failures(&[trace(&[("org.example.Cache", "Cache.java", 50)])])
        .expect("rank");
    let scores: Vec<(u32, f64)> = ranked.iter().map(|loc| (loc.line, loc.score)).collect();
    assert_eq!(scores.len(), 3);
    assert_eq!(scores[0].0, 50);
    assert!(close(scores[0].1, 0.5));
    assert_eq!(scores[1].0, 49);
    assert!(close(scores[1].1, 0.1667), "got {}", scores[1].1);
    assert_eq!(scores[2].0, 51);
    assert!(close(scores[2].1, -0.0333), "got {}", scores[2].1);
}

#[test]
fn ranking_is_descending_and_stable() {
    let project = FakeProject::default()
        .with("A.java", 10, kinds::EXPR_STMT)
        .with("B.java", 20, kinds::EXPR_STMT);
    let localizer = Localizer::new(config(2), &project).expect("localizer");
    let ranked = localizer
        .rank_failures(&[
            trace(&[("org.example.A", "A.java", 10)]),
            trace(&[("org.example.B", "B.java", 20)]),
        ])
        .expect("rank");
    assert_eq!(ranked.len(), 2);
    assert!(ranked.windows(2).all(|pair| pair[0].score >= pair[1].score));
    assert!(close(ranked[0].score, ranked[1].score));
    assert_eq!(ranked[0].path, PathBuf::from("src/A.java"), "ties keep first-seen order");
}

#[test]
fn duplicate_locations_keep_the_best_score() {
    let project = FakeProject::default().with("Cache.java", 50, kinds::EXPR_STMT);
    let localizer = Localizer::new(config(2), &project).expect("localizer");
    let ranked = localizer
        .rank_failures(&[
            trace(&[
                ("org.example.Cache", "Cache.java", 80),
                ("org.example.Cache", "Cache.java", 50),
            ]),
            trace(&[("org.example.Cache", "Cache.java", 50)]),
        ])
        .expect("rank");
    assert_eq!(ranked.len(), 1);
    assert!(close(ranked[0].score, 0.5));
}

#[test]
fn control_flow_lines_are_boosted() {
    let project = FakeProject::default()
        .with("Cache.java", 49, kinds::IF)
        .with("Cache.java", 50, kinds::EXPR_STMT);
    let localizer = Localizer::new(config(1), &project).expect("localizer");
    let ranked = localizer
        .rank_failures(&[trace(&[("org.example.Cache", "Cache.java", 50)])])
        .expect("rank");
    assert_eq!(ranked[0].line, 49);
    assert!(close(ranked[0].score, 0.1667 + CONTROL_FLOW_BOOST));
}

#[test]
fn frames_outside_the_project_do_not_count() {
    let project = FakeProject::default()
        .with("Cache.java", 50, kinds::EXPR_STMT)
        .with("Cache.java", 70, kinds::EXPR_STMT);
    let localizer = Localizer::new(config(1), &project).expect("localizer");
    let ranked = localizer
        .rank_failures(&[trace(&[
            ("org.junit.Assert", "Assert.java", 12),
            ("org.example.Cache", "Cache.java", 50),
            ("org.example.Cache", "Cache.java", 70),
        ])])
        .expect("rank");
    assert_eq!(ranked.len(), 1, "only the first in-project frame is used");
    assert_eq!(ranked[0].line, 50);
    assert!(close(ranked[0].score, 0.5));
}

#[test]
fn scoring_error_aborts_the_pass() {
    let project = FakeProject {
        failing_line: Some(51),
        ..FakeProject::default()
    };
    let localizer = Localizer::new(config(1), &project).expect("localizer");
    let err = localizer
        .rank_failures(&[trace(&[("org.example.Cache", "Cache.java", 50)])])
        .expect_err("unreadable line");
    assert!(matches!(err, Error::Localization { .. }));
}

#[test]
fn zero_normalizer_is_a_configuration_error() {
    let project = FakeProject::default();
    let config = LocalizerConfig {
        n_locs: 0,
        n_surrounding_lines: 0,
        ..LocalizerConfig::default()
    };
    assert!(matches!(
        Localizer::new(config, &project),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn location_equality_ignores_score() {
    let a = SuspiciousLocation {
        path: PathBuf::from("A.java"),
        line: 3,
        column: None,
        score: 0.1,
    };
    let b = SuspiciousLocation { score: 0.9, ..a.clone() };
    assert_eq!(a, b);
    let mut ranking = Ranking::new();
    ranking.insert(a);
    ranking.insert(b);
    let sorted = ranking.into_sorted();
    assert_eq!(sorted.len(), 1);
    assert!(close(sorted[0].score, 0.9));
}

struct ScriptedRunner {
    text: String,
    calls: RefCell<Vec<PathBuf>>,
}

impl TestRunner for ScriptedRunner {
    fn run(
        &self,
        workdir: &Path,
        tests: &[String],
        _timeout: Duration,
    ) -> anyhow::Result<Vec<TestOutcome>> {
        self.calls.borrow_mut().push(workdir.to_path_buf());
        Ok(tests
            .iter()
            .map(|test| TestOutcome {
                test: test.clone(),
                passed: false,
                timed_out: false,
                failure_text: self.text.clone(),
            })
            .collect())
    }
}

struct NoopScratch;

impl ScratchBuilder for NoopScratch {
    fn prepare(&self, scratch: &Path, _rewrite_handlers: bool) -> anyhow::Result<()> {
        anyhow::ensure!(scratch.is_dir(), "scratch directory missing");
        Ok(())
    }
}

struct BrokenScratch;

impl ScratchBuilder for BrokenScratch {
    fn prepare(&self, _scratch: &Path, _rewrite_handlers: bool) -> anyhow::Result<()> {
        anyhow::bail!("compilation failed")
    }
}

#[test]
fn localize_prefers_re_executed_trace() {
    let project = FakeProject::default()
        .with("Cache.java", 50, kinds::EXPR_STMT)
        .with("Cache.java", 90, kinds::EXPR_STMT);
    let localizer = Localizer::new(config(1), &project).expect("localizer");
    let runner = ScriptedRunner {
        text: trace(&[("org.example.Cache", "Cache.java", 90)]).text,
        calls: RefCell::new(Vec::new()),
    };
    let captured = trace(&[("org.example.Cache", "Cache.java", 50)]);
    let ranked = localizer
        .localize(&[captured], &runner, &NoopScratch)
        .expect("localize");
    assert_eq!(ranked[0].line, 90);
    let calls = runner.calls.borrow();
    assert_eq!(calls.len(), 1);
    assert!(!calls[0].exists(), "scratch copy is removed");
}

#[test]
fn localize_falls_back_to_captured_trace() {
    let project = FakeProject::default().with("Cache.java", 50, kinds::EXPR_STMT);
    let localizer = Localizer::new(config(1), &project).expect("localizer");
    let runner = ScriptedRunner {
        text: String::new(),
        calls: RefCell::new(Vec::new()),
    };
    let captured = trace(&[("org.example.Cache", "Cache.java", 50)]);
    let ranked = localizer
        .localize(std::slice::from_ref(&captured), &runner, &BrokenScratch)
        .expect("localize");
    assert_eq!(ranked.len(), 1);
    assert!(runner.calls.borrow().is_empty());

    let ranked = localizer
        .localize(&[captured], &runner, &NoopScratch)
        .expect("localize");
    assert_eq!(ranked[0].line, 50, "empty re-run output keeps the captured trace");
}
