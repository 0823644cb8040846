//! Configuration helpers.
//!
//! One JSON file carries every tunable bound. Fields left out fall back to
//! the defaults below, and unknown fields are rejected.
use crate::error::{Error, Result};
use crate::generator::GeneratorLimits;
use crate::localize::runner::CommandTestRunner;
use crate::localize::scratch::CopyScratchBuilder;
use crate::localize::LocalizerConfig;
use crate::search::SearchOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const CONFIG_FILE: &str = "config.json";
/// Scratch builds compile a whole project, so they get far longer than a test.
pub const DEFAULT_BUILD_TIMEOUT_SECONDS: u64 = 600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PatchgenConfig {
    pub schema_version: u32,
    pub cost_ceiling: u64,
    pub max_elements: usize,
    pub max_depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_quota: Option<usize>,
    pub use_clone_cache: bool,
    pub n_locs: usize,
    pub n_surrounding_lines: u32,
    pub line_weight: f64,
    pub concurrency: usize,
    pub rewrite_exception_handlers: bool,
    pub test_timeout_seconds: u64,
    pub build_timeout_seconds: u64,
    /// Per-test command template; `{test}` and `{dir}` are substituted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_command: Option<String>,
    /// Run in each scratch copy before its tests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_command: Option<String>,
    /// Source roots searched when resolving stack frames, relative to the
    /// project root.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub source_roots: Vec<String>,
}

impl Default for PatchgenConfig {
    fn default() -> Self {
        default_config()
    }
}

/// Defaults used by `patchgen init` and for every field a file omits.
pub fn default_config() -> PatchgenConfig {
    let search = SearchOptions::default();
    let limits = GeneratorLimits::default();
    let localizer = LocalizerConfig::default();
    PatchgenConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        cost_ceiling: search.cost_ceiling,
        max_elements: limits.max_elements,
        max_depth: limits.max_depth,
        candidate_quota: search.candidate_quota,
        use_clone_cache: search.use_clone_cache,
        n_locs: localizer.n_locs,
        n_surrounding_lines: localizer.n_surrounding_lines,
        line_weight: localizer.line_weight,
        concurrency: search.concurrency,
        rewrite_exception_handlers: localizer.rewrite_exception_handlers,
        test_timeout_seconds: localizer.test_timeout.as_secs(),
        build_timeout_seconds: DEFAULT_BUILD_TIMEOUT_SECONDS,
        test_command: None,
        build_command: None,
        source_roots: Vec::new(),
    }
}

/// Pretty JSON of the defaults, as written by `init`.
pub fn config_stub() -> Result<String> {
    Ok(serde_json::to_string_pretty(&default_config())?)
}

/// `<config_dir>/patchgen/config.json`.
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("patchgen").join(CONFIG_FILE))
        .ok_or_else(|| Error::Configuration("no user config directory on this platform".into()))
}

pub fn load_config(path: &Path) -> Result<PatchgenConfig> {
    let bytes = fs::read(path).map_err(|err| {
        Error::Configuration(format!("read config {}: {err}", path.display()))
    })?;
    let config: PatchgenConfig = serde_json::from_slice(&bytes).map_err(|err| {
        Error::Configuration(format!("parse config {}: {err}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Defaults when `path` does not exist; otherwise the validated file.
pub fn load_or_default(path: &Path) -> Result<PatchgenConfig> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "no config file; using defaults");
        Ok(default_config())
    }
}

pub fn write_config(path: &Path, config: &PatchgenConfig) -> Result<()> {
    validate_config(config)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut text = serde_json::to_string_pretty(config)?;
    text.push('\n');
    fs::write(path, text.as_bytes())?;
    Ok(())
}

pub fn validate_config(config: &PatchgenConfig) -> Result<()> {
    let invalid = |message: String| Err(Error::Configuration(message));
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return invalid(format!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    if config.cost_ceiling == 0 {
        return invalid("cost_ceiling must be positive".into());
    }
    if config.max_elements == 0 {
        return invalid("max_elements must be positive".into());
    }
    if config.max_depth == 0 {
        return invalid("max_depth must be positive".into());
    }
    if config.candidate_quota == Some(0) {
        return invalid("candidate_quota must be positive when set".into());
    }
    if config.concurrency == 0 {
        return invalid("concurrency must be positive".into());
    }
    if !config.line_weight.is_finite() || config.line_weight < 0.0 {
        return invalid(format!(
            "line_weight must be a non-negative number (got {})",
            config.line_weight
        ));
    }
    if config.n_locs == 0 {
        return invalid("n_locs must be positive".into());
    }
    if config.test_timeout_seconds == 0 {
        return invalid("test_timeout_seconds must be positive".into());
    }
    if config.build_timeout_seconds == 0 {
        return invalid("build_timeout_seconds must be positive".into());
    }
    for (label, command) in [
        ("test_command", &config.test_command),
        ("build_command", &config.build_command),
    ] {
        if let Some(command) = command {
            shell_words::split(command)
                .map_err(|err| Error::Configuration(format!("{label}: {err}")))?;
        }
    }
    for root in &config.source_roots {
        let path = Path::new(root);
        if path.is_absolute() || has_parent_components(path) {
            return invalid(format!(
                "source_roots entries must be relative paths without '..' (got {root:?})"
            ));
        }
    }
    Ok(())
}

fn has_parent_components(path: &Path) -> bool {
    path.components()
        .any(|component| matches!(component, std::path::Component::ParentDir))
}

impl PatchgenConfig {
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            cost_ceiling: self.cost_ceiling,
            candidate_quota: self.candidate_quota,
            use_clone_cache: self.use_clone_cache,
            concurrency: self.concurrency,
        }
    }

    pub fn generator_limits(&self) -> GeneratorLimits {
        GeneratorLimits {
            max_elements: self.max_elements,
            max_depth: self.max_depth,
        }
    }

    pub fn localizer(&self) -> LocalizerConfig {
        LocalizerConfig {
            n_locs: self.n_locs,
            n_surrounding_lines: self.n_surrounding_lines,
            line_weight: self.line_weight,
            rewrite_exception_handlers: self.rewrite_exception_handlers,
            test_timeout: Duration::from_secs(self.test_timeout_seconds),
        }
    }

    /// The configured test runner; re-execution without one is a
    /// configuration error.
    pub fn test_runner(&self) -> Result<CommandTestRunner> {
        let command = self.test_command.as_deref().ok_or_else(|| {
            Error::Configuration("test_command is required to re-execute tests".into())
        })?;
        CommandTestRunner::new(command)
    }

    /// Scratch-copy builder for re-execution. Rewriting exception handlers
    /// needs a source codec, which only library callers can supply through
    /// [`CopyScratchBuilder::with_codec`], so it is rejected here.
    pub fn scratch_builder(&self, project: &Path) -> Result<CopyScratchBuilder> {
        if self.rewrite_exception_handlers {
            return Err(Error::Configuration(
                "rewrite_exception_handlers needs a source codec; the command line has none".into(),
            ));
        }
        Ok(CopyScratchBuilder::new(project).with_build_command(
            self.build_argv()?,
            Duration::from_secs(self.build_timeout_seconds),
        ))
    }

    pub fn build_argv(&self) -> Result<Vec<String>> {
        match &self.build_command {
            Some(command) => shell_words::split(command)
                .map_err(|err| Error::Configuration(format!("build_command: {err}"))),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
