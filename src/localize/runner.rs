use super::{TestOutcome, TestRunner};
use crate::error::{Error, Result};
use crate::util::{truncate_bytes, truncate_string};
use anyhow::Context;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

const MAX_FAILURE_TEXT_BYTES: usize = 256 * 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Finished (or killed) process with its captured output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: Option<ExitStatus>,
    pub timed_out: bool,
    pub duration_ms: u128,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.is_some_and(|status| status.success())
    }
}

/// Run `argv` in `cwd`, killing it once `timeout` elapses. Output goes to
/// anonymous temp files so a chatty child never blocks on a full pipe.
pub fn run_with_timeout(
    argv: &[String],
    cwd: &Path,
    timeout: Duration,
) -> anyhow::Result<CommandOutput> {
    let (program, args) = argv.split_first().context("empty command")?;
    let mut stdout_file = tempfile::tempfile().context("create stdout capture")?;
    let mut stderr_file = tempfile::tempfile().context("create stderr capture")?;
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(
            stdout_file.try_clone().context("share stdout capture")?,
        ))
        .stderr(Stdio::from(
            stderr_file.try_clone().context("share stderr capture")?,
        ))
        .current_dir(cwd);

    let start = Instant::now();
    let mut child = cmd.spawn().with_context(|| format!("spawn {program}"))?;
    let mut timed_out = false;

    let status = loop {
        if let Some(status) = child.try_wait().context("check command status")? {
            break Some(status);
        }
        if start.elapsed() > timeout {
            timed_out = true;
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    Ok(CommandOutput {
        status,
        timed_out,
        duration_ms: start.elapsed().as_millis(),
        stdout: read_capture(&mut stdout_file)?,
        stderr: read_capture(&mut stderr_file)?,
    })
}

fn read_capture(file: &mut File) -> anyhow::Result<String> {
    file.seek(SeekFrom::Start(0)).context("rewind capture")?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).context("read capture")?;
    Ok(truncate_bytes(&bytes, MAX_FAILURE_TEXT_BYTES))
}

/// Runs one command per test from a template such as
/// `mvn -q test -Dtest={test}`. `{test}` and `{dir}` are substituted per
/// argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTestRunner {
    template: Vec<String>,
}

impl CommandTestRunner {
    /// Split `template` shell-style and check the program is runnable.
    pub fn new(template: &str) -> Result<Self> {
        let template = shell_words::split(template)
            .map_err(|err| Error::Configuration(format!("test_command: {err}")))?;
        let program = template
            .first()
            .ok_or_else(|| Error::Configuration("test_command is empty".to_string()))?;
        resolve_program(program)?;
        Ok(Self { template })
    }

    pub fn template(&self) -> &[String] {
        &self.template
    }

    fn argv(&self, test: &str, workdir: &Path) -> Vec<String> {
        let dir = workdir.display().to_string();
        self.template
            .iter()
            .map(|arg| arg.replace("{test}", test).replace("{dir}", &dir))
            .collect()
    }
}

fn resolve_program(program: &str) -> Result<PathBuf> {
    let path = PathBuf::from(program);
    if path.parent().is_some_and(|parent| !parent.as_os_str().is_empty()) {
        return if path.is_file() {
            Ok(path)
        } else {
            Err(Error::Configuration(format!(
                "test program {program} does not exist"
            )))
        };
    }
    which::which(program)
        .map_err(|err| Error::Configuration(format!("test program {program} not on PATH: {err}")))
}

impl TestRunner for CommandTestRunner {
    fn run(
        &self,
        workdir: &Path,
        tests: &[String],
        timeout: Duration,
    ) -> anyhow::Result<Vec<TestOutcome>> {
        let mut outcomes = Vec::with_capacity(tests.len());
        for test in tests {
            let argv = self.argv(test, workdir);
            let output = run_with_timeout(&argv, workdir, timeout)
                .with_context(|| format!("run test {test}"))?;
            tracing::debug!(
                %test,
                duration_ms = output.duration_ms as u64,
                exit_code = output.status.and_then(|status| status.code()),
                timed_out = output.timed_out,
                "test finished"
            );
            let passed = output.success();
            let failure_text = if passed {
                String::new()
            } else {
                truncate_string(
                    &format!("{}{}", output.stdout, output.stderr),
                    MAX_FAILURE_TEXT_BYTES,
                )
            };
            outcomes.push(TestOutcome {
                test: test.clone(),
                passed,
                timed_out: output.timed_out,
                failure_text,
            });
        }
        Ok(outcomes)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_failure_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = CommandTestRunner::new(
            "sh -c 'echo \"\tat org.example.Cache.get(Cache.java:12) {test}\"; exit 1'",
        )
        .expect("runner");
        let outcomes = runner
            .run(dir.path(), &["CacheTest".to_string()], Duration::from_secs(10))
            .expect("run");
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].passed);
        assert!(!outcomes[0].timed_out);
        assert!(outcomes[0].failure_text.contains("Cache.java:12) CacheTest"));
    }

    #[test]
    fn passing_test_has_no_failure_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = CommandTestRunner::new("sh -c 'echo ok'").expect("runner");
        let outcomes = runner
            .run(dir.path(), &["t".to_string()], Duration::from_secs(10))
            .expect("run");
        assert!(outcomes[0].passed);
        assert!(outcomes[0].failure_text.is_empty());
    }

    #[test]
    fn slow_test_times_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = CommandTestRunner::new("sleep 5").expect("runner");
        let outcomes = runner
            .run(dir.path(), &["t".to_string()], Duration::from_millis(100))
            .expect("run");
        assert!(outcomes[0].timed_out);
        assert!(!outcomes[0].passed);
    }

    #[test]
    fn workdir_is_substituted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = CommandTestRunner::new("true {dir}/{test}").expect("runner");
        let argv = runner.argv("Foo", dir.path());
        assert_eq!(argv[1], format!("{}/Foo", dir.path().display()));
    }

    #[test]
    fn missing_program_is_a_configuration_error() {
        let err = CommandTestRunner::new("patchgen-no-such-runner --x").expect_err("missing");
        assert!(matches!(err, Error::Configuration(_)));
        assert!(matches!(
            CommandTestRunner::new("   "),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            CommandTestRunner::new("sh -c 'unterminated"),
            Err(Error::Configuration(_))
        ));
    }
}
