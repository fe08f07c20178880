//! Batch transpilation through the out-of-process `hyper` compiler.
//!
//! The request/response contract is the [`TranspilePort`] trait so that
//! callers can swap the external process for the in-memory generator.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::OnceLock;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::compiler::transpile_with;
use crate::config::{BridgeConfig, DEFAULT_TIMEOUT, GeneratorOptions};
use crate::error::{CoreError, ProcessFailure};
use crate::wire::TranspileOutput;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Synchronous request/response transpilation.
///
/// Failures are deterministic for a given input, so implementations never
/// retry.
pub trait TranspilePort {
    fn transpile(&self, source: &str, include_pieces: bool) -> Result<TranspileOutput, CoreError>;
}

/// Runs the generator in this process.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTranspiler {
    options: GeneratorOptions,
}

impl InMemoryTranspiler {
    pub fn new(options: GeneratorOptions) -> Self {
        InMemoryTranspiler { options }
    }
}

impl TranspilePort for InMemoryTranspiler {
    fn transpile(&self, source: &str, include_pieces: bool) -> Result<TranspileOutput, CoreError> {
        let program = transpile_with(source, &self.options)?;
        Ok(TranspileOutput::from_program(&program, include_pieces))
    }
}

/// Spawns the compiler binary once per request.
#[derive(Debug, Clone)]
pub struct ProcessBridge {
    binary: PathBuf,
    leading_args: Vec<String>,
    timeout: Duration,
}

impl ProcessBridge {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        ProcessBridge {
            binary: binary.into(),
            leading_args: vec!["generate".to_string()],
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_config(binary: impl Into<PathBuf>, config: &BridgeConfig) -> Self {
        ProcessBridge {
            binary: binary.into(),
            leading_args: config.leading_args.clone(),
            timeout: config.timeout,
        }
    }

    /// Locate the binary with `locator` and configure the bridge from its
    /// settings.
    pub fn discover(locator: &BinaryLocator) -> Result<Self, CoreError> {
        let binary = locator.locate()?;
        Ok(ProcessBridge::from_config(binary, locator.config()))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn args(&self, include_pieces: bool) -> Vec<String> {
        let mut args = self.leading_args.clone();
        args.push("--stdin".to_string());
        args.push("--json".to_string());
        if include_pieces {
            args.push("--pieces".to_string());
        }
        args
    }

    fn timed_out(&self) -> CoreError {
        CoreError::ExternalProcess(ProcessFailure::Timeout {
            after: self.timeout,
        })
    }

    fn wait(&self, child: &mut Child, deadline: Instant) -> Result<ExitStatus, CoreError> {
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                warn!(binary = %self.binary.display(), timeout = ?self.timeout, "compiler timed out; killing it");
                let _ = child.kill();
                let _ = child.wait();
                return Err(self.timed_out());
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Output of one pipe, or a timeout when something still holds the
    /// pipe open at the deadline. The reader thread is left behind then.
    fn collect(
        &self,
        pipe: Option<Receiver<io::Result<Vec<u8>>>>,
        deadline: Instant,
    ) -> Result<Vec<u8>, CoreError> {
        let Some(pipe) = pipe else {
            return Ok(Vec::new());
        };
        match pipe.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(bytes) => Ok(bytes?),
            Err(RecvTimeoutError::Timeout) => {
                warn!(binary = %self.binary.display(), timeout = ?self.timeout, "compiler output still open after exit");
                Err(self.timed_out())
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(io::Error::other("pipe reader thread panicked").into())
            }
        }
    }
}

impl TranspilePort for ProcessBridge {
    fn transpile(&self, source: &str, include_pieces: bool) -> Result<TranspileOutput, CoreError> {
        let args = self.args(include_pieces);
        debug!(binary = %self.binary.display(), ?args, "spawning compiler");

        let deadline = Instant::now() + self.timeout;
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Pipes are serviced on detached threads; every wait on them is
        // bounded by the deadline.
        if let Some(mut stdin) = child.stdin.take() {
            let input = source.to_owned();
            thread::spawn(move || {
                // A child that exits without reading reports through its
                // exit status instead.
                let _ = stdin.write_all(input.as_bytes());
            });
        }
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = self.wait(&mut child, deadline)?;
        let stdout = self.collect(stdout, deadline)?;
        let stderr = self.collect(stderr, deadline)?;

        if !status.success() {
            return Err(CoreError::ExternalProcess(ProcessFailure::Exit {
                code: status.code(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            }));
        }

        let output = TranspileOutput::from_json(&stdout)?;
        output.validate_for(source, include_pieces)?;
        Ok(output)
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> Receiver<io::Result<Vec<u8>>> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let result = reader.read_to_end(&mut buffer).map(|_| buffer);
        // The receiver is gone once the bridge has given up on this pipe.
        let _ = sender.send(result);
    });
    receiver
}

/// Finds the compiler binary once and remembers the answer.
#[derive(Debug)]
pub struct BinaryLocator {
    config: BridgeConfig,
    resolved: OnceLock<Result<PathBuf, Vec<PathBuf>>>,
}

impl BinaryLocator {
    pub fn new(config: BridgeConfig) -> Self {
        BinaryLocator {
            config,
            resolved: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn locate(&self) -> Result<PathBuf, CoreError> {
        self.resolved
            .get_or_init(|| {
                let found = search(&self.config, env::var_os("PATH"));
                match &found {
                    Ok(path) => info!(binary = %path.display(), "found compiler"),
                    Err(searched) => warn!(searched = searched.len(), "compiler binary not found"),
                }
                found
            })
            .clone()
            .map_err(|searched| CoreError::BinaryNotFound {
                binary: self.config.binary_name.clone(),
                searched,
            })
    }
}

/// Explicit path, then the candidate directories in order, then `PATH`.
/// On failure returns every explicit path that was checked.
fn search(config: &BridgeConfig, path_var: Option<OsString>) -> Result<PathBuf, Vec<PathBuf>> {
    if let Some(path) = &config.binary_path {
        return if is_executable(path) {
            Ok(path.clone())
        } else {
            Err(vec![path.clone()])
        };
    }

    let file_name = format!("{}{}", config.binary_name, env::consts::EXE_SUFFIX);
    let mut searched = Vec::new();
    for dir in &config.candidate_dirs {
        let candidate = dir.join(&file_name);
        if is_executable(&candidate) {
            return Ok(candidate);
        }
        searched.push(candidate);
    }

    if let Some(path_var) = path_var {
        for dir in env::split_paths(&path_var) {
            let candidate = dir.join(&file_name);
            if is_executable(&candidate) {
                return Ok(candidate);
            }
        }
    }

    Err(searched)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    fs::metadata(path).map(|meta| meta.is_file()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_with(dirs: Vec<PathBuf>) -> BridgeConfig {
        BridgeConfig {
            binary_name: "hyper".to_string(),
            binary_path: None,
            candidate_dirs: dirs,
            timeout: Duration::from_secs(5),
            leading_args: vec!["generate".to_string()],
        }
    }

    #[cfg(unix)]
    fn install(dir: &Path, name: &str, mode: u32) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\n").expect("write binary");
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).expect("chmod");
        path
    }

    #[cfg(unix)]
    #[test]
    fn first_candidate_directory_wins() {
        let first = TempDir::new().expect("tempdir");
        let second = TempDir::new().expect("tempdir");
        install(second.path(), "hyper", 0o755);
        let expected = install(first.path(), "hyper", 0o755);

        let config = config_with(vec![first.path().to_path_buf(), second.path().to_path_buf()]);
        assert_eq!(search(&config, None), Ok(expected));
    }

    #[cfg(unix)]
    #[test]
    fn skips_files_that_are_not_executable() {
        let dir = TempDir::new().expect("tempdir");
        let on_path = TempDir::new().expect("tempdir");
        install(dir.path(), "hyper", 0o644);
        let expected = install(on_path.path(), "hyper", 0o755);

        let config = config_with(vec![dir.path().to_path_buf()]);
        let path_var = env::join_paths([on_path.path()]).expect("join paths");
        assert_eq!(search(&config, Some(path_var)), Ok(expected));
    }

    #[test]
    fn reports_every_searched_candidate() {
        let dir = TempDir::new().expect("tempdir");
        let config = config_with(vec![dir.path().to_path_buf()]);
        let empty = TempDir::new().expect("tempdir");
        let path_var = env::join_paths([empty.path()]).expect("join paths");

        let searched = search(&config, Some(path_var)).unwrap_err();
        assert_eq!(searched.len(), 1);
        assert!(searched[0].starts_with(dir.path()));
    }

    #[test]
    fn explicit_binary_path_short_circuits_discovery() {
        let dir = TempDir::new().expect("tempdir");
        let mut config = config_with(Vec::new());
        config.binary_path = Some(dir.path().join("missing-hyper"));

        let locator = BinaryLocator::new(config);
        let err = locator.locate().unwrap_err();
        match err {
            CoreError::BinaryNotFound { binary, searched } => {
                assert_eq!(binary, "hyper");
                assert_eq!(searched, vec![dir.path().join("missing-hyper")]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The failure is cached: a binary appearing later is not picked up.
        fs::write(dir.path().join("missing-hyper"), "").expect("write");
        assert!(locator.locate().is_err());
    }

    #[test]
    fn in_memory_port_matches_generator() {
        let port = InMemoryTranspiler::default();
        let output = port.transpile("<p>{x}</p>\n", true).expect("transpile");
        assert!(output.generated_code.contains("t\"\"\"<p>{x}</p>\"\"\""));
        assert_eq!(output.pieces.map(|p| p.len()), Some(2));
    }

    #[test]
    fn in_memory_port_reports_structure_errors() {
        let err = InMemoryTranspiler::default()
            .transpile("for x in xs:\n", false)
            .unwrap_err();
        assert!(err.is_input_error());
    }

    #[cfg(unix)]
    mod process {
        use super::*;

        /// Bridge that runs `script` through `/bin/sh`; the script sees the
        /// mode flags as its arguments.
        fn script_bridge(dir: &TempDir, body: &str) -> ProcessBridge {
            let script = dir.path().join("fake-hyper.sh");
            fs::write(&script, body).expect("write script");
            ProcessBridge::new("/bin/sh")
                .with_leading_args([script.display().to_string()])
                .with_timeout(Duration::from_secs(5))
        }

        #[test]
        fn decodes_successful_output() {
            let dir = TempDir::new().expect("tempdir");
            let bridge = script_bridge(
                &dir,
                r#"cat > /dev/null
printf '%s' '{"generated_code":"def f():\n    pass\n","source_mappings":[{"gen_line":0,"gen_col":0,"src_line":0,"src_col":0}]}'
"#,
            );
            let output = bridge.transpile("<p/>\n", false).expect("transpile");
            assert_eq!(output.generated_code, "def f():\n    pass\n");
            assert_eq!(output.source_mappings.len(), 1);
            assert!(output.pieces.is_none());
        }

        #[test]
        fn passes_mode_flags_and_source() {
            let dir = TempDir::new().expect("tempdir");
            let bridge = script_bridge(
                &dir,
                r#"input=$(cat)
[ "$*" = "--stdin --json --pieces" ] || { echo "bad args: $*" >&2; exit 9; }
[ "$input" = "<p/>" ] || { echo "bad input: $input" >&2; exit 8; }
printf '%s' '{"generated_code":"","source_mappings":[],"pieces":[{"prefix":"def f():\n","suffix":"","src_start":0,"src_end":0},{"prefix":"    ","suffix":"\n","src_start":0,"src_end":4}]}'
"#,
            );
            let output = bridge.transpile("<p/>\n", true).expect("transpile");
            assert_eq!(output.pieces.map(|p| p.len()), Some(2));
        }

        #[test]
        fn surfaces_stderr_on_failure() {
            let dir = TempDir::new().expect("tempdir");
            let bridge = script_bridge(&dir, "cat > /dev/null\necho 'line 3: boom' >&2\nexit 2\n");
            let err = bridge.transpile("<p/>\n", false).unwrap_err();
            match err {
                CoreError::ExternalProcess(ProcessFailure::Exit { code, stderr }) => {
                    assert_eq!(code, Some(2));
                    assert!(stderr.contains("line 3: boom"));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[test]
        fn kills_the_compiler_on_timeout() {
            let dir = TempDir::new().expect("tempdir");
            let bridge = script_bridge(&dir, "exec sleep 5\n")
                .with_timeout(Duration::from_millis(200));
            let started = Instant::now();
            let err = bridge.transpile("<p/>\n", false).unwrap_err();
            assert!(matches!(
                err,
                CoreError::ExternalProcess(ProcessFailure::Timeout { .. })
            ));
            assert!(started.elapsed() < Duration::from_secs(4));
        }

        #[test]
        fn rejects_malformed_payload() {
            let dir = TempDir::new().expect("tempdir");
            let bridge = script_bridge(&dir, "cat > /dev/null\necho 'not json'\n");
            let err = bridge.transpile("<p/>\n", false).unwrap_err();
            assert!(matches!(err, CoreError::Decode(_)));
        }

        #[test]
        fn rejects_missing_piece_list() {
            let dir = TempDir::new().expect("tempdir");
            let bridge = script_bridge(
                &dir,
                r#"cat > /dev/null
printf '%s' '{"generated_code":"","source_mappings":[]}'
"#,
            );
            let err = bridge.transpile("<p/>\n", true).unwrap_err();
            assert!(matches!(err, CoreError::Decode(_)));
        }

        #[test]
        fn rejects_overlapping_pieces() {
            let dir = TempDir::new().expect("tempdir");
            let bridge = script_bridge(
                &dir,
                r#"cat > /dev/null
printf '%s' '{"generated_code":"","source_mappings":[],"pieces":[{"prefix":"","suffix":"","src_start":1,"src_end":4},{"prefix":"","suffix":"","src_start":2,"src_end":3}]}'
"#,
            );
            let err = bridge.transpile("<p/>\n", true).unwrap_err();
            assert!(matches!(err, CoreError::InvariantViolation { .. }));
        }

        #[test]
        fn rejects_pieces_outside_the_source() {
            let dir = TempDir::new().expect("tempdir");
            let bridge = script_bridge(
                &dir,
                r#"cat > /dev/null
printf '%s' '{"generated_code":"","source_mappings":[],"pieces":[{"prefix":"","suffix":"","src_start":0,"src_end":999}]}'
"#,
            );
            let err = bridge.transpile("<p/>\n", true).unwrap_err();
            assert!(matches!(err, CoreError::Decode(_)));
        }

        #[test]
        fn times_out_when_a_helper_keeps_output_open() {
            let dir = TempDir::new().expect("tempdir");
            let bridge = script_bridge(
                &dir,
                r#"cat > /dev/null
sleep 4 &
printf '%s' '{"generated_code":"","source_mappings":[]}'
"#,
            )
            .with_timeout(Duration::from_millis(300));
            let started = Instant::now();
            let err = bridge.transpile("<p/>\n", false).unwrap_err();
            assert!(matches!(
                err,
                CoreError::ExternalProcess(ProcessFailure::Timeout { .. })
            ));
            assert!(started.elapsed() < Duration::from_secs(3));
        }
    }
}
