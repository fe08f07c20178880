//! Options for generation and for the out-of-process bridge.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable that points the bridge at a specific compiler
/// binary, bypassing discovery.
pub const BINARY_ENV_VAR: &str = "HYPER_BIN";

pub const DEFAULT_FUNCTION_NAME: &str = "__hyper_template__";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shape of the generated host-language program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorOptions {
    /// Name of the wrapping function definition.
    pub function_name: String,
    /// One level of indentation.
    pub indent: String,
    /// Literal prefix placed before the triple quote of markup strings.
    pub markup_string_prefix: String,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        GeneratorOptions {
            function_name: DEFAULT_FUNCTION_NAME.to_string(),
            indent: "    ".to_string(),
            markup_string_prefix: "t".to_string(),
        }
    }
}

impl GeneratorOptions {
    pub fn indent(&self, level: usize) -> String {
        self.indent.repeat(level)
    }
}

/// Where and how the bridge finds and runs the batch compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub binary_name: String,
    /// Explicit binary; when set, discovery checks only this path.
    pub binary_path: Option<PathBuf>,
    /// Directories probed in order before falling back to `PATH`.
    pub candidate_dirs: Vec<PathBuf>,
    pub timeout: Duration,
    /// Arguments placed before the mode flags, e.g. a subcommand.
    pub leading_args: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let mut candidate_dirs = Vec::new();
        if let Some(home) = env::var_os("HOME") {
            let home = PathBuf::from(home);
            candidate_dirs.push(home.join(".cargo/bin"));
            candidate_dirs.push(home.join(".local/bin"));
        }
        candidate_dirs.push(PathBuf::from("/usr/local/bin"));
        candidate_dirs.push(PathBuf::from("/opt/homebrew/bin"));
        candidate_dirs.push(PathBuf::from("/usr/bin"));

        BridgeConfig {
            binary_name: "hyper".to_string(),
            binary_path: binary_override(),
            candidate_dirs,
            timeout: DEFAULT_TIMEOUT,
            leading_args: vec!["generate".to_string()],
        }
    }
}

/// Explicit override from [`BINARY_ENV_VAR`], if set and non-empty.
fn binary_override() -> Option<PathBuf> {
    env::var_os(BINARY_ENV_VAR)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
