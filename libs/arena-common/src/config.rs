use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Placeholder replaced by the source file path in `compile_command`
pub const SOURCE_PLACEHOLDER: &str = "{source}";
/// Placeholder replaced by the output binary path in `compile_command`
pub const BINARY_PLACEHOLDER: &str = "{binary}";

/// Grading configuration
/// Loaded once at contest start and passed explicitly to the components that need it.
/// Provides defaults with environment variable overrides.
#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub compile_timeout_ms: u64,
    pub run_timeout_ms: u64,
    pub max_output_bytes: usize,
    /// Global cap on simultaneous sandbox invocations
    pub max_concurrent_executions: usize,
    /// Test cases of one question run concurrently up to this bound (1 = sequential)
    pub test_case_parallelism: usize,
    pub compile_command: Vec<String>,
    pub source_file_name: String,
    pub workspace_root: PathBuf,
    pub finalize_attempts: u32,
    pub submit_deadline_ms: u64,
    /// How long one instance may hold a team's grading claim before another may take over
    pub grading_lease_ms: u64,
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            redis_url: env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            compile_timeout_ms: env_parse("COMPILE_TIMEOUT_MS").unwrap_or(defaults.compile_timeout_ms),
            run_timeout_ms: env_parse("RUN_TIMEOUT_MS").unwrap_or(defaults.run_timeout_ms),
            max_output_bytes: env_parse("MAX_OUTPUT_BYTES").unwrap_or(defaults.max_output_bytes),
            max_concurrent_executions: env_parse("MAX_CONCURRENT_EXECUTIONS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_executions),
            test_case_parallelism: env_parse("TEST_CASE_PARALLELISM")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.test_case_parallelism),
            compile_command: env::var("COMPILE_COMMAND")
                .ok()
                .map(|v| split_command(&v))
                .filter(|cmd| !cmd.is_empty())
                .unwrap_or(defaults.compile_command),
            source_file_name: env::var("SOURCE_FILE_NAME").unwrap_or(defaults.source_file_name),
            workspace_root: env::var("SANDBOX_WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_root),
            finalize_attempts: env_parse("FINALIZE_ATTEMPTS")
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.finalize_attempts),
            submit_deadline_ms: env_parse("SUBMIT_DEADLINE_MS").unwrap_or(defaults.submit_deadline_ms),
            grading_lease_ms: env_parse("GRADING_LEASE_MS")
                .filter(|n: &u64| *n > 0)
                .unwrap_or(defaults.grading_lease_ms),
        }
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_timeout_ms)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    pub fn submit_deadline(&self) -> Duration {
        Duration::from_millis(self.submit_deadline_ms)
    }

    pub fn grading_lease(&self) -> Duration {
        Duration::from_millis(self.grading_lease_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            compile_timeout_ms: 10_000,
            run_timeout_ms: 5_000,
            max_output_bytes: 10_000,
            max_concurrent_executions: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            test_case_parallelism: 1,
            compile_command: split_command("gcc {source} -o {binary} -lm"),
            source_file_name: "main.c".to_string(),
            workspace_root: env::temp_dir(),
            finalize_attempts: 3,
            submit_deadline_ms: 120_000,
            grading_lease_ms: 600_000,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn split_command(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}
