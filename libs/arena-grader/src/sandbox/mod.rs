/// Execution Sandbox - Abstraction for Running Untrusted Code
///
/// **Core Responsibility:**
/// Compile one source text and run it against one input, under compile and
/// run time budgets, returning captured stdout or a classified failure.
///
/// **Critical Architectural Boundary:**
/// - Sandbox knows HOW to execute (local processes today, containers later)
/// - Sandbox does NOT know scoring rules
/// - Sandbox does NOT compare output
/// - Sandbox never returns an error: infrastructure faults come back as
///   `ExecutionResult` with `FailureKind::Error`
///
/// Stronger isolation (filesystem view, memory limits, no network) belongs
/// behind this same trait without changing callers.

mod process;
mod workspace;

pub use process::ProcessSandbox;
pub use workspace::Workspace;

use arena_common::types::ExecutionResult;
use async_trait::async_trait;
use thiserror::Error;

/// Execution sandbox trait
///
/// Any implementation must guarantee:
/// 1. One isolated workspace per invocation, removed before returning
/// 2. Compile and run budgets enforced independently, run budget per call
/// 3. Processes that exceed a budget are killed, not abandoned
/// 4. stdout captured up to a fixed byte cap
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Compile `source_code` and run it with `stdin` as standard input
    async fn execute(&self, source_code: &str, stdin: &str) -> ExecutionResult;
}

/// Infrastructure failures inside a sandbox invocation
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to prepare workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("failed to write source file: {0}")]
    WriteSource(#[source] std::io::Error),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("compile command is empty")]
    EmptyCompileCommand,

    #[error("sandbox worker pool is closed")]
    PoolClosed,
}
