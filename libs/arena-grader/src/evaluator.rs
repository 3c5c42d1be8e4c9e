/// Test-Case Evaluator - Scoring Logic for One Code Question
///
/// **Core Responsibility:**
/// Run the sandbox once per test case, compare normalized output against the
/// expected output, and turn the pass ratio into an integer mark.
///
/// **Critical Properties:**
/// - Knows nothing about process spawning or persistence
/// - Every test case is attempted, an early failure never short-circuits
/// - Results come back in test-case order even when cases run concurrently
///
/// **Scoring Rules:**
/// - passed iff the sandbox succeeded AND normalized outputs are equal
/// - marks_earned = round(total_marks * passed / total), half rounds up
/// - no test cases => zero marks, zero cases, empty results

use crate::sandbox::Sandbox;
use arena_common::types::{TestCase, TestCaseResult};
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::debug;

/// Aggregated outcome for one question
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub results: Vec<TestCaseResult>,
    pub passed_count: usize,
    pub total_cases: usize,
    pub marks_earned: u32,
}

impl Evaluation {
    /// One `TC <n>: PASS|FAIL` line per test case
    pub fn summary(&self) -> String {
        self.results
            .iter()
            .enumerate()
            .map(|(idx, r)| format!("TC {}: {}", idx + 1, if r.passed { "PASS" } else { "FAIL" }))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Canonical form used on both sides of the comparison
///
/// CRLF and lone CR become LF, trailing whitespace is removed from every
/// line, then the whole text is trimmed. Comparison after this is exact.
pub fn normalize_output(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    unified
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// round(total_marks * passed / total_cases) with the zero-case guard
pub fn marks_for(total_marks: u32, passed: usize, total_cases: usize) -> u32 {
    if total_cases == 0 {
        return 0;
    }
    let numerator = 2 * total_marks as u64 * passed as u64 + total_cases as u64;
    (numerator / (2 * total_cases as u64)) as u32
}

/// Evaluate `code` against `test_cases`
///
/// `parallelism` bounds how many cases of this question run at once
/// (1 = strictly sequential). The sandbox's own pool still caps the global load.
pub async fn evaluate<S>(
    sandbox: &S,
    code: &str,
    test_cases: &[TestCase],
    total_marks: u32,
    parallelism: usize,
) -> Evaluation
where
    S: Sandbox + ?Sized,
{
    if test_cases.is_empty() {
        return Evaluation::default();
    }

    let pending: Vec<BoxFuture<'_, TestCaseResult>> = test_cases
        .iter()
        .enumerate()
        .map(|(idx, test_case)| run_case(sandbox, code, idx, test_case).boxed())
        .collect();

    let results: Vec<TestCaseResult> = stream::iter(pending)
        .buffered(parallelism.max(1))
        .collect()
        .await;

    let passed_count = results.iter().filter(|r| r.passed).count();
    let total_cases = results.len();

    Evaluation {
        marks_earned: marks_for(total_marks, passed_count, total_cases),
        results,
        passed_count,
        total_cases,
    }
}

async fn run_case<S>(sandbox: &S, code: &str, idx: usize, test_case: &TestCase) -> TestCaseResult
where
    S: Sandbox + ?Sized,
{
    let execution = sandbox.execute(code, &test_case.input).await;
    let passed = execution.success
        && normalize_output(&execution.stdout) == normalize_output(&test_case.expected_output);

    debug!(
        test_case = idx + 1,
        passed,
        failure = ?execution.failure,
        execution_time_ms = execution.execution_time_ms,
        "Test case evaluated"
    );

    TestCaseResult {
        input: test_case.input.clone(),
        expected: test_case.expected_output.clone(),
        actual: execution.stdout,
        passed,
        failure: execution.failure,
        error: execution.message,
    }
}
