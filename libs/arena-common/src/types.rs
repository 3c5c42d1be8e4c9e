use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Question kind
/// Multiple-choice questions are scored directly, code questions go through the sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    Mcq,
    Code,
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionKind::Mcq => write!(f, "mcq"),
            QuestionKind::Code => write!(f, "code"),
        }
    }
}

/// Test Case Definition (Immutable Input)
/// Ordering matters - results are reported in the order cases are listed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(default)]
    pub input: String,
    pub expected_output: String,
}

impl TestCase {
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
        }
    }
}

/// Contest question
/// Owned by contest configuration and never mutated during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub question_id: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(default)]
    pub section: u32,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub question_text: String,
    pub marks: u32,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
    #[serde(default)]
    pub starter_code: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

/// Failure classification for a single sandbox invocation
/// `Error` marks sandbox infrastructure faults, the other variants are contestant faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Compile,
    Runtime,
    Timeout,
    Error,
}

impl FailureKind {
    /// True for failures caused by the platform rather than the submitted program
    pub fn is_system(&self) -> bool {
        matches!(self, FailureKind::Error)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Compile => write!(f, "compile"),
            FailureKind::Runtime => write!(f, "runtime"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Error => write!(f, "error"),
        }
    }
}

/// Outcome of one compile+run cycle
/// Produced fresh per invocation, never persisted directly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub execution_time_ms: u64,
}

impl ExecutionResult {
    pub fn succeeded(stdout: String, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            stdout,
            failure: None,
            message: None,
            execution_time_ms,
        }
    }

    pub fn failed(kind: FailureKind, message: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            failure: Some(kind),
            message: Some(message.into()),
            execution_time_ms,
        }
    }
}

/// Per-test-case grading record, persisted inside a Submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub input: String,
    pub expected: String,
    pub actual: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One team's answer to one question
/// Keyed by (team_id, question_id), upserted in place, never deleted during a contest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub team_id: String,
    pub question_id: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub selected_option: String,
    #[serde(default)]
    pub output: String,
    pub marks: u32,
    pub max_marks: u32,
    #[serde(default)]
    pub test_results: Vec<TestCaseResult>,
    pub evaluated: bool,
    /// Operator-facing grading error (sandbox fault, missing answer key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Submission {
    /// Empty record for a question the team has not touched yet
    pub fn blank(team_id: &str, question: &Question, now: DateTime<Utc>) -> Self {
        Self {
            team_id: team_id.to_string(),
            question_id: question.question_id.clone(),
            kind: question.kind,
            code: String::new(),
            selected_option: String::new(),
            output: String::new(),
            marks: 0,
            max_marks: question.marks,
            test_results: Vec::new(),
            evaluated: false,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Team record
/// `submitted` is terminal once true
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub team_id: String,
    pub score: u32,
    pub submitted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl Team {
    pub fn new(team_id: impl Into<String>) -> Self {
        Self {
            team_id: team_id.into(),
            score: 0,
            submitted: false,
            end_time: None,
        }
    }

    pub fn state(&self) -> SubmissionState {
        if self.submitted {
            SubmissionState::Finalized
        } else {
            SubmissionState::Drafting
        }
    }
}

/// Submission lifecycle
/// Drafting -> Finalized, no transition out of Finalized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionState {
    Drafting,
    Finalized,
}

/// Draft payload for save-draft
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftContent {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub selected_option: Option<String>,
}

/// Emitted once per successful finalize
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEvent {
    pub team_id: String,
    pub score: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_kind_serialization() {
        let json = serde_json::to_string(&QuestionKind::Mcq).unwrap();
        assert_eq!(json, "\"mcq\"");

        let kind: QuestionKind = serde_json::from_str("\"code\"").unwrap();
        assert_eq!(kind, QuestionKind::Code);
    }

    #[test]
    fn test_question_deserialization_defaults() {
        let json = r#"{
            "question_id": "q1",
            "type": "code",
            "marks": 10,
            "test_cases": [{"input": "5\n", "expected_output": "120"}]
        }"#;

        let question: Question = serde_json::from_str(json).unwrap();
        assert_eq!(question.kind, QuestionKind::Code);
        assert_eq!(question.marks, 10);
        assert!(question.options.is_empty());
        assert!(question.correct_answer.is_none());
        assert_eq!(question.test_cases.len(), 1);
        assert_eq!(question.test_cases[0].expected_output, "120");
    }

    #[test]
    fn test_test_case_input_defaults_to_empty() {
        let tc: TestCase = serde_json::from_str(r#"{"expected_output": "42"}"#).unwrap();
        assert_eq!(tc.input, "");
    }

    #[test]
    fn test_execution_result_failure_uses_type_field() {
        let result = ExecutionResult::failed(FailureKind::Timeout, "Execution timed out", 5000);
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["success"], false);
        assert_eq!(value["type"], "timeout");
        assert_eq!(value["message"], "Execution timed out");
    }

    #[test]
    fn test_success_omits_failure_fields() {
        let result = ExecutionResult::succeeded("hi".to_string(), 3);
        let value = serde_json::to_value(&result).unwrap();

        assert!(value.get("type").is_none());
        assert!(value.get("message").is_none());
    }

    #[test]
    fn test_only_error_is_system_failure() {
        assert!(FailureKind::Error.is_system());
        assert!(!FailureKind::Compile.is_system());
        assert!(!FailureKind::Runtime.is_system());
        assert!(!FailureKind::Timeout.is_system());
    }

    #[test]
    fn test_team_state() {
        let mut team = Team::new("t1");
        assert_eq!(team.state(), SubmissionState::Drafting);

        team.submitted = true;
        assert_eq!(team.state(), SubmissionState::Finalized);
    }

    #[test]
    fn test_blank_submission_takes_question_marks() {
        let question = Question {
            question_id: "q7".to_string(),
            kind: QuestionKind::Mcq,
            section: 1,
            order: 2,
            question_text: String::new(),
            marks: 4,
            options: vec!["A".into(), "B".into()],
            correct_answer: Some("B".into()),
            starter_code: String::new(),
            test_cases: vec![],
        };

        let sub = Submission::blank("t1", &question, Utc::now());
        assert_eq!(sub.max_marks, 4);
        assert_eq!(sub.kind, QuestionKind::Mcq);
        assert!(!sub.evaluated);
        assert_eq!(sub.created_at, sub.updated_at);
    }

    #[test]
    fn test_draft_content_partial_body() {
        let draft: DraftContent = serde_json::from_str(r#"{"selected_option": "C"}"#).unwrap();
        assert_eq!(draft.selected_option.as_deref(), Some("C"));
        assert!(draft.code.is_none());
    }
}
