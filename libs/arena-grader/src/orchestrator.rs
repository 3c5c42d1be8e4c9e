/// Grading Orchestrator - One Team, Every Question
///
/// **Responsibility:**
/// Load the team's drafts, score every contest question, persist each
/// question's result, and return the total.
///
/// **Architecture:**
/// 1. MCQ questions are scored directly (exact match, no partial credit)
/// 2. Code questions with code and test cases go through the evaluator
/// 3. Each question's result is upserted before the total is returned
///
/// This module is the glue layer - it knows nothing about:
/// - How code executes (sandbox's job)
/// - How output is compared (evaluator's job)
/// - Whether the team may be graded at all (submission service's job)
///
/// Sandbox faults are contained per question as zero marks plus an error
/// message. Only store failures propagate.

use crate::evaluator::{self, Evaluation};
use crate::sandbox::Sandbox;
use crate::store::{GradeRecord, StoreError, SubmissionStore};
use arena_common::types::{Question, QuestionKind, Submission, TestCaseResult};
use arena_common::{Config, ContestConfig};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result of grading one question
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionGrade {
    pub question_id: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub marks: u32,
    pub max_marks: u32,
    pub output: String,
    pub passed_count: usize,
    pub total_cases: usize,
    pub test_results: Vec<TestCaseResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QuestionGrade {
    fn zero(question: &Question, output: String, error: Option<String>) -> Self {
        Self {
            question_id: question.question_id.clone(),
            kind: question.kind,
            marks: 0,
            max_marks: question.marks,
            output,
            passed_count: 0,
            total_cases: 0,
            test_results: Vec::new(),
            error,
        }
    }

    fn record(&self) -> GradeRecord {
        GradeRecord {
            marks: self.marks,
            max_marks: self.max_marks,
            output: self.output.clone(),
            test_results: self.test_results.clone(),
            error: self.error.clone(),
        }
    }
}

/// Result of grading one team
#[derive(Debug, Clone, Serialize)]
pub struct GradingSummary {
    pub team_id: String,
    pub total_score: u32,
    pub max_score: u32,
    pub questions: Vec<QuestionGrade>,
}

pub struct Grader {
    sandbox: Arc<dyn Sandbox>,
    store: Arc<dyn SubmissionStore>,
    contest: Arc<ContestConfig>,
    test_case_parallelism: usize,
}

impl Grader {
    pub fn new(
        sandbox: Arc<dyn Sandbox>,
        store: Arc<dyn SubmissionStore>,
        contest: Arc<ContestConfig>,
        config: &Config,
    ) -> Self {
        Self {
            sandbox,
            store,
            contest,
            test_case_parallelism: config.test_case_parallelism.max(1),
        }
    }

    pub fn contest(&self) -> &ContestConfig {
        &self.contest
    }

    /// Grade every question for `team_id` and persist the per-question results.
    ///
    /// Questions are graded concurrently; all per-question writes have
    /// completed when this returns.
    pub async fn grade_submission(&self, team_id: &str) -> Result<GradingSummary, StoreError> {
        let drafts: HashMap<String, Submission> = self
            .store
            .submissions(team_id)
            .await?
            .into_iter()
            .map(|s| (s.question_id.clone(), s))
            .collect();

        info!(
            team_id,
            questions = self.contest.questions.len(),
            drafts = drafts.len(),
            "Grading submission"
        );

        let graded = join_all(
            self.contest
                .questions
                .iter()
                .map(|q| self.grade_question(team_id, q, drafts.get(&q.question_id))),
        )
        .await;

        let questions = graded.into_iter().collect::<Result<Vec<_>, _>>()?;
        let total_score = questions.iter().map(|q| q.marks).sum();

        info!(team_id, total_score, "Grading complete");

        Ok(GradingSummary {
            team_id: team_id.to_string(),
            total_score,
            max_score: self.contest.max_score(),
            questions,
        })
    }

    async fn grade_question(
        &self,
        team_id: &str,
        question: &Question,
        draft: Option<&Submission>,
    ) -> Result<QuestionGrade, StoreError> {
        let grade = match question.kind {
            QuestionKind::Mcq => score_mcq(question, draft),
            QuestionKind::Code => self.score_code(team_id, question, draft).await,
        };

        self.store.record_grade(team_id, question, &grade.record()).await?;

        info!(
            team_id,
            question_id = %question.question_id,
            marks = grade.marks,
            max_marks = grade.max_marks,
            "Question graded"
        );
        Ok(grade)
    }

    async fn score_code(
        &self,
        team_id: &str,
        question: &Question,
        draft: Option<&Submission>,
    ) -> QuestionGrade {
        let code = draft.map(|d| d.code.as_str()).unwrap_or_default();
        if code.trim().is_empty() {
            return QuestionGrade::zero(question, String::new(), None);
        }
        if question.test_cases.is_empty() {
            warn!(question_id = %question.question_id, "Code question has no test cases; scoring zero");
            return QuestionGrade::zero(question, String::new(), None);
        }

        let evaluation = evaluator::evaluate(
            self.sandbox.as_ref(),
            code,
            &question.test_cases,
            question.marks,
            self.test_case_parallelism,
        )
        .await;

        let error = system_failure(&evaluation);
        if let Some(message) = &error {
            error!(team_id, question_id = %question.question_id, error = %message, "Sandbox failure during grading");
        }

        QuestionGrade {
            question_id: question.question_id.clone(),
            kind: question.kind,
            marks: evaluation.marks_earned,
            max_marks: question.marks,
            output: evaluation.summary(),
            passed_count: evaluation.passed_count,
            total_cases: evaluation.total_cases,
            test_results: evaluation.results,
            error,
        }
    }
}

fn score_mcq(question: &Question, draft: Option<&Submission>) -> QuestionGrade {
    let selected = draft.map(|d| d.selected_option.clone()).unwrap_or_default();

    let Some(correct) = question.correct_answer.as_deref() else {
        warn!(question_id = %question.question_id, "MCQ question has no correct answer configured");
        return QuestionGrade::zero(
            question,
            selected,
            Some("question has no correct answer configured".to_string()),
        );
    };

    let marks = if !selected.is_empty() && selected == correct {
        question.marks
    } else {
        0
    };

    QuestionGrade {
        marks,
        ..QuestionGrade::zero(question, selected, None)
    }
}

/// Operator-facing message when any test case hit a sandbox infrastructure fault
fn system_failure(evaluation: &Evaluation) -> Option<String> {
    let failures: Vec<&TestCaseResult> = evaluation
        .results
        .iter()
        .filter(|r| r.failure.map(|f| f.is_system()).unwrap_or(false))
        .collect();

    let first = failures.first()?;
    Some(format!(
        "sandbox failure on {} of {} test case(s): {}",
        failures.len(),
        evaluation.total_cases,
        first.error.as_deref().unwrap_or("unknown error")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::testing::{code_question as code, mcq_question as mcq, ScriptedSandbox};
    use arena_common::types::{DraftContent, ExecutionResult, FailureKind};

    async fn setup(
        questions: Vec<Question>,
        sandbox: Arc<ScriptedSandbox>,
    ) -> (Grader, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::with_teams(["alpha"]).await);
        let contest = Arc::new(ContestConfig {
            questions,
            teams: vec!["alpha".into()],
        });
        let grader = Grader::new(sandbox, store.clone(), contest, &Config::default());
        (grader, store)
    }

    async fn draft(store: &InMemoryStore, question: &Question, code: Option<&str>, option: Option<&str>) {
        let content = DraftContent {
            code: code.map(str::to_string),
            selected_option: option.map(str::to_string),
        };
        store.save_draft("alpha", question, &content).await.unwrap();
    }

    #[tokio::test]
    async fn test_mcq_correct_and_unanswered() {
        let q1 = mcq("m1", 4, "B");
        let q2 = mcq("m2", 4, "B");
        let sandbox = Arc::new(ScriptedSandbox::echo());
        let (grader, store) = setup(vec![q1.clone(), q2.clone()], sandbox.clone()).await;
        draft(&store, &q1, None, Some("B")).await;
        draft(&store, &q2, None, Some("")).await;

        let summary = grader.grade_submission("alpha").await.unwrap();

        assert_eq!(summary.questions[0].marks, 4);
        assert_eq!(summary.questions[0].output, "B");
        assert_eq!(summary.questions[1].marks, 0);
        assert_eq!(summary.total_score, 4);
        assert_eq!(summary.max_score, 8);
        assert_eq!(sandbox.invocations(), 0);
    }

    #[tokio::test]
    async fn test_mcq_wrong_answer_no_partial_credit() {
        let q = mcq("m1", 5, "C");
        let (grader, store) = setup(vec![q.clone()], Arc::new(ScriptedSandbox::echo())).await;
        draft(&store, &q, None, Some("c")).await;

        let summary = grader.grade_submission("alpha").await.unwrap();

        assert_eq!(summary.total_score, 0);
    }

    #[tokio::test]
    async fn test_code_question_partial_marks() {
        let q = code("c1", 10, &[("1", "1"), ("2", "2"), ("3", "3"), ("4", "x")]);
        let sandbox = Arc::new(ScriptedSandbox::echo());
        let (grader, store) = setup(vec![q.clone()], sandbox.clone()).await;
        draft(&store, &q, Some("int main(){}"), None).await;

        let summary = grader.grade_submission("alpha").await.unwrap();

        let grade = &summary.questions[0];
        assert_eq!(grade.marks, 8);
        assert_eq!(grade.passed_count, 3);
        assert_eq!(grade.output, "TC 1: PASS\nTC 2: PASS\nTC 3: PASS\nTC 4: FAIL");
        assert_eq!(sandbox.invocations(), 4);

        let stored = store.submission("alpha", "c1").await.unwrap().unwrap();
        assert!(stored.evaluated);
        assert_eq!(stored.marks, 8);
        assert_eq!(stored.code, "int main(){}");
        assert_eq!(stored.test_results.len(), 4);
    }

    #[tokio::test]
    async fn test_missing_code_scores_zero_without_sandbox() {
        let q_code = code("c1", 10, &[("1", "1")]);
        let q_blank = code("c2", 10, &[("1", "1")]);
        let q_mcq = mcq("m1", 3, "A");
        let sandbox = Arc::new(ScriptedSandbox::echo());
        let (grader, store) =
            setup(vec![q_code.clone(), q_blank.clone(), q_mcq.clone()], sandbox.clone()).await;
        draft(&store, &q_blank, Some("   \n\t"), None).await;
        draft(&store, &q_mcq, None, Some("A")).await;

        let summary = grader.grade_submission("alpha").await.unwrap();

        assert_eq!(sandbox.invocations(), 0);
        assert_eq!(summary.total_score, 3);

        // never-drafted question still gets an evaluated record
        let created = store.submission("alpha", "c1").await.unwrap().unwrap();
        assert!(created.evaluated);
        assert_eq!(created.marks, 0);
        assert_eq!(created.max_marks, 10);
    }

    #[tokio::test]
    async fn test_code_without_test_cases_scores_zero() {
        let q = code("c1", 10, &[]);
        let sandbox = Arc::new(ScriptedSandbox::echo());
        let (grader, store) = setup(vec![q.clone()], sandbox.clone()).await;
        draft(&store, &q, Some("int main(){}"), None).await;

        let summary = grader.grade_submission("alpha").await.unwrap();

        assert_eq!(summary.total_score, 0);
        assert!(summary.questions[0].error.is_none());
        assert_eq!(sandbox.invocations(), 0);
    }

    #[tokio::test]
    async fn test_sandbox_fault_contained_to_question() {
        let broken = code("c1", 10, &[("1", "1")]);
        let healthy = code("c2", 6, &[("2", "2")]);
        let sandbox = Arc::new(ScriptedSandbox::new(|source, input| {
            if source == "broken" {
                ExecutionResult::failed(FailureKind::Error, "failed to prepare workspace: disk full", 0)
            } else {
                ExecutionResult::succeeded(input.to_string(), 1)
            }
        }));
        let (grader, store) = setup(vec![broken.clone(), healthy.clone()], sandbox).await;
        draft(&store, &broken, Some("broken"), None).await;
        draft(&store, &healthy, Some("fine"), None).await;

        let summary = grader.grade_submission("alpha").await.unwrap();

        assert_eq!(summary.questions[0].marks, 0);
        let message = summary.questions[0].error.as_deref().unwrap();
        assert!(message.contains("disk full"));
        assert_eq!(summary.questions[0].test_results[0].failure, Some(FailureKind::Error));
        assert_eq!(summary.questions[1].marks, 6);
        assert_eq!(summary.total_score, 6);

        let stored = store.submission("alpha", "c1").await.unwrap().unwrap();
        assert!(stored.evaluated);
        assert!(stored.error.unwrap().contains("disk full"));
        let healthy = store.submission("alpha", "c2").await.unwrap().unwrap();
        assert!(healthy.error.is_none());
    }

    #[tokio::test]
    async fn test_compile_error_is_not_a_system_failure() {
        let q = code("c1", 10, &[("1", "1"), ("2", "2")]);
        let sandbox = Arc::new(ScriptedSandbox::new(|_, _| {
            ExecutionResult::failed(FailureKind::Compile, "main.c:1: error: expected ';'", 0)
        }));
        let (grader, store) = setup(vec![q.clone()], sandbox).await;
        draft(&store, &q, Some("int main( {"), None).await;

        let summary = grader.grade_submission("alpha").await.unwrap();

        let grade = &summary.questions[0];
        assert_eq!(grade.marks, 0);
        assert!(grade.error.is_none());
        assert_eq!(grade.test_results[0].failure, Some(FailureKind::Compile));
        assert!(grade.test_results[1].error.as_deref().unwrap().contains("expected"));
    }

    #[tokio::test]
    async fn test_mcq_without_answer_key_records_error() {
        let mut q = mcq("m1", 2, "A");
        q.correct_answer = None;
        let (grader, store) = setup(vec![q.clone()], Arc::new(ScriptedSandbox::echo())).await;
        draft(&store, &q, None, Some("A")).await;

        let summary = grader.grade_submission("alpha").await.unwrap();

        assert_eq!(summary.total_score, 0);
        assert!(summary.questions[0].error.is_some());

        let stored = store.submission("alpha", "m1").await.unwrap().unwrap();
        assert!(stored.error.unwrap().contains("no correct answer"));
    }
}
