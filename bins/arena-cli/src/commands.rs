// CLI commands for running and grading contest programs locally
use anyhow::{Context, Result};
use arena_common::types::{DraftContent, TestCase};
use arena_common::{Config, ContestConfig};
use arena_grader::{
    Grader, GradingSummary, InMemoryStore, LogNotifier, ProcessSandbox, Sandbox,
    SubmissionService, SubmissionStore,
};
use handlebars::{Context as HbsContext, Handlebars, Helper, HelperResult, Output, RenderContext};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

const REPORT_TEMPLATE: &str = r#"Team {{team_id}}: {{total_score}} / {{max_score}}
{{#each questions}}
[{{question_id}}] {{type}} {{marks}}/{{max_marks}}{{#if total_cases}} ({{passed_count}}/{{total_cases}} test cases){{/if}}
{{#each test_results}}
  TC {{inc @index}}: {{#if passed}}PASS{{else}}FAIL{{#if failure}} [{{failure}}]{{/if}}{{/if}}
{{/each}}
{{#if error}}
  error: {{error}}
{{/if}}
{{/each}}"#;

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// `run`: one sandbox invocation, result printed as JSON
pub async fn run(config: &Config, source: &Path, input: Option<&Path>) -> Result<()> {
    let code = read_file(source)?;
    let stdin = match input {
        Some(path) => read_file(path)?,
        None => String::new(),
    };

    let sandbox = ProcessSandbox::new(config);
    let result = sandbox.execute(&code, &stdin).await;

    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("Failed to serialize result")?
    );
    Ok(())
}

/// `evaluate`: score one program against a test-case file
pub async fn evaluate(config: &Config, source: &Path, tests: &Path, marks: u32) -> Result<()> {
    let code = read_file(source)?;
    let test_cases: Vec<TestCase> = serde_json::from_str(&read_file(tests)?)
        .with_context(|| format!("Failed to parse test cases from {}", tests.display()))?;

    println!("🧪 Evaluating {} against {} test case(s)...", source.display(), test_cases.len());

    let sandbox = ProcessSandbox::new(config);
    let evaluation = arena_grader::evaluate(
        &sandbox,
        &code,
        &test_cases,
        marks,
        config.test_case_parallelism,
    )
    .await;

    for (idx, result) in evaluation.results.iter().enumerate() {
        let status = if result.passed { "✅ PASS" } else { "❌ FAIL" };
        println!("  TC {}: {}", idx + 1, status);
        if let Some(error) = &result.error {
            println!("      {}", error.lines().next().unwrap_or_default());
        }
    }

    println!(
        "\n📊 {}/{} passed, {} / {} marks",
        evaluation.passed_count, evaluation.total_cases, evaluation.marks_earned, marks
    );
    Ok(())
}

/// `grade`: full draft -> submit pipeline on an in-memory store
pub async fn grade(config: &Config, contest: &Path, drafts: &Path, team_id: &str) -> Result<String> {
    let contest = ContestConfig::load_from_file(contest)
        .with_context(|| format!("Failed to load contest from {}", contest.display()))?;
    let drafts: BTreeMap<String, DraftContent> = serde_json::from_str(&read_file(drafts)?)
        .with_context(|| format!("Failed to parse drafts from {}", drafts.display()))?;

    let store: Arc<dyn SubmissionStore> = Arc::new(InMemoryStore::with_teams([team_id]).await);
    let grader = Grader::new(
        Arc::new(ProcessSandbox::new(config)),
        store.clone(),
        Arc::new(contest),
        config,
    );
    let service = SubmissionService::new(store, grader, Arc::new(LogNotifier), config);

    for (question_id, draft) in drafts {
        service
            .save_draft(team_id, &question_id, draft)
            .await
            .with_context(|| format!("Failed to save draft for {}", question_id))?;
    }

    let outcome = service.submit(team_id).await.context("Grading failed")?;
    let summary = outcome
        .grading
        .context("Team was already finalized; no grading report")?;

    render_report(&summary)
}

/// `{{inc @index}}`: one-based numbering inside `#each`
fn inc_helper(
    h: &Helper,
    _: &Handlebars,
    _: &HbsContext,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let n = h.param(0).and_then(|p| p.value().as_u64()).unwrap_or(0);
    out.write(&(n + 1).to_string())?;
    Ok(())
}

fn render_report(summary: &GradingSummary) -> Result<String> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars.register_helper("inc", Box::new(inc_helper));

    handlebars
        .render_template(REPORT_TEMPLATE, summary)
        .context("Failed to render grading report")
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_common::types::{QuestionKind, TestCaseResult};
    use arena_grader::QuestionGrade;

    const CONTEST: &str = r#"{
        "questions": [
            {"question_id": "m1", "type": "mcq", "section": 0, "order": 0,
             "question_text": "Pick B", "marks": 2, "options": ["A", "B"], "correct_answer": "B"},
            {"question_id": "m2", "type": "mcq", "section": 0, "order": 1,
             "question_text": "Pick A", "marks": 3, "options": ["A", "B"], "correct_answer": "A"}
        ]
    }"#;

    #[test]
    fn test_report_lists_questions_and_cases() {
        let summary = GradingSummary {
            team_id: "alpha".into(),
            total_score: 5,
            max_score: 10,
            questions: vec![QuestionGrade {
                question_id: "c1".into(),
                kind: QuestionKind::Code,
                marks: 5,
                max_marks: 10,
                output: "TC 1: PASS\nTC 2: FAIL".into(),
                passed_count: 1,
                total_cases: 2,
                test_results: vec![
                    TestCaseResult {
                        input: "1".into(),
                        expected: "1".into(),
                        actual: "1".into(),
                        passed: true,
                        failure: None,
                        error: None,
                    },
                    TestCaseResult {
                        input: "2".into(),
                        expected: "2".into(),
                        actual: String::new(),
                        passed: false,
                        failure: Some(arena_common::types::FailureKind::Timeout),
                        error: Some("Time limit exceeded".into()),
                    },
                ],
                error: None,
            }],
        };

        let report = render_report(&summary).unwrap();

        assert!(report.contains("Team alpha: 5 / 10"));
        assert!(report.contains("[c1] code 5/10 (1/2 test cases)"));
        assert!(report.contains("TC 1: PASS"));
        assert!(report.contains("TC 2: FAIL [timeout]"));
    }

    #[tokio::test]
    async fn test_grade_pipeline_on_mcq_contest() {
        let dir = tempfile::tempdir().unwrap();
        let contest = dir.path().join("contest.json");
        let drafts = dir.path().join("drafts.json");
        fs::write(&contest, CONTEST).unwrap();
        fs::write(
            &drafts,
            r#"{"m1": {"selected_option": "B"}, "m2": {"selected_option": "B"}}"#,
        )
        .unwrap();

        let report = grade(&Config::default(), &contest, &drafts, "alpha").await.unwrap();

        assert!(report.contains("Team alpha: 2 / 5"));
        assert!(report.contains("[m1] mcq 2/2"));
        assert!(report.contains("[m2] mcq 0/3"));
    }

    #[tokio::test]
    async fn test_grade_rejects_unknown_question_in_drafts() {
        let dir = tempfile::tempdir().unwrap();
        let contest = dir.path().join("contest.json");
        let drafts = dir.path().join("drafts.json");
        fs::write(&contest, CONTEST).unwrap();
        fs::write(&drafts, r#"{"zz": {"code": "x"}}"#).unwrap();

        let err = grade(&Config::default(), &contest, &drafts, "alpha")
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("zz"));
    }
}
