//! Test doubles shared by the unit tests of this crate.

use crate::notify::{NotifyError, ScoreNotifier};
use crate::sandbox::Sandbox;
use arena_common::types::{ExecutionResult, Question, QuestionKind, ScoreEvent, TestCase};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Behaviour = Box<dyn Fn(&str, &str) -> ExecutionResult + Send + Sync>;
type Delay = Box<dyn Fn(&str) -> Duration + Send + Sync>;

/// Sandbox that answers from a closure and counts invocations
pub struct ScriptedSandbox {
    behaviour: Behaviour,
    delay: Option<Delay>,
    invocations: AtomicUsize,
}

impl ScriptedSandbox {
    pub fn new<F>(behaviour: F) -> Self
    where
        F: Fn(&str, &str) -> ExecutionResult + Send + Sync + 'static,
    {
        Self {
            behaviour: Box::new(behaviour),
            delay: None,
            invocations: AtomicUsize::new(0),
        }
    }

    /// stdout = stdin, always succeeds
    pub fn echo() -> Self {
        Self::new(|_, input| ExecutionResult::succeeded(input.to_string(), 1))
    }

    pub fn with_delay<F>(mut self, delay: F) -> Self
    where
        F: Fn(&str) -> Duration + Send + Sync + 'static,
    {
        self.delay = Some(Box::new(delay));
        self
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sandbox for ScriptedSandbox {
    async fn execute(&self, source_code: &str, stdin: &str) -> ExecutionResult {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        match &self.delay {
            Some(delay) => tokio::time::sleep(delay(stdin)).await,
            None => tokio::task::yield_now().await,
        }
        (self.behaviour)(source_code, stdin)
    }
}

/// Notifier that records every event it receives
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<ScoreEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<ScoreEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScoreNotifier for RecordingNotifier {
    async fn score_updated(&self, event: &ScoreEvent) -> Result<(), NotifyError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub fn mcq_question(id: &str, marks: u32, correct: &str) -> Question {
    Question {
        question_id: id.to_string(),
        kind: QuestionKind::Mcq,
        section: 1,
        order: 0,
        question_text: String::new(),
        marks,
        options: vec!["A".into(), "B".into(), "C".into()],
        correct_answer: Some(correct.to_string()),
        starter_code: String::new(),
        test_cases: vec![],
    }
}

pub fn code_question(id: &str, marks: u32, cases: &[(&str, &str)]) -> Question {
    Question {
        question_id: id.to_string(),
        kind: QuestionKind::Code,
        section: 2,
        order: 0,
        question_text: String::new(),
        marks,
        options: vec![],
        correct_answer: None,
        starter_code: String::new(),
        test_cases: cases.iter().map(|(i, e)| TestCase::new(*i, *e)).collect(),
    }
}
