use crate::types::{Question, QuestionKind};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read contest config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse contest config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate question id: {0}")]
    DuplicateQuestion(String),

    #[error("invalid id {0:?}: ids must be non-empty and must not contain ':'")]
    InvalidId(String),
}

/// Contest configuration
/// Question set and team roster, loaded at contest start and read-only during a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContestConfig {
    pub questions: Vec<Question>,
    #[serde(default)]
    pub teams: Vec<String>,
}

/// Contestant-facing view of a question: no test cases, no answer
#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub question_id: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub section: u32,
    pub order: u32,
    pub question_text: String,
    pub options: Vec<String>,
    pub marks: u32,
    pub starter_code: String,
    pub test_cases_count: usize,
}

impl ContestConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: ContestConfig = serde_json::from_str(content)?;

        // ids are joined with ':' in store keys
        let ids = config
            .questions
            .iter()
            .map(|q| &q.question_id)
            .chain(config.teams.iter());
        for id in ids {
            if !is_valid_id(id) {
                return Err(ConfigError::InvalidId(id.clone()));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for q in &config.questions {
            if !seen.insert(q.question_id.as_str()) {
                return Err(ConfigError::DuplicateQuestion(q.question_id.clone()));
            }
        }

        Ok(config)
    }

    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.question_id == question_id)
    }

    pub fn max_score(&self) -> u32 {
        self.questions.iter().map(|q| q.marks).sum()
    }

    /// Questions ordered by (section, order) with hidden fields stripped
    pub fn sanitized(&self) -> Vec<QuestionView> {
        let mut views: Vec<QuestionView> = self
            .questions
            .iter()
            .map(|q| QuestionView {
                question_id: q.question_id.clone(),
                kind: q.kind,
                section: q.section,
                order: q.order,
                question_text: q.question_text.clone(),
                options: q.options.clone(),
                marks: q.marks,
                starter_code: q.starter_code.clone(),
                test_cases_count: q.test_cases.len(),
            })
            .collect();
        views.sort_by_key(|v| (v.section, v.order));
        views
    }
}

/// Non-empty and free of the key separator
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(':')
}
