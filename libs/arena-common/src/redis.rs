/// Redis key semantics - defines only naming, not runtime logic
/// Keeps the API, the store and any subscriber agreeing on key layout

pub const TEAM_PREFIX: &str = "arena:team";
pub const SUBMISSION_PREFIX: &str = "arena:submission";
pub const SUBMISSION_INDEX_PREFIX: &str = "arena:submissions";
pub const GRADING_PREFIX: &str = "arena:grading";

/// Pub/sub channel carrying one ScoreEvent per finalized team
pub const SCORE_CHANNEL: &str = "arena:events:score";

/// Hash holding score / submitted / end_time for a team
pub fn team_key(team_id: &str) -> String {
    format!("{}:{}", TEAM_PREFIX, team_id)
}

/// JSON-encoded Submission for one (team, question) pair
pub fn submission_key(team_id: &str, question_id: &str) -> String {
    format!("{}:{}:{}", SUBMISSION_PREFIX, team_id, question_id)
}

/// Set of question ids the team has a Submission for
pub fn submission_index_key(team_id: &str) -> String {
    format!("{}:{}", SUBMISSION_INDEX_PREFIX, team_id)
}

/// Token of the instance currently grading the team; expires with the lease
pub fn grading_key(team_id: &str) -> String {
    format!("{}:{}", GRADING_PREFIX, team_id)
}
