use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const CONTINUOUS_ASSESSMENT_CODE: &str = "CC";
pub const FINAL_EXAM_CODE: &str = "EF";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EvaluationType {
    pub id: String,
    pub code: String,
    pub name: String,
    pub weight: f64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvaluationTypeRequest {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub weight: f64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Ids of the two evaluation types the averaging logic cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CcEfIds {
    pub cc: Option<String>,
    pub ef: Option<String>,
}
