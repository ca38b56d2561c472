use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const DEFAULT_MAX_GRADE: f64 = 20.0;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Grade {
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub evaluation_type_id: String,
    pub semester: i32,
    pub academic_year: String,
    pub value: f64,
    pub max_grade: f64,
    pub is_published: bool,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertGradeRequest {
    pub student_id: String,
    pub subject_id: String,
    pub evaluation_type_id: String,
    pub semester: i32,
    pub academic_year: String,
    pub value: f64,
    pub max_grade: Option<f64>,
}

impl UpsertGradeRequest {
    pub fn max_grade(&self) -> f64 {
        self.max_grade.unwrap_or(DEFAULT_MAX_GRADE)
    }

    pub fn validate(&self) -> Result<(), String> {
        let max = self.max_grade();
        if !max.is_finite() || max <= 0.0 {
            return Err(format!("max_grade must be positive, got {}", max));
        }
        if !self.value.is_finite() || self.value < 0.0 || self.value > max {
            return Err(format!("grade value {} is outside 0..={}", self.value, max));
        }
        if self.semester < 1 {
            return Err(format!("semester must be at least 1, got {}", self.semester));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishGradesRequest {
    pub program_id: String,
    pub semester: i32,
    pub academic_year: String,
}

/// Row-change notification emitted after every grade upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeChange {
    pub grade_id: String,
    pub student_id: String,
    pub subject_id: String,
    pub evaluation_type_id: String,
    pub semester: i32,
    pub academic_year: String,
    pub value: f64,
    pub updated_at: String,
}

impl From<&Grade> for GradeChange {
    fn from(grade: &Grade) -> Self {
        Self {
            grade_id: grade.id.clone(),
            student_id: grade.student_id.clone(),
            subject_id: grade.subject_id.clone(),
            evaluation_type_id: grade.evaluation_type_id.clone(),
            semester: grade.semester,
            academic_year: grade.academic_year.clone(),
            value: grade.value,
            updated_at: grade.updated_at.clone(),
        }
    }
}
