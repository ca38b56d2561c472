use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Per student and subject rollup of the CC/EF grades.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SemesterSubjectGrade {
    pub cc: Option<f64>,
    pub ef: Option<f64>,
    pub moyenne: Option<f64>,
    pub coefficient: i32,
}

impl SemesterSubjectGrade {
    pub fn empty(coefficient: i32) -> Self {
        Self {
            cc: None,
            ef: None,
            moyenne: None,
            coefficient,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mention {
    #[serde(rename = "Très Bien")]
    TresBien,
    #[serde(rename = "Bien")]
    Bien,
    #[serde(rename = "Assez Bien")]
    AssezBien,
    #[serde(rename = "Passable")]
    Passable,
    #[serde(rename = "Insuffisant")]
    Insuffisant,
}

impl Mention {
    pub fn label(&self) -> &'static str {
        match self {
            Mention::TresBien => "Très Bien",
            Mention::Bien => "Bien",
            Mention::AssezBien => "Assez Bien",
            Mention::Passable => "Passable",
            Mention::Insuffisant => "Insuffisant",
        }
    }
}

impl fmt::Display for Mention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentSummary {
    pub id: String,
    pub student_number: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemesterStudentData {
    pub student: StudentSummary,
    /// Keyed by subject id.
    pub subjects: BTreeMap<String, SemesterSubjectGrade>,
    pub semester_average: Option<f64>,
    pub mention: Option<Mention>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemesterQuery {
    pub program_id: String,
    pub group_id: Option<String>,
    pub semester: i32,
    pub academic_year: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EctsSummary {
    pub student_id: String,
    pub credits_attempted: i32,
    pub credits_earned: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassStatistics {
    pub student_count: usize,
    pub graded_count: usize,
    pub class_average: Option<f64>,
    pub min_average: Option<f64>,
    pub max_average: Option<f64>,
    pub pass_rate: Option<f64>,
}
