use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum StudentStatus {
    Active,
    Suspended,
    Graduated,
    Dropped,
}

impl StudentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudentStatus::Active => "active",
            StudentStatus::Suspended => "suspended",
            StudentStatus::Graduated => "graduated",
            StudentStatus::Dropped => "dropped",
        }
    }
}

impl fmt::Display for StudentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StudentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(StudentStatus::Active),
            "suspended" => Ok(StudentStatus::Suspended),
            "graduated" => Ok(StudentStatus::Graduated),
            "dropped" => Ok(StudentStatus::Dropped),
            other => Err(format!("Unknown student status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Student {
    pub id: String,
    pub student_number: String,
    pub first_name: String,
    pub last_name: String,
    pub program_id: String,
    pub group_id: Option<String>,
    pub academic_year: String,
    pub status: StudentStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStudentRequest {
    pub student_number: String,
    pub first_name: String,
    pub last_name: String,
    pub program_id: String,
    pub group_id: Option<String>,
    pub academic_year: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStudentStatusRequest {
    pub status: StudentStatus,
}
