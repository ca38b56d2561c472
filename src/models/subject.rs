use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A course unit of a program semester. `credits` is the ECTS count.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subject {
    pub id: String,
    pub program_id: String,
    pub semester: i32,
    pub code: String,
    pub name: String,
    pub credits: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubjectRequest {
    pub program_id: String,
    pub semester: i32,
    pub code: String,
    pub name: String,
    pub credits: i32,
}
