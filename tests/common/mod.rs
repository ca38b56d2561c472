#![allow(dead_code)]

use myacademics::db::{self, repository};
use myacademics::models::{
    CcEfIds, NewProgramRequest, NewStudentRequest, NewSubjectRequest, Program, Student, Subject,
    UpsertGradeRequest,
};
use sqlx::SqlitePool;

pub const YEAR: &str = "2025-2026";

pub async fn test_pool() -> SqlitePool {
    db::connect_in_memory()
        .await
        .expect("Failed to create database")
}

pub async fn program(db: &SqlitePool, code: &str) -> Program {
    repository::insert_program(db, NewProgramRequest {
        code: code.to_string(),
        name: format!("Program {}", code),
    })
    .await
    .expect("Failed to insert program")
}

pub async fn student(db: &SqlitePool, program: &Program, number: &str, group: Option<&str>) -> Student {
    repository::insert_student(db, NewStudentRequest {
        student_number: number.to_string(),
        first_name: "Student".to_string(),
        last_name: number.to_string(),
        program_id: program.id.clone(),
        group_id: group.map(str::to_string),
        academic_year: YEAR.to_string(),
    })
    .await
    .expect("Failed to insert student")
}

pub async fn subject(db: &SqlitePool, program: &Program, semester: i32, code: &str, credits: i32) -> Subject {
    repository::insert_subject(db, NewSubjectRequest {
        program_id: program.id.clone(),
        semester,
        code: code.to_string(),
        name: format!("Subject {}", code),
        credits,
    })
    .await
    .expect("Failed to insert subject")
}

pub async fn cc_ef(db: &SqlitePool) -> (String, String) {
    let CcEfIds { cc, ef } = repository::fetch_cc_ef_ids(db)
        .await
        .expect("Failed to fetch evaluation types");
    (cc.expect("CC is seeded"), ef.expect("EF is seeded"))
}

pub fn grade_request(student: &Student, subject: &Subject, evaluation_type_id: &str, value: f64) -> UpsertGradeRequest {
    UpsertGradeRequest {
        student_id: student.id.clone(),
        subject_id: subject.id.clone(),
        evaluation_type_id: evaluation_type_id.to_string(),
        semester: subject.semester,
        academic_year: YEAR.to_string(),
        value,
        max_grade: None,
    }
}

pub async fn grade(db: &SqlitePool, student: &Student, subject: &Subject, evaluation_type_id: &str, value: f64) {
    repository::upsert_grade(db, &grade_request(student, subject, evaluation_type_id, value))
        .await
        .expect("Failed to upsert grade");
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
