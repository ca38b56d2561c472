use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::models::{
    CcEfIds, EvaluationType, Grade, NewEvaluationTypeRequest, NewProgramRequest,
    NewStudentRequest, NewSubjectRequest, Program, Student, StudentStatus, Subject,
    UpsertGradeRequest,
};
use crate::models::evaluation::{CONTINUOUS_ASSESSMENT_CODE, FINAL_EXAM_CODE};

const STUDENT_COLUMNS: &str = "id, student_number, first_name, last_name, program_id, group_id, academic_year, status, created_at, updated_at";
const GRADE_COLUMNS: &str = "id, student_id, subject_id, evaluation_type_id, semester, academic_year, value, max_grade, is_published, updated_at";

pub async fn fetch_programs(db: &SqlitePool) -> Result<Vec<Program>, sqlx::Error> {
    sqlx::query_as::<_, Program>(
        "SELECT id, code, name, created_at FROM programs ORDER BY code"
    )
    .fetch_all(db)
    .await
}

pub async fn insert_program(
    db: &SqlitePool,
    req: NewProgramRequest,
) -> Result<Program, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query("INSERT INTO programs (id, code, name, created_at) VALUES (?1, ?2, ?3, ?4)")
        .bind(&id)
        .bind(&req.code)
        .bind(&req.name)
        .bind(&now)
        .execute(db)
        .await?;

    Ok(Program {
        id,
        code: req.code,
        name: req.name,
        created_at: now,
    })
}

pub async fn fetch_students(
    db: &SqlitePool,
    program_id: Option<&str>,
    status: Option<StudentStatus>,
) -> Result<Vec<Student>, sqlx::Error> {
    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM students WHERE 1 = 1", STUDENT_COLUMNS));
    if let Some(program_id) = program_id {
        builder.push(" AND program_id = ").push_bind(program_id);
    }
    if let Some(status) = status {
        builder.push(" AND status = ").push_bind(status);
    }
    builder.push(" ORDER BY last_name, first_name");

    builder.build_query_as::<Student>().fetch_all(db).await
}

/// Active students of a program, optionally narrowed to one group.
pub async fn fetch_active_students(
    db: &SqlitePool,
    program_id: &str,
    group_id: Option<&str>,
) -> Result<Vec<Student>, sqlx::Error> {
    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM students WHERE status = 'active'", STUDENT_COLUMNS));
    builder.push(" AND program_id = ").push_bind(program_id);
    if let Some(group_id) = group_id {
        builder.push(" AND group_id = ").push_bind(group_id);
    }
    builder.push(" ORDER BY last_name, first_name");

    builder.build_query_as::<Student>().fetch_all(db).await
}

pub async fn find_student_by_id(db: &SqlitePool, id: &str) -> Result<Option<Student>, sqlx::Error> {
    sqlx::query_as::<_, Student>(&format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn insert_student(
    db: &SqlitePool,
    req: NewStudentRequest,
) -> Result<Student, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    let status = StudentStatus::Active;

    sqlx::query(
        r#"
        INSERT INTO students
            (id, student_number, first_name, last_name, program_id, group_id,
            academic_year, status, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
        "#,
    )
    .bind(&id)
    .bind(&req.student_number)
    .bind(&req.first_name)
    .bind(&req.last_name)
    .bind(&req.program_id)
    .bind(&req.group_id)
    .bind(&req.academic_year)
    .bind(status)
    .bind(&now)
    .execute(db)
    .await?;

    Ok(Student {
        id,
        student_number: req.student_number,
        first_name: req.first_name,
        last_name: req.last_name,
        program_id: req.program_id,
        group_id: req.group_id,
        academic_year: req.academic_year,
        status,
        created_at: now.clone(),
        updated_at: now,
    })
}

/// Students are never deleted; leaving the program is a status change.
pub async fn update_student_status(
    db: &SqlitePool,
    id: &str,
    status: StudentStatus,
) -> Result<Option<Student>, sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    let affected = sqlx::query("UPDATE students SET status = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(status)
        .bind(&now)
        .bind(id)
        .execute(db)
        .await?
        .rows_affected();

    if affected == 0 {
        return Ok(None);
    }
    find_student_by_id(db, id).await
}

pub async fn fetch_subjects(
    db: &SqlitePool,
    program_id: Option<&str>,
    semester: Option<i32>,
) -> Result<Vec<Subject>, sqlx::Error> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT id, program_id, semester, code, name, credits FROM subjects WHERE 1 = 1",
    );
    if let Some(program_id) = program_id {
        builder.push(" AND program_id = ").push_bind(program_id);
    }
    if let Some(semester) = semester {
        builder.push(" AND semester = ").push_bind(semester);
    }
    builder.push(" ORDER BY semester, code");

    builder.build_query_as::<Subject>().fetch_all(db).await
}

pub async fn fetch_subjects_for_semester(
    db: &SqlitePool,
    program_id: &str,
    semester: i32,
) -> Result<Vec<Subject>, sqlx::Error> {
    fetch_subjects(db, Some(program_id), Some(semester)).await
}

pub async fn insert_subject(
    db: &SqlitePool,
    req: NewSubjectRequest,
) -> Result<Subject, sqlx::Error> {
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        "INSERT INTO subjects (id, program_id, semester, code, name, credits) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
    )
    .bind(&id)
    .bind(&req.program_id)
    .bind(req.semester)
    .bind(&req.code)
    .bind(&req.name)
    .bind(req.credits)
    .execute(db)
    .await?;

    Ok(Subject {
        id,
        program_id: req.program_id,
        semester: req.semester,
        code: req.code,
        name: req.name,
        credits: req.credits,
    })
}

pub async fn fetch_evaluation_types(db: &SqlitePool) -> Result<Vec<EvaluationType>, sqlx::Error> {
    sqlx::query_as::<_, EvaluationType>(
        "SELECT id, code, name, weight, is_active FROM evaluation_types ORDER BY code"
    )
    .fetch_all(db)
    .await
}

pub async fn insert_evaluation_type(
    db: &SqlitePool,
    req: NewEvaluationTypeRequest,
) -> Result<EvaluationType, sqlx::Error> {
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        "INSERT INTO evaluation_types (id, code, name, weight, is_active) VALUES (?1, ?2, ?3, ?4, ?5)"
    )
    .bind(&id)
    .bind(&req.code)
    .bind(&req.name)
    .bind(req.weight)
    .bind(req.is_active)
    .execute(db)
    .await?;

    Ok(EvaluationType {
        id,
        code: req.code,
        name: req.name,
        weight: req.weight,
        is_active: req.is_active,
    })
}

/// Looks up the CC and EF ids by exact code match.
pub async fn fetch_cc_ef_ids(db: &SqlitePool) -> Result<CcEfIds, sqlx::Error> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT id, code FROM evaluation_types WHERE code IN (?1, ?2)"
    )
    .bind(CONTINUOUS_ASSESSMENT_CODE)
    .bind(FINAL_EXAM_CODE)
    .fetch_all(db)
    .await?;

    let mut ids = CcEfIds::default();
    for (id, code) in rows {
        match code.as_str() {
            CONTINUOUS_ASSESSMENT_CODE => ids.cc = Some(id),
            FINAL_EXAM_CODE => ids.ef = Some(id),
            _ => {}
        }
    }
    Ok(ids)
}

/// Grades for every (student, subject) pair of the given sets in one semester.
pub async fn fetch_semester_grades(
    db: &SqlitePool,
    student_ids: &[String],
    subject_ids: &[String],
    semester: i32,
    academic_year: &str,
) -> Result<Vec<Grade>, sqlx::Error> {
    if student_ids.is_empty() || subject_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM grades WHERE semester = ", GRADE_COLUMNS));
    builder.push_bind(semester);
    builder.push(" AND academic_year = ").push_bind(academic_year);

    builder.push(" AND student_id IN (");
    let mut separated = builder.separated(", ");
    for id in student_ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    builder.push(" AND subject_id IN (");
    let mut separated = builder.separated(", ");
    for id in subject_ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    builder.build_query_as::<Grade>().fetch_all(db).await
}

/// Last write wins on (student, subject, evaluation type, semester).
pub async fn upsert_grade(db: &SqlitePool, req: &UpsertGradeRequest) -> Result<Grade, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query_as::<_, Grade>(&format!(
        r#"
        INSERT INTO grades
            (id, student_id, subject_id, evaluation_type_id, semester, academic_year,
            value, max_grade, is_published, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)
        ON CONFLICT (student_id, subject_id, evaluation_type_id, semester) DO UPDATE SET
            academic_year = excluded.academic_year,
            value = excluded.value,
            max_grade = excluded.max_grade,
            updated_at = excluded.updated_at
        RETURNING {}
        "#,
        GRADE_COLUMNS
    ))
    .bind(&id)
    .bind(&req.student_id)
    .bind(&req.subject_id)
    .bind(&req.evaluation_type_id)
    .bind(req.semester)
    .bind(&req.academic_year)
    .bind(req.value)
    .bind(req.max_grade())
    .bind(&now)
    .fetch_one(db)
    .await
}

pub async fn fetch_student_grades(
    db: &SqlitePool,
    student_id: &str,
    published_only: bool,
) -> Result<Vec<Grade>, sqlx::Error> {
    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM grades WHERE student_id = ", GRADE_COLUMNS));
    builder.push_bind(student_id);
    if published_only {
        builder.push(" AND is_published = 1");
    }
    builder.push(" ORDER BY academic_year, semester, subject_id");

    builder.build_query_as::<Grade>().fetch_all(db).await
}

pub async fn publish_grades(
    db: &SqlitePool,
    program_id: &str,
    semester: i32,
    academic_year: &str,
) -> Result<u64, sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        r#"
        UPDATE grades
        SET is_published = 1,
            updated_at = ?1
        WHERE semester = ?2
          AND academic_year = ?3
          AND is_published = 0
          AND subject_id IN (SELECT id FROM subjects WHERE program_id = ?4)
        "#,
    )
    .bind(&now)
    .bind(semester)
    .bind(academic_year)
    .bind(program_id)
    .execute(db)
    .await?;

    Ok(result.rows_affected())
}
