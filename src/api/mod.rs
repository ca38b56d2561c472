use std::collections::HashSet;

use axum::Json;
use axum::extract::{Path, Query};
use axum::routing::{delete, patch, post, put};
use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, constraint_error};
use crate::state::AppState;
use crate::services::presence::CursorIndicator;
use crate::services::{
    CalculationKind, CalculationOptions, CalculationResult, CursorPosition, GradeService,
    GridLayout, PresenceEvent, Priority, QueueStatus,
};
use crate::models::*;
use crate::db::repository;

#[derive(Deserialize)]
struct StudentQueryParams {
    program_id: Option<String>,
    status: Option<String>,
}

#[derive(Deserialize)]
struct SubjectQueryParams {
    program_id: Option<String>,
    semester: Option<i32>,
}

#[derive(Deserialize)]
struct GradeQueryParams {
    #[serde(default)]
    published_only: bool,
}

#[derive(Deserialize)]
struct CalculationRequest {
    #[serde(rename = "type")]
    kind: String,
    program_id: String,
    group_id: Option<String>,
    semester: i32,
    academic_year: String,
    #[serde(default)]
    priority: Priority,
}

#[derive(Deserialize)]
struct PresenceSyncRequest {
    connected: Vec<String>,
}

#[derive(Serialize)]
struct PublishResponse {
    published: u64,
}

#[derive(Serialize)]
struct ClearResponse {
    rejected: usize,
}

#[derive(Serialize)]
struct DeliveryResponse {
    delivered: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/programs", get(list_programs).post(create_program))
        .route("/students", get(list_students).post(create_student))
        .route("/students/{id}/status", patch(update_student_status))
        .route("/students/{id}/grades", get(list_student_grades))
        .route("/subjects", get(list_subjects).post(create_subject))
        .route("/evaluation-types", get(list_evaluation_types).post(create_evaluation_type))
        .route("/grades", put(upsert_grade))
        .route("/grades/publish", post(publish_grades))
        .route("/semester-averages", get(semester_averages))
        .route("/calculations", post(run_calculation).delete(clear_calculations))
        .route("/calculations/status", get(calculation_status))
        .route("/grids/{grid_id}", delete(close_grid))
        .route("/grids/{grid_id}/layout", put(open_grid))
        .route("/grids/{grid_id}/cursors", get(list_cursors).post(publish_cursor))
        .route("/grids/{grid_id}/presence", post(publish_presence))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

async fn list_programs(State(state): State<AppState>) -> Result<Json<Vec<Program>>, AppError> {
    let programs = repository::fetch_programs(&state.db).await?;
    Ok(Json(programs))
}

async fn create_program(
    State(state): State<AppState>,
    Json(req): Json<NewProgramRequest>
) -> Result<(StatusCode, Json<Program>), AppError> {
    let program = repository::insert_program(&state.db, req)
        .await
        .map_err(|e| constraint_error(e, "program"))?;
    Ok((StatusCode::CREATED, Json(program)))
}

async fn list_students(
    State(state): State<AppState>,
    Query(params): Query<StudentQueryParams>
) -> Result<Json<Vec<Student>>, AppError> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<StudentStatus>)
        .transpose()
        .map_err(AppError::BadRequest)?;
    let students = repository::fetch_students(&state.db, params.program_id.as_deref(), status).await?;
    Ok(Json(students))
}

async fn create_student(
    State(state): State<AppState>,
    Json(req): Json<NewStudentRequest>
) -> Result<(StatusCode, Json<Student>), AppError> {
    let student = repository::insert_student(&state.db, req)
        .await
        .map_err(|e| constraint_error(e, "student"))?;
    Ok((StatusCode::CREATED, Json(student)))
}

async fn update_student_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStudentStatusRequest>
) -> Result<Json<Student>, AppError> {
    let student = repository::update_student_status(&state.db, &id, req.status)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(student))
}

async fn list_student_grades(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<GradeQueryParams>
) -> Result<Json<Vec<Grade>>, AppError> {
    let service = GradeService::new(state.db.clone(), state.grade_feed.clone());
    let grades = service.list_for_student(&id, params.published_only).await?;
    Ok(Json(grades))
}

async fn list_subjects(
    State(state): State<AppState>,
    Query(params): Query<SubjectQueryParams>
) -> Result<Json<Vec<Subject>>, AppError> {
    let subjects = repository::fetch_subjects(&state.db, params.program_id.as_deref(), params.semester).await?;
    Ok(Json(subjects))
}

async fn create_subject(
    State(state): State<AppState>,
    Json(req): Json<NewSubjectRequest>
) -> Result<(StatusCode, Json<Subject>), AppError> {
    if req.credits < 0 {
        return Err(AppError::BadRequest("credits must not be negative".to_string()));
    }
    let subject = repository::insert_subject(&state.db, req)
        .await
        .map_err(|e| constraint_error(e, "subject"))?;
    Ok((StatusCode::CREATED, Json(subject)))
}

async fn list_evaluation_types(
    State(state): State<AppState>
) -> Result<Json<Vec<EvaluationType>>, AppError> {
    let types = repository::fetch_evaluation_types(&state.db).await?;
    Ok(Json(types))
}

async fn create_evaluation_type(
    State(state): State<AppState>,
    Json(req): Json<NewEvaluationTypeRequest>
) -> Result<(StatusCode, Json<EvaluationType>), AppError> {
    let evaluation_type = repository::insert_evaluation_type(&state.db, req)
        .await
        .map_err(|e| constraint_error(e, "evaluation type"))?;
    Ok((StatusCode::CREATED, Json(evaluation_type)))
}

async fn upsert_grade(
    State(state): State<AppState>,
    Json(req): Json<UpsertGradeRequest>
) -> Result<Json<Grade>, AppError> {
    let service = GradeService::new(state.db.clone(), state.grade_feed.clone());
    let grade = service.upsert(req).await?;
    Ok(Json(grade))
}

async fn publish_grades(
    State(state): State<AppState>,
    Json(req): Json<PublishGradesRequest>
) -> Result<Json<PublishResponse>, AppError> {
    let service = GradeService::new(state.db.clone(), state.grade_feed.clone());
    let published = service.publish(&req).await?;
    Ok(Json(PublishResponse { published }))
}

async fn semester_averages(
    State(state): State<AppState>,
    Query(query): Query<SemesterQuery>
) -> Result<Json<Vec<SemesterStudentData>>, AppError> {
    let data = state.averages.calculate(&query).await?;
    Ok(Json(data))
}

async fn run_calculation(
    State(state): State<AppState>,
    Json(req): Json<CalculationRequest>
) -> Result<Json<CalculationResult>, AppError> {
    let kind: CalculationKind = req.kind.parse()?;
    let options = CalculationOptions {
        kind,
        query: SemesterQuery {
            program_id: req.program_id,
            group_id: req.group_id,
            semester: req.semester,
            academic_year: req.academic_year,
        },
        priority: req.priority,
    };
    let result = state.queue.add(options).await?;
    Ok(Json(result))
}

async fn calculation_status(State(state): State<AppState>) -> Json<QueueStatus> {
    Json(state.queue.status().await)
}

async fn clear_calculations(State(state): State<AppState>) -> Json<ClearResponse> {
    let rejected = state.queue.clear().await;
    Json(ClearResponse { rejected })
}

async fn open_grid(
    State(state): State<AppState>,
    Path(grid_id): Path<String>,
    Json(layout): Json<GridLayout>
) -> Result<StatusCode, AppError> {
    if layout.cell_width <= 0.0 || layout.cell_height <= 0.0 {
        return Err(AppError::BadRequest("cell dimensions must be positive".to_string()));
    }
    state.presence.open(&grid_id, layout).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn close_grid(
    State(state): State<AppState>,
    Path(grid_id): Path<String>
) -> Result<StatusCode, AppError> {
    if state.presence.close(&grid_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}

async fn list_cursors(
    State(state): State<AppState>,
    Path(grid_id): Path<String>
) -> Result<Json<Vec<CursorIndicator>>, AppError> {
    let session = state.presence.session(&grid_id).await.ok_or(AppError::NotFound)?;
    Ok(Json(session.overlay.cursors().await))
}

async fn publish_cursor(
    State(state): State<AppState>,
    Path(grid_id): Path<String>,
    Json(position): Json<CursorPosition>
) -> Result<(StatusCode, Json<DeliveryResponse>), AppError> {
    let session = state.presence.session(&grid_id).await.ok_or(AppError::NotFound)?;
    let delivered = session.bus.publish(PresenceEvent::CursorUpdate(position));
    Ok((StatusCode::ACCEPTED, Json(DeliveryResponse { delivered })))
}

async fn publish_presence(
    State(state): State<AppState>,
    Path(grid_id): Path<String>,
    Json(req): Json<PresenceSyncRequest>
) -> Result<(StatusCode, Json<DeliveryResponse>), AppError> {
    let session = state.presence.session(&grid_id).await.ok_or(AppError::NotFound)?;
    let connected: HashSet<String> = req.connected.into_iter().collect();
    let delivered = session.bus.publish(PresenceEvent::PresenceSync { connected });
    Ok((StatusCode::ACCEPTED, Json(DeliveryResponse { delivered })))
}
