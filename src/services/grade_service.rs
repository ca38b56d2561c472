use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::repository;
use crate::error::{AppError, constraint_error};
use crate::models::{Grade, GradeChange, PublishGradesRequest, UpsertGradeRequest};
use crate::services::grade_feed::GradeFeed;

pub struct GradeService {
    db: SqlitePool,
    feed: GradeFeed,
}

impl GradeService {
    pub fn new(db: SqlitePool, feed: GradeFeed) -> Self {
        Self { db, feed }
    }

    /// Writes the grade and notifies feed subscribers. Concurrent writers to the
    /// same key overwrite each other.
    pub async fn upsert(&self, req: UpsertGradeRequest) -> Result<Grade, AppError> {
        req.validate().map_err(AppError::BadRequest)?;

        if repository::find_student_by_id(&self.db, &req.student_id).await?.is_none() {
            warn!("Rejecting grade for unknown student {}", req.student_id);
            return Err(AppError::NotFound);
        }

        let grade = repository::upsert_grade(&self.db, &req)
            .await
            .map_err(|e| constraint_error(e, "grade"))?;
        let receivers = self.feed.publish(GradeChange::from(&grade));
        info!(
            "Grade {} saved ({} / {}), {} feed subscribers notified",
            grade.id, grade.student_id, grade.subject_id, receivers
        );
        Ok(grade)
    }

    pub async fn publish(&self, req: &PublishGradesRequest) -> Result<u64, AppError> {
        let count = repository::publish_grades(&self.db, &req.program_id, req.semester, &req.academic_year).await?;
        info!(
            "Published {} grades for program {} semester {} ({})",
            count, req.program_id, req.semester, req.academic_year
        );
        Ok(count)
    }

    pub async fn list_for_student(&self, student_id: &str, published_only: bool) -> Result<Vec<Grade>, AppError> {
        if repository::find_student_by_id(&self.db, student_id).await?.is_none() {
            return Err(AppError::NotFound);
        }
        Ok(repository::fetch_student_grades(&self.db, student_id, published_only).await?)
    }
}
