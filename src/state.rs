use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::services::{
    CalculationQueue, GradeFeed, GradingRunner, PresenceHub, SemesterAverageService, SqlGradeSource,
};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub averages: Arc<SemesterAverageService>,
    pub queue: CalculationQueue,
    pub presence: PresenceHub,
    pub grade_feed: GradeFeed,
}

impl AppState {
    pub fn new(db: SqlitePool, queue_concurrency: usize, presence_ttl: Duration) -> Self {
        let source = Arc::new(SqlGradeSource::new(db.clone()));
        let averages = Arc::new(SemesterAverageService::new(source.clone()));
        let runner = Arc::new(GradingRunner::new(SemesterAverageService::new(source)));

        Self {
            db,
            averages,
            queue: CalculationQueue::new(queue_concurrency, runner),
            presence: PresenceHub::new(presence_ttl),
            grade_feed: GradeFeed::new(),
        }
    }
}
