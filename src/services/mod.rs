pub mod calc_queue;
pub mod grade_feed;
pub mod grade_service;
pub mod grading;
pub mod presence;

pub use calc_queue::{
    CalculationHandle, CalculationKind, CalculationOptions, CalculationQueue, CalculationResult,
    CalculationRunner, CalculationStatus, GradingRunner, Priority, QueueStatus,
};
pub use grade_feed::GradeFeed;
pub use grade_service::GradeService;
pub use grading::{GradeSource, SemesterAverageService, SqlGradeSource};
pub use presence::{CursorOverlay, CursorPosition, GridLayout, PresenceBus, PresenceEvent, PresenceHub};
