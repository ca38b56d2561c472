use tokio::sync::broadcast;

use crate::models::GradeChange;

const FEED_CAPACITY: usize = 1024;

/// Row-change notifications for the grades table.
#[derive(Clone)]
pub struct GradeFeed {
    tx: broadcast::Sender<GradeChange>,
}

impl GradeFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, change: GradeChange) -> usize {
        self.tx.send(change).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GradeChange> {
        self.tx.subscribe()
    }
}

impl Default for GradeFeed {
    fn default() -> Self {
        Self::new()
    }
}
