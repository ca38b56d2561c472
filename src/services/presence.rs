use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

pub const DEFAULT_CURSOR_TTL: Duration = Duration::from_secs(30);
const BUS_CAPACITY: usize = 256;

/// One collaborator's focus on the grade grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub user_id: String,
    pub user_name: String,
    pub cell_id: String,
    pub color: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PresenceEvent {
    CursorUpdate(CursorPosition),
    PresenceSync { connected: HashSet<String> },
}

/// Explicit pub/sub channel shared by cursor publishers and overlays.
#[derive(Clone)]
pub struct PresenceBus {
    tx: broadcast::Sender<PresenceEvent>,
}

impl PresenceBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Returns how many subscribers saw the event.
    pub fn publish(&self, event: PresenceEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.tx.subscribe()
    }
}

impl Default for PresenceBus {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Geometry of the grade-entry grid. Cell ids are `"<row key>:<column key>"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridLayout {
    pub row_keys: Vec<String>,
    pub column_keys: Vec<String>,
    pub cell_width: f64,
    pub cell_height: f64,
    #[serde(default)]
    pub origin_x: f64,
    #[serde(default)]
    pub origin_y: f64,
}

impl GridLayout {
    pub fn cell_id(row_key: &str, column_key: &str) -> String {
        format!("{}:{}", row_key, column_key)
    }

    /// Position of a cell relative to the grid container.
    pub fn locate(&self, cell_id: &str) -> Option<CellRect> {
        let (row_key, column_key) = cell_id.split_once(':')?;
        let row = self.row_keys.iter().position(|key| key == row_key)?;
        let column = self.column_keys.iter().position(|key| key == column_key)?;

        Some(CellRect {
            x: self.origin_x + column as f64 * self.cell_width,
            y: self.origin_y + row as f64 * self.cell_height,
            width: self.cell_width,
            height: self.cell_height,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorIndicator {
    pub user_id: String,
    pub user_name: String,
    pub cell_id: String,
    pub color: String,
    pub rect: CellRect,
    pub updated_at: DateTime<Utc>,
}

struct TrackedCursor {
    indicator: CursorIndicator,
    generation: u64,
}

#[derive(Default)]
struct OverlayState {
    cursors: HashMap<String, TrackedCursor>,
    next_generation: u64,
}

/// Remote cursors drawn over one grid: at most one per user, each expiring after `ttl`.
#[derive(Clone)]
pub struct CursorOverlay {
    layout: Arc<RwLock<GridLayout>>,
    state: Arc<Mutex<OverlayState>>,
    ttl: Duration,
}

impl CursorOverlay {
    pub fn new(layout: GridLayout, ttl: Duration) -> Self {
        Self {
            layout: Arc::new(RwLock::new(layout)),
            state: Arc::new(Mutex::new(OverlayState::default())),
            ttl,
        }
    }

    pub async fn set_layout(&self, layout: GridLayout) {
        *self.layout.write().await = layout;
    }

    pub async fn apply(&self, event: PresenceEvent) {
        match event {
            PresenceEvent::CursorUpdate(position) => self.update(position).await,
            PresenceEvent::PresenceSync { connected } => self.sync(&connected).await,
        }
    }

    /// Replaces the user's indicator and schedules its expiry.
    pub async fn update(&self, position: CursorPosition) {
        let Some(rect) = self.layout.read().await.locate(&position.cell_id) else {
            debug!("Ignoring cursor for unknown cell {}", position.cell_id);
            return;
        };

        let user_id = position.user_id.clone();
        let generation = {
            let mut state = self.state.lock().await;
            state.next_generation += 1;
            let generation = state.next_generation;
            state.cursors.insert(
                user_id.clone(),
                TrackedCursor {
                    indicator: CursorIndicator {
                        user_id: position.user_id,
                        user_name: position.user_name,
                        cell_id: position.cell_id,
                        color: position.color,
                        rect,
                        updated_at: position.timestamp,
                    },
                    generation,
                },
            );
            generation
        };

        let overlay = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(overlay.ttl).await;
            overlay.expire(&user_id, generation).await;
        });
    }

    /// Drops every indicator whose user is no longer connected.
    pub async fn sync(&self, connected: &HashSet<String>) {
        let mut state = self.state.lock().await;
        let before = state.cursors.len();
        state.cursors.retain(|user_id, _| connected.contains(user_id));
        let pruned = before - state.cursors.len();
        if pruned > 0 {
            debug!("Presence sync pruned {} cursors", pruned);
        }
    }

    /// Removes the cursor only if nothing newer replaced it since `generation`.
    async fn expire(&self, user_id: &str, generation: u64) {
        let mut state = self.state.lock().await;
        let is_current = state
            .cursors
            .get(user_id)
            .is_some_and(|tracked| tracked.generation == generation);
        if is_current {
            state.cursors.remove(user_id);
            debug!("Cursor for {} expired", user_id);
        }
    }

    pub async fn cursors(&self) -> Vec<CursorIndicator> {
        let state = self.state.lock().await;
        let mut cursors: Vec<CursorIndicator> = state
            .cursors
            .values()
            .map(|tracked| tracked.indicator.clone())
            .collect();
        cursors.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        cursors
    }

    pub async fn cursor_for(&self, user_id: &str) -> Option<CursorIndicator> {
        let state = self.state.lock().await;
        state.cursors.get(user_id).map(|tracked| tracked.indicator.clone())
    }

    /// Feeds the overlay from the bus until every sender is gone.
    pub fn listen(&self, bus: &PresenceBus) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        let overlay = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => overlay.apply(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Cursor overlay lagged behind, {} events skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

/// A bus and its overlay for one grid.
#[derive(Clone)]
pub struct GridSession {
    pub bus: PresenceBus,
    pub overlay: CursorOverlay,
    listener: AbortHandle,
}

/// Presence sessions keyed by grid id. A session lives until `close`.
#[derive(Clone)]
pub struct PresenceHub {
    sessions: Arc<RwLock<HashMap<String, GridSession>>>,
    ttl: Duration,
}

impl PresenceHub {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Creates the session or swaps in a new layout for an existing one.
    pub async fn open(&self, grid_id: &str, layout: GridLayout) -> GridSession {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(grid_id) {
            session.overlay.set_layout(layout).await;
            return session.clone();
        }

        let bus = PresenceBus::new();
        let overlay = CursorOverlay::new(layout, self.ttl);
        let listener = overlay.listen(&bus).abort_handle();
        let session = GridSession { bus, overlay, listener };
        sessions.insert(grid_id.to_string(), session.clone());
        info!("Opened presence session for grid {}", grid_id);
        session
    }

    pub async fn session(&self, grid_id: &str) -> Option<GridSession> {
        self.sessions.read().await.get(grid_id).cloned()
    }

    /// Drops the session and stops its listener. Returns false for an unknown grid.
    pub async fn close(&self, grid_id: &str) -> bool {
        let Some(session) = self.sessions.write().await.remove(grid_id) else {
            return false;
        };
        session.listener.abort();
        info!("Closed presence session for grid {}", grid_id);
        true
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
