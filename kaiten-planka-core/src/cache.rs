//! Run-wide identity caches: source email → destination user id, and
//! (destination board, source tag) → destination label.
//!
//! Each key owns a [`OnceCell`]. The map mutex is held only to fetch or insert
//! that cell, never across a network call; the cell then serialises the
//! single lookup or create for its key while other keys proceed in parallel.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::contract::DestinationWriter;
use crate::error::{Error, Result};
use crate::mapping::label_color;
use crate::model::{DestId, Label, SourceId, Tag};

/// Write-once-per-key map.
pub struct OnceMap<K, V> {
    cells: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> Default for OnceMap<K, V> {
    fn default() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash, V> OnceMap<K, V> {
    pub fn cell(&self, key: K) -> Arc<OnceCell<V>> {
        let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        cells.entry(key).or_default().clone()
    }

    /// Initialised entries only.
    pub fn initialised(&self) -> usize {
        let cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        cells.values().filter(|c| c.initialized()).count()
    }
}

/// Outcome of the one label create for a key; failures are kept so the
/// create is never issued twice.
type LabelOutcome = std::result::Result<Label, String>;

pub struct IdentityCache {
    destination: Arc<dyn DestinationWriter>,
    users: OnceMap<String, Option<DestId>>,
    labels: OnceMap<(DestId, SourceId), LabelOutcome>,
}

impl IdentityCache {
    pub fn new(destination: Arc<dyn DestinationWriter>) -> Self {
        Self {
            destination,
            users: OnceMap::default(),
            labels: OnceMap::default(),
        }
    }

    /// Records an id learned elsewhere, e.g. right after creating the user.
    pub fn seed_user(&self, email: &str, user_id: DestId) {
        let cell = self.users.cell(email.to_owned());
        if cell.set(Some(user_id)).is_err() {
            debug!(email, "[CACHE][USER] Already resolved, seed ignored");
        }
    }

    /// `Ok(None)` when the destination has no user with this email. Transport
    /// errors are returned and not cached.
    pub async fn user_id_for_email(&self, email: &str) -> Result<Option<DestId>> {
        let cell = self.users.cell(email.to_owned());
        let resolved = cell
            .get_or_try_init(|| async {
                let found = self.destination.user_id_by_email(email).await?;
                match &found {
                    Some(id) => debug!(email, user_id = %id, "[CACHE][USER] Resolved"),
                    None => warn!(email, "[CACHE][USER] No destination user with this email"),
                }
                Ok::<_, Error>(found)
            })
            .await?;
        Ok(resolved.clone())
    }

    /// Like [`Self::user_id_for_email`] but a missing user is an error.
    pub async fn require_user_id(&self, email: &str) -> Result<DestId> {
        self.user_id_for_email(email)
            .await?
            .ok_or_else(|| Error::not_found("user", email))
    }

    /// Returns the board's label for `tag`, creating it on first use. At most
    /// one create call is issued per (board, tag) for the life of the cache.
    pub async fn resolve_or_create_label(&self, board_id: &str, tag: &Tag) -> Result<Label> {
        let cell = self.labels.cell((board_id.to_owned(), tag.id));
        let outcome = cell
            .get_or_init(|| async {
                let color = label_color(tag.color);
                match self.destination.create_label(board_id, &tag.name, color).await {
                    Ok(id) => {
                        info!(board_id, tag_id = tag.id, label_id = %id, name = %tag.name, color, "[CACHE][LABEL] Created label");
                        Ok(Label {
                            id,
                            name: tag.name.clone(),
                            color: color.to_owned(),
                        })
                    }
                    Err(e) => {
                        warn!(board_id, tag_id = tag.id, error = %e, "[CACHE][LABEL] Label create failed, not retrying for this board");
                        Err(e.to_string())
                    }
                }
            })
            .await;
        outcome.clone().map_err(|message| {
            Error::transport(format!("create label for tag {} on board {board_id}", tag.id), message)
        })
    }

    pub fn labels_resolved(&self) -> usize {
        self.labels.initialised()
    }
}
