use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Most checklists in flight per card.
pub const MAX_CHECKLISTS: usize = 3;
/// Most items in flight per checklist.
pub const MAX_CHECKLIST_ITEMS: usize = 5;
/// Most tags in flight per card.
pub const MAX_TAGS: usize = 5;

/// Fan-out bounds per hierarchy level. The checklist, item and tag bounds
/// may be lowered but never raised past their maximums.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Concurrency {
    pub boards: usize,
    pub columns: usize,
    pub cards: usize,
    pub checklists: usize,
    pub checklist_items: usize,
    pub tags: usize,
    pub attachments: usize,
}

impl Default for Concurrency {
    fn default() -> Self {
        Self {
            boards: 4,
            columns: 2,
            cards: 4,
            checklists: 3,
            checklist_items: 5,
            tags: 5,
            attachments: 3,
        }
    }
}

impl Concurrency {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("boards", self.boards),
            ("columns", self.columns),
            ("cards", self.cards),
            ("checklists", self.checklists),
            ("checklist_items", self.checklist_items),
            ("tags", self.tags),
            ("attachments", self.attachments),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, v)| *v == 0) {
            return Err(Error::Config(format!(
                "concurrency.{name} must be at least 1"
            )));
        }
        let capped = [
            ("checklists", self.checklists, MAX_CHECKLISTS),
            ("checklist_items", self.checklist_items, MAX_CHECKLIST_ITEMS),
            ("tags", self.tags, MAX_TAGS),
        ];
        match capped.iter().find(|(_, v, max)| v > max) {
            Some((name, _, max)) => Err(Error::Config(format!(
                "concurrency.{name} must be at most {max}"
            ))),
            None => Ok(()),
        }
    }
}

/// Everything the orchestrator needs to know about a run besides its two
/// service handles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    pub admin_email: String,
    pub admin_password: String,
    /// Password given to every user created in the destination; comment
    /// authors log in with it.
    pub default_user_password: String,
    pub default_user_role: String,
    pub concurrency: Concurrency,
    /// Wipe destination users and projects before migrating.
    pub teardown: bool,
}

impl MigrationConfig {
    pub fn new(admin_email: impl Into<String>, admin_password: impl Into<String>) -> Self {
        Self {
            admin_email: admin_email.into(),
            admin_password: admin_password.into(),
            default_user_password: "1234tempPass".to_string(),
            default_user_role: "boardUser".to_string(),
            concurrency: Concurrency::default(),
            teardown: false,
        }
    }

    /// Password to log in as `email` in the destination.
    pub fn password_for(&self, email: &str) -> &str {
        if email == self.admin_email {
            &self.admin_password
        } else {
            &self.default_user_password
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            admin_email = %self.admin_email,
            default_user_role = %self.default_user_role,
            teardown = self.teardown,
            "Loaded MigrationConfig"
        );
        debug!(concurrency = ?self.concurrency, "MigrationConfig concurrency bounds");
    }
}
