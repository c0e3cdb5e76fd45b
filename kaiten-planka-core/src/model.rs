//! Typed entities flowing between the source reader, the orchestrator and the
//! destination writer.
//!
//! Source ids are Kaiten's numeric ids; destination ids are Planka's opaque
//! string ids. Wire decoding lives in the clients and ends at these types.

use serde::{Deserialize, Serialize};

pub type SourceId = u64;
pub type DestId = String;

// --- source side ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUser {
    pub email: String,
    pub full_name: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: SourceId,
    pub name: String,
    /// Positional index into [`crate::mapping::LABEL_PALETTE`].
    pub color: u32,
}

/// A space as listed by the source; `parent_uid` is `None` for roots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    pub id: SourceId,
    pub uid: String,
    pub name: String,
    pub parent_uid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub id: SourceId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: SourceId,
    pub board_id: SourceId,
    pub name: String,
    pub position: f64,
}

/// Just enough of a card listing entry to fetch the full card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRef {
    pub id: SourceId,
}

/// Date fields of a card. A due date suppresses start and end; construct
/// through [`crate::mapping::resolve_dates`] to keep that invariant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDates {
    pub due: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: SourceId,
    pub title: String,
    pub description: Option<String>,
    /// Always `>= 1`.
    pub sort_order: f64,
    pub member_emails: Vec<String>,
    pub dates: CardDates,
    pub tag_ids: Vec<SourceId>,
    pub archived: bool,
    pub checklist_ids: Vec<SourceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: SourceId,
    pub author_email: String,
    pub created_at: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub text: String,
    pub checked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    pub name: String,
    pub items: Vec<ChecklistItem>,
}

// --- destination side ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewUser {
    pub username: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: DestId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestUser {
    pub id: DestId,
    pub email: String,
}

/// Card payload for the destination, derived from a source [`Card`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewCard {
    pub name: String,
    pub description: Option<String>,
    pub position: f64,
    pub start: Option<String>,
    pub due_date: Option<String>,
}

impl From<&Card> for NewCard {
    fn from(card: &Card) -> Self {
        let (start, due_date) = match &card.dates.due {
            Some(due) => (None, Some(due.clone())),
            None => (card.dates.start.clone(), card.dates.end.clone()),
        };
        NewCard {
            name: card.title.clone(),
            description: card.description.clone(),
            position: card.sort_order,
            start,
            due_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: DestId,
    pub name: String,
    pub color: String,
}
