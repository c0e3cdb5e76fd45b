//! In-memory source and destination used by the pipeline tests.
//!
//! The destination records every write, in order, in `events` so tests can
//! check ordering as well as final state.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use kaiten_planka_core::contract::{DestinationWriter, SourceReader};
use kaiten_planka_core::model::{
    Attachment, Board, Card, CardDates, CardRef, Checklist, ChecklistItem, Column, Comment, DestId,
    DestUser, NewCard, NewUser, Project, SourceId, SourceUser, Space, Tag,
};
use kaiten_planka_core::{Error, Result};

// --- source ---

#[derive(Default)]
pub struct FakeSource {
    pub users: Vec<SourceUser>,
    pub tags: Vec<Tag>,
    pub spaces: Vec<Space>,
    pub boards: HashMap<SourceId, Vec<Board>>,
    pub columns: HashMap<SourceId, Vec<Column>>,
    pub cards: HashMap<SourceId, Vec<Card>>,
    pub comments: HashMap<SourceId, Vec<Comment>>,
    pub attachments: HashMap<SourceId, Vec<Attachment>>,
    pub checklists: HashMap<(SourceId, SourceId), Checklist>,
    pub fail_tags: bool,
    pub space_listings: AtomicUsize,
}

impl FakeSource {
    fn card(&self, card_id: SourceId) -> Option<&Card> {
        self.cards.values().flatten().find(|c| c.id == card_id)
    }
}

#[async_trait]
impl SourceReader for FakeSource {
    async fn list_users(&self) -> Result<Vec<SourceUser>> {
        Ok(self.users.clone())
    }

    async fn list_tags(&self) -> Result<Vec<Tag>> {
        if self.fail_tags {
            return Err(Error::transport("GET /api/latest/tags", "status 503"));
        }
        Ok(self.tags.clone())
    }

    async fn list_spaces(&self) -> Result<Vec<Space>> {
        self.space_listings.fetch_add(1, Ordering::SeqCst);
        Ok(self.spaces.clone())
    }

    async fn list_boards(&self, space_id: SourceId) -> Result<Vec<Board>> {
        Ok(self.boards.get(&space_id).cloned().unwrap_or_default())
    }

    async fn list_columns(&self, board_id: SourceId) -> Result<Vec<Column>> {
        Ok(self.columns.get(&board_id).cloned().unwrap_or_default())
    }

    async fn list_cards(&self, column_id: SourceId) -> Result<Vec<CardRef>> {
        Ok(self
            .cards
            .get(&column_id)
            .map(|cards| cards.iter().map(|c| CardRef { id: c.id }).collect())
            .unwrap_or_default())
    }

    async fn get_card(&self, card_id: SourceId) -> Result<Card> {
        self.card(card_id)
            .cloned()
            .ok_or_else(|| Error::not_found("card", card_id.to_string()))
    }

    async fn list_comments(&self, card_id: SourceId) -> Result<Vec<Comment>> {
        Ok(self.comments.get(&card_id).cloned().unwrap_or_default())
    }

    async fn list_attachments(&self, card_id: SourceId) -> Result<Vec<Attachment>> {
        Ok(self.attachments.get(&card_id).cloned().unwrap_or_default())
    }

    async fn get_checklist(&self, card_id: SourceId, checklist_id: SourceId) -> Result<Checklist> {
        self.checklists
            .get(&(card_id, checklist_id))
            .cloned()
            .ok_or_else(|| Error::not_found("checklist", checklist_id.to_string()))
    }

    async fn download_attachment(&self, url: &str, target: &Path) -> Result<()> {
        tokio::fs::write(target, format!("body of {url}"))
            .await
            .map_err(|e| Error::io("write download", e))
    }
}

// --- destination ---

#[derive(Debug, Clone, PartialEq)]
pub struct StoredBoard {
    pub id: DestId,
    pub project_id: DestId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredCard {
    pub id: DestId,
    pub list_id: DestId,
    pub card: NewCard,
}

#[derive(Debug, Default)]
pub struct DestState {
    pub users: Vec<DestUser>,
    pub created_users: Vec<NewUser>,
    pub projects: Vec<Project>,
    pub boards: Vec<StoredBoard>,
    pub board_members: Vec<(DestId, DestId)>,
    pub lists: Vec<(DestId, DestId, String)>,
    pub cards: Vec<StoredCard>,
    pub card_members: Vec<(DestId, DestId)>,
    /// (board, label id, name, color)
    pub labels: Vec<(DestId, DestId, String, String)>,
    pub card_labels: Vec<(DestId, DestId)>,
    pub tasklists: Vec<(DestId, DestId, String)>,
    pub tasks: Vec<(DestId, String, bool)>,
    /// (card, user id, token, text)
    pub comments: Vec<(DestId, DestId, String, String)>,
    pub attachments: Vec<(DestId, String, String)>,
    pub deleted: Vec<String>,
    /// `"<kind>:<card id>"` for every card-scoped write, in call order.
    pub events: Vec<String>,
}

/// Concurrent calls per key: current count and the highest seen.
#[derive(Default)]
pub struct InFlight {
    counts: Mutex<HashMap<String, (usize, usize)>>,
}

pub struct InFlightGuard<'a> {
    gauge: &'a InFlight,
    key: String,
}

impl InFlight {
    pub fn enter(&self, key: &str) -> InFlightGuard<'_> {
        let mut counts = self.counts.lock().unwrap();
        let (current, peak) = counts.entry(key.to_string()).or_default();
        *current += 1;
        *peak = (*peak).max(*current);
        InFlightGuard {
            gauge: self,
            key: key.to_string(),
        }
    }

    pub fn peak(&self, key: &str) -> usize {
        self.counts.lock().unwrap().get(key).map_or(0, |(_, peak)| *peak)
    }

    /// Highest peak over every key.
    pub fn max_peak(&self) -> usize {
        self.counts
            .lock()
            .unwrap()
            .values()
            .map(|(_, peak)| *peak)
            .max()
            .unwrap_or(0)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Some((current, _)) = self.gauge.counts.lock().unwrap().get_mut(&self.key) {
            *current -= 1;
        }
    }
}

#[derive(Default)]
pub struct FakeDestination {
    pub state: Mutex<DestState>,
    pub next_id: AtomicU64,
    pub fail_user_create: HashSet<String>,
    pub fail_lookup: HashSet<String>,
    pub fail_user_listing: bool,
    pub fail_upload: bool,
    pub label_delay: Duration,
    /// Held inside tasklist, task and card-label writes so overlapping calls
    /// show up in the gauges below.
    pub write_delay: Duration,
    /// Tasklist creates per card.
    pub tasklists_in_flight: InFlight,
    /// Task creates per tasklist.
    pub tasks_in_flight: InFlight,
    /// Label attachments per card.
    pub labels_in_flight: InFlight,
    /// Emails passed to `user_id_by_email`, in call order.
    pub lookups: Mutex<Vec<String>>,
    pub user_listings: AtomicUsize,
    pub staged_files: Mutex<Vec<PathBuf>>,
}

impl FakeDestination {
    pub fn with_users(users: &[(&str, &str)]) -> Self {
        let fake = Self::default();
        {
            let mut state = fake.state.lock().unwrap();
            for (id, email) in users {
                state.users.push(DestUser {
                    id: id.to_string(),
                    email: email.to_string(),
                });
            }
        }
        fake
    }

    pub fn snapshot<R>(&self, f: impl FnOnce(&DestState) -> R) -> R {
        f(&self.state.lock().unwrap())
    }

    fn id(&self, prefix: &str) -> DestId {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn hold(&self) {
        if !self.write_delay.is_zero() {
            tokio::time::sleep(self.write_delay).await;
        }
    }

    fn write<R>(&self, f: impl FnOnce(&mut DestState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }
}

#[async_trait]
impl DestinationWriter for FakeDestination {
    async fn list_user_emails(&self) -> Result<Vec<String>> {
        Ok(self.snapshot(|s| s.users.iter().map(|u| u.email.clone()).collect()))
    }

    async fn list_users(&self) -> Result<Vec<DestUser>> {
        self.user_listings.fetch_add(1, Ordering::SeqCst);
        if self.fail_user_listing {
            return Err(Error::transport("GET /api/users", "status 502"));
        }
        Ok(self.snapshot(|s| s.users.clone()))
    }

    async fn create_user(&self, user: &NewUser) -> Result<DestId> {
        if self.fail_user_create.contains(&user.email) {
            return Err(Error::transport("POST /api/users", "status 422"));
        }
        let id = self.id("user");
        self.write(|s| {
            s.users.push(DestUser {
                id: id.clone(),
                email: user.email.clone(),
            });
            s.created_users.push(user.clone());
        });
        Ok(id)
    }

    async fn user_id_by_email(&self, email: &str) -> Result<Option<DestId>> {
        self.lookups.lock().unwrap().push(email.to_string());
        if self.fail_lookup.contains(email) {
            return Err(Error::transport("GET /api/users", "connection reset"));
        }
        Ok(self.snapshot(|s| {
            s.users
                .iter()
                .find(|u| u.email == email)
                .map(|u| u.id.clone())
        }))
    }

    async fn issue_access_token(&self, email: &str, _password: &str) -> Result<String> {
        let known = self.snapshot(|s| s.users.iter().any(|u| u.email == email));
        if known {
            Ok(format!("token-{email}"))
        } else {
            Err(Error::transport("POST /api/access-tokens", "status 401"))
        }
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        Ok(self.snapshot(|s| s.projects.clone()))
    }

    async fn create_project(&self, name: &str) -> Result<DestId> {
        let id = self.id("project");
        self.write(|s| {
            s.projects.push(Project {
                id: id.clone(),
                name: name.to_string(),
            })
        });
        Ok(id)
    }

    async fn list_project_boards(&self, project_id: &str) -> Result<Vec<DestId>> {
        Ok(self.snapshot(|s| {
            s.boards
                .iter()
                .filter(|b| b.project_id == project_id)
                .map(|b| b.id.clone())
                .collect()
        }))
    }

    async fn create_board(&self, project_id: &str, name: &str) -> Result<DestId> {
        let id = self.id("board");
        self.write(|s| {
            s.boards.push(StoredBoard {
                id: id.clone(),
                project_id: project_id.to_string(),
                name: name.to_string(),
            })
        });
        Ok(id)
    }

    async fn add_board_member(&self, board_id: &str, user_id: &str) -> Result<()> {
        self.write(|s| {
            s.board_members
                .push((board_id.to_string(), user_id.to_string()))
        });
        Ok(())
    }

    async fn create_list(&self, board_id: &str, column: &Column) -> Result<DestId> {
        let id = self.id("list");
        self.write(|s| {
            s.lists
                .push((board_id.to_string(), id.clone(), column.name.clone()))
        });
        Ok(id)
    }

    async fn create_card(&self, list_id: &str, card: &NewCard) -> Result<DestId> {
        let id = self.id("card");
        self.write(|s| {
            s.events.push(format!("card:{id}"));
            s.cards.push(StoredCard {
                id: id.clone(),
                list_id: list_id.to_string(),
                card: card.clone(),
            });
        });
        Ok(id)
    }

    async fn add_card_member(&self, card_id: &str, user_id: &str) -> Result<()> {
        self.write(|s| {
            s.events.push(format!("member:{card_id}"));
            s.card_members
                .push((card_id.to_string(), user_id.to_string()));
        });
        Ok(())
    }

    async fn create_label(&self, board_id: &str, name: &str, color: &str) -> Result<DestId> {
        if !self.label_delay.is_zero() {
            tokio::time::sleep(self.label_delay).await;
        }
        let id = self.id("label");
        self.write(|s| {
            s.labels.push((
                board_id.to_string(),
                id.clone(),
                name.to_string(),
                color.to_string(),
            ))
        });
        Ok(id)
    }

    async fn attach_label_to_card(&self, card_id: &str, label_id: &str) -> Result<()> {
        let _in_flight = self.labels_in_flight.enter(card_id);
        self.hold().await;
        self.write(|s| {
            s.events.push(format!("label:{card_id}"));
            s.card_labels
                .push((card_id.to_string(), label_id.to_string()));
        });
        Ok(())
    }

    async fn create_tasklist(&self, card_id: &str, name: &str) -> Result<DestId> {
        let _in_flight = self.tasklists_in_flight.enter(card_id);
        self.hold().await;
        let id = self.id("tasklist");
        self.write(|s| {
            s.events.push(format!("tasklist:{card_id}"));
            s.tasklists
                .push((card_id.to_string(), id.clone(), name.to_string()));
        });
        Ok(id)
    }

    async fn create_task(&self, tasklist_id: &str, item: &ChecklistItem) -> Result<DestId> {
        let _in_flight = self.tasks_in_flight.enter(tasklist_id);
        self.hold().await;
        let id = self.id("task");
        self.write(|s| {
            s.tasks
                .push((tasklist_id.to_string(), item.text.clone(), item.checked))
        });
        Ok(id)
    }

    async fn create_comment(
        &self,
        card_id: &str,
        author_token: &str,
        text: &str,
        user_id: &str,
    ) -> Result<()> {
        self.write(|s| {
            s.events.push(format!("comment:{card_id}"));
            s.comments.push((
                card_id.to_string(),
                user_id.to_string(),
                author_token.to_string(),
                text.to_string(),
            ));
        });
        Ok(())
    }

    async fn upload_attachment(
        &self,
        card_id: &str,
        local_file: &Path,
        display_name: &str,
    ) -> Result<()> {
        self.staged_files
            .lock()
            .unwrap()
            .push(local_file.to_path_buf());
        if self.fail_upload {
            return Err(Error::transport("POST attachments", "status 413"));
        }
        let body = tokio::fs::read_to_string(local_file)
            .await
            .map_err(|e| Error::io("read staged file", e))?;
        self.write(|s| {
            s.events.push(format!("attachment:{card_id}"));
            s.attachments
                .push((card_id.to_string(), display_name.to_string(), body));
        });
        Ok(())
    }

    async fn delete_user(&self, user_id: &str) -> Result<()> {
        self.write(|s| {
            s.users.retain(|u| u.id != user_id);
            s.deleted.push(format!("user:{user_id}"));
        });
        Ok(())
    }

    async fn delete_board(&self, board_id: &str) -> Result<()> {
        self.write(|s| {
            s.boards.retain(|b| b.id != board_id);
            s.deleted.push(format!("board:{board_id}"));
        });
        Ok(())
    }

    async fn delete_project(&self, project_id: &str) -> Result<()> {
        self.write(|s| {
            s.projects.retain(|p| p.id != project_id);
            s.deleted.push(format!("project:{project_id}"));
        });
        Ok(())
    }
}

// --- fixtures ---

pub fn user(email: &str) -> SourceUser {
    let username = email.split('@').next().unwrap_or(email).to_string();
    SourceUser {
        email: email.to_string(),
        full_name: username.to_uppercase(),
        username,
    }
}

pub fn space(id: SourceId, uid: &str, name: &str, parent: Option<&str>) -> Space {
    Space {
        id,
        uid: uid.to_string(),
        name: name.to_string(),
        parent_uid: parent.map(str::to_string),
    }
}

pub fn column(id: SourceId, board_id: SourceId, name: &str) -> Column {
    Column {
        id,
        board_id,
        name: name.to_string(),
        position: id as f64,
    }
}

pub fn card(id: SourceId, title: &str) -> Card {
    Card {
        id,
        title: title.to_string(),
        description: None,
        sort_order: 1.0,
        member_emails: vec![],
        dates: CardDates::default(),
        tag_ids: vec![],
        archived: false,
        checklist_ids: vec![],
    }
}
