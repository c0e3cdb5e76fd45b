//! # contract: the two service seams the orchestrator drives
//!
//! [`SourceReader`] is the read-only view of the Kaiten hierarchy and
//! [`DestinationWriter`] the create/lookup/delete surface of Planka. Real
//! clients live in the CLI crate; tests use the `mockall` mocks generated
//! here or an in-memory fake.
//!
//! Both traits are `Send + Sync` so one instance can be shared by every
//! worker of a run behind an `Arc`.

use std::path::Path;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::Result;
use crate::model::{
    Attachment, Board, Card, CardRef, Checklist, ChecklistItem, Column, Comment, DestId, DestUser,
    NewCard, NewUser, Project, SourceId, SourceUser, Space, Tag,
};

/// Read access to the source service. Every call is expected to pass through
/// the source rate limiter inside the implementation.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SourceReader: Send + Sync {
    async fn list_users(&self) -> Result<Vec<SourceUser>>;

    async fn list_tags(&self) -> Result<Vec<Tag>>;

    async fn list_spaces(&self) -> Result<Vec<Space>>;

    async fn list_boards(&self, space_id: SourceId) -> Result<Vec<Board>>;

    async fn list_columns(&self, board_id: SourceId) -> Result<Vec<Column>>;

    async fn list_cards(&self, column_id: SourceId) -> Result<Vec<CardRef>>;

    async fn get_card(&self, card_id: SourceId) -> Result<Card>;

    async fn list_comments(&self, card_id: SourceId) -> Result<Vec<Comment>>;

    async fn list_attachments(&self, card_id: SourceId) -> Result<Vec<Attachment>>;

    async fn get_checklist(&self, card_id: SourceId, checklist_id: SourceId) -> Result<Checklist>;

    /// Downloads the attachment body into `target`, creating or truncating it.
    async fn download_attachment(&self, url: &str, target: &Path) -> Result<()>;
}

/// Write access to the destination service.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DestinationWriter: Send + Sync {
    async fn list_user_emails(&self) -> Result<Vec<String>>;

    async fn list_users(&self) -> Result<Vec<DestUser>>;

    /// Returns the id of the new user.
    async fn create_user(&self, user: &NewUser) -> Result<DestId>;

    /// `Ok(None)` when no destination user has this email.
    async fn user_id_by_email(&self, email: &str) -> Result<Option<DestId>>;

    async fn issue_access_token(&self, email: &str, password: &str) -> Result<String>;

    async fn list_projects(&self) -> Result<Vec<Project>>;

    async fn create_project(&self, name: &str) -> Result<DestId>;

    async fn list_project_boards(&self, project_id: &str) -> Result<Vec<DestId>>;

    async fn create_board(&self, project_id: &str, name: &str) -> Result<DestId>;

    async fn add_board_member(&self, board_id: &str, user_id: &str) -> Result<()>;

    async fn create_list(&self, board_id: &str, column: &Column) -> Result<DestId>;

    async fn create_card(&self, list_id: &str, card: &NewCard) -> Result<DestId>;

    async fn add_card_member(&self, card_id: &str, user_id: &str) -> Result<()>;

    async fn create_label(&self, board_id: &str, name: &str, color: &str) -> Result<DestId>;

    async fn attach_label_to_card(&self, card_id: &str, label_id: &str) -> Result<()>;

    async fn create_tasklist(&self, card_id: &str, name: &str) -> Result<DestId>;

    async fn create_task(&self, tasklist_id: &str, item: &ChecklistItem) -> Result<DestId>;

    /// Posts `text` on the card authenticated as the holder of `author_token`.
    async fn create_comment(
        &self,
        card_id: &str,
        author_token: &str,
        text: &str,
        user_id: &str,
    ) -> Result<()>;

    async fn upload_attachment(
        &self,
        card_id: &str,
        local_file: &Path,
        display_name: &str,
    ) -> Result<()>;

    async fn delete_user(&self, user_id: &str) -> Result<()>;

    async fn delete_board(&self, board_id: &str) -> Result<()>;

    async fn delete_project(&self, project_id: &str) -> Result<()>;
}
