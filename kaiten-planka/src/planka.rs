//! Planka REST client implementing [`DestinationWriter`].
//!
//! Requests are authenticated with the admin token, except comments, which
//! are posted with the author's own token. The destination is not rate
//! limited.

use std::path::Path;

use async_trait::async_trait;
use kaiten_planka_core::contract::DestinationWriter;
use kaiten_planka_core::model::{ChecklistItem, Column, DestId, DestUser, NewCard, NewUser, Project};
use kaiten_planka_core::{Error, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::http;

/// Description given to every project created by a migration run.
pub const PROJECT_DESCRIPTION: &str = "Migrated from Kaiten";

pub struct PlankaClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct Item<T> {
    item: T,
}

#[derive(Deserialize)]
struct Items<T> {
    items: Vec<T>,
}

#[derive(Deserialize)]
struct Created {
    id: DestId,
}

#[derive(Deserialize)]
struct WireUser {
    id: DestId,
    email: Option<String>,
}

#[derive(Deserialize)]
struct WireProject {
    id: DestId,
    name: Option<String>,
}

#[derive(Deserialize)]
struct ProjectDetail {
    included: ProjectIncluded,
}

#[derive(Deserialize)]
struct ProjectIncluded {
    #[serde(default)]
    boards: Vec<Created>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CardPayload<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    position: f64,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_date: Option<&'a str>,
}

impl PlankaClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!(base_url = %base_url, "Initialized PlankaClient");
        Self {
            base_url,
            token: token.into(),
            client,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        http::send_json(&format!("GET {path}"), self.request(Method::GET, path)).await
    }

    /// POSTs `body` and returns the id of the created item.
    async fn create(&self, path: &str, body: serde_json::Value) -> Result<DestId> {
        let created: Item<Created> =
            http::send_json(&format!("POST {path}"), self.request(Method::POST, path).json(&body))
                .await?;
        Ok(created.item.id)
    }

    async fn post_unit(&self, path: &str, body: serde_json::Value) -> Result<()> {
        http::send(&format!("POST {path}"), self.request(Method::POST, path).json(&body)).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        http::send(&format!("DELETE {path}"), self.request(Method::DELETE, path)).await?;
        Ok(())
    }

    async fn users(&self) -> Result<Vec<WireUser>> {
        let users: Items<WireUser> = self.get("/api/users").await?;
        Ok(users.items)
    }
}

#[async_trait]
impl DestinationWriter for PlankaClient {
    async fn list_user_emails(&self) -> Result<Vec<String>> {
        Ok(self
            .users()
            .await?
            .into_iter()
            .filter_map(|u| u.email)
            .filter(|e| !e.is_empty())
            .collect())
    }

    async fn list_users(&self) -> Result<Vec<DestUser>> {
        Ok(self
            .users()
            .await?
            .into_iter()
            .map(|u| DestUser {
                id: u.id,
                email: u.email.unwrap_or_default(),
            })
            .collect())
    }

    async fn create_user(&self, user: &NewUser) -> Result<DestId> {
        let body = serde_json::to_value(user).map_err(|e| Error::decode("encode user", e))?;
        let id = self.create("/api/users", body).await?;
        debug!(user_id = %id, email = %user.email, "[PLANKA] Created user");
        Ok(id)
    }

    async fn user_id_by_email(&self, email: &str) -> Result<Option<DestId>> {
        Ok(self
            .users()
            .await?
            .into_iter()
            .find(|u| u.email.as_deref() == Some(email))
            .map(|u| u.id))
    }

    async fn issue_access_token(&self, email: &str, password: &str) -> Result<String> {
        let path = "/api/access-tokens";
        let request = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(&json!({ "emailOrUsername": email, "password": password }));
        let token: Item<String> = http::send_json(&format!("POST {path}"), request).await?;
        if token.item.is_empty() {
            return Err(Error::not_found("access token", email));
        }
        Ok(token.item)
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let projects: Items<WireProject> = self.get("/api/projects").await?;
        Ok(projects
            .items
            .into_iter()
            .map(|p| Project {
                id: p.id,
                name: p.name.unwrap_or_default(),
            })
            .collect())
    }

    async fn create_project(&self, name: &str) -> Result<DestId> {
        self.create(
            "/api/projects",
            json!({ "name": name, "description": PROJECT_DESCRIPTION, "type": "shared" }),
        )
        .await
    }

    async fn list_project_boards(&self, project_id: &str) -> Result<Vec<DestId>> {
        let detail: ProjectDetail = self.get(&format!("/api/projects/{project_id}")).await?;
        Ok(detail.included.boards.into_iter().map(|b| b.id).collect())
    }

    async fn create_board(&self, project_id: &str, name: &str) -> Result<DestId> {
        self.create(
            &format!("/api/projects/{project_id}/boards"),
            json!({ "name": name, "position": 0 }),
        )
        .await
    }

    async fn add_board_member(&self, board_id: &str, user_id: &str) -> Result<()> {
        self.post_unit(
            &format!("/api/boards/{board_id}/board-memberships"),
            json!({ "userId": user_id, "role": "editor", "canComment": true }),
        )
        .await
    }

    async fn create_list(&self, board_id: &str, column: &Column) -> Result<DestId> {
        self.create(
            &format!("/api/boards/{board_id}/lists"),
            json!({ "name": column.name, "position": column.position, "type": "active" }),
        )
        .await
    }

    async fn create_card(&self, list_id: &str, card: &NewCard) -> Result<DestId> {
        let payload = CardPayload {
            name: &card.name,
            description: card.description.as_deref(),
            position: card.position,
            kind: "project",
            start: card.start.as_deref(),
            due_date: card.due_date.as_deref(),
        };
        let body = serde_json::to_value(&payload).map_err(|e| Error::decode("encode card", e))?;
        self.create(&format!("/api/lists/{list_id}/cards"), body).await
    }

    async fn add_card_member(&self, card_id: &str, user_id: &str) -> Result<()> {
        self.post_unit(
            &format!("/api/cards/{card_id}/card-memberships"),
            json!({ "userId": user_id }),
        )
        .await
    }

    async fn create_label(&self, board_id: &str, name: &str, color: &str) -> Result<DestId> {
        self.create(
            &format!("/api/boards/{board_id}/labels"),
            json!({ "name": name, "color": color, "position": 0 }),
        )
        .await
    }

    async fn attach_label_to_card(&self, card_id: &str, label_id: &str) -> Result<()> {
        self.post_unit(
            &format!("/api/cards/{card_id}/card-labels"),
            json!({ "labelId": label_id }),
        )
        .await
    }

    async fn create_tasklist(&self, card_id: &str, name: &str) -> Result<DestId> {
        self.create(
            &format!("/api/cards/{card_id}/task-lists"),
            json!({ "name": name, "position": 0 }),
        )
        .await
    }

    async fn create_task(&self, tasklist_id: &str, item: &ChecklistItem) -> Result<DestId> {
        self.create(
            &format!("/api/task-lists/{tasklist_id}/tasks"),
            json!({ "name": item.text, "position": 0, "isCompleted": item.checked }),
        )
        .await
    }

    async fn create_comment(
        &self,
        card_id: &str,
        author_token: &str,
        text: &str,
        user_id: &str,
    ) -> Result<()> {
        let path = format!("/api/cards/{card_id}/comments");
        let request = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(author_token)
            .json(&json!({ "text": text, "userId": user_id }));
        http::send(&format!("POST {path}"), request).await?;
        Ok(())
    }

    async fn upload_attachment(
        &self,
        card_id: &str,
        local_file: &Path,
        display_name: &str,
    ) -> Result<()> {
        let bytes = tokio::fs::read(local_file)
            .await
            .map_err(|e| Error::io(format!("read {}", local_file.display()), e))?;
        let size = bytes.len();
        let form = Form::new()
            .text("name", display_name.to_string())
            .text("type", "file")
            .part("file", Part::bytes(bytes).file_name(display_name.to_string()));

        let path = format!("/api/cards/{card_id}/attachments");
        http::send(
            &format!("POST {path}"),
            self.request(Method::POST, &path).multipart(form),
        )
        .await?;
        debug!(card_id, name = display_name, size, "[PLANKA] Uploaded attachment");
        Ok(())
    }

    async fn delete_user(&self, user_id: &str) -> Result<()> {
        self.delete(&format!("/api/users/{user_id}")).await
    }

    async fn delete_board(&self, board_id: &str) -> Result<()> {
        self.delete(&format!("/api/boards/{board_id}")).await
    }

    async fn delete_project(&self, project_id: &str) -> Result<()> {
        self.delete(&format!("/api/projects/{project_id}")).await
    }
}
