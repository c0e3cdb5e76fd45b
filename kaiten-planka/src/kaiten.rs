//! Kaiten REST client implementing [`SourceReader`].
//!
//! Every request, attachment downloads included, waits on the shared
//! [`RateLimiter`] before it is sent. Responses are decoded into loose wire
//! structs whose fields are all optional, then mapped onto the core model so
//! missing fields fall back to defaults instead of failing the whole listing.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use kaiten_planka_core::contract::SourceReader;
use kaiten_planka_core::mapping::{clamp_sort_order, compose_description, resolve_dates};
use kaiten_planka_core::model::{
    Attachment, Board, Card, CardRef, Checklist, ChecklistItem, Column, Comment, SourceId,
    SourceUser, Space, Tag,
};
use kaiten_planka_core::rate_limit::RateLimiter;
use kaiten_planka_core::{Error, Result};
use reqwest::header::ACCEPT;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::http;

const API: &str = "/api/latest";

pub struct KaitenClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
}

impl KaitenClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        client: reqwest::Client,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!(base_url = %base_url, per_second = limiter.per_second(), burst = limiter.burst(), "Initialized KaitenClient");
        Self {
            base_url,
            token: token.into(),
            client,
            limiter,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.limiter.acquire().await;
        let context = format!("GET {path}");
        let request = self
            .client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json");
        http::send_json(&context, request).await
    }

    /// Absolute file URLs are used as is; relative ones hang off the base URL.
    /// The token is only sent to the Kaiten origin itself.
    fn download_request(&self, url: &str) -> reqwest::RequestBuilder {
        if url.starts_with('/') {
            self.client
                .get(format!("{}{url}", self.base_url))
                .bearer_auth(&self.token)
        } else if self.is_own_origin(url) {
            self.client.get(url).bearer_auth(&self.token)
        } else {
            self.client.get(url)
        }
    }

    /// Same scheme, host and port as the base URL. Unparseable URLs never match.
    fn is_own_origin(&self, url: &str) -> bool {
        let (Ok(base), Ok(target)) = (Url::parse(&self.base_url), Url::parse(url)) else {
            return false;
        };
        base.scheme() == target.scheme()
            && base.host_str().is_some()
            && base.host_str() == target.host_str()
            && base.port_or_known_default() == target.port_or_known_default()
    }
}

// --- wire types ---

#[derive(Deserialize)]
struct WireUser {
    email: Option<String>,
    full_name: Option<String>,
    username: Option<String>,
}

#[derive(Deserialize)]
struct WireTag {
    id: SourceId,
    name: Option<String>,
    color: Option<u32>,
}

#[derive(Deserialize)]
struct WireSpace {
    id: SourceId,
    uid: String,
    title: Option<String>,
    parent_entity_uid: Option<String>,
}

#[derive(Deserialize)]
struct WireBoard {
    id: SourceId,
    title: Option<String>,
}

#[derive(Deserialize)]
struct WireColumn {
    id: SourceId,
    title: Option<String>,
    sort_order: Option<f64>,
}

#[derive(Deserialize)]
struct WireCardRef {
    id: SourceId,
}

#[derive(Deserialize)]
struct WireMember {
    email: Option<String>,
}

#[derive(Deserialize)]
struct WireChecklistRef {
    id: Option<SourceId>,
}

#[derive(Deserialize)]
struct WireCard {
    id: SourceId,
    title: Option<String>,
    description: Option<String>,
    archived: Option<bool>,
    due_date: Option<String>,
    planned_start: Option<String>,
    planned_end: Option<String>,
    tag_ids: Option<Vec<SourceId>>,
    sort_order: Option<f64>,
    members: Option<Vec<WireMember>>,
    checklists: Option<Vec<WireChecklistRef>>,
    properties: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Deserialize)]
struct WireAuthor {
    email: Option<String>,
}

#[derive(Deserialize)]
struct WireComment {
    id: SourceId,
    author: Option<WireAuthor>,
    created: Option<String>,
    text: Option<String>,
}

#[derive(Deserialize)]
struct WireFile {
    name: Option<String>,
    url: Option<String>,
}

#[derive(Deserialize)]
struct WireChecklistItem {
    text: Option<String>,
    checked: Option<bool>,
}

#[derive(Deserialize)]
struct WireChecklist {
    name: Option<String>,
    items: Option<Vec<WireChecklistItem>>,
}

impl From<WireCard> for Card {
    fn from(wire: WireCard) -> Self {
        let properties: BTreeMap<String, String> = wire
            .properties
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(key, value)| match value {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some((key, s)),
                other => Some((key, other.to_string())),
            })
            .collect();

        Card {
            id: wire.id,
            title: wire.title.unwrap_or_default(),
            description: compose_description(&properties, wire.description.as_deref()),
            sort_order: clamp_sort_order(wire.sort_order.unwrap_or(1.0)),
            member_emails: wire
                .members
                .unwrap_or_default()
                .into_iter()
                .filter_map(|m| m.email)
                .filter(|e| !e.is_empty())
                .collect(),
            dates: resolve_dates(wire.due_date, wire.planned_start, wire.planned_end),
            tag_ids: wire.tag_ids.unwrap_or_default(),
            archived: wire.archived.unwrap_or(false),
            checklist_ids: wire
                .checklists
                .unwrap_or_default()
                .into_iter()
                .filter_map(|c| c.id)
                .collect(),
        }
    }
}

#[async_trait]
impl SourceReader for KaitenClient {
    async fn list_users(&self) -> Result<Vec<SourceUser>> {
        let users: Vec<WireUser> = self.get(&format!("{API}/users")).await?;
        debug!(count = users.len(), "[KAITEN] Listed users");
        Ok(users
            .into_iter()
            .map(|u| SourceUser {
                email: u.email.unwrap_or_default(),
                full_name: u.full_name.unwrap_or_default(),
                username: u.username.unwrap_or_default(),
            })
            .collect())
    }

    async fn list_tags(&self) -> Result<Vec<Tag>> {
        let tags: Vec<WireTag> = self.get(&format!("{API}/tags")).await?;
        Ok(tags
            .into_iter()
            .map(|t| Tag {
                id: t.id,
                name: t.name.unwrap_or_default(),
                color: t.color.unwrap_or(0),
            })
            .collect())
    }

    async fn list_spaces(&self) -> Result<Vec<Space>> {
        let spaces: Vec<WireSpace> = self.get(&format!("{API}/spaces")).await?;
        Ok(spaces
            .into_iter()
            .map(|s| Space {
                id: s.id,
                uid: s.uid,
                name: s.title.unwrap_or_default(),
                parent_uid: s.parent_entity_uid.filter(|p| !p.is_empty()),
            })
            .collect())
    }

    async fn list_boards(&self, space_id: SourceId) -> Result<Vec<Board>> {
        let boards: Vec<WireBoard> = self.get(&format!("{API}/spaces/{space_id}/boards")).await?;
        Ok(boards
            .into_iter()
            .map(|b| Board {
                id: b.id,
                title: b.title.unwrap_or_default(),
            })
            .collect())
    }

    async fn list_columns(&self, board_id: SourceId) -> Result<Vec<Column>> {
        let columns: Vec<WireColumn> = self.get(&format!("{API}/boards/{board_id}/columns")).await?;
        Ok(columns
            .into_iter()
            .map(|c| Column {
                id: c.id,
                board_id,
                name: c.title.unwrap_or_default(),
                position: c.sort_order.unwrap_or(0.0),
            })
            .collect())
    }

    async fn list_cards(&self, column_id: SourceId) -> Result<Vec<CardRef>> {
        let cards: Vec<WireCardRef> = self
            .get(&format!("{API}/cards?column_ids={column_id}"))
            .await?;
        Ok(cards.into_iter().map(|c| CardRef { id: c.id }).collect())
    }

    async fn get_card(&self, card_id: SourceId) -> Result<Card> {
        let card: WireCard = self.get(&format!("{API}/cards/{card_id}")).await?;
        Ok(card.into())
    }

    async fn list_comments(&self, card_id: SourceId) -> Result<Vec<Comment>> {
        let comments: Vec<WireComment> =
            self.get(&format!("{API}/cards/{card_id}/comments")).await?;
        Ok(comments
            .into_iter()
            .map(|c| Comment {
                id: c.id,
                author_email: c.author.and_then(|a| a.email).unwrap_or_default(),
                created_at: c.created.unwrap_or_default(),
                text: c.text.unwrap_or_default(),
            })
            .collect())
    }

    async fn list_attachments(&self, card_id: SourceId) -> Result<Vec<Attachment>> {
        let files: Vec<WireFile> = self.get(&format!("{API}/cards/{card_id}/files")).await?;
        Ok(files
            .into_iter()
            .filter_map(|f| {
                let url = f.url.filter(|u| !u.is_empty())?;
                Some(Attachment {
                    name: f.name.unwrap_or_else(|| "attachment".to_string()),
                    url,
                })
            })
            .collect())
    }

    async fn get_checklist(&self, card_id: SourceId, checklist_id: SourceId) -> Result<Checklist> {
        let checklist: WireChecklist = self
            .get(&format!("{API}/cards/{card_id}/checklists/{checklist_id}"))
            .await?;
        Ok(Checklist {
            name: checklist.name.unwrap_or_default(),
            items: checklist
                .items
                .unwrap_or_default()
                .into_iter()
                .map(|i| ChecklistItem {
                    text: i.text.unwrap_or_default(),
                    checked: i.checked.unwrap_or(false),
                })
                .collect(),
        })
    }

    async fn download_attachment(&self, url: &str, target: &Path) -> Result<()> {
        self.limiter.acquire().await;
        let context = "GET attachment";
        let response = http::send(context, self.download_request(url)).await?;

        let mut file = tokio::fs::File::create(target)
            .await
            .map_err(|e| Error::io(format!("create {}", target.display()), e))?;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| Error::transport(context, e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::io(format!("write {}", target.display()), e))?;
        }
        file.flush()
            .await
            .map_err(|e| Error::io(format!("flush {}", target.display()), e))?;
        debug!(target = %target.display(), "[KAITEN] Downloaded attachment");
        Ok(())
    }
}
