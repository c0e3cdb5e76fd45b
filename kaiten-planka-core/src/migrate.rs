//! High-level pipeline: walks the Kaiten hierarchy and recreates it in Planka.
//!
//! A run is a fixed sequence of stages. Stages with a data dependency on
//! each other are joined before the next starts; work inside a stage fans out.
//!
//! - Stage 0, teardown (optional): delete destination users except the admin
//!   and every destination project, as two parallel units.
//! - Stage 1, bulk reads: source users, source tags, destination emails.
//! - Stage 2, user reconciliation: create each source user missing from the
//!   destination, one unit per user.
//! - Stage 3, projects: one create-or-reuse per root space.
//! - Stage 4, cascade: boards, lists, cards and each card's children.
//!
//! # Error Handling
//! Stages 0–2 are all-or-nothing: failures are collected after the stage's
//! join point and returned as [`Error::Stage`], ending the run. From Stage 3
//! on each failed unit is logged with its kind, id and parent id and skipped;
//! siblings and parents carry on, and nothing already created is rolled back.
//!
//! # Ordering
//! A card is created before any of its members, labels, tasklists, comments
//! or attachments are added, since they all need its destination id. Within a
//! checklist the tasklist precedes its tasks. A card's comments are posted
//! one after another, oldest first, alongside the card's attachment fan-out.
//! Nothing else is ordered.
//!
//! # Navigation
//! - Entry points: [`migrate`], [`teardown`]
//! - Stage 3 on its own: [`create_projects`]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::cache::OnceMap;
use crate::context::MigrationContext;
use crate::error::{Error, Result};
use crate::mapping::board_name;
use crate::model::{
    Attachment, Board, Card, Checklist, Column, DestId, NewCard, NewUser, SourceId, SourceUser,
    Space, Tag,
};
use crate::report::{EntityKind, Outcome};
use crate::tree::SpaceTree;
use crate::work::{fan_out, WorkGroup};

/// Runs Stages 0 (when configured) through 4.
pub async fn migrate(ctx: Arc<MigrationContext>) -> Result<()> {
    info!("[MIGRATE] Starting migration run");

    if ctx.config.teardown {
        teardown(&ctx).await?;
    }

    let base = bulk_reads(&ctx).await?;
    info!(
        source_users = base.users.len(),
        tags = base.tags.len(),
        destination_users = base.destination_emails.len(),
        "[MIGRATE] Bulk reads complete"
    );

    let known_emails = reconcile_users(&ctx, &base.users, &base.destination_emails).await?;
    info!(known_users = known_emails.len(), "[MIGRATE] User reconciliation complete");

    let spaces = ctx.source.list_spaces().await.map_err(|e| {
        error!(error = %e, "[MIGRATE][ERROR] Failed to list source spaces");
        e
    })?;
    let tree = SpaceTree::build(spaces);
    info!(spaces = tree.len(), roots = tree.roots().count(), "[MIGRATE] Space tree built");

    let projects = create_projects(&ctx, &tree).await;
    info!(projects = projects.len(), "[MIGRATE] Projects ready");

    let plan = Arc::new(BoardPlan {
        tags: base.tags,
        board_members: resolve_board_members(&ctx, &known_emails).await,
    });
    migrate_spaces(&ctx, &tree, &projects, plan).await;

    log_report(&ctx);
    Ok(())
}

// --- Stage 0 ---

/// Deletes every destination user except the admin and every destination
/// project. Both halves always run to completion before errors are reported.
pub async fn teardown(ctx: &Arc<MigrationContext>) -> Result<()> {
    info!("[TEARDOWN] Starting destination teardown");
    let mut group = WorkGroup::new("teardown");

    let users_ctx = Arc::clone(ctx);
    group.spawn(async move { delete_users_except_admin(&users_ctx).await });
    let projects_ctx = Arc::clone(ctx);
    group.spawn(async move { delete_all_projects(&projects_ctx).await });

    join_stage("teardown", group).await?;
    info!("[TEARDOWN] Destination teardown complete");
    Ok(())
}

async fn delete_users_except_admin(ctx: &MigrationContext) -> Result<()> {
    let users = ctx.destination.list_users().await?;
    for user in users {
        if user.email.is_empty() {
            debug!(user_id = %user.id, "[TEARDOWN][USER] Skipping user without email");
            continue;
        }
        if user.email == ctx.config.admin_email {
            info!(email = %user.email, "[TEARDOWN][USER] Keeping admin user");
            continue;
        }
        ctx.destination.delete_user(&user.id).await.map_err(|e| {
            error!(user_id = %user.id, email = %user.email, error = %e, "[TEARDOWN][ERROR] Failed to delete user");
            e
        })?;
        info!(user_id = %user.id, email = %user.email, "[TEARDOWN][USER] Deleted user");
    }
    Ok(())
}

async fn delete_all_projects(ctx: &MigrationContext) -> Result<()> {
    let projects = ctx.destination.list_projects().await?;
    fan_out(projects, ctx.config.concurrency.boards, |project| async move {
        let boards = match ctx.destination.list_project_boards(&project.id).await {
            Ok(boards) => boards,
            Err(e) => {
                warn!(project_id = %project.id, name = %project.name, error = %e, "[TEARDOWN][PROJECT] Cannot list boards, skipping project");
                return;
            }
        };
        for board_id in boards {
            match ctx.destination.delete_board(&board_id).await {
                Ok(()) => info!(board_id = %board_id, project_id = %project.id, "[TEARDOWN][BOARD] Deleted board"),
                Err(e) => warn!(board_id = %board_id, project_id = %project.id, error = %e, "[TEARDOWN][BOARD] Failed to delete board"),
            }
        }
        match ctx.destination.delete_project(&project.id).await {
            Ok(()) => info!(project_id = %project.id, name = %project.name, "[TEARDOWN][PROJECT] Deleted project"),
            Err(e) => warn!(project_id = %project.id, name = %project.name, error = %e, "[TEARDOWN][PROJECT] Failed to delete project"),
        }
    })
    .await;
    Ok(())
}

// --- Stage 1 ---

struct BaseData {
    users: Vec<SourceUser>,
    tags: HashMap<SourceId, Tag>,
    destination_emails: HashSet<String>,
}

async fn bulk_reads(ctx: &MigrationContext) -> Result<BaseData> {
    let (users, tags, emails) = tokio::join!(
        ctx.source.list_users(),
        ctx.source.list_tags(),
        ctx.destination.list_user_emails(),
    );

    let mut errors = Vec::new();
    let mut keep = |what: &'static str, e: Error| {
        error!(read = what, error = %e, "[MIGRATE][ERROR] Bulk read failed");
        errors.push(e);
    };
    let users = users.map_err(|e| keep("source users", e)).ok();
    let tags = tags.map_err(|e| keep("source tags", e)).ok();
    let emails = emails.map_err(|e| keep("destination emails", e)).ok();

    match (users, tags, emails) {
        (Some(users), Some(tags), Some(emails)) => Ok(BaseData {
            users,
            tags: tags.into_iter().map(|t| (t.id, t)).collect(),
            destination_emails: emails.into_iter().filter(|e| !e.is_empty()).collect(),
        }),
        _ => Err(Error::Stage {
            stage: "bulk_reads",
            errors,
        }),
    }
}

// --- Stage 2 ---

/// Creates missing users and returns every email known to the destination
/// afterwards, sorted.
async fn reconcile_users(
    ctx: &Arc<MigrationContext>,
    users: &[SourceUser],
    existing: &HashSet<String>,
) -> Result<Vec<String>> {
    let mut known: Vec<String> = existing.iter().cloned().collect();
    let mut queued = HashSet::new();
    let mut group = WorkGroup::new("users");

    for user in users {
        if user.email.trim().is_empty() {
            warn!(username = %user.username, "[MIGRATE][USER] Source user has no email, skipping");
            ctx.report.record(EntityKind::User, Outcome::Skipped);
            continue;
        }
        if existing.contains(&user.email) {
            debug!(email = %user.email, "[MIGRATE][USER] Already in destination");
            ctx.report.record(EntityKind::User, Outcome::Reused);
            continue;
        }
        if !queued.insert(user.email.clone()) {
            continue;
        }

        let new_user = NewUser {
            username: user.username.clone(),
            name: user.full_name.clone(),
            email: user.email.clone(),
            password: ctx.config.default_user_password.clone(),
            role: ctx.config.default_user_role.clone(),
        };
        let ctx = Arc::clone(ctx);
        group.spawn(async move {
            match ctx.destination.create_user(&new_user).await {
                Ok(user_id) => {
                    info!(email = %new_user.email, username = %new_user.username, user_id = %user_id, "[MIGRATE][USER] Created user");
                    ctx.identities.seed_user(&new_user.email, user_id);
                    ctx.report.record(EntityKind::User, Outcome::Created);
                    Ok(new_user.email)
                }
                Err(e) => {
                    error!(email = %new_user.email, username = %new_user.username, error = %e, "[MIGRATE][ERROR] Failed to create user");
                    ctx.report.record(EntityKind::User, Outcome::Failed);
                    Err(e)
                }
            }
        });
    }

    known.extend(join_stage("user_reconciliation", group).await?);
    known.sort();
    Ok(known)
}

/// Join point of an all-or-nothing stage.
async fn join_stage<T: Send + 'static>(
    stage: &'static str,
    group: WorkGroup<Result<T>>,
) -> Result<Vec<T>> {
    let expected = group.len();
    let results = group.wait_all().await;

    let mut errors = Vec::new();
    if results.len() < expected {
        errors.push(Error::Aborted(format!(
            "{} of {expected} {stage} unit(s)",
            expected - results.len()
        )));
    }
    let mut done = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(value) => done.push(value),
            Err(e) => errors.push(e),
        }
    }

    if errors.is_empty() {
        Ok(done)
    } else {
        error!(stage, failures = errors.len(), "[MIGRATE][ERROR] Stage failed");
        Err(Error::Stage { stage, errors })
    }
}

// --- Stage 3 ---

/// Root-space uid → destination project id, filled by Stage 3.
#[derive(Default)]
struct ProjectDirectory {
    by_name: OnceMap<String, DestId>,
    by_space: Mutex<HashMap<String, DestId>>,
}

impl ProjectDirectory {
    /// Single-flight per name, so root spaces sharing a name share a project.
    async fn project_for(&self, ctx: &MigrationContext, name: &str) -> Result<DestId> {
        let cell = self.by_name.cell(name.to_owned());
        let id = cell.get_or_try_init(|| ensure_project(ctx, name)).await?;
        Ok(id.clone())
    }

    fn assign(&self, space_uid: &str, project_id: DestId) {
        let mut by_space = self.by_space.lock().unwrap_or_else(PoisonError::into_inner);
        by_space.insert(space_uid.to_owned(), project_id);
    }

    fn snapshot(&self) -> HashMap<String, DestId> {
        self.by_space
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Reuses the destination project with this name or creates it.
async fn ensure_project(ctx: &MigrationContext, name: &str) -> Result<DestId> {
    let existing = ctx.destination.list_projects().await?;
    if let Some(project) = existing.into_iter().find(|p| p.name == name) {
        info!(project_id = %project.id, name, "[MIGRATE][PROJECT] Reusing existing project");
        ctx.report.record(EntityKind::Project, Outcome::Reused);
        return Ok(project.id);
    }
    let id = ctx.destination.create_project(name).await?;
    info!(project_id = %id, name, "[MIGRATE][PROJECT] Created project");
    ctx.report.record(EntityKind::Project, Outcome::Created);
    Ok(id)
}

/// Stage 3: create-or-reuse a project for each root space, concurrently.
/// Returns root uid → project id; roots whose project failed are absent.
pub async fn create_projects(
    ctx: &Arc<MigrationContext>,
    tree: &SpaceTree,
) -> HashMap<String, DestId> {
    let directory = Arc::new(ProjectDirectory::default());
    let mut group = WorkGroup::new("projects");

    for root in tree.roots() {
        let ctx = Arc::clone(ctx);
        let directory = Arc::clone(&directory);
        let root = root.clone();
        group.spawn(async move {
            match directory.project_for(&ctx, &root.name).await {
                Ok(project_id) => directory.assign(&root.uid, project_id),
                Err(e) => {
                    error!(space_id = root.id, space_uid = %root.uid, name = %root.name, error = %e, "[MIGRATE][ERROR] Failed to create project");
                    ctx.report.record(EntityKind::Project, Outcome::Failed);
                }
            }
        });
    }

    group.wait_all().await;
    directory.snapshot()
}

// --- Stage 4 ---

/// Read-only data every board worker needs.
struct BoardPlan {
    tags: HashMap<SourceId, Tag>,
    /// Destination ids to add to every created board.
    board_members: Vec<DestId>,
}

/// Ids of every known user except the admin, who creates the boards and is
/// already a member of each. One user listing serves every email, and each
/// id found is seeded into the identity cache.
async fn resolve_board_members(ctx: &MigrationContext, emails: &[String]) -> Vec<DestId> {
    let users = match ctx.destination.list_users().await {
        Ok(users) => users,
        Err(e) => {
            error!(error = %e, "[MIGRATE][ERROR] Failed to list destination users, boards get no members");
            return Vec::new();
        }
    };
    let ids: HashMap<&str, &DestId> = users
        .iter()
        .filter(|u| !u.email.is_empty())
        .map(|u| (u.email.as_str(), &u.id))
        .collect();

    emails
        .iter()
        .filter(|email| **email != ctx.config.admin_email)
        .filter_map(|email| match ids.get(email.as_str()) {
            Some(&id) => {
                ctx.identities.seed_user(email, id.clone());
                Some(id.clone())
            }
            None => {
                warn!(email = %email, "[MIGRATE][BOARD_MEMBER] No destination user with this email, not adding to boards");
                None
            }
        })
        .collect()
}

async fn migrate_spaces(
    ctx: &Arc<MigrationContext>,
    tree: &SpaceTree,
    projects: &HashMap<String, DestId>,
    plan: Arc<BoardPlan>,
) {
    let mut group = WorkGroup::new("spaces");
    for space in tree.spaces() {
        let Some(root) = tree.root_of(&space.uid) else {
            error!(space_id = space.id, space_uid = %space.uid, "[MIGRATE][ERROR] Space parent chain loops, skipping space");
            continue;
        };
        let Some(project_id) = projects.get(&root.uid).cloned() else {
            warn!(space_id = space.id, space_uid = %space.uid, root_uid = %root.uid, "[MIGRATE][SPACE] No project for root space, skipping boards");
            continue;
        };
        let ctx = Arc::clone(ctx);
        let plan = Arc::clone(&plan);
        let space = space.clone();
        group.spawn(async move { migrate_space(ctx, plan, project_id, space).await });
    }
    group.wait_all().await;
}

async fn migrate_space(
    ctx: Arc<MigrationContext>,
    plan: Arc<BoardPlan>,
    project_id: DestId,
    space: Space,
) {
    let boards = match ctx.source.list_boards(space.id).await {
        Ok(boards) => boards,
        Err(e) => {
            error!(space_id = space.id, project_id = %project_id, error = %e, "[MIGRATE][ERROR] Failed to list boards");
            return;
        }
    };
    if boards.is_empty() {
        info!(space_id = space.id, name = %space.name, "[MIGRATE][SPACE] Space has no boards");
        return;
    }

    let boards_in_space = boards.len();
    let mut group = WorkGroup::bounded("boards", ctx.config.concurrency.boards);
    for board in boards {
        let name = board_name(&space.name, &board.title, boards_in_space);
        let ctx = Arc::clone(&ctx);
        let plan = Arc::clone(&plan);
        let project_id = project_id.clone();
        group.spawn(async move { migrate_board(&ctx, &plan, &project_id, &name, &board).await });
    }
    group.wait_all().await;
}

async fn migrate_board(
    ctx: &MigrationContext,
    plan: &BoardPlan,
    project_id: &str,
    name: &str,
    board: &Board,
) {
    let board_id = match ctx.destination.create_board(project_id, name).await {
        Ok(id) => {
            info!(board_id = %id, source_board_id = board.id, project_id, name, "[MIGRATE][BOARD] Created board");
            ctx.report.record(EntityKind::Board, Outcome::Created);
            id
        }
        Err(e) => {
            error!(source_board_id = board.id, project_id, name, error = %e, "[MIGRATE][ERROR] Failed to create board");
            ctx.report.record(EntityKind::Board, Outcome::Failed);
            return;
        }
    };
    let board_id = board_id.as_str();

    join_all(plan.board_members.iter().cloned().map(|user_id| async move {
        match ctx.destination.add_board_member(board_id, &user_id).await {
            Ok(()) => ctx.report.record(EntityKind::BoardMember, Outcome::Created),
            Err(e) => {
                error!(board_id, user_id = %user_id, error = %e, "[MIGRATE][ERROR] Failed to add board member");
                ctx.report.record(EntityKind::BoardMember, Outcome::Failed);
            }
        }
    }))
    .await;

    let columns = match ctx.source.list_columns(board.id).await {
        Ok(columns) => columns,
        Err(e) => {
            error!(source_board_id = board.id, board_id, error = %e, "[MIGRATE][ERROR] Failed to list columns");
            return;
        }
    };
    fan_out(columns, ctx.config.concurrency.columns, |column| async move {
        migrate_column(ctx, plan, board_id, &column).await
    })
    .await;
}

async fn migrate_column(ctx: &MigrationContext, plan: &BoardPlan, board_id: &str, column: &Column) {
    let list_id = match ctx.destination.create_list(board_id, column).await {
        Ok(id) => {
            info!(list_id = %id, column_id = column.id, board_id, name = %column.name, "[MIGRATE][LIST] Created list");
            ctx.report.record(EntityKind::List, Outcome::Created);
            id
        }
        Err(e) => {
            error!(column_id = column.id, board_id, name = %column.name, error = %e, "[MIGRATE][ERROR] Failed to create list");
            ctx.report.record(EntityKind::List, Outcome::Failed);
            return;
        }
    };
    let list_id = list_id.as_str();

    let cards = match ctx.source.list_cards(column.id).await {
        Ok(cards) => cards,
        Err(e) => {
            error!(column_id = column.id, list_id, error = %e, "[MIGRATE][ERROR] Failed to list cards");
            return;
        }
    };
    fan_out(cards, ctx.config.concurrency.cards, |card_ref| async move {
        migrate_card(ctx, plan, board_id, list_id, card_ref.id).await
    })
    .await;
}

async fn migrate_card(
    ctx: &MigrationContext,
    plan: &BoardPlan,
    board_id: &str,
    list_id: &str,
    source_card_id: SourceId,
) {
    let card = match ctx.source.get_card(source_card_id).await {
        Ok(card) => card,
        Err(e) => {
            error!(source_card_id, list_id, error = %e, "[MIGRATE][ERROR] Failed to fetch card");
            ctx.report.record(EntityKind::Card, Outcome::Failed);
            return;
        }
    };
    if card.archived {
        info!(source_card_id, title = %card.title, "[MIGRATE][CARD] Archived card, skipping");
        ctx.report.record(EntityKind::Card, Outcome::Skipped);
        return;
    }

    let card_id = match ctx.destination.create_card(list_id, &NewCard::from(&card)).await {
        Ok(id) => {
            info!(card_id = %id, source_card_id, list_id, title = %card.title, "[MIGRATE][CARD] Created card");
            ctx.report.record(EntityKind::Card, Outcome::Created);
            id
        }
        Err(e) => {
            error!(source_card_id, list_id, title = %card.title, error = %e, "[MIGRATE][ERROR] Failed to create card");
            ctx.report.record(EntityKind::Card, Outcome::Failed);
            return;
        }
    };

    // child work starts only once the card id exists
    tokio::join!(
        assign_members(ctx, &card, &card_id),
        assign_labels(ctx, plan, board_id, &card, &card_id),
        migrate_checklists(ctx, &card, &card_id),
    );
    tokio::join!(
        migrate_comments(ctx, &card, &card_id),
        migrate_attachments(ctx, &card, &card_id),
    );
    debug!(card_id = %card_id, source_card_id, "[MIGRATE][CARD] Card children done");
}

async fn assign_members(ctx: &MigrationContext, card: &Card, card_id: &str) {
    join_all(card.member_emails.iter().cloned().map(|email| async move {
        let linked = async {
            let user_id = ctx.identities.require_user_id(&email).await?;
            ctx.destination.add_card_member(card_id, &user_id).await
        };
        match linked.await {
            Ok(()) => {
                info!(card_id, email = %email, "[MIGRATE][CARD_MEMBER] Added card member");
                ctx.report.record(EntityKind::CardMember, Outcome::Created);
            }
            Err(e) => {
                error!(card_id, source_card_id = card.id, email = %email, error = %e, "[MIGRATE][ERROR] Failed to add card member");
                ctx.report.record(EntityKind::CardMember, Outcome::Failed);
            }
        }
    }))
    .await;
}

async fn assign_labels(
    ctx: &MigrationContext,
    plan: &BoardPlan,
    board_id: &str,
    card: &Card,
    card_id: &str,
) {
    fan_out(card.tag_ids.iter().copied(), ctx.config.concurrency.tags, |tag_id| async move {
        let Some(tag) = plan.tags.get(&tag_id) else {
            warn!(card_id, source_card_id = card.id, tag_id, "[MIGRATE][LABEL] Unknown tag, skipping");
            ctx.report.record(EntityKind::CardLabel, Outcome::Skipped);
            return;
        };
        let attached = async {
            let label = ctx.identities.resolve_or_create_label(board_id, tag).await?;
            ctx.destination.attach_label_to_card(card_id, &label.id).await?;
            Ok::<_, Error>(label)
        };
        match attached.await {
            Ok(label) => {
                info!(card_id, label_id = %label.id, tag_id, "[MIGRATE][LABEL] Attached label");
                ctx.report.record(EntityKind::CardLabel, Outcome::Created);
            }
            Err(e) => {
                error!(card_id, source_card_id = card.id, tag_id, board_id, error = %e, "[MIGRATE][ERROR] Failed to attach label");
                ctx.report.record(EntityKind::CardLabel, Outcome::Failed);
            }
        }
    })
    .await;
}

async fn migrate_checklists(ctx: &MigrationContext, card: &Card, card_id: &str) {
    fan_out(
        card.checklist_ids.iter().copied(),
        ctx.config.concurrency.checklists,
        |checklist_id| async move {
            let checklist = match ctx.source.get_checklist(card.id, checklist_id).await {
                Ok(checklist) => checklist,
                Err(e) => {
                    error!(source_card_id = card.id, checklist_id, card_id, error = %e, "[MIGRATE][ERROR] Failed to fetch checklist");
                    ctx.report.record(EntityKind::Tasklist, Outcome::Failed);
                    return;
                }
            };
            let Checklist { name, items } = checklist;
            let tasklist_id = match ctx.destination.create_tasklist(card_id, &name).await {
                Ok(id) => {
                    info!(tasklist_id = %id, card_id, checklist_id, name = %name, "[MIGRATE][TASKLIST] Created tasklist");
                    ctx.report.record(EntityKind::Tasklist, Outcome::Created);
                    id
                }
                Err(e) => {
                    error!(checklist_id, card_id, name = %name, error = %e, "[MIGRATE][ERROR] Failed to create tasklist");
                    ctx.report.record(EntityKind::Tasklist, Outcome::Failed);
                    return;
                }
            };
            let tasklist_id = tasklist_id.as_str();
            fan_out(
                items,
                ctx.config.concurrency.checklist_items,
                |item| async move {
                    match ctx.destination.create_task(tasklist_id, &item).await {
                        Ok(task_id) => {
                            debug!(task_id = %task_id, tasklist_id, "[MIGRATE][TASK] Created task");
                            ctx.report.record(EntityKind::Task, Outcome::Created);
                        }
                        Err(e) => {
                            error!(tasklist_id, card_id, text = %item.text, error = %e, "[MIGRATE][ERROR] Failed to create task");
                            ctx.report.record(EntityKind::Task, Outcome::Failed);
                        }
                    }
                },
            )
            .await;
        },
    )
    .await;
}

/// Comments go in one at a time, oldest first. Planka lists a card's
/// comments in the order they were created.
async fn migrate_comments(ctx: &MigrationContext, card: &Card, card_id: &str) {
    let mut comments = match ctx.source.list_comments(card.id).await {
        Ok(comments) => comments,
        Err(e) => {
            error!(source_card_id = card.id, card_id, error = %e, "[MIGRATE][ERROR] Failed to list comments");
            return;
        }
    };
    comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    for comment in &comments {
        let identity = match ctx.identity_or_admin(&comment.author_email).await {
            Ok(identity) => identity,
            Err(e) => {
                error!(comment_id = comment.id, card_id, author = %comment.author_email, error = %e, "[MIGRATE][ERROR] No identity to post comment as");
                ctx.report.record(EntityKind::Comment, Outcome::Failed);
                continue;
            }
        };
        match ctx
            .destination
            .create_comment(card_id, &identity.token, &comment.text, &identity.user_id)
            .await
        {
            Ok(()) => {
                info!(comment_id = comment.id, card_id, user_id = %identity.user_id, "[MIGRATE][COMMENT] Created comment");
                ctx.report.record(EntityKind::Comment, Outcome::Created);
            }
            Err(e) => {
                error!(comment_id = comment.id, card_id, source_card_id = card.id, error = %e, "[MIGRATE][ERROR] Failed to create comment");
                ctx.report.record(EntityKind::Comment, Outcome::Failed);
            }
        }
    }
}

async fn migrate_attachments(ctx: &MigrationContext, card: &Card, card_id: &str) {
    let attachments = match ctx.source.list_attachments(card.id).await {
        Ok(attachments) => attachments,
        Err(e) => {
            error!(source_card_id = card.id, card_id, error = %e, "[MIGRATE][ERROR] Failed to list attachments");
            return;
        }
    };
    fan_out(attachments, ctx.config.concurrency.attachments, |attachment| async move {
        match transfer_attachment(ctx, card_id, &attachment).await {
            Ok(()) => {
                info!(card_id, name = %attachment.name, "[MIGRATE][ATTACHMENT] Uploaded attachment");
                ctx.report.record(EntityKind::Attachment, Outcome::Created);
            }
            Err(e) => {
                error!(card_id, source_card_id = card.id, name = %attachment.name, error = %e, "[MIGRATE][ERROR] Failed to transfer attachment");
                ctx.report.record(EntityKind::Attachment, Outcome::Failed);
            }
        }
    })
    .await;
}

/// Download into a private temp directory, upload, then remove the
/// directory. Dropping the directory on an early return removes it too.
async fn transfer_attachment(
    ctx: &MigrationContext,
    card_id: &str,
    attachment: &Attachment,
) -> Result<()> {
    let staging = tempfile::Builder::new()
        .prefix("kaiten-attachment-")
        .tempdir()
        .map_err(|e| Error::io("create attachment staging dir", e))?;
    let local_file = staging.path().join(local_file_name(&attachment.name));

    ctx.source
        .download_attachment(&attachment.url, &local_file)
        .await?;
    ctx.destination
        .upload_attachment(card_id, &local_file, &attachment.name)
        .await?;

    staging
        .close()
        .map_err(|e| Error::io("remove attachment staging dir", e))
}

/// File name safe to join under the staging directory.
fn local_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "attachment".to_string(),
        trimmed => trimmed.to_string(),
    }
}

fn log_report(ctx: &MigrationContext) {
    for (kind, counts) in ctx.report.snapshot() {
        info!(
            kind,
            created = counts.created,
            reused = counts.reused,
            skipped = counts.skipped,
            failed = counts.failed,
            "migration_report"
        );
    }
    info!(
        labels = ctx.identities.labels_resolved(),
        failed = ctx.report.total_failed(),
        "[MIGRATE] Migration run finished"
    );
}
