pub mod diff;
#[cfg(feature = "postgres")]
pub mod pg;
pub mod service;
pub mod sla;
pub mod store;
pub mod timeline;
pub mod types;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::directory::User;
use crate::shared::error::TicketError;
use crate::shared::state::AppState;

use self::service::{CreateTicket, NewComment, UpdateTicket};
use self::types::{Comment, Metadata, SlaRule, Ticket, TicketPriority, TicketStatus, TimelineAction};

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub title: String,
    pub description: String,
    pub priority: Option<TicketPriority>,
    pub assigned_to: Option<Uuid>,
    pub sla_due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTicketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    /// Absent keeps the current assignee; explicit null unassigns.
    #[serde(default, deserialize_with = "double_option")]
    pub assigned_to: Option<Option<Uuid>>,
    /// Version the client read the ticket at. Omit to force-write.
    pub version: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
    pub parent: Option<Uuid>,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Ticket as exposed to callers, with resolved user records and comment
/// summary fields.
#[derive(Debug, Serialize)]
pub struct TicketView {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub created_by: Option<User>,
    pub assigned_to: Option<User>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sla_due_date: Option<DateTime<Utc>>,
    pub is_sla_breached: bool,
    pub version: i32,
    pub comments_count: usize,
    pub latest_comment: Option<LatestComment>,
}

#[derive(Debug, Serialize)]
pub struct LatestComment {
    pub content: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CommentView {
    pub id: Uuid,
    pub content: String,
    pub author: Option<User>,
    pub parent: Option<Uuid>,
    pub replies: Vec<CommentView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TimelineView {
    pub id: Uuid,
    pub action: TimelineAction,
    pub description: String,
    pub metadata: Metadata,
    pub user: Option<User>,
    pub created_at: DateTime<Utc>,
}

const LATEST_COMMENT_CHARS: usize = 100;

fn ticket_view(state: &AppState, ticket: Ticket, comments: &[Comment]) -> TicketView {
    let latest_comment = comments.last().map(|comment| {
        let content = if comment.content.chars().count() > LATEST_COMMENT_CHARS {
            let head: String = comment.content.chars().take(LATEST_COMMENT_CHARS).collect();
            format!("{head}...")
        } else {
            comment.content.clone()
        };
        LatestComment {
            content,
            author: state
                .directory
                .resolve(comment.author)
                .map(|user| user.username)
                .unwrap_or_else(|| comment.author.to_string()),
            created_at: comment.created_at,
        }
    });

    TicketView {
        id: ticket.id,
        title: ticket.title,
        description: ticket.description,
        status: ticket.status,
        priority: ticket.priority,
        created_by: state.directory.resolve(ticket.created_by),
        assigned_to: ticket.assigned_to.and_then(|id| state.directory.resolve(id)),
        created_at: ticket.created_at,
        updated_at: ticket.updated_at,
        sla_due_date: ticket.sla_due_date,
        is_sla_breached: ticket.is_sla_breached,
        version: ticket.version,
        comments_count: comments.len(),
        latest_comment,
    }
}

/// Builds the reply forest from the flat comment list, preserving creation
/// order at every level.
fn comment_forest(state: &AppState, comments: &[Comment]) -> Vec<CommentView> {
    comments
        .iter()
        .filter(|comment| comment.parent.is_none())
        .map(|root| comment_view(state, root, comments))
        .collect()
}

fn comment_view(state: &AppState, comment: &Comment, all: &[Comment]) -> CommentView {
    let replies = all
        .iter()
        .filter(|candidate| candidate.parent == Some(comment.id))
        .map(|reply| comment_view(state, reply, all))
        .collect();
    CommentView {
        id: comment.id,
        content: comment.content.clone(),
        author: state.directory.resolve(comment.author),
        parent: comment.parent,
        replies,
        created_at: comment.created_at,
        updated_at: comment.updated_at,
    }
}

/// Resolves the acting user from the `x-user-id` header. Authentication is
/// handled upstream; this core only needs a resolvable identity.
fn resolve_actor(state: &AppState, headers: &HeaderMap) -> Result<User, TicketError> {
    let raw = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| TicketError::Validation("x-user-id header is required".to_string()))?;
    let id = Uuid::parse_str(raw)
        .map_err(|_| TicketError::Validation("x-user-id header is not a valid id".to_string()))?;
    state
        .directory
        .resolve(id)
        .ok_or_else(|| TicketError::Validation("Acting user not found".to_string()))
}

pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<TicketView>), TicketError> {
    let actor = resolve_actor(&state, &headers)?;
    let ticket = state.service.create(
        CreateTicket {
            title: req.title,
            description: req.description,
            priority: req.priority,
            assigned_to: req.assigned_to,
            sla_due_date: req.sla_due_date,
        },
        actor.id,
    )?;
    Ok((StatusCode::CREATED, Json(ticket_view(&state, ticket, &[]))))
}

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TicketView>, TicketError> {
    let ticket = state.service.get(id)?;
    let comments = state.service.comments(id)?;
    Ok(Json(ticket_view(&state, ticket, &comments)))
}

pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<UpdateTicketRequest>,
) -> Result<Json<TicketView>, TicketError> {
    let actor = resolve_actor(&state, &headers)?;
    let ticket = state.service.update(
        id,
        UpdateTicket {
            title: req.title,
            description: req.description,
            status: req.status,
            priority: req.priority,
            assigned_to: req.assigned_to,
            version: req.version,
        },
        actor.id,
    )?;
    let comments = state.service.comments(id)?;
    Ok(Json(ticket_view(&state, ticket, &comments)))
}

pub async fn delete_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, TicketError> {
    state.service.delete(id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_timeline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TimelineView>>, TicketError> {
    let entries = state.service.timeline(id)?;
    let views = entries
        .into_iter()
        .map(|entry| TimelineView {
            id: entry.id,
            action: entry.action,
            description: entry.description,
            metadata: entry.metadata,
            user: state.directory.resolve(entry.user_id),
            created_at: entry.created_at,
        })
        .collect();
    Ok(Json(views))
}

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<CommentView>>, TicketError> {
    let comments = state.service.comments(id)?;
    Ok(Json(comment_forest(&state, &comments)))
}

pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentView>), TicketError> {
    let actor = resolve_actor(&state, &headers)?;
    let comment = state.service.add_comment(
        id,
        NewComment {
            content: req.content,
            parent: req.parent,
        },
        actor.id,
    )?;
    let view = CommentView {
        id: comment.id,
        content: comment.content,
        author: Some(actor),
        parent: comment.parent,
        replies: Vec::new(),
        created_at: comment.created_at,
        updated_at: comment.updated_at,
    };
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn list_sla_rules(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SlaRule>>, TicketError> {
    Ok(Json(state.service.sla_rules()?))
}

pub fn configure_ticket_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tickets", axum::routing::post(create_ticket))
        .route("/api/tickets/sla", get(list_sla_rules))
        .route(
            "/api/tickets/:id",
            get(get_ticket).put(update_ticket).delete(delete_ticket),
        )
        .route("/api/tickets/:id/timeline", get(get_timeline))
        .route(
            "/api/tickets/:id/comments",
            get(list_comments).post(add_comment),
        )
}
