use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use uuid::Uuid;

use crate::shared::error::TicketError;

use super::sla;
use super::store::TicketStore;
use super::types::{
    Comment, SlaRule, Ticket, TicketPriority, TicketStatus, TimelineAction, TimelineEntry,
};

diesel::table! {
    tickets (id) {
        id -> Uuid,
        title -> Text,
        description -> Text,
        status -> Text,
        priority -> Text,
        created_by -> Uuid,
        assigned_to -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        sla_due_date -> Nullable<Timestamptz>,
        is_sla_breached -> Bool,
        version -> Int4,
    }
}

diesel::table! {
    ticket_comments (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        author -> Uuid,
        content -> Text,
        parent -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_timeline (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        user_id -> Uuid,
        action -> Text,
        description -> Text,
        metadata -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    sla_rules (priority) {
        priority -> Text,
        response_hours -> Int4,
        resolution_hours -> Int4,
    }
}

#[derive(Debug, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = tickets)]
// Updates write the full proposed state; a None assignment really means
// "unassigned", not "leave unchanged".
#[diesel(treat_none_as_null = true)]
struct TicketRow {
    id: Uuid,
    title: String,
    description: String,
    status: String,
    priority: String,
    created_by: Uuid,
    assigned_to: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    sla_due_date: Option<DateTime<Utc>>,
    is_sla_breached: bool,
    version: i32,
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = ticket_comments)]
struct CommentRow {
    id: Uuid,
    ticket_id: Uuid,
    author: Uuid,
    content: String,
    parent: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = ticket_timeline)]
struct TimelineRow {
    id: Uuid,
    ticket_id: Uuid,
    user_id: Uuid,
    action: String,
    description: String,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = sla_rules)]
struct SlaRuleRow {
    priority: String,
    response_hours: i32,
    resolution_hours: i32,
}

fn status_from_str(value: &str) -> Result<TicketStatus, TicketError> {
    match value {
        "open" => Ok(TicketStatus::Open),
        "in_progress" => Ok(TicketStatus::InProgress),
        "resolved" => Ok(TicketStatus::Resolved),
        "closed" => Ok(TicketStatus::Closed),
        other => Err(TicketError::Storage(format!("unknown status {other:?}"))),
    }
}

fn priority_from_str(value: &str) -> Result<TicketPriority, TicketError> {
    match value {
        "low" => Ok(TicketPriority::Low),
        "medium" => Ok(TicketPriority::Medium),
        "high" => Ok(TicketPriority::High),
        "critical" => Ok(TicketPriority::Critical),
        other => Err(TicketError::Storage(format!("unknown priority {other:?}"))),
    }
}

fn action_from_str(value: &str) -> Result<TimelineAction, TicketError> {
    match value {
        "created" => Ok(TimelineAction::Created),
        "updated" => Ok(TimelineAction::Updated),
        "status_changed" => Ok(TimelineAction::StatusChanged),
        "priority_changed" => Ok(TimelineAction::PriorityChanged),
        "assigned" => Ok(TimelineAction::Assigned),
        "commented" => Ok(TimelineAction::Commented),
        other => Err(TicketError::Storage(format!("unknown action {other:?}"))),
    }
}

impl From<&Ticket> for TicketRow {
    fn from(ticket: &Ticket) -> Self {
        Self {
            id: ticket.id,
            title: ticket.title.clone(),
            description: ticket.description.clone(),
            status: ticket.status.as_str().to_string(),
            priority: ticket.priority.as_str().to_string(),
            created_by: ticket.created_by,
            assigned_to: ticket.assigned_to,
            created_at: ticket.created_at,
            updated_at: ticket.updated_at,
            sla_due_date: ticket.sla_due_date,
            is_sla_breached: ticket.is_sla_breached,
            version: ticket.version,
        }
    }
}

impl TryFrom<TicketRow> for Ticket {
    type Error = TicketError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        Ok(Ticket {
            id: row.id,
            title: row.title,
            description: row.description,
            status: status_from_str(&row.status)?,
            priority: priority_from_str(&row.priority)?,
            created_by: row.created_by,
            assigned_to: row.assigned_to,
            created_at: row.created_at,
            updated_at: row.updated_at,
            sla_due_date: row.sla_due_date,
            is_sla_breached: row.is_sla_breached,
            version: row.version,
        })
    }
}

impl From<&Comment> for CommentRow {
    fn from(comment: &Comment) -> Self {
        Self {
            id: comment.id,
            ticket_id: comment.ticket_id,
            author: comment.author,
            content: comment.content.clone(),
            parent: comment.parent,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        }
    }
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Comment {
            id: row.id,
            ticket_id: row.ticket_id,
            author: row.author,
            content: row.content,
            parent: row.parent,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl TryFrom<&TimelineEntry> for TimelineRow {
    type Error = TicketError;

    fn try_from(entry: &TimelineEntry) -> Result<Self, Self::Error> {
        Ok(Self {
            id: entry.id,
            ticket_id: entry.ticket_id,
            user_id: entry.user_id,
            action: entry.action.as_str().to_string(),
            description: entry.description.clone(),
            metadata: serde_json::to_value(&entry.metadata)
                .map_err(|e| TicketError::Storage(format!("metadata encode: {e}")))?,
            created_at: entry.created_at,
        })
    }
}

impl TryFrom<TimelineRow> for TimelineEntry {
    type Error = TicketError;

    fn try_from(row: TimelineRow) -> Result<Self, Self::Error> {
        Ok(TimelineEntry {
            id: row.id,
            ticket_id: row.ticket_id,
            user_id: row.user_id,
            action: action_from_str(&row.action)?,
            description: row.description,
            metadata: serde_json::from_value(row.metadata)
                .map_err(|e| TicketError::Storage(format!("metadata decode: {e}")))?,
            created_at: row.created_at,
        })
    }
}

impl From<diesel::result::Error> for TicketError {
    fn from(err: diesel::result::Error) -> Self {
        TicketError::Storage(err.to_string())
    }
}

type PgPool = Pool<ConnectionManager<PgConnection>>;

/// Postgres-backed store. The conditional write is a plain
/// `UPDATE ... WHERE id = $1 AND version = $expected` inside a
/// transaction, so concurrent writers race on the database rather than in
/// process memory.
pub struct PgTicketStore {
    pool: PgPool,
}

impl PgTicketStore {
    pub fn connect(database_url: &str) -> Result<Self, TicketError> {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder()
            .build(manager)
            .map_err(|e| TicketError::Storage(format!("pool: {e}")))?;
        let store = Self { pool };
        store.seed_sla_rules()?;
        Ok(store)
    }

    fn conn(
        &self,
    ) -> Result<diesel::r2d2::PooledConnection<ConnectionManager<PgConnection>>, TicketError> {
        self.pool
            .get()
            .map_err(|e| TicketError::Storage(format!("pool: {e}")))
    }

    fn seed_sla_rules(&self) -> Result<(), TicketError> {
        let mut conn = self.conn()?;
        let rows: Vec<SlaRuleRow> = sla::default_rules()
            .iter()
            .map(|rule| SlaRuleRow {
                priority: rule.priority.as_str().to_string(),
                response_hours: rule.response_hours,
                resolution_hours: rule.resolution_hours,
            })
            .collect();
        diesel::insert_into(sla_rules::table)
            .values(&rows)
            .on_conflict(sla_rules::priority)
            .do_nothing()
            .execute(&mut conn)?;
        Ok(())
    }
}

impl TicketStore for PgTicketStore {
    fn insert_ticket(&self, ticket: Ticket, entry: TimelineEntry) -> Result<(), TicketError> {
        let mut conn = self.conn()?;
        conn.transaction::<_, TicketError, _>(|conn| {
            diesel::insert_into(tickets::table)
                .values(TicketRow::from(&ticket))
                .execute(conn)?;
            diesel::insert_into(ticket_timeline::table)
                .values(TimelineRow::try_from(&entry)?)
                .execute(conn)?;
            Ok(())
        })
    }

    fn load_ticket(&self, id: Uuid) -> Result<Option<Ticket>, TicketError> {
        let mut conn = self.conn()?;
        let row: Option<TicketRow> = tickets::table
            .filter(tickets::id.eq(id))
            .first(&mut conn)
            .optional()?;
        row.map(Ticket::try_from).transpose()
    }

    fn update_ticket(
        &self,
        expected_version: Option<i32>,
        ticket: Ticket,
        entries: Vec<TimelineEntry>,
    ) -> Result<(), TicketError> {
        let mut conn = self.conn()?;
        conn.transaction::<_, TicketError, _>(|conn| {
            let affected = match expected_version {
                Some(expected) => diesel::update(
                    tickets::table
                        .filter(tickets::id.eq(ticket.id))
                        .filter(tickets::version.eq(expected)),
                )
                .set(TicketRow::from(&ticket))
                .execute(conn)?,
                None => diesel::update(tickets::table.filter(tickets::id.eq(ticket.id)))
                    .set(TicketRow::from(&ticket))
                    .execute(conn)?,
            };

            if affected == 0 {
                // Either the ticket is gone or another writer got there
                // first; distinguish by re-reading.
                let stored: Option<i32> = tickets::table
                    .filter(tickets::id.eq(ticket.id))
                    .select(tickets::version)
                    .first(conn)
                    .optional()?;
                return match (stored, expected_version) {
                    (Some(stored), Some(supplied)) => Err(TicketError::Conflict {
                        expected: stored,
                        supplied,
                    }),
                    _ => Err(TicketError::NotFound(format!(
                        "Ticket {} not found",
                        ticket.id
                    ))),
                };
            }

            let rows: Vec<TimelineRow> = entries
                .iter()
                .map(TimelineRow::try_from)
                .collect::<Result<_, _>>()?;
            diesel::insert_into(ticket_timeline::table)
                .values(&rows)
                .execute(conn)?;
            Ok(())
        })
    }

    fn add_comment(
        &self,
        comment: Comment,
        entry: TimelineEntry,
        ticket_updated_at: DateTime<Utc>,
    ) -> Result<(), TicketError> {
        let mut conn = self.conn()?;
        conn.transaction::<_, TicketError, _>(|conn| {
            let exists: Option<Uuid> = tickets::table
                .filter(tickets::id.eq(comment.ticket_id))
                .select(tickets::id)
                .first(conn)
                .optional()?;
            if exists.is_none() {
                return Err(TicketError::NotFound(format!(
                    "Ticket {} not found",
                    comment.ticket_id
                )));
            }

            if let Some(parent_id) = comment.parent {
                let parent: Option<Uuid> = ticket_comments::table
                    .filter(ticket_comments::id.eq(parent_id))
                    .filter(ticket_comments::ticket_id.eq(comment.ticket_id))
                    .select(ticket_comments::id)
                    .first(conn)
                    .optional()?;
                if parent.is_none() {
                    return Err(TicketError::NotFound(format!(
                        "Parent comment {parent_id} not found on this ticket"
                    )));
                }
            }

            diesel::insert_into(ticket_comments::table)
                .values(CommentRow::from(&comment))
                .execute(conn)?;
            diesel::insert_into(ticket_timeline::table)
                .values(TimelineRow::try_from(&entry)?)
                .execute(conn)?;
            diesel::update(tickets::table.filter(tickets::id.eq(comment.ticket_id)))
                .set(tickets::updated_at.eq(ticket_updated_at))
                .execute(conn)?;
            Ok(())
        })
    }

    fn comments(&self, ticket_id: Uuid) -> Result<Vec<Comment>, TicketError> {
        let mut conn = self.conn()?;
        let rows: Vec<CommentRow> = ticket_comments::table
            .filter(ticket_comments::ticket_id.eq(ticket_id))
            .order(ticket_comments::created_at.asc())
            .load(&mut conn)?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    fn timeline(&self, ticket_id: Uuid) -> Result<Vec<TimelineEntry>, TicketError> {
        let mut conn = self.conn()?;
        let rows: Vec<TimelineRow> = ticket_timeline::table
            .filter(ticket_timeline::ticket_id.eq(ticket_id))
            .order(ticket_timeline::created_at.desc())
            .load(&mut conn)?;
        rows.into_iter().map(TimelineEntry::try_from).collect()
    }

    fn delete_ticket(&self, id: Uuid) -> Result<bool, TicketError> {
        let mut conn = self.conn()?;
        conn.transaction::<_, TicketError, _>(|conn| {
            // No relational cascade is assumed; dependents go explicitly,
            // in the same transaction.
            diesel::delete(ticket_comments::table.filter(ticket_comments::ticket_id.eq(id)))
                .execute(conn)?;
            diesel::delete(ticket_timeline::table.filter(ticket_timeline::ticket_id.eq(id)))
                .execute(conn)?;
            let deleted =
                diesel::delete(tickets::table.filter(tickets::id.eq(id))).execute(conn)?;
            Ok(deleted > 0)
        })
    }

    fn sla_rules(&self) -> Result<Vec<SlaRule>, TicketError> {
        let mut conn = self.conn()?;
        let rows: Vec<SlaRuleRow> = sla_rules::table
            .order(sla_rules::priority.asc())
            .load(&mut conn)?;
        rows.into_iter()
            .map(|row| {
                Ok(SlaRule {
                    priority: priority_from_str(&row.priority)?,
                    response_hours: row.response_hours,
                    resolution_hours: row.resolution_hours,
                })
            })
            .collect()
    }
}
