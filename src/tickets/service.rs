use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::directory::UserDirectory;
use crate::shared::error::TicketError;

use super::diff::{self, Snapshot};
use super::sla;
use super::store::TicketStore;
use super::timeline;
use super::types::{Comment, SlaRule, Ticket, TicketPriority, TicketStatus, TimelineEntry};

#[derive(Debug, Clone, Default)]
pub struct CreateTicket {
    pub title: String,
    pub description: String,
    pub priority: Option<TicketPriority>,
    pub assigned_to: Option<Uuid>,
    pub sla_due_date: Option<DateTime<Utc>>,
}

/// Proposed ticket state for an update. `assigned_to` is tri-state:
/// `None` keeps the current assignment, `Some(None)` clears it,
/// `Some(Some(id))` assigns.
#[derive(Debug, Clone, Default)]
pub struct UpdateTicket {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub assigned_to: Option<Option<Uuid>>,
    /// Version the caller read the ticket at. Omitting it bypasses the
    /// optimistic lock (force write) — a compatibility concession.
    pub version: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub content: String,
    pub parent: Option<Uuid>,
}

/// Orchestrates the mutation pipeline: version guard, change detection,
/// SLA recomputation, timeline recording, atomic persist.
pub struct TicketService {
    store: Arc<dyn TicketStore>,
    directory: Arc<dyn UserDirectory>,
}

impl TicketService {
    pub fn new(store: Arc<dyn TicketStore>, directory: Arc<dyn UserDirectory>) -> Self {
        Self { store, directory }
    }

    pub fn create(&self, req: CreateTicket, actor: Uuid) -> Result<Ticket, TicketError> {
        if req.title.trim().is_empty() {
            return Err(TicketError::Validation("Title is required".to_string()));
        }
        if req.description.trim().is_empty() {
            return Err(TicketError::Validation(
                "Description is required".to_string(),
            ));
        }
        if let Some(assignee) = req.assigned_to {
            self.resolve_assignee(assignee)?;
        }

        let now = Utc::now();
        let priority = req.priority.unwrap_or(TicketPriority::Medium);
        let status = TicketStatus::Open;

        // The due date is derived exactly once, here. Later priority
        // changes never recompute it.
        let sla_due_date = match req.sla_due_date {
            Some(due) => Some(due),
            None => Some(sla::due_date(priority, now)),
        };
        let is_sla_breached = sla::evaluate_breach(now, sla_due_date, status, false);

        let ticket = Ticket {
            id: Uuid::new_v4(),
            title: req.title,
            description: req.description,
            status,
            priority,
            created_by: actor,
            assigned_to: req.assigned_to,
            created_at: now,
            updated_at: now,
            sla_due_date,
            is_sla_breached,
            version: 1,
        };

        let entry = timeline::created_entry(&ticket, actor);
        self.store.insert_ticket(ticket.clone(), entry)?;
        log::info!("Created ticket {} with priority {}", ticket.id, priority);
        Ok(ticket)
    }

    pub fn update(
        &self,
        id: Uuid,
        req: UpdateTicket,
        actor: Uuid,
    ) -> Result<Ticket, TicketError> {
        let current = self.load(id)?;
        check_version(&current, req.version)?;

        if let Some(title) = &req.title {
            if title.trim().is_empty() {
                return Err(TicketError::Validation("Title is required".to_string()));
            }
        }
        if let Some(description) = &req.description {
            if description.trim().is_empty() {
                return Err(TicketError::Validation(
                    "Description is required".to_string(),
                ));
            }
        }

        let assigned_to = match req.assigned_to {
            Some(Some(assignee)) => {
                self.resolve_assignee(assignee)?;
                Some(assignee)
            }
            Some(None) => None,
            None => current.assigned_to,
        };

        let now = Utc::now();
        let status = req.status.unwrap_or(current.status);
        let is_sla_breached =
            sla::evaluate_breach(now, current.sla_due_date, status, current.is_sla_breached);

        let updated = Ticket {
            title: req.title.unwrap_or_else(|| current.title.clone()),
            description: req
                .description
                .unwrap_or_else(|| current.description.clone()),
            status,
            priority: req.priority.unwrap_or(current.priority),
            assigned_to,
            updated_at: now,
            is_sla_breached,
            version: current.version + 1,
            ..current.clone()
        };

        let changes = diff::detect_changes(&self.snapshot(&current), &self.snapshot(&updated));
        let entries = timeline::change_entries(id, actor, &changes, now);

        // The guard already passed, but the persist itself stays
        // conditional so a concurrent writer that slipped in between the
        // read and this point still loses cleanly.
        let expected = req.version.map(|_| current.version);
        self.store.update_ticket(expected, updated.clone(), entries)?;
        Ok(updated)
    }

    pub fn add_comment(
        &self,
        ticket_id: Uuid,
        req: NewComment,
        author: Uuid,
    ) -> Result<Comment, TicketError> {
        if req.content.trim().is_empty() {
            return Err(TicketError::Validation(
                "Comment content is required".to_string(),
            ));
        }

        let now = Utc::now();
        let comment = Comment {
            id: Uuid::new_v4(),
            ticket_id,
            author,
            content: req.content,
            parent: req.parent,
            created_at: now,
            updated_at: now,
        };
        let entry = timeline::commented_entry(ticket_id, author, &comment.content, now);
        self.store.add_comment(comment.clone(), entry, now)?;
        Ok(comment)
    }

    pub fn get(&self, id: Uuid) -> Result<Ticket, TicketError> {
        self.load(id)
    }

    pub fn timeline(&self, id: Uuid) -> Result<Vec<TimelineEntry>, TicketError> {
        self.load(id)?;
        self.store.timeline(id)
    }

    pub fn comments(&self, id: Uuid) -> Result<Vec<Comment>, TicketError> {
        self.load(id)?;
        self.store.comments(id)
    }

    pub fn delete(&self, id: Uuid) -> Result<(), TicketError> {
        if self.store.delete_ticket(id)? {
            log::info!("Deleted ticket {id} and its comments and timeline");
            Ok(())
        } else {
            Err(TicketError::NotFound(format!("Ticket {id} not found")))
        }
    }

    pub fn sla_rules(&self) -> Result<Vec<SlaRule>, TicketError> {
        self.store.sla_rules()
    }

    fn load(&self, id: Uuid) -> Result<Ticket, TicketError> {
        self.store
            .load_ticket(id)?
            .ok_or_else(|| TicketError::NotFound(format!("Ticket {id} not found")))
    }

    fn resolve_assignee(&self, id: Uuid) -> Result<(), TicketError> {
        if self.directory.resolve(id).is_none() {
            return Err(TicketError::Validation("Assigned user not found".to_string()));
        }
        Ok(())
    }

    fn snapshot(&self, ticket: &Ticket) -> Snapshot {
        let assignee_name = ticket.assigned_to.map(|id| {
            self.directory
                .resolve(id)
                .map(|user| user.username)
                // Stale assignee no longer in the directory; fall back to
                // the raw id so the audit line stays meaningful.
                .unwrap_or_else(|| id.to_string())
        });
        Snapshot {
            status: ticket.status,
            priority: ticket.priority,
            assignee_id: ticket.assigned_to,
            assignee_name,
        }
    }
}

fn check_version(stored: &Ticket, client_version: Option<i32>) -> Result<(), TicketError> {
    match client_version {
        Some(supplied) if supplied != stored.version => Err(TicketError::Conflict {
            expected: stored.version,
            supplied,
        }),
        Some(_) => Ok(()),
        None => {
            log::warn!(
                "Update for ticket {} without a version: optimistic lock bypassed",
                stored.id
            );
            Ok(())
        }
    }
}
