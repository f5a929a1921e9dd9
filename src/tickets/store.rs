use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::shared::error::TicketError;

use super::sla;
use super::types::{Comment, SlaRule, Ticket, TimelineEntry};

/// Persistence boundary for the ticket core. Every mutating call is one
/// atomic unit: the ticket state and its derived timeline entries commit
/// together or not at all.
pub trait TicketStore: Send + Sync {
    fn insert_ticket(&self, ticket: Ticket, entry: TimelineEntry) -> Result<(), TicketError>;

    fn load_ticket(&self, id: Uuid) -> Result<Option<Ticket>, TicketError>;

    /// Conditional write closing the read-check-write race. With
    /// `expected_version = Some(n)` the write commits only while the stored
    /// version is still `n` (the WHERE-version-equals predicate); `None`
    /// overwrites unconditionally (force write).
    fn update_ticket(
        &self,
        expected_version: Option<i32>,
        ticket: Ticket,
        entries: Vec<TimelineEntry>,
    ) -> Result<(), TicketError>;

    /// Appends a comment plus its `commented` timeline entry and bumps the
    /// ticket's `updated_at`, atomically. Validates that the ticket exists
    /// and that a parent comment, if given, belongs to the same ticket.
    fn add_comment(
        &self,
        comment: Comment,
        entry: TimelineEntry,
        ticket_updated_at: DateTime<Utc>,
    ) -> Result<(), TicketError>;

    /// Comments for a ticket in creation order.
    fn comments(&self, ticket_id: Uuid) -> Result<Vec<Comment>, TicketError>;

    /// Timeline entries for a ticket, newest first.
    fn timeline(&self, ticket_id: Uuid) -> Result<Vec<TimelineEntry>, TicketError>;

    /// Explicit cascade: removes the ticket together with all of its
    /// comments and timeline entries. Returns false when the ticket did not
    /// exist.
    fn delete_ticket(&self, id: Uuid) -> Result<bool, TicketError>;

    fn sla_rules(&self) -> Result<Vec<SlaRule>, TicketError>;
}

#[derive(Default)]
struct Dataset {
    tickets: HashMap<Uuid, Ticket>,
    // Keyed by ticket id; vectors are in insertion (= chronological) order.
    comments: HashMap<Uuid, Vec<Comment>>,
    timeline: HashMap<Uuid, Vec<TimelineEntry>>,
    sla_rules: Vec<SlaRule>,
}

/// In-memory store. A single mutex over the whole dataset makes every
/// mutating call serializable, which is what gives the version check its
/// compare-and-swap semantics.
pub struct MemoryTicketStore {
    data: Mutex<Dataset>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(Dataset {
                sla_rules: sla::default_rules(),
                ..Dataset::default()
            }),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Dataset> {
        self.data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryTicketStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TicketStore for MemoryTicketStore {
    fn insert_ticket(&self, ticket: Ticket, entry: TimelineEntry) -> Result<(), TicketError> {
        let mut data = self.guard();
        let id = ticket.id;
        data.tickets.insert(id, ticket);
        data.timeline.entry(id).or_default().push(entry);
        Ok(())
    }

    fn load_ticket(&self, id: Uuid) -> Result<Option<Ticket>, TicketError> {
        Ok(self.guard().tickets.get(&id).cloned())
    }

    fn update_ticket(
        &self,
        expected_version: Option<i32>,
        ticket: Ticket,
        entries: Vec<TimelineEntry>,
    ) -> Result<(), TicketError> {
        let mut data = self.guard();
        let id = ticket.id;
        let stored = data
            .tickets
            .get(&id)
            .ok_or_else(|| TicketError::NotFound(format!("Ticket {id} not found")))?;

        if let Some(expected) = expected_version {
            if stored.version != expected {
                return Err(TicketError::Conflict {
                    expected: stored.version,
                    supplied: expected,
                });
            }
        }

        data.tickets.insert(id, ticket);
        data.timeline.entry(id).or_default().extend(entries);
        Ok(())
    }

    fn add_comment(
        &self,
        comment: Comment,
        entry: TimelineEntry,
        ticket_updated_at: DateTime<Utc>,
    ) -> Result<(), TicketError> {
        let mut data = self.guard();
        let ticket_id = comment.ticket_id;

        if !data.tickets.contains_key(&ticket_id) {
            return Err(TicketError::NotFound(format!(
                "Ticket {ticket_id} not found"
            )));
        }

        if let Some(parent_id) = comment.parent {
            let parent_ok = data
                .comments
                .get(&ticket_id)
                .is_some_and(|list| list.iter().any(|c| c.id == parent_id));
            if !parent_ok {
                return Err(TicketError::NotFound(format!(
                    "Parent comment {parent_id} not found on this ticket"
                )));
            }
        }

        if let Some(ticket) = data.tickets.get_mut(&ticket_id) {
            ticket.updated_at = ticket_updated_at;
        }
        data.comments.entry(ticket_id).or_default().push(comment);
        data.timeline.entry(ticket_id).or_default().push(entry);
        Ok(())
    }

    fn comments(&self, ticket_id: Uuid) -> Result<Vec<Comment>, TicketError> {
        Ok(self
            .guard()
            .comments
            .get(&ticket_id)
            .cloned()
            .unwrap_or_default())
    }

    fn timeline(&self, ticket_id: Uuid) -> Result<Vec<TimelineEntry>, TicketError> {
        // Insertion order is chronological, so newest-first is a reversal.
        let mut entries = self
            .guard()
            .timeline
            .get(&ticket_id)
            .cloned()
            .unwrap_or_default();
        entries.reverse();
        Ok(entries)
    }

    fn delete_ticket(&self, id: Uuid) -> Result<bool, TicketError> {
        let mut data = self.guard();
        let existed = data.tickets.remove(&id).is_some();
        data.comments.remove(&id);
        data.timeline.remove(&id);
        Ok(existed)
    }

    fn sla_rules(&self) -> Result<Vec<SlaRule>, TicketError> {
        Ok(self.guard().sla_rules.clone())
    }
}
