use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::diff::{summarize, FieldChange, TrackedField};
use super::types::{Metadata, Ticket, TimelineAction, TimelineEntry};

/// Comment excerpts in `commented` entries are capped at this many
/// characters.
const COMMENT_EXCERPT_CHARS: usize = 50;

fn entry(
    ticket_id: Uuid,
    user_id: Uuid,
    action: TimelineAction,
    description: String,
    metadata: Metadata,
    created_at: DateTime<Utc>,
) -> TimelineEntry {
    TimelineEntry {
        id: Uuid::new_v4(),
        ticket_id,
        user_id,
        action,
        description,
        metadata,
        created_at,
    }
}

/// Entry recorded when a ticket is created.
pub fn created_entry(ticket: &Ticket, actor: Uuid) -> TimelineEntry {
    entry(
        ticket.id,
        actor,
        TimelineAction::Created,
        format!("Ticket created with priority {}", ticket.priority.label()),
        Metadata::new(),
        ticket.created_at,
    )
}

/// Entries derived from a tracked-field diff: one per change, plus a
/// single `updated` rollup when anything changed at all.
pub fn change_entries(
    ticket_id: Uuid,
    actor: Uuid,
    changes: &[FieldChange],
    at: DateTime<Utc>,
) -> Vec<TimelineEntry> {
    let mut entries: Vec<TimelineEntry> = changes
        .iter()
        .map(|change| {
            let action = match change.field {
                TrackedField::Status => TimelineAction::StatusChanged,
                TrackedField::Priority => TimelineAction::PriorityChanged,
                TrackedField::Assignee => TimelineAction::Assigned,
            };
            let mut metadata = Metadata::new();
            metadata.insert("from".to_string(), change.from.as_str().into());
            metadata.insert("to".to_string(), change.to.as_str().into());
            entry(ticket_id, actor, action, change.describe(), metadata, at)
        })
        .collect();

    if let Some(summary) = summarize(changes) {
        entries.push(entry(
            ticket_id,
            actor,
            TimelineAction::Updated,
            summary,
            Metadata::new(),
            at,
        ));
    }

    entries
}

/// Entry recorded when a comment is added; the description carries an
/// excerpt of the comment body.
pub fn commented_entry(
    ticket_id: Uuid,
    actor: Uuid,
    content: &str,
    at: DateTime<Utc>,
) -> TimelineEntry {
    entry(
        ticket_id,
        actor,
        TimelineAction::Commented,
        format!("Added comment: {}", excerpt(content, COMMENT_EXCERPT_CHARS)),
        Metadata::new(),
        at,
    )
}

fn excerpt(content: &str, max_chars: usize) -> String {
    if content.chars().count() > max_chars {
        let head: String = content.chars().take(max_chars).collect();
        format!("{head}...")
    } else {
        content.to_string()
    }
}
