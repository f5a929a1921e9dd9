use uuid::Uuid;

use super::types::{TicketPriority, TicketStatus};

pub const UNASSIGNED: &str = "Unassigned";

/// The fields whose edits are audited. Title and description edits are
/// intentionally untracked and produce no change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedField {
    Status,
    Priority,
    Assignee,
}

/// One semantic change between two ticket snapshots, with both sides
/// rendered for the audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: TrackedField,
    pub from: String,
    pub to: String,
}

impl FieldChange {
    /// Human-readable line for this change, as it appears in timeline
    /// descriptions and in the update rollup.
    pub fn describe(&self) -> String {
        match self.field {
            TrackedField::Status => {
                format!("Status changed from {} to {}", self.from, self.to)
            }
            TrackedField::Priority => {
                format!("Priority changed from {} to {}", self.from, self.to)
            }
            TrackedField::Assignee => format!("Assigned to {}", self.to),
        }
    }
}

/// The tracked portion of a ticket state. Assignment carries the resolved
/// username alongside the id: identity comparison uses the id, rendering
/// uses the name.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub assignee_id: Option<Uuid>,
    pub assignee_name: Option<String>,
}

impl Snapshot {
    fn assignee_label(&self) -> String {
        self.assignee_name
            .clone()
            .unwrap_or_else(|| UNASSIGNED.to_string())
    }
}

/// Diffs two snapshots over the tracked fields, in fixed order: status,
/// then priority, then assignment.
pub fn detect_changes(before: &Snapshot, after: &Snapshot) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    if before.status != after.status {
        changes.push(FieldChange {
            field: TrackedField::Status,
            from: before.status.to_string(),
            to: after.status.to_string(),
        });
    }

    if before.priority != after.priority {
        changes.push(FieldChange {
            field: TrackedField::Priority,
            from: before.priority.to_string(),
            to: after.priority.to_string(),
        });
    }

    if before.assignee_id != after.assignee_id {
        changes.push(FieldChange {
            field: TrackedField::Assignee,
            from: before.assignee_label(),
            to: after.assignee_label(),
        });
    }

    changes
}

/// Rollup line summarizing a non-empty change list, semicolon-joined in
/// detection order.
pub fn summarize(changes: &[FieldChange]) -> Option<String> {
    if changes.is_empty() {
        return None;
    }
    Some(
        changes
            .iter()
            .map(FieldChange::describe)
            .collect::<Vec<_>>()
            .join("; "),
    )
}
