use chrono::{DateTime, Duration, Utc};

use super::types::{SlaRule, TicketPriority, TicketStatus};

/// Response-time budget per priority, in hours. This table is fixed by
/// policy and is deliberately not derived from the configurable `SlaRule`
/// rows; due dates are computed once at creation and never revisited when
/// priority changes later.
pub fn response_hours(priority: TicketPriority) -> i64 {
    match priority {
        TicketPriority::Critical => 4,
        TicketPriority::High => 24,
        TicketPriority::Medium => 72,
        TicketPriority::Low => 168,
    }
}

/// Due date for a newly created ticket: creation time plus the priority's
/// response budget.
pub fn due_date(priority: TicketPriority, created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + Duration::hours(response_hours(priority))
}

/// One-way breach latch. Once a ticket has breached its SLA the flag stays
/// set for the rest of its life; tickets that are already resolved or
/// closed never enter the breached state.
pub fn evaluate_breach(
    now: DateTime<Utc>,
    due_date: Option<DateTime<Utc>>,
    status: TicketStatus,
    previously_breached: bool,
) -> bool {
    if previously_breached {
        return true;
    }
    match due_date {
        Some(due) => now > due && status.is_active(),
        None => false,
    }
}

/// Seed rows for the administratively configured SLA table. Response hours
/// mirror the built-in budget; resolution targets are twice the response
/// budget.
pub fn default_rules() -> Vec<SlaRule> {
    TicketPriority::ALL
        .iter()
        .map(|&priority| {
            let response = response_hours(priority) as i32;
            SlaRule {
                priority,
                response_hours: response,
                resolution_hours: response * 2,
            }
        })
        .collect()
}
