//! Builds the exact string handed to the embedder: a fixed-order,
//! space-joined concatenation of non-PII content fields. The field order
//! and exclusion set are part of the external contract (spec §4.4) and
//! must never change without a corresponding re-embedding migration.

use crate::types::Ticket;

/// `summary, description, category, subcategory, merchant, channel, severity`,
/// skipping empty or absent fields. Never includes `customer_id`, `name`,
/// `email`, `mobile_number`, or `account_type`.
#[must_use]
pub fn build_dedup_text(
    summary: &str,
    description: Option<&str>,
    category: &str,
    subcategory: Option<&str>,
    merchant: Option<&str>,
    channel: &str,
    severity: Option<&str>,
) -> String {
    let fields = [
        Some(summary),
        description,
        Some(category),
        subcategory,
        merchant,
        Some(channel),
        severity,
    ];

    fields
        .into_iter()
        .flatten()
        .filter(|f| !f.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Convenience wrapper over [`build_dedup_text`] for an already-constructed
/// [`Ticket`] whose `dedup_text` has not yet been derived.
#[must_use]
pub fn build_dedup_text_for_ticket(ticket: &Ticket) -> String {
    build_dedup_text(
        &ticket.summary,
        ticket.description.as_deref(),
        &ticket.category,
        ticket.subcategory.as_deref(),
        ticket.merchant.as_deref(),
        &ticket.channel,
        ticket.severity.as_deref(),
    )
}
