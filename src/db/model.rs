//! Row models returned by repositories.

use chrono::{DateTime, Utc};

use crate::ledger::LedgerEntry;

/// One `invited_ledger` row.
#[derive(Debug, Clone)]
pub struct LedgerRow {
    pub destination: String,
    pub recipient_id: i64,
    pub display_name: Option<String>,
    pub invited_at: DateTime<Utc>,
}

impl From<LedgerRow> for LedgerEntry {
    fn from(row: LedgerRow) -> Self {
        LedgerEntry {
            recipient_id: row.recipient_id,
            destination: row.destination,
            display_name: row.display_name,
            invited_at: row.invited_at,
        }
    }
}

/// Per-destination totals for operator listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationSummary {
    pub destination: String,
    pub entries: i64,
    pub newest: Option<DateTime<Utc>>,
}
