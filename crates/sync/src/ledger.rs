//! The pending-write ledger.
//!
//! Writes made while the backend is unreachable land here and stay until
//! the backend has confirmed them. The ledger is append-only from the
//! terminal's point of view: entries are removed only after a confirmed
//! remote acceptance, which gives at-least-once delivery toward the
//! backend. Duplicate suppression on replay is the backend's concern.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while loading or persisting ledger state.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// File could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File contents are not valid JSON for the expected shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One queued transaction line, keyed by email rather than user name so
/// replay does not depend on the user list being loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Email of the purchaser.
    pub email: String,
    /// Name of the purchased product.
    pub product_name: String,
    /// Number of units.
    pub amount: u32,
}

/// One queued card registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCard {
    /// Email of the card owner. May be empty in a damaged ledger; such
    /// entries are skipped during replay, never treated as errors.
    #[serde(default)]
    pub email: String,
    /// Display name of the card owner.
    #[serde(default)]
    pub owner: String,
}

/// Durable queue of writes awaiting remote confirmation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLedger {
    /// Queued transaction lines.
    #[serde(default)]
    pub transactions: Vec<LedgerTransaction>,
    /// Queued card registrations, keyed by card id.
    #[serde(default)]
    pub cards: BTreeMap<String, LedgerCard>,
}

impl PendingLedger {
    /// Load the ledger from `path`.
    ///
    /// A missing file is not an error: an empty ledger is written and
    /// returned. An unreadable or unparseable file *is* an error - the
    /// caller must leave the file untouched rather than lose queued
    /// writes.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError` on I/O failure or malformed JSON.
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        if !path.exists() {
            let ledger = Self::default();
            ledger.persist(path)?;
            debug!(path = %path.display(), "Created empty pending ledger");
            return Ok(ledger);
        }

        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Persist the ledger to `path` atomically.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError` on I/O failure.
    pub fn persist(&self, path: &Path) -> Result<(), LedgerError> {
        write_json_atomic(path, self)
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty() && self.cards.is_empty()
    }
}

/// Write a JSON document atomically: to a temp file in the same
/// directory, then rename over the target, so a concurrent reader never
/// observes a half-written document.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), LedgerError> {
    let json = serde_json::to_string_pretty(value)?;

    let tmp_path = path.with_extension("json.tmp");
    {
        let mut tmp = std::fs::File::create(&tmp_path)?;
        tmp.write_all(json.as_bytes())?;
        tmp.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn transaction(email: &str, product: &str, amount: u32) -> LedgerTransaction {
        LedgerTransaction {
            email: email.to_owned(),
            product_name: product.to_owned(),
            amount,
        }
    }

    #[test]
    fn test_load_missing_file_creates_empty_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending_ledger.json");

        let ledger = PendingLedger::load(&path).unwrap();
        assert!(ledger.is_empty());
        assert!(path.exists());
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending_ledger.json");

        let mut ledger = PendingLedger::default();
        ledger
            .transactions
            .push(transaction("a@x.com", "cola", 2));
        ledger.cards.insert(
            "04AB".to_string(),
            LedgerCard {
                email: "a@x.com".to_string(),
                owner: "Alice".to_string(),
            },
        );
        ledger.persist(&path).unwrap();

        let loaded = PendingLedger::load(&path).unwrap();
        assert_eq!(loaded, ledger);
    }

    #[test]
    fn test_corrupt_file_is_an_error_and_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending_ledger.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(PendingLedger::load(&path).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{not json");
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let ledger: PendingLedger = serde_json::from_str("{}").unwrap();
        assert!(ledger.is_empty());

        let ledger: PendingLedger =
            serde_json::from_str(r#"{"cards": {"04AB": {"owner": "Alice"}}}"#).unwrap();
        assert_eq!(ledger.cards["04AB"].email, "");
    }
}
