//! NFC card mapping type.

use serde::{Deserialize, Serialize};

use super::email::Email;

/// The owner mapping of one NFC card.
///
/// Created on the first successful lookup or registration and cached by
/// `card_id` for the remainder of the process run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardInfo {
    /// Card UID as reported by the reader.
    pub card_id: String,
    /// Display name of the owner.
    pub owner_name: String,
    /// Email address of the owner.
    pub owner_email: Email,
}

impl CardInfo {
    /// Create a new card mapping.
    #[must_use]
    pub const fn new(card_id: String, owner_name: String, owner_email: Email) -> Self {
        Self {
            card_id,
            owner_name,
            owner_email,
        }
    }
}
