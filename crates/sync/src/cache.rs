//! Shared in-memory cache.
//!
//! Both the remote gateway and the local fallback store populate this
//! cache, which lets either side answer from data the other fetched.
//! Entries live for the whole process run and never expire; the backend
//! catalog is assumed static during a session, so a populated section is
//! always served as-is.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;

use tally_core::{CardInfo, Email, Product, User};

/// Process-lifetime cache of catalog and identification data.
///
/// Each section has exactly one logical writer at a time; the per-section
/// locks exist so concurrent request handlers never observe an
/// interleaved read-modify-write.
#[derive(Debug, Default)]
pub struct DataCache {
    users: RwLock<Option<Vec<User>>>,
    categories: RwLock<Option<Vec<String>>>,
    products: RwLock<Option<BTreeMap<String, Vec<Product>>>>,
    cards: RwLock<HashMap<String, CardInfo>>,
    /// Set once the full card list has been fetched, so a lookup miss can
    /// be distinguished from a not-yet-populated cache.
    cards_complete: AtomicBool,
}

impl DataCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// The cached user list, if populated.
    pub async fn users(&self) -> Option<Vec<User>> {
        self.users.read().await.clone()
    }

    /// Replace the user list wholesale.
    pub async fn set_users(&self, users: Vec<User>) {
        *self.users.write().await = Some(users);
    }

    /// Resolve a user name to its email via the cached user list.
    pub async fn email_for(&self, name: &str) -> Option<Email> {
        self.users
            .read()
            .await
            .as_ref()?
            .iter()
            .find(|u| u.name == name)
            .map(|u| u.email.clone())
    }

    // =========================================================================
    // Categories
    // =========================================================================

    /// The cached category list, if populated.
    pub async fn categories(&self) -> Option<Vec<String>> {
        self.categories.read().await.clone()
    }

    /// Replace the category list wholesale.
    pub async fn set_categories(&self, categories: Vec<String>) {
        *self.categories.write().await = Some(categories);
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// The cached category-to-products mapping, if populated.
    pub async fn products(&self) -> Option<BTreeMap<String, Vec<Product>>> {
        self.products.read().await.clone()
    }

    /// Replace the product mapping wholesale.
    pub async fn set_products(&self, products: BTreeMap<String, Vec<Product>>) {
        *self.products.write().await = Some(products);
    }

    // =========================================================================
    // Cards
    // =========================================================================

    /// Look up a single cached card.
    pub async fn card(&self, card_id: &str) -> Option<CardInfo> {
        self.cards.read().await.get(card_id).cloned()
    }

    /// Insert one card mapping (registration or single lookup result).
    pub async fn insert_card(&self, card: CardInfo) {
        self.cards.write().await.insert(card.card_id.clone(), card);
    }

    /// Replace the card section with the full backend list.
    ///
    /// Cards inserted earlier in this run (e.g. offline registrations) are
    /// kept when the list does not mention them.
    pub async fn set_all_cards(&self, cards: Vec<CardInfo>) {
        let mut section = self.cards.write().await;
        for card in cards {
            section.insert(card.card_id.clone(), card);
        }
        self.cards_complete.store(true, Ordering::Release);
    }

    /// Whether the full card list has been fetched this run.
    #[must_use]
    pub fn cards_complete(&self) -> bool {
        self.cards_complete.load(Ordering::Acquire)
    }

    /// A clone of the whole card section.
    pub async fn cards_map(&self) -> HashMap<String, CardInfo> {
        self.cards.read().await.clone()
    }
}
