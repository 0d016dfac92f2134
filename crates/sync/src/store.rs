//! Local fallback store.
//!
//! Serves catalog and identification reads from a JSON snapshot file when
//! the backend is unreachable, and durably records writes in the pending
//! ledger for later replay. Both files default to empty structures on
//! first run; an unparseable file is logged and treated as empty but
//! never deleted or overwritten automatically.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, warn};

use tally_core::{CardInfo, Email, Product, ShoppingCart, User};

use crate::cache::DataCache;
use crate::ledger::{LedgerCard, LedgerError, LedgerTransaction, PendingLedger, write_json_atomic};

// =============================================================================
// Snapshot file layout
// =============================================================================

/// On-disk layout of the read-cache snapshot file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct CacheSnapshot {
    /// User name -> email record.
    #[serde(default)]
    pub users: BTreeMap<String, SnapshotUser>,
    /// Product name -> product record.
    #[serde(default)]
    pub products: BTreeMap<String, SnapshotProduct>,
    /// Category names.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Card id -> owner record.
    #[serde(default)]
    pub cards: BTreeMap<String, SnapshotCard>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SnapshotUser {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SnapshotProduct {
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub shown: bool,
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SnapshotCard {
    pub owner: String,
    pub email: String,
}

// =============================================================================
// Local store
// =============================================================================

/// JSON-backed fallback for reads plus the durable pending-write ledger.
#[derive(Debug)]
pub struct LocalStore {
    cache: Arc<DataCache>,
    snapshot_path: PathBuf,
    ledger_path: PathBuf,
    /// Parsed image of the snapshot file; loaded at most once per run.
    snapshot: Mutex<Option<CacheSnapshot>>,
    /// Serializes every load-modify-persist cycle on the ledger file.
    ledger_lock: Mutex<()>,
}

impl LocalStore {
    /// Create a store over the given cache and state files. No file is
    /// touched until the first read or write.
    #[must_use]
    pub fn new(cache: Arc<DataCache>, snapshot_path: PathBuf, ledger_path: PathBuf) -> Self {
        Self {
            cache,
            snapshot_path,
            ledger_path,
            snapshot: Mutex::new(None),
            ledger_lock: Mutex::new(()),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Users from cache, falling back to the snapshot file. Empty when
    /// neither has data.
    pub async fn get_users(&self) -> Vec<User> {
        if let Some(users) = self.cache.users().await {
            debug!("Using cached user data");
            return users;
        }

        let snapshot = self.load_snapshot().await;
        let mut users: Vec<User> = snapshot
            .users
            .iter()
            .filter_map(|(name, record)| match Email::parse(&record.email) {
                Ok(email) => Some(User::new(name.clone(), email)),
                Err(e) => {
                    warn!(user = %name, error = %e, "Skipping snapshot user with bad email");
                    None
                }
            })
            .collect();
        users.sort();

        if users.is_empty() {
            return users;
        }

        debug!(count = users.len(), "Loaded user data from offline snapshot");
        self.cache.set_users(users.clone()).await;
        users
    }

    /// Categories from cache, falling back to the snapshot file.
    pub async fn get_categories(&self) -> Vec<String> {
        if let Some(categories) = self.cache.categories().await {
            debug!("Using cached category data");
            return categories;
        }

        let snapshot = self.load_snapshot().await;
        let categories = snapshot.categories.clone();

        if categories.is_empty() {
            return categories;
        }

        debug!(
            count = categories.len(),
            "Loaded category data from offline snapshot"
        );
        self.cache.set_categories(categories.clone()).await;
        categories
    }

    /// Category-to-products mapping from cache, falling back to the
    /// snapshot file. Hidden products are filtered out.
    pub async fn get_products(&self) -> BTreeMap<String, Vec<Product>> {
        if let Some(products) = self.cache.products().await {
            debug!("Using cached product data");
            return products;
        }

        let snapshot = self.load_snapshot().await;
        let mut products: BTreeMap<String, Vec<Product>> = BTreeMap::new();
        for (name, record) in &snapshot.products {
            if !record.shown {
                continue;
            }
            match Product::new(name.clone(), record.price, record.category.clone(), true) {
                Ok(product) => products
                    .entry(record.category.clone())
                    .or_default()
                    .push(product),
                Err(e) => warn!(product = %name, error = %e, "Skipping invalid snapshot product"),
            }
        }

        if products.is_empty() {
            return products;
        }

        debug!(
            count = products.values().map(Vec::len).sum::<usize>(),
            "Loaded product data from offline snapshot"
        );
        self.cache.set_products(products.clone()).await;
        products
    }

    /// Card lookup from cache, falling back to the snapshot file.
    pub async fn get_card_info(&self, card_id: &str) -> Option<CardInfo> {
        if let Some(card) = self.cache.card(card_id).await {
            return Some(card);
        }

        let snapshot = self.load_snapshot().await;
        let record = snapshot.cards.get(card_id)?;

        let email = match Email::parse(&record.email) {
            Ok(email) => email,
            Err(e) => {
                warn!(card_id, error = %e, "Snapshot card has bad email");
                return None;
            }
        };

        let card = CardInfo::new(card_id.to_owned(), record.owner.clone(), email);
        self.cache.insert_card(card.clone()).await;
        Some(card)
    }

    // =========================================================================
    // Writes (queued in the pending ledger)
    // =========================================================================

    /// Queue a card registration for later replay.
    ///
    /// Rejects empty ids or emails with `false`. On success the mapping is
    /// also inserted into the in-memory card cache, so same-process
    /// readers see it immediately even though the backend has not.
    pub async fn register_card_info(&self, card_id: &str, email: &str, owner: &str) -> bool {
        if card_id.is_empty() || email.is_empty() {
            warn!("Rejecting card registration with empty id or email");
            return false;
        }

        let parsed_email = match Email::parse(email) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(card_id, error = %e, "Rejecting card registration with invalid email");
                return false;
            }
        };

        let session = self.ledger_session().await;
        let mut ledger = match session.load() {
            Ok(ledger) => ledger,
            Err(e) => {
                error!(error = %e, "Cannot queue card registration, pending ledger is unreadable");
                return false;
            }
        };

        ledger.cards.insert(
            card_id.to_owned(),
            LedgerCard {
                email: email.to_owned(),
                owner: owner.to_owned(),
            },
        );

        if let Err(e) = session.persist(&ledger) {
            error!(error = %e, "Failed to persist pending ledger");
            return false;
        }

        self.cache
            .insert_card(CardInfo::new(
                card_id.to_owned(),
                owner.to_owned(),
                parsed_email,
            ))
            .await;

        debug!(card_id, "Queued card registration for replay");
        true
    }

    /// Queue a cart's purchase lines for later replay.
    ///
    /// An empty cart is a vacuous success with no file access. Purchaser
    /// names are resolved to emails through the cached user list; a cart
    /// containing an unknown purchaser is rejected whole rather than
    /// queued half-translated.
    pub async fn create_transactions(&self, cart: &ShoppingCart) -> bool {
        if cart.is_empty() {
            return true;
        }

        let mut lines = Vec::with_capacity(cart.len());
        for purchase in cart.lines() {
            let Some(email) = self.cache.email_for(&purchase.purchaser_name).await else {
                error!(
                    purchaser = %purchase.purchaser_name,
                    "Cannot queue transaction for unknown purchaser"
                );
                return false;
            };
            lines.push(LedgerTransaction {
                email: email.into_inner(),
                product_name: purchase.product_name.clone(),
                amount: purchase.amount,
            });
        }

        let session = self.ledger_session().await;
        let mut ledger = match session.load() {
            Ok(ledger) => ledger,
            Err(e) => {
                error!(error = %e, "Cannot queue transactions, pending ledger is unreadable");
                return false;
            }
        };

        let count = lines.len();
        ledger.transactions.extend(lines);

        if let Err(e) = session.persist(&ledger) {
            error!(error = %e, "Failed to persist pending ledger");
            return false;
        }

        debug!(count, "Queued transactions for replay");
        true
    }

    // =========================================================================
    // Snapshot maintenance
    // =========================================================================

    /// Rewrite the snapshot file from the current in-memory cache, so a
    /// cold start after a crash still has reasonably fresh catalog data.
    pub async fn update_file_from_cache(&self) {
        let mut snapshot = CacheSnapshot::default();

        if let Some(users) = self.cache.users().await {
            for user in users {
                snapshot.users.insert(
                    user.name,
                    SnapshotUser {
                        email: user.email.into_inner(),
                    },
                );
            }
        }

        if let Some(products) = self.cache.products().await {
            for (category, items) in products {
                snapshot.categories.push(category);
                for product in items {
                    snapshot.products.insert(
                        product.name,
                        SnapshotProduct {
                            price: product.price,
                            shown: product.visible,
                            category: product.category,
                        },
                    );
                }
            }
        } else if let Some(categories) = self.cache.categories().await {
            snapshot.categories = categories;
        }

        for (card_id, card) in self.cache.cards_map().await {
            snapshot.cards.insert(
                card_id,
                SnapshotCard {
                    owner: card.owner_name,
                    email: card.owner_email.into_inner(),
                },
            );
        }

        // A never-populated cache must not wipe out a snapshot from a
        // previous run.
        if snapshot.users.is_empty() && snapshot.products.is_empty() && snapshot.cards.is_empty() {
            debug!("Cache is empty, leaving existing snapshot in place");
            return;
        }

        if let Err(e) = write_json_atomic(&self.snapshot_path, &snapshot) {
            error!(error = %e, "Failed to persist offline snapshot");
        } else {
            debug!(path = %self.snapshot_path.display(), "Updated offline snapshot from cache");
        }
    }

    /// Parse the snapshot file, once per run. A missing file is created
    /// empty; a corrupt file is logged and treated as empty (and left in
    /// place).
    async fn load_snapshot(&self) -> CacheSnapshot {
        let mut slot = self.snapshot.lock().await;
        if let Some(snapshot) = slot.as_ref() {
            return snapshot.clone();
        }

        let snapshot = if self.snapshot_path.exists() {
            match std::fs::read_to_string(&self.snapshot_path)
                .map_err(LedgerError::from)
                .and_then(|raw| Ok(serde_json::from_str::<CacheSnapshot>(&raw)?))
            {
                Ok(snapshot) => {
                    debug!("Loaded offline snapshot file");
                    snapshot
                }
                Err(e) => {
                    error!(error = %e, "Offline snapshot is unreadable, serving empty sections");
                    CacheSnapshot::default()
                }
            }
        } else {
            let empty = CacheSnapshot::default();
            if let Err(e) = write_json_atomic(&self.snapshot_path, &empty) {
                error!(error = %e, "Failed to create offline snapshot file");
            }
            empty
        };

        *slot = Some(snapshot.clone());
        snapshot
    }

    /// Exclusive access to the ledger file for a load-modify-persist
    /// cycle. Held across the whole reconciliation drain so offline
    /// writes cannot interleave.
    pub(crate) async fn ledger_session(&self) -> LedgerFileSession<'_> {
        LedgerFileSession {
            _guard: self.ledger_lock.lock().await,
            path: &self.ledger_path,
        }
    }
}

/// Exclusive handle on the ledger file.
pub(crate) struct LedgerFileSession<'a> {
    _guard: MutexGuard<'a, ()>,
    path: &'a Path,
}

impl LedgerFileSession<'_> {
    pub fn load(&self) -> Result<PendingLedger, LedgerError> {
        PendingLedger::load(self.path)
    }

    pub fn persist(&self, ledger: &PendingLedger) -> Result<(), LedgerError> {
        ledger.persist(self.path)
    }
}
