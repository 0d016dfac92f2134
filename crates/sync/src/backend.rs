//! Online gateway to the backend's REST API.
//!
//! Every read populates the in-memory cache on success so the offline
//! path has data to fall back on. Failures are absorbed: reads answer
//! with empty collections or `None`, writes answer `false`, and the
//! caller decides whether to queue the write locally.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};

use tally_core::{CardInfo, Email, Product, ShoppingCart, User};

use crate::cache::DataCache;
use crate::endpoints::Endpoints;
use crate::ledger::LedgerTransaction;
use crate::session::SessionManager;

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct WireUser {
    name: String,
    email: String,
}

#[derive(Debug, Deserialize)]
struct WireCategory {
    name: String,
}

#[derive(Debug, Deserialize)]
struct WireProduct {
    name: String,
    price: f64,
    shown: bool,
}

#[derive(Debug, Deserialize)]
struct WireCard {
    card_id: String,
    owner: WireUser,
}

#[derive(Debug, Deserialize)]
struct WireTransaction {
    email: String,
}

// =============================================================================
// Gateway
// =============================================================================

/// Talks to the backend over the authenticated session and keeps the
/// in-memory cache fresh as a side effect of every successful read.
#[derive(Debug)]
pub struct RemoteGateway {
    session: Arc<SessionManager>,
    cache: Arc<DataCache>,
    endpoints: Endpoints,
}

impl RemoteGateway {
    #[must_use]
    pub fn new(session: Arc<SessionManager>, cache: Arc<DataCache>, endpoints: Endpoints) -> Self {
        Self {
            session,
            cache,
            endpoints,
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The user list, sorted by name, fetched at most once per run.
    /// Empty on any failure.
    #[instrument(skip(self))]
    pub async fn get_users(&self) -> Vec<User> {
        if let Some(users) = self.cache.users().await {
            debug!("Using cached user data");
            return users;
        }

        let Some(wire) = self.get_json::<Vec<WireUser>>(self.endpoints.users()).await else {
            return Vec::new();
        };

        let mut users: Vec<User> = wire
            .into_iter()
            .filter_map(|w| match Email::parse(&w.email) {
                Ok(email) => Some(User::new(w.name, email)),
                Err(e) => {
                    warn!(user = %w.name, error = %e, "Skipping user with bad email");
                    None
                }
            })
            .collect();
        users.sort();

        debug!(count = users.len(), "Fetched user data");
        self.cache.set_users(users.clone()).await;
        users
    }

    /// The category names, fetched at most once per run. Empty on any
    /// failure.
    #[instrument(skip(self))]
    pub async fn get_categories(&self) -> Vec<String> {
        if let Some(categories) = self.cache.categories().await {
            debug!("Using cached category data");
            return categories;
        }

        let Some(wire) = self
            .get_json::<Vec<WireCategory>>(self.endpoints.categories())
            .await
        else {
            return Vec::new();
        };

        let categories: Vec<String> = wire.into_iter().map(|c| c.name).collect();
        debug!(count = categories.len(), "Fetched category data");
        self.cache.set_categories(categories.clone()).await;
        categories
    }

    /// Products for every category, keeping only the ones marked
    /// visible; fetched at most once per run. Categories are a
    /// dependency and are fetched first when not already cached. Empty
    /// on any failure, including a category list failure.
    #[instrument(skip(self))]
    pub async fn get_products(&self) -> BTreeMap<String, Vec<Product>> {
        if let Some(products) = self.cache.products().await {
            debug!("Using cached product data");
            return products;
        }

        let categories = self.get_categories().await;
        if categories.is_empty() {
            return BTreeMap::new();
        }

        let mut products: BTreeMap<String, Vec<Product>> = BTreeMap::new();
        for category in categories {
            let Some(wire) = self
                .get_json::<Vec<WireProduct>>(self.endpoints.products(&category))
                .await
            else {
                // One unreadable category poisons the whole answer;
                // partial catalogs would look like delisted products.
                return BTreeMap::new();
            };

            let items: Vec<Product> = wire
                .into_iter()
                .filter(|w| w.shown)
                .filter_map(|w| {
                    let price = Decimal::try_from(w.price).ok()?;
                    match Product::new(w.name.clone(), price, category.clone(), true) {
                        Ok(product) => Some(product),
                        Err(e) => {
                            warn!(product = %w.name, error = %e, "Skipping invalid product");
                            None
                        }
                    }
                })
                .collect();
            products.insert(category, items);
        }

        debug!(
            count = products.values().map(Vec::len).sum::<usize>(),
            "Fetched product data"
        );
        self.cache.set_products(products.clone()).await;
        products
    }

    /// Look up a card mapping.
    ///
    /// On the first cache miss the full mapping table is fetched and
    /// merged into the cache; afterwards a miss is answered from memory
    /// without another network call.
    #[instrument(skip(self))]
    pub async fn get_card_info(&self, card_id: &str) -> Option<CardInfo> {
        if let Some(card) = self.cache.card(card_id).await {
            return Some(card);
        }
        if self.cache.cards_complete() {
            return None;
        }

        let wire = self.get_json::<Vec<WireCard>>(self.endpoints.cards()).await?;
        let cards: Vec<CardInfo> = wire
            .into_iter()
            .filter_map(|w| match Email::parse(&w.owner.email) {
                Ok(email) => Some(CardInfo::new(w.card_id, w.owner.name, email)),
                Err(e) => {
                    warn!(card_id = %w.card_id, error = %e, "Skipping card with bad email");
                    None
                }
            })
            .collect();

        debug!(count = cards.len(), "Fetched card mapping table");
        self.cache.set_all_cards(cards).await;
        self.cache.card(card_id).await
    }

    /// Users who appear in transactions created since `begin`, most
    /// recent purchaser first, capped at `count` unique users. Only users
    /// present in the cached user list are returned.
    #[instrument(skip(self))]
    pub async fn get_recent_users(&self, begin: DateTime<Utc>, count: usize) -> Vec<User> {
        let body = json!({
            "begin_date": begin.format("%Y/%m/%d %H:%M:%S").to_string(),
        });
        let Some(response) = self
            .session
            .post(self.endpoints.all_transactions(), &body)
            .await
        else {
            return Vec::new();
        };
        if !response.status().is_success() {
            warn!(status = %response.status(), "Transaction history request rejected");
            return Vec::new();
        }
        let Ok(wire) = response.json::<Vec<WireTransaction>>().await else {
            warn!("Transaction history response is not valid JSON");
            return Vec::new();
        };

        let Some(users) = self.cache.users().await else {
            return Vec::new();
        };

        let mut recent: Vec<User> = Vec::new();
        // Newest transactions last on the wire; walk backwards so the
        // most recent purchaser comes first.
        for transaction in wire.iter().rev() {
            if recent.len() >= count {
                break;
            }
            let Some(user) = users.iter().find(|u| u.email.as_str() == transaction.email)
            else {
                continue;
            };
            if !recent.contains(user) {
                recent.push(user.clone());
            }
        }
        recent
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Register a card mapping with the backend.
    ///
    /// Rejects empty ids or emails with `false` before any network call.
    /// On success the mapping is also inserted into the cache.
    #[instrument(skip(self))]
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

        let body = json!({
            "card_id": card_id,
            "email": email,
        });
        let Some(response) = self
            .session
            .post(self.endpoints.add_card_mapping(), &body)
            .await
        else {
            return false;
        };
        if !response.status().is_success() {
            warn!(status = %response.status(), card_id, "Card registration rejected");
            return false;
        }

        self.cache
            .insert_card(CardInfo::new(
                card_id.to_owned(),
                owner.to_owned(),
                parsed_email,
            ))
            .await;
        debug!(card_id, "Registered card mapping");
        true
    }

    /// Submit a cart's purchase lines as one transaction batch.
    ///
    /// An empty cart is a vacuous success with no network call.
    /// Purchaser names are resolved to emails through the cached user
    /// list; a cart with an unknown purchaser is rejected whole.
    #[instrument(skip_all, fields(lines = cart.len()))]
    pub async fn create_transactions(&self, cart: &ShoppingCart) -> bool {
        if cart.is_empty() {
            return true;
        }

        let mut lines = Vec::with_capacity(cart.len());
        for purchase in cart.lines() {
            let Some(email) = self.cache.email_for(&purchase.purchaser_name).await else {
                warn!(
                    purchaser = %purchase.purchaser_name,
                    "Cannot submit transaction for unknown purchaser"
                );
                return false;
            };
            lines.push(LedgerTransaction {
                email: email.into_inner(),
                product_name: purchase.product_name.clone(),
                amount: purchase.amount,
            });
        }

        self.submit_transactions(&lines).await
    }

    /// Submit already-resolved transaction lines. Shared by the online
    /// write path and the reconciliation drain.
    pub async fn submit_transactions(&self, lines: &[LedgerTransaction]) -> bool {
        if lines.is_empty() {
            return true;
        }

        let body = json!({ "products": lines });
        let Some(response) = self
            .session
            .post(self.endpoints.create_transactions(), &body)
            .await
        else {
            return false;
        };
        if !response.status().is_success() {
            warn!(status = %response.status(), "Transaction batch rejected");
            return false;
        }

        debug!(count = lines.len(), "Submitted transaction batch");
        true
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    /// GET a JSON body, treating transport failures, non-2xx statuses and
    /// malformed bodies uniformly as `None`.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: url::Url) -> Option<T> {
        let response = self.session.get(url.clone()).await?;
        if !response.status().is_success() {
            warn!(status = %response.status(), url = %url, "Request rejected");
            return None;
        }
        match response.json::<T>().await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, url = %url, "Response body is not valid JSON");
                None
            }
        }
    }
}
