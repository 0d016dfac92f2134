//! The data controller.
//!
//! Single entry point for everything the terminal reads or writes. Every
//! call is routed by the last-known connectivity status: online calls go
//! to the backend gateway, offline calls to the local store. Consumers
//! never learn which storage answered.
//!
//! The controller also owns the background loops: the reachability probe
//! and the reconciliation cycle that replays the pending ledger and
//! refreshes the offline snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use tally_core::{CardInfo, Product, ShoppingCart, User};

use crate::backend::RemoteGateway;
use crate::cache::DataCache;
use crate::config::{Credentials, SyncConfig};
use crate::connectivity::ConnectivityMonitor;
use crate::endpoints::Endpoints;
use crate::session::{SessionError, SessionManager};
use crate::store::LocalStore;

/// Fatal startup failures.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The backend was reachable but refused the terminal's credentials.
    /// Unlike a transport failure this cannot be ridden out offline.
    #[error("Backend rejected the terminal credentials (status {0})")]
    AuthRejected(reqwest::StatusCode),
}

/// Observable lifecycle state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    /// [`DataController::start`] has not been called yet.
    Uninitialized = 0,
    /// Startup is running; no probe has completed.
    Probing = 1,
    /// Backend considered reachable as of the last probe.
    Online = 2,
    /// Backend considered unreachable as of the last probe.
    Offline = 3,
}

impl Mode {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Probing,
            2 => Self::Online,
            3 => Self::Offline,
            _ => Self::Uninitialized,
        }
    }
}

/// Routes reads and writes between the backend and the local store.
#[derive(Debug)]
pub struct DataController {
    cache: Arc<DataCache>,
    monitor: Arc<ConnectivityMonitor>,
    session: Arc<SessionManager>,
    gateway: RemoteGateway,
    store: LocalStore,
    mode: Arc<AtomicU8>,
    /// Whether the current session was opened with an accepted login.
    authenticated: AtomicBool,
    /// Woken on an offline-to-online transition to reconcile promptly.
    online_notify: Arc<Notify>,
    reconcile_interval: Duration,
    startup_grace: Duration,
}

impl DataController {
    /// Wire up the controller from configuration and credentials. No
    /// network or file access happens until [`Self::start`] or the first
    /// data call.
    #[must_use]
    pub fn new(config: &SyncConfig, credentials: Credentials) -> Self {
        let endpoints = Endpoints::new(config.backend_url.clone());
        let cache = Arc::new(DataCache::new());
        let monitor = Arc::new(ConnectivityMonitor::new(
            endpoints.probe(),
            config.probe_interval,
            config.request_timeout,
        ));
        let session = Arc::new(SessionManager::new(
            endpoints.clone(),
            credentials,
            config.request_timeout,
        ));
        let gateway = RemoteGateway::new(
            Arc::clone(&session),
            Arc::clone(&cache),
            endpoints,
        );
        let store = LocalStore::new(
            Arc::clone(&cache),
            config.snapshot_path(),
            config.ledger_path(),
        );

        Self {
            cache,
            monitor,
            session,
            gateway,
            store,
            mode: Arc::new(AtomicU8::new(Mode::Uninitialized as u8)),
            authenticated: AtomicBool::new(false),
            online_notify: Arc::new(Notify::new()),
            reconcile_interval: config.reconcile_interval,
            startup_grace: config.startup_grace,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn mode(&self) -> Mode {
        Mode::from_u8(self.mode.load(Ordering::Acquire))
    }

    /// Last-known connectivity, without blocking on a fresh probe.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.monitor.is_online()
    }

    /// Run one reachability probe immediately and return the fresh
    /// status. The periodic loop keeps running on its own schedule.
    pub async fn check_connectivity(&self) -> bool {
        self.monitor.check_now().await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Run the startup sequence and spawn the background loops.
    ///
    /// Waits out the grace period, completes the first probe, and when
    /// the backend is reachable opens the session. A transport failure
    /// anywhere degrades to offline readiness; the terminal starts
    /// selling either way.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError::AuthRejected`] when the backend answered
    /// the login with a non-2xx status. Wrong credentials will not fix
    /// themselves, so the caller should exit.
    #[instrument(skip(self))]
    pub async fn start(self: &Arc<Self>) -> Result<(), StartupError> {
        self.mode.store(Mode::Probing as u8, Ordering::Release);

        // Listener keeps the observable mode in step with connectivity
        // and wakes the reconciler the moment we come back online.
        let mode = Arc::clone(&self.mode);
        let notify = Arc::clone(&self.online_notify);
        self.monitor.add_listener(move |online| {
            let next = if online { Mode::Online } else { Mode::Offline };
            mode.store(next as u8, Ordering::Release);
            if online {
                notify.notify_one();
            }
        });

        // Give the network stack a moment after boot before judging
        // reachability; kiosk hardware routinely starts faster than its
        // Wi-Fi association.
        if !self.startup_grace.is_zero() {
            debug!(secs = self.startup_grace.as_secs(), "Startup grace period");
            tokio::time::sleep(self.startup_grace).await;
        }

        let online = self.monitor.check_now().await;
        if online {
            match self.session.authenticate().await {
                Ok(()) => {
                    info!("Started online");
                    self.authenticated.store(true, Ordering::Release);
                    self.mode.store(Mode::Online as u8, Ordering::Release);
                }
                Err(SessionError::Rejected(status)) => {
                    return Err(StartupError::AuthRejected(status));
                }
                Err(e) => {
                    warn!(error = %e, "Backend reachable but login did not complete, starting offline");
                    // Routing follows the monitor flag, so it must agree
                    // with the offline decision or writes would race an
                    // unauthenticated gateway. The next successful probe
                    // is then a transition that restores online mode.
                    self.monitor.mark_offline();
                    self.mode.store(Mode::Offline as u8, Ordering::Release);
                }
            }
        } else {
            info!("Backend unreachable, started offline");
            self.mode.store(Mode::Offline as u8, Ordering::Release);
        }

        self.spawn_loops();
        Ok(())
    }

    /// Spawn the probe loop and the reconciliation loop.
    fn spawn_loops(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let monitor = Arc::clone(&self.monitor);
        let probe_loop = tokio::spawn(async move { monitor.run().await });

        let controller = Arc::clone(self);
        let reconcile_loop = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tokio::time::sleep(controller.reconcile_interval) => {}
                    () = controller.online_notify.notified() => {
                        debug!("Connectivity regained, reconciling now");
                    }
                }
                controller.reconcile_once().await;
            }
        });

        vec![probe_loop, reconcile_loop]
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// All known users, sorted by name. Empty when no source has data.
    pub async fn get_users(&self) -> Vec<User> {
        if self.is_online() {
            self.gateway.get_users().await
        } else {
            self.store.get_users().await
        }
    }

    /// All known category names.
    pub async fn get_categories(&self) -> Vec<String> {
        if self.is_online() {
            self.gateway.get_categories().await
        } else {
            self.store.get_categories().await
        }
    }

    /// Visible products, grouped by category.
    pub async fn get_products(&self) -> BTreeMap<String, Vec<Product>> {
        if self.is_online() {
            self.gateway.get_products().await
        } else {
            self.store.get_products().await
        }
    }

    /// Resolve a card id to its owner, if known.
    pub async fn get_card_info(&self, card_id: &str) -> Option<CardInfo> {
        if self.is_online() {
            self.gateway.get_card_info(card_id).await
        } else {
            self.store.get_card_info(card_id).await
        }
    }

    /// Users who purchased recently, most recent first. Answered only
    /// while online; offline there is no transaction history to consult.
    pub async fn get_recent_users(&self, count: usize) -> Vec<User> {
        if !self.is_online() {
            return Vec::new();
        }
        // One day of history is plenty for a "recent purchasers" strip.
        let begin = chrono::Utc::now() - chrono::Duration::days(1);
        self.gateway.get_recent_users(begin, count).await
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Bind a card to a user.
    ///
    /// Online the backend is asked directly; offline the registration is
    /// queued durably and becomes visible to this process immediately.
    pub async fn register_card_info(&self, card_id: &str, email: &str, owner: &str) -> bool {
        if self.is_online() {
            self.gateway.register_card_info(card_id, email, owner).await
        } else {
            self.store.register_card_info(card_id, email, owner).await
        }
    }

    /// Commit a shopping cart. An empty cart always succeeds.
    pub async fn create_transactions(&self, cart: &ShoppingCart) -> bool {
        if self.is_online() {
            self.gateway.create_transactions(cart).await
        } else {
            self.store.create_transactions(cart).await
        }
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// One reconciliation cycle: refresh the offline snapshot from the
    /// cache, then (while online) replay the pending ledger against the
    /// backend.
    ///
    /// Ledger entries are removed only after the backend confirmed them;
    /// anything unconfirmed stays queued for the next cycle. An
    /// unreadable ledger aborts the drain without touching the file.
    #[instrument(skip(self))]
    pub async fn reconcile_once(&self) {
        self.store.update_file_from_cache().await;

        if !self.is_online() {
            // Nothing is lost; the ledger simply waits for connectivity.
            return;
        }

        // A session may never have been opened (offline start, or a login
        // that failed in transit). Without one the backend would refuse
        // the replay anyway, so stay offline until it completes.
        if !self.authenticated.load(Ordering::Acquire) {
            match self.session.authenticate().await {
                Ok(()) => self.authenticated.store(true, Ordering::Release),
                Err(e) => {
                    warn!(error = %e, "Reconnected but login did not complete, staying offline");
                    self.monitor.mark_offline();
                    self.mode.store(Mode::Offline as u8, Ordering::Release);
                    return;
                }
            }
        }

        let ledger_file = self.store.ledger_session().await;
        let mut ledger = match ledger_file.load() {
            Ok(ledger) => ledger,
            Err(e) => {
                error!(error = %e, "Pending ledger is unreadable, skipping replay");
                return;
            }
        };
        if ledger.is_empty() {
            return;
        }

        debug!(
            transactions = ledger.transactions.len(),
            cards = ledger.cards.len(),
            "Replaying pending ledger"
        );

        if !ledger.transactions.is_empty()
            && self.gateway.submit_transactions(&ledger.transactions).await
        {
            info!(
                count = ledger.transactions.len(),
                "Queued transactions accepted by the backend"
            );
            ledger.transactions.clear();
        }

        let card_ids: Vec<String> = ledger.cards.keys().cloned().collect();
        for card_id in card_ids {
            let Some(card) = ledger.cards.get(&card_id).cloned() else {
                continue;
            };
            if card.email.is_empty() {
                // Likely hand-edited state; keep it rather than guess.
                warn!(card_id, "Skipping queued card registration without an email");
                continue;
            }
            if self
                .gateway
                .register_card_info(&card_id, &card.email, &card.owner)
                .await
            {
                info!(card_id, "Queued card registration accepted by the backend");
                ledger.cards.remove(&card_id);
            }
        }

        // Persist regardless of partial success so confirmed entries are
        // never resent while pending ones stay queued.
        if let Err(e) = ledger_file.persist(&ledger) {
            error!(error = %e, "Failed to persist pending ledger after replay");
        }
    }

    /// The shared in-memory cache, mainly for inspection.
    #[must_use]
    pub fn cache(&self) -> &DataCache {
        &self.cache
    }
}
