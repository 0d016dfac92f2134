//! Integration tests for Tally.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p tally-integration-tests
//! ```
//!
//! Every test runs against a fresh [`wiremock`] backend and a fresh
//! temporary state directory, so tests are independent and need no
//! external services.
//!
//! # Test Categories
//!
//! - `routing` - online/offline call routing
//! - `ledger_replay` - pending-ledger durability and reconciliation
//! - `offline_lifecycle` - full offline-sale-to-reconciliation scenario

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tally_sync::{Credentials, DataController, SyncConfig};

/// One controller wired to a mock backend and a throwaway state
/// directory.
pub struct TestContext {
    server: MockServer,
    dir: tempfile::TempDir,
    pub controller: Arc<DataController>,
}

impl TestContext {
    /// Start a mock backend and build a controller against it. No probe
    /// has run yet, so the controller starts out routing offline.
    ///
    /// # Panics
    ///
    /// Panics when the mock backend or the temporary directory cannot be
    /// created.
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().expect("Failed to create temp dir");

        let config = SyncConfig {
            backend_url: server.uri().parse().expect("Mock server URI is valid"),
            credentials_path: dir.path().join("credentials.json"),
            state_dir: dir.path().to_path_buf(),
            // Background loops are driven manually in tests.
            probe_interval: Duration::from_secs(3600),
            reconcile_interval: Duration::from_secs(3600),
            startup_grace: Duration::ZERO,
            request_timeout: Duration::from_secs(1),
        };
        let credentials = Credentials {
            email: "terminal@example.com".to_string(),
            password: SecretString::from("hunter2".to_string()),
        };

        Self {
            server,
            dir,
            controller: Arc::new(DataController::new(&config, credentials)),
        }
    }

    /// The mock backend.
    #[must_use]
    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Take the backend down: wipe every mounted endpoint, answer
    /// probes with a server error, and run one probe so the controller
    /// notices.
    ///
    /// The mock server keeps its port, so this models a host that still
    /// accepts connections but can no longer serve anything.
    ///
    /// # Panics
    ///
    /// Panics when the probe still reports the backend as reachable.
    pub async fn kill_backend(&self) {
        self.server.reset().await;
        Mock::given(method("HEAD"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&self.server)
            .await;
        assert!(!self.controller.check_connectivity().await);
    }

    /// Run one reachability probe and return the fresh status.
    pub async fn probe(&self) -> bool {
        self.controller.check_connectivity().await
    }

    /// Path of the pending-ledger file.
    #[must_use]
    pub fn ledger_path(&self) -> PathBuf {
        self.dir.path().join("pending_ledger.json")
    }

    /// Path of the offline snapshot file.
    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.path().join("cached_data.json")
    }

    /// Answer reachability probes with 200 from now on.
    pub async fn mount_probe(&self) {
        Mock::given(method("HEAD"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(self.server())
            .await;
    }

    /// Answer the login endpoint with the given status.
    pub async fn mount_auth(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path("/authenticate"))
            .respond_with(ResponseTemplate::new(status))
            .mount(self.server())
            .await;
    }

    /// Serve a small fixed catalog: two users, one category, two
    /// products (one hidden), one registered card.
    pub async fn mount_catalog(&self) {
        let server = self.server();
        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "bob", "email": "bob@example.com"},
                {"name": "alice", "email": "alice@example.com"},
            ])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/categories"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!([{"name": "Drinks"}])),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/products/Drinks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "Cola", "price": 0.6, "shown": true},
                {"name": "Delisted", "price": 9.9, "shown": false},
            ])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/identification/cards"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"card_id": "04AB", "owner": {"name": "Alice", "email": "alice@example.com"}},
            ])))
            .mount(server)
            .await;
    }

    /// Accept every write endpoint with 200.
    pub async fn mount_accepting_writes(&self) {
        let server = self.server();
        Mock::given(method("POST"))
            .and(path("/transactions/create"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/identification/add-card-mapping"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
    }

    /// Seed the offline snapshot file as a previous run would have left
    /// it.
    ///
    /// # Panics
    ///
    /// Panics when the file cannot be written.
    pub fn seed_snapshot(&self) {
        std::fs::write(
            self.snapshot_path(),
            serde_json::json!({
                "users": {
                    "alice": {"email": "alice@example.com"},
                    "bob": {"email": "bob@example.com"},
                },
                "products": {
                    "Cola": {"price": 0.6, "shown": true, "category": "Drinks"},
                },
                "categories": ["Drinks"],
                "cards": {
                    "04AB": {"owner": "Alice", "email": "alice@example.com"},
                },
            })
            .to_string(),
        )
        .expect("Failed to seed snapshot");
    }
}
