//! Backend reachability monitoring.
//!
//! A dedicated loop probes the backend with a lightweight HEAD request and
//! keeps a boolean "can reach backend" flag. Subscribers are notified only
//! on a transition, never on every probe; routing decisions elsewhere read
//! the last-known flag without blocking on a fresh probe.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, instrument, warn};
use url::Url;

/// Callback invoked on every connection-status transition.
pub type ConnectionListener = Box<dyn Fn(bool) + Send + Sync>;

/// Maintains the last-known backend reachability status.
pub struct ConnectivityMonitor {
    client: reqwest::Client,
    probe_url: Url,
    interval: Duration,
    online: AtomicBool,
    probed: AtomicBool,
    probed_notify: Notify,
    listeners: Mutex<Vec<ConnectionListener>>,
}

impl ConnectivityMonitor {
    /// Create a monitor probing `probe_url` every `interval`.
    ///
    /// The initial status is offline until the first probe completes.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created. This should never
    /// happen under normal circumstances as we use standard TLS
    /// configuration.
    #[must_use]
    pub fn new(probe_url: Url, interval: Duration, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            probe_url,
            interval,
            online: AtomicBool::new(false),
            probed: AtomicBool::new(false),
            probed_notify: Notify::new(),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Non-blocking read of the last-known status.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Register a listener called with the new status on every transition.
    ///
    /// A listener is invoked exactly once per transition; unchanged probe
    /// results produce no call.
    pub fn add_listener(&self, listener: impl Fn(bool) + Send + Sync + 'static) {
        self.listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(Box::new(listener));
    }

    /// Wait until at least one probe has completed.
    pub async fn wait_for_first_probe(&self) {
        while !self.probed.load(Ordering::Acquire) {
            self.probed_notify.notified().await;
        }
    }

    /// Issue one reachability probe and apply edge-triggered notification.
    ///
    /// Returns the fresh status.
    #[instrument(skip(self), fields(url = %self.probe_url))]
    pub async fn check_now(&self) -> bool {
        let status = self.probe().await;
        let previous = self.online.swap(status, Ordering::AcqRel);

        if !self.probed.swap(true, Ordering::AcqRel) {
            self.probed_notify.notify_waiters();
        }

        if status != previous {
            self.notify_listeners(status);
        }

        status
    }

    /// Force the last-known status to offline until the next probe says
    /// otherwise.
    ///
    /// Used when the probe found the backend reachable but a session
    /// could not be established: for routing purposes that backend is as
    /// good as unreachable.
    pub fn mark_offline(&self) {
        let previous = self.online.swap(false, Ordering::AcqRel);
        if previous {
            self.notify_listeners(false);
        }
    }

    fn notify_listeners(&self, status: bool) {
        if status {
            debug!("Connected to the backend (again)");
        } else {
            warn!("Lost connection to the backend");
        }
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for listener in listeners.iter() {
            listener(status);
        }
    }

    /// The probe loop: probe, sleep, repeat.
    ///
    /// Never returns; run it on its own task.
    pub async fn run(&self) {
        loop {
            self.check_now().await;
            tokio::time::sleep(self.interval).await;
        }
    }

    /// One HEAD-equivalent request; true only on a non-error HTTP status.
    async fn probe(&self) -> bool {
        match self
            .client
            .head(self.probe_url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
        {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Reachability probe failed");
                false
            }
        }
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("probe_url", &self.probe_url.as_str())
            .field("online", &self.is_online())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn monitor(url: &str) -> ConnectivityMonitor {
        ConnectivityMonitor::new(
            url.parse().unwrap(),
            Duration::from_secs(10),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_probe_success_flips_online() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let monitor = monitor(&server.uri());
        assert!(!monitor.is_online());

        assert!(monitor.check_now().await);
        assert!(monitor.is_online());
    }

    #[tokio::test]
    async fn test_http_error_status_counts_as_offline() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let monitor = monitor(&server.uri());
        assert!(!monitor.check_now().await);
        assert!(!monitor.is_online());
    }

    #[tokio::test]
    async fn test_unreachable_host_counts_as_offline() {
        let monitor = monitor("http://127.0.0.1:1/");
        assert!(!monitor.check_now().await);
    }

    #[tokio::test]
    async fn test_listeners_fire_only_on_transition() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);

        let monitor = monitor(&server.uri());
        monitor.add_listener(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        // offline -> online: one notification
        monitor.check_now().await;
        // online -> online: none
        monitor.check_now().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // online -> offline: one more
        server.reset().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        monitor.check_now().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_mark_offline_overrides_last_probe() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);

        let monitor = monitor(&server.uri());
        monitor.add_listener(move |status| {
            if !status {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        monitor.check_now().await;
        assert!(monitor.is_online());

        monitor.mark_offline();
        assert!(!monitor.is_online());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Already offline, nothing to announce.
        monitor.mark_offline();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wait_for_first_probe() {
        let monitor = Arc::new(monitor("http://127.0.0.1:1/"));

        let waiter = Arc::clone(&monitor);
        let handle = tokio::spawn(async move {
            waiter.wait_for_first_probe().await;
        });

        monitor.check_now().await;
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
