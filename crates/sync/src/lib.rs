//! Tally Sync - the data-synchronization core of the terminal.
//!
//! The terminal must keep selling when the backend is unreachable and
//! reconcile locally recorded activity once connectivity returns. This
//! crate owns that problem:
//!
//! - [`connectivity`] - periodic reachability probe with edge-triggered
//!   listener notifications
//! - [`session`] - one authenticated HTTP session, transparently rebuilt
//!   and re-authenticated on connection loss
//! - [`backend`] - typed reads and writes against the backend, with
//!   single-fetch caching of catalog data
//! - [`cache`] - the shared in-memory cache both storages populate
//! - [`store`] - JSON-backed fallback reads plus the durable pending
//!   ledger for writes made while offline
//! - [`controller`] - the single entry point consumers use; hides the
//!   online/offline choice and runs the reconciliation loop
//!
//! UI screens, NFC hardware and navigation are external collaborators;
//! they consume only [`controller::DataController`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod cache;
pub mod config;
pub mod connectivity;
pub mod controller;
pub mod endpoints;
pub mod ledger;
pub mod session;
pub mod store;

pub use config::{Credentials, SyncConfig};
pub use controller::{DataController, Mode};
