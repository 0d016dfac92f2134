//! Tally Core - Shared domain types.
//!
//! This crate provides the value objects passed between the layers of the
//! Tally terminal:
//! - `sync` - The data-synchronization core (online/offline routing)
//! - `terminal` - The binary that wires everything together
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no file
//! access. Records are constructed through validated parsing functions that
//! fail with a typed error instead of panicking deep in unrelated code.
//!
//! # Modules
//!
//! - [`types`] - Users, products, cards, purchases and the shopping cart

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
