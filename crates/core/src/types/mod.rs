//! Domain types for the Tally terminal.
//!
//! Everything here is immutable-ish record data; the one exception is
//! [`ShoppingCart`], which mutates its purchase lines in place and notifies
//! registered change listeners.

pub mod card;
pub mod cart;
pub mod email;
pub mod product;
pub mod user;

pub use card::CardInfo;
pub use cart::{Purchase, ShoppingCart};
pub use email::{Email, EmailError};
pub use product::{Category, Product, ProductError};
pub use user::User;
