//! Shopping cart and purchase lines.

use core::fmt;

use serde::{Deserialize, Serialize};

/// One purchase line: some amount of one product for one purchaser.
///
/// Two purchases are "the same line" iff `(purchaser_name, product_name)`
/// match; amounts merge additively when lines are combined in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    /// Display name of the purchaser.
    pub purchaser_name: String,
    /// Name of the purchased product.
    pub product_name: String,
    /// Number of units.
    pub amount: u32,
}

impl Purchase {
    /// Create a new purchase line.
    #[must_use]
    pub const fn new(purchaser_name: String, product_name: String, amount: u32) -> Self {
        Self {
            purchaser_name,
            product_name,
            amount,
        }
    }

    fn same_line(&self, other: &Self) -> bool {
        self.purchaser_name == other.purchaser_name && self.product_name == other.product_name
    }
}

/// Callback invoked whenever the cart contents change.
pub type CartListener = Box<dyn Fn(&[Purchase]) + Send + Sync>;

/// An ordered collection of purchase lines.
///
/// Order is insertion order and carries no meaning. Invariants: no two
/// lines share `(purchaser_name, product_name)` and no line has an amount
/// of zero at rest.
///
/// Change listeners are a plain registration list of closures; they fire
/// after every mutation that changed the cart.
#[derive(Default)]
pub struct ShoppingCart {
    purchases: Vec<Purchase>,
    listeners: Vec<CartListener>,
}

impl ShoppingCart {
    /// Create an empty cart.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cart from existing lines, merging duplicates.
    #[must_use]
    pub fn from_lines(lines: impl IntoIterator<Item = Purchase>) -> Self {
        let mut cart = Self::new();
        for line in lines {
            cart.add(line);
        }
        cart
    }

    /// Add a purchase to the cart.
    ///
    /// If a line with the same `(purchaser_name, product_name)` already
    /// exists its amount is increased; otherwise the purchase is appended.
    /// Adding an amount of zero is a no-op.
    pub fn add(&mut self, purchase: Purchase) {
        if purchase.amount == 0 {
            return;
        }

        if let Some(existing) = self.purchases.iter_mut().find(|p| p.same_line(&purchase)) {
            existing.amount += purchase.amount;
        } else {
            self.purchases.push(purchase);
        }

        self.notify();
    }

    /// Remove (part of) a purchase from the cart.
    ///
    /// Subtracts the given amount from the matching line. The amount floors
    /// at zero and the line is deleted once it reaches zero; removing more
    /// than is present never goes negative.
    ///
    /// Returns `false` if no matching line exists.
    pub fn remove(&mut self, purchase: &Purchase) -> bool {
        let Some(index) = self.purchases.iter().position(|p| p.same_line(purchase)) else {
            return false;
        };

        let remaining = {
            let line = &mut self.purchases[index];
            line.amount = line.amount.saturating_sub(purchase.amount);
            line.amount
        };

        if remaining == 0 {
            self.purchases.remove(index);
        }

        self.notify();
        true
    }

    /// The current purchase lines, in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[Purchase] {
        &self.purchases
    }

    /// Whether the cart holds no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.purchases.is_empty()
    }

    /// Number of purchase lines (not units).
    #[must_use]
    pub fn len(&self) -> usize {
        self.purchases.len()
    }

    /// Drop all lines.
    pub fn clear(&mut self) {
        if !self.purchases.is_empty() {
            self.purchases.clear();
            self.notify();
        }
    }

    /// Register a change listener.
    ///
    /// Listeners fire after every mutation, with the cart's lines as
    /// argument. There is no deregistration; listeners live as long as the
    /// cart.
    pub fn add_listener(&mut self, listener: impl Fn(&[Purchase]) + Send + Sync + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn notify(&self) {
        for listener in &self.listeners {
            listener(&self.purchases);
        }
    }
}

impl fmt::Debug for ShoppingCart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShoppingCart")
            .field("purchases", &self.purchases)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
