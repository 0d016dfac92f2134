//! Backend endpoint URLs.
//!
//! Paths are fixed relative to the configured base URL; only the base is
//! configuration.

use url::Url;

/// Resolver for the backend's HTTP endpoints.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    /// Create an endpoint resolver for the given base URL.
    #[must_use]
    pub const fn new(base: Url) -> Self {
        Self { base }
    }

    /// Target for the lightweight reachability probe.
    #[must_use]
    pub fn probe(&self) -> Url {
        self.base.clone()
    }

    /// `POST` credentials here to open a session.
    #[must_use]
    pub fn authenticate(&self) -> Url {
        self.join("authenticate")
    }

    /// `GET` the full user list.
    #[must_use]
    pub fn users(&self) -> Url {
        self.join("users")
    }

    /// `GET` the category list.
    #[must_use]
    pub fn categories(&self) -> Url {
        self.join("categories")
    }

    /// `GET` the products of one category.
    #[must_use]
    pub fn products(&self, category: &str) -> Url {
        self.join(&format!("products/{category}"))
    }

    /// `GET` the full card-to-owner mapping list.
    #[must_use]
    pub fn cards(&self) -> Url {
        self.join("identification/cards")
    }

    /// `POST` a new card-to-user mapping.
    #[must_use]
    pub fn add_card_mapping(&self) -> Url {
        self.join("identification/add-card-mapping")
    }

    /// `POST` a batch of transactions.
    #[must_use]
    pub fn create_transactions(&self) -> Url {
        self.join("transactions/create")
    }

    /// `GET` transactions, filtered by a begin date in the body.
    #[must_use]
    pub fn all_transactions(&self) -> Url {
        self.join("transactions/all")
    }

    fn join(&self, path: &str) -> Url {
        // The base URL is validated at configuration time; joining a fixed
        // relative path cannot fail after that.
        self.base.join(path).unwrap_or_else(|_| self.base.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn endpoints() -> Endpoints {
        Endpoints::new("http://localhost:8181/".parse().unwrap())
    }

    #[test]
    fn test_paths() {
        let e = endpoints();
        assert_eq!(e.authenticate().path(), "/authenticate");
        assert_eq!(e.users().path(), "/users");
        assert_eq!(e.products("Drinks").path(), "/products/Drinks");
        assert_eq!(e.cards().path(), "/identification/cards");
        assert_eq!(
            e.add_card_mapping().path(),
            "/identification/add-card-mapping"
        );
        assert_eq!(e.create_transactions().path(), "/transactions/create");
        assert_eq!(e.all_transactions().path(), "/transactions/all");
        assert_eq!(e.probe().path(), "/");
    }
}
