//! Pending-ledger durability and reconciliation.
//!
//! Writes made while offline must survive on disk exactly until the
//! backend confirms them, and never a moment less.

#![allow(clippy::unwrap_used)]

use tally_core::{Purchase, ShoppingCart};
use tally_integration_tests::TestContext;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_offline_writes_queue_durably() {
    let ctx = TestContext::new().await;
    ctx.seed_snapshot();
    assert!(!ctx.probe().await);

    // Load users so purchaser names can be resolved to emails.
    ctx.controller.get_users().await;

    assert!(
        ctx.controller
            .register_card_info("99FF", "bob@example.com", "Bob")
            .await
    );
    let cart = ShoppingCart::from_lines([Purchase::new("alice".into(), "Cola".into(), 2)]);
    assert!(ctx.controller.create_transactions(&cart).await);

    let raw = std::fs::read_to_string(ctx.ledger_path()).unwrap();
    let ledger: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(ledger["cards"]["99FF"]["owner"], "Bob");
    assert_eq!(ledger["transactions"][0]["email"], "alice@example.com");
    assert_eq!(ledger["transactions"][0]["amount"], 2);
}

#[tokio::test]
async fn test_offline_registration_is_immediately_visible() {
    let ctx = TestContext::new().await;

    assert!(
        ctx.controller
            .register_card_info("99FF", "bob@example.com", "Bob")
            .await
    );

    let card = ctx.controller.get_card_info("99FF").await.unwrap();
    assert_eq!(card.owner_name, "Bob");
}

#[tokio::test]
async fn test_reconcile_removes_only_confirmed_entries() {
    let ctx = TestContext::new().await;
    ctx.seed_snapshot();
    ctx.controller.get_users().await;

    let cart = ShoppingCart::from_lines([Purchase::new("alice".into(), "Cola".into(), 1)]);
    assert!(ctx.controller.create_transactions(&cart).await);
    assert!(
        ctx.controller
            .register_card_info("99FF", "bob@example.com", "Bob")
            .await
    );

    // Backend refuses the transaction batch but accepts the card.
    ctx.mount_probe().await;
    ctx.mount_auth(200).await;
    Mock::given(method("POST"))
        .and(path("/transactions/create"))
        .respond_with(ResponseTemplate::new(500))
        .mount(ctx.server())
        .await;
    Mock::given(method("POST"))
        .and(path("/identification/add-card-mapping"))
        .respond_with(ResponseTemplate::new(200))
        .mount(ctx.server())
        .await;

    assert!(ctx.probe().await);
    ctx.controller.reconcile_once().await;

    let raw = std::fs::read_to_string(ctx.ledger_path()).unwrap();
    let ledger: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(
        ledger["transactions"].as_array().unwrap().len(),
        1,
        "unconfirmed transactions stay queued"
    );
    assert!(
        ledger["cards"].as_object().unwrap().is_empty(),
        "confirmed card registration is removed"
    );
}

#[tokio::test]
async fn test_reconcile_retries_on_next_cycle() {
    let ctx = TestContext::new().await;
    ctx.seed_snapshot();
    ctx.controller.get_users().await;

    let cart = ShoppingCart::from_lines([Purchase::new("alice".into(), "Cola".into(), 1)]);
    assert!(ctx.controller.create_transactions(&cart).await);

    ctx.mount_probe().await;
    ctx.mount_auth(200).await;
    assert!(ctx.probe().await);

    // First cycle: backend refuses, entry stays.
    ctx.controller.reconcile_once().await;

    // Second cycle: backend accepts, entry drains.
    ctx.mount_accepting_writes().await;
    ctx.controller.reconcile_once().await;

    let raw = std::fs::read_to_string(ctx.ledger_path()).unwrap();
    let ledger: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert!(ledger["transactions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_corrupt_ledger_is_never_clobbered() {
    let ctx = TestContext::new().await;
    std::fs::write(ctx.ledger_path(), "{definitely not json").unwrap();

    // Offline writes fail loudly instead of overwriting queued data.
    assert!(
        !ctx.controller
            .register_card_info("99FF", "bob@example.com", "Bob")
            .await
    );

    // Reconciliation skips the drain and leaves the file alone.
    ctx.mount_probe().await;
    ctx.mount_auth(200).await;
    ctx.mount_accepting_writes().await;
    ctx.probe().await;
    ctx.controller.reconcile_once().await;

    assert_eq!(
        std::fs::read_to_string(ctx.ledger_path()).unwrap(),
        "{definitely not json"
    );
}
