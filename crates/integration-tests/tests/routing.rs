//! Online/offline routing through the data controller.
//!
//! Consumers call one API; these tests pin down which storage answers
//! under which connectivity, and that the switch is invisible to the
//! caller.

#![allow(clippy::unwrap_used)]

use tally_core::ShoppingCart;
use tally_integration_tests::TestContext;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_no_network_access_before_first_probe() {
    let ctx = TestContext::new().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(0)
        .mount(ctx.server())
        .await;

    // Connectivity is unknown, so the controller must stay local.
    assert!(ctx.controller.get_users().await.is_empty());
    assert!(ctx.controller.get_card_info("04AB").await.is_none());
}

#[tokio::test]
async fn test_online_reads_come_from_backend() {
    let ctx = TestContext::new().await;
    ctx.mount_probe().await;
    ctx.mount_catalog().await;
    assert!(ctx.probe().await);

    let users = ctx.controller.get_users().await;
    let names: Vec<&str> = users.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["alice", "bob"]);

    let products = ctx.controller.get_products().await;
    assert_eq!(products["Drinks"].len(), 1, "hidden products are dropped");
    assert_eq!(products["Drinks"][0].name, "Cola");

    let card = ctx.controller.get_card_info("04AB").await.unwrap();
    assert_eq!(card.owner_name, "Alice");
}

#[tokio::test]
async fn test_offline_reads_come_from_snapshot() {
    let ctx = TestContext::new().await;
    ctx.seed_snapshot();

    assert!(!ctx.probe().await, "no probe mock means unreachable");

    let users = ctx.controller.get_users().await;
    assert_eq!(users.len(), 2);

    let products = ctx.controller.get_products().await;
    assert_eq!(products["Drinks"][0].name, "Cola");

    assert_eq!(ctx.controller.get_categories().await, vec!["Drinks"]);

    let card = ctx.controller.get_card_info("04AB").await.unwrap();
    assert_eq!(card.owner_email.as_str(), "alice@example.com");
}

#[tokio::test]
async fn test_connectivity_loss_keeps_serving_from_cache() {
    let ctx = TestContext::new().await;
    ctx.mount_probe().await;
    ctx.mount_catalog().await;
    ctx.probe().await;

    // Populate the cache while online.
    assert_eq!(ctx.controller.get_users().await.len(), 2);

    ctx.kill_backend().await;
    assert!(!ctx.controller.is_online());

    // Same data, now answered locally.
    let users = ctx.controller.get_users().await;
    assert_eq!(users.len(), 2);
}

#[tokio::test]
async fn test_empty_cart_succeeds_in_either_mode() {
    let ctx = TestContext::new().await;
    assert!(ctx.controller.create_transactions(&ShoppingCart::new()).await);

    ctx.mount_probe().await;
    ctx.probe().await;
    assert!(ctx.controller.create_transactions(&ShoppingCart::new()).await);
}

#[tokio::test]
async fn test_recent_users_only_answered_online() {
    let ctx = TestContext::new().await;
    ctx.seed_snapshot();

    // Offline: no history to consult.
    assert!(ctx.controller.get_recent_users(3).await.is_empty());

    ctx.mount_probe().await;
    ctx.mount_catalog().await;
    Mock::given(method("POST"))
        .and(path("/transactions/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"email": "bob@example.com", "product_name": "Cola", "amount": 1},
            {"email": "alice@example.com", "product_name": "Cola", "amount": 2},
        ])))
        .mount(ctx.server())
        .await;
    ctx.probe().await;
    ctx.controller.get_users().await;

    let recent = ctx.controller.get_recent_users(3).await;
    let names: Vec<&str> = recent.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["alice", "bob"], "most recent purchaser first");
}
