//! Integration tests for search, cart and delivery operations.
//!
//! Run with: cargo test -p willys-integration-tests --test shopping

#![allow(clippy::unwrap_used)]

use std::sync::atomic::Ordering;

use axum::http::Method;
use chrono::{Days, Local};
use rust_decimal::Decimal;
use willys_client::ErrorKind;
use willys_core::{DeliveryAddress, Product, SearchPreferences, SortMode, TimeSlot};
use willys_integration_tests::{DELIVERABLE_POSTAL_CODE, FakeWillys};

const MILK: &str = "101233933_ST";
const BANANAS: &str = "101205823_KG";

fn codes(products: &[Product]) -> Vec<&str> {
    products.iter().map(|p| p.code.as_str()).collect()
}

fn address() -> DeliveryAddress {
    DeliveryAddress {
        first_name: "Anna".to_string(),
        last_name: "Svensson".to_string(),
        address: "Drottninggatan 1".to_string(),
        postal_code: "111 51".to_string(),
        city: "Stockholm".to_string(),
        door_code: Some("1234".to_string()),
        message_to_driver: None,
    }
}

fn first_available(slots: &[TimeSlot]) -> &TimeSlot {
    slots.iter().find(|s| s.available).unwrap()
}

// ============================================================================
// Search Tests
// ============================================================================

#[tokio::test]
async fn test_search_keeps_store_order_without_preferences() {
    let fake = FakeWillys::start().await;
    let client = fake.client();

    let products = client.search_products("mjölk", 0, 30, None).await.unwrap();

    assert_eq!(
        codes(&products),
        vec!["100000001_ST", "100000002_ST", "100000003_ST", MILK]
    );
    let search = fake.state.requests_to("/search");
    assert_eq!(search[0].uri, "/search?q=mj%C3%B6lk&page=0&size=30");
}

#[tokio::test]
async fn test_search_sorts_cheapest_first() {
    let fake = FakeWillys::start().await;
    let preferences = SearchPreferences {
        sort_by: Some(SortMode::Cheapest),
        ..SearchPreferences::default()
    };

    let products = fake
        .client()
        .search_products("mjölk", 0, 30, Some(&preferences))
        .await
        .unwrap();

    // An empty compare price ranks as zero.
    assert_eq!(
        codes(&products),
        vec!["100000003_ST", MILK, "100000001_ST", "100000002_ST"]
    );
}

#[tokio::test]
async fn test_search_best_value_with_filters() {
    let fake = FakeWillys::start().await;
    let client = fake.client();

    let best_value = SearchPreferences {
        sort_by: Some(SortMode::BestValue),
        ..SearchPreferences::default()
    };
    let products = client
        .search_products("mjölk", 0, 30, Some(&best_value))
        .await
        .unwrap();
    assert_eq!(
        codes(&products),
        vec!["100000002_ST", MILK, "100000001_ST", "100000003_ST"]
    );

    let organic_under_25 = SearchPreferences {
        required_labels: vec!["krav".to_string()],
        max_price_per_unit: Some(25.0),
        ..SearchPreferences::default()
    };
    let products = client
        .search_products("mjölk", 0, 30, Some(&organic_under_25))
        .await
        .unwrap();
    assert_eq!(codes(&products), vec!["100000002_ST"]);
}

#[tokio::test]
async fn test_search_validation_before_request() {
    let fake = FakeWillys::start().await;
    let client = fake.client();

    let err = client.search_products("   ", 0, 30, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = client.search_products("mjölk", 0, 101, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert!(fake.state.requests_to("/search").is_empty());
}

#[tokio::test]
async fn test_search_past_last_page_is_empty() {
    let fake = FakeWillys::start().await;
    let products = fake.client().search_products("mjölk", 3, 30, None).await.unwrap();
    assert!(products.is_empty());
}

// ============================================================================
// Cart Tests
// ============================================================================

#[tokio::test]
async fn test_add_to_cart_returns_fresh_snapshot() {
    let fake = FakeWillys::start().await;
    let client = fake.logged_in_client().await;

    let cart = client.add_to_cart(MILK, 2).await.unwrap();
    assert_eq!(cart.item(MILK).unwrap().quantity, 2);

    let cart = client.add_to_cart(BANANAS, 1).await.unwrap();
    assert_eq!(cart.items.len(), 2);
    assert_eq!(cart.item_count, 3);

    // Line prices arrive as a number and as a string.
    assert_eq!(cart.item(BANANAS).unwrap().price, Decimal::new(245, 1));
    let milk = cart.item(MILK).unwrap();
    assert_eq!(milk.price, Decimal::new(179, 1));
    assert_eq!(milk.total_price, Decimal::new(358, 1));

    assert_eq!(cart.total_price, Decimal::new(603, 1));
    assert_eq!(cart.delivery_fee, Decimal::from(49));
    assert_eq!(cart.picking_fee, Decimal::ZERO);
    assert_eq!(cart.final_total, Decimal::new(1093, 1));

    let add = fake.state.requests_to("/axfood/rest/cart/addProducts");
    let line = &add[0].body.as_ref().unwrap()["products"][0];
    assert_eq!(line["productCodePost"], MILK);
    assert_eq!(line["qty"], 2);
    assert_eq!(line["pickUnit"], "pieces");
}

#[tokio::test]
async fn test_add_unknown_product_is_not_found() {
    let fake = FakeWillys::start().await;
    let client = fake.logged_in_client().await;

    let err = client.add_to_cart("999999999_ST", 1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.to_string(), "product not found: 999999999_ST");
}

#[tokio::test]
async fn test_add_to_cart_validates_input() {
    let fake = FakeWillys::start().await;
    let client = fake.logged_in_client().await;
    let before = fake.state.requests().len();

    assert_eq!(
        client.add_to_cart("milk", 1).await.unwrap_err().kind(),
        ErrorKind::Validation
    );
    assert_eq!(
        client.add_to_cart(MILK, 0).await.unwrap_err().kind(),
        ErrorKind::Validation
    );
    assert_eq!(
        client.add_to_cart(MILK, 1000).await.unwrap_err().kind(),
        ErrorKind::Validation
    );
    assert_eq!(fake.state.requests().len(), before);
}

#[tokio::test]
async fn test_remove_partial_and_whole_line() {
    let fake = FakeWillys::start().await;
    let client = fake.logged_in_client().await;
    fake.state.seed_cart(MILK, 3);
    fake.state.seed_cart(BANANAS, 1);

    let cart = client.remove_from_cart(MILK, Some(1)).await.unwrap();
    assert_eq!(cart.item(MILK).unwrap().quantity, 2);

    // Removing more than present sets the line to zero.
    let cart = client.remove_from_cart(MILK, Some(5)).await.unwrap();
    assert!(cart.item(MILK).is_none());

    let cart = client.remove_from_cart(BANANAS, None).await.unwrap();
    assert!(cart.is_empty());
}

#[tokio::test]
async fn test_remove_absent_item_sends_no_mutation() {
    let fake = FakeWillys::start().await;
    let client = fake.logged_in_client().await;
    fake.state.seed_cart(BANANAS, 1);

    let cart = client.remove_from_cart(MILK, Some(1)).await.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert!(fake.state.requests_to("/axfood/rest/cart/addProducts").is_empty());
}

#[tokio::test]
async fn test_clear_cart() {
    let fake = FakeWillys::start().await;
    let client = fake.logged_in_client().await;
    fake.state.seed_cart(MILK, 2);

    client.clear_cart().await.unwrap();

    assert!(client.get_cart().await.unwrap().is_empty());
    let clear = fake.state.requests_to("/axfood/rest/cart");
    assert!(clear.iter().any(|r| r.method == Method::DELETE && r.csrf_token.is_some()));
}

// ============================================================================
// Delivery Tests
// ============================================================================

#[tokio::test]
async fn test_time_slots_in_local_time() {
    let fake = FakeWillys::start().await;
    let client = fake.logged_in_client().await;

    let slots = client.get_available_time_slots("111 51").await.unwrap();
    assert_eq!(slots.len(), 3);

    let tomorrow = Local::now().date_naive().checked_add_days(Days::new(1)).unwrap();
    let slot = &slots[0];
    assert_eq!(slot.date, tomorrow);
    assert_eq!(slot.start_time, "15:00");
    assert_eq!(slot.end_time, "17:00");
    assert_eq!(slot.fee, Decimal::from(49));
    assert!(slot.available);
    assert!(!slots[1].available);
    assert_eq!(slot.routing.route_id, 300);

    let listed = fake.state.requests_to("/axfood/rest/slot/homeDelivery");
    assert_eq!(
        listed[0].uri,
        format!("/axfood/rest/slot/homeDelivery?postalCode={DELIVERABLE_POSTAL_CODE}&b2b=false")
    );
}

#[tokio::test]
async fn test_no_slots_for_unserved_postal_code() {
    let fake = FakeWillys::start().await;
    let slots = fake.client().get_available_time_slots("12345").await.unwrap();
    assert!(slots.is_empty());
}

#[tokio::test]
async fn test_deliverability() {
    let fake = FakeWillys::start().await;
    let client = fake.client();

    assert!(client.check_deliverability("111 51").await.unwrap());
    assert!(!client.check_deliverability("98765").await.unwrap());
    assert_eq!(
        client.check_deliverability("1115").await.unwrap_err().kind(),
        ErrorKind::Validation
    );
}

#[tokio::test]
async fn test_setup_delivery_echoes_routing() {
    let fake = FakeWillys::start().await;
    let client = fake.logged_in_client().await;
    let slots = client.get_available_time_slots("11151").await.unwrap();
    let slot = first_available(&slots);

    let info = client.setup_delivery(&address(), slot).await.unwrap();

    assert_eq!(info.time_slot, *slot);
    assert_eq!(info.delivery_fee, Decimal::from(49));
    assert_eq!(info.picking_fee, Decimal::from(59));
    assert_eq!(info.total_fee, Decimal::from(108));

    let booked = fake.state.requests_to("/axfood/rest/slot/slotInCart");
    assert_eq!(booked.len(), 1);
    assert!(booked[0].uri.ends_with("?isTmsSlot=true"));
    assert!(booked[0].csrf_token.is_some());
    assert_eq!(
        booked[0].body.as_ref().unwrap(),
        &fake.state.slot_listing()[0]["tmsDeliveryWindowReference"]
    );
}

#[tokio::test]
async fn test_setup_delivery_step_order() {
    let fake = FakeWillys::start().await;
    let client = fake.logged_in_client().await;
    let slots = client.get_available_time_slots("11151").await.unwrap();

    client
        .setup_delivery(&address(), first_available(&slots))
        .await
        .unwrap();

    let steps: Vec<String> = fake
        .state
        .requests()
        .into_iter()
        .filter(|r| {
            r.uri.starts_with("/axfood/rest/cart/")
                || r.uri.contains("deliverability")
                || r.uri.contains("slotInCart")
        })
        .map(|r| r.uri.split('?').next().unwrap_or_default().to_string())
        .collect();
    let slot_path = format!("/axfood/rest/slot/slotInCart/{}", urlencode(&slots[0].slot_id));
    assert_eq!(
        steps,
        vec![
            "/axfood/rest/shipping/delivery/11151/deliverability",
            "/axfood/rest/cart/delivery-mode/homeDelivery",
            "/axfood/rest/cart/delivery-address",
            "/axfood/rest/cart/postal-code",
            slot_path.as_str(),
        ]
    );

    let address_call = fake.state.requests_to("/axfood/rest/cart/delivery-address");
    let uri = &address_call[0].uri;
    assert!(uri.contains("firstName=Anna"), "got: {uri}");
    assert!(uri.contains("doorCode=1234"), "got: {uri}");
    assert!(!uri.contains("messageToDriver"), "got: {uri}");
}

#[tokio::test]
async fn test_setup_delivery_refuses_undeliverable_postal_code() {
    let fake = FakeWillys::start().await;
    let client = fake.logged_in_client().await;
    let slots = client.get_available_time_slots("11151").await.unwrap();
    fake.state.deliverable.store(false, Ordering::SeqCst);

    let err = client
        .setup_delivery(&address(), first_available(&slots))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().starts_with("postal_code:"), "got: {err}");
    assert!(fake.state.requests_to("/axfood/rest/cart/delivery-mode").is_empty());
    assert!(fake.state.requests_to("/axfood/rest/slot/slotInCart").is_empty());
}

#[tokio::test]
async fn test_checkout_url() {
    let fake = FakeWillys::start().await;
    assert_eq!(fake.client().checkout_url(), format!("{}/kassa", fake.base_url()));
}

/// Slot codes contain spaces, which the path encodes as `%20`.
fn urlencode(s: &str) -> String {
    s.replace(' ', "%20")
}
