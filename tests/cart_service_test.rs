mod common;

use common::TestApp;
use rust_decimal_macros::dec;
use storefront_api::errors::ServiceError;
use uuid::Uuid;

#[tokio::test]
async fn cart_is_created_lazily_once_per_user() {
    let app = TestApp::new().await;
    let user = app.create_user("shopper@example.com", false).await;

    let cart = app
        .state
        .services
        .cart
        .get_or_create_cart(user.id)
        .await
        .expect("failed to create cart");

    let again = app
        .state
        .services
        .cart
        .get_or_create_cart(user.id)
        .await
        .expect("failed to fetch cart");

    assert_eq!(cart.id, again.id);
}

#[tokio::test]
async fn adding_the_same_product_merges_into_one_line() {
    let app = TestApp::new().await;
    let user = app.create_user("shopper@example.com", false).await;
    let product = app.create_product("Espresso Beans", dec!(12.99), true).await;

    let cart_service = &app.state.services.cart;
    cart_service
        .add_item(user.id, product.id, 2)
        .await
        .expect("first add failed");
    let cart = cart_service
        .add_item(user.id, product.id, 3)
        .await
        .expect("second add failed");

    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].item.quantity, 5);
    assert_eq!(cart.items[0].product.id, product.id);
}

#[tokio::test]
async fn unavailable_product_is_rejected_without_mutation() {
    let app = TestApp::new().await;
    let user = app.create_user("shopper@example.com", false).await;
    let product = app.create_product("Sold Out Syrup", dec!(4.50), false).await;

    let cart_service = &app.state.services.cart;
    let err = cart_service
        .add_item(user.id, product.id, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));

    let cart = cart_service
        .get_cart_with_items(user.id)
        .await
        .expect("cart should exist after get_or_create in add path");
    assert!(cart.items.is_empty());
}

#[tokio::test]
async fn unknown_product_is_not_found() {
    let app = TestApp::new().await;
    let user = app.create_user("shopper@example.com", false).await;

    let err = app
        .state
        .services
        .cart
        .add_item(user.id, Uuid::new_v4(), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn non_positive_add_quantity_is_rejected() {
    let app = TestApp::new().await;
    let user = app.create_user("shopper@example.com", false).await;
    let product = app.create_product("Espresso Beans", dec!(12.99), true).await;

    let err = app
        .state
        .services
        .cart
        .add_item(user.id, product.id, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn setting_quantity_to_zero_removes_the_line() {
    let app = TestApp::new().await;
    let user = app.create_user("shopper@example.com", false).await;
    let product = app.create_product("Espresso Beans", dec!(12.99), true).await;

    let cart_service = &app.state.services.cart;
    let cart = cart_service
        .add_item(user.id, product.id, 2)
        .await
        .expect("add failed");
    let item_id = cart.items[0].item.id;

    cart_service
        .update_item_quantity(cart.cart.id, item_id, 0)
        .await
        .expect("update failed");

    let cart = cart_service.get_cart_with_items(user.id).await.unwrap();
    assert!(cart.items.is_empty());
}

#[tokio::test]
async fn negative_quantity_also_removes_the_line() {
    let app = TestApp::new().await;
    let user = app.create_user("shopper@example.com", false).await;
    let product = app.create_product("Espresso Beans", dec!(12.99), true).await;

    let cart_service = &app.state.services.cart;
    let cart = cart_service
        .add_item(user.id, product.id, 2)
        .await
        .expect("add failed");
    let item_id = cart.items[0].item.id;

    cart_service
        .update_item_quantity(cart.cart.id, item_id, -5)
        .await
        .expect("update failed");

    let cart = cart_service.get_cart_with_items(user.id).await.unwrap();
    assert!(cart.items.is_empty());
}

#[tokio::test]
async fn positive_quantity_update_is_stored() {
    let app = TestApp::new().await;
    let user = app.create_user("shopper@example.com", false).await;
    let product = app.create_product("Espresso Beans", dec!(12.99), true).await;

    let cart_service = &app.state.services.cart;
    let cart = cart_service
        .add_item(user.id, product.id, 2)
        .await
        .expect("add failed");
    let item_id = cart.items[0].item.id;

    cart_service
        .update_item_quantity(cart.cart.id, item_id, 7)
        .await
        .expect("update failed");

    let cart = cart_service.get_cart_with_items(user.id).await.unwrap();
    assert_eq!(cart.items[0].item.quantity, 7);
}

#[tokio::test]
async fn updating_an_item_from_another_cart_is_rejected() {
    let app = TestApp::new().await;
    let alice = app.create_user("alice@example.com", false).await;
    let bob = app.create_user("bob@example.com", false).await;
    let product = app.create_product("Espresso Beans", dec!(12.99), true).await;

    let cart_service = &app.state.services.cart;
    let alice_cart = cart_service
        .add_item(alice.id, product.id, 1)
        .await
        .expect("add failed");
    let bob_cart = cart_service.get_or_create_cart(bob.id).await.unwrap();

    let err = cart_service
        .update_item_quantity(bob_cart.id, alice_cart.items[0].item.id, 3)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOperation(_)));
}

#[tokio::test]
async fn clearing_a_cart_keeps_the_cart_row() {
    let app = TestApp::new().await;
    let user = app.create_user("shopper@example.com", false).await;
    let product = app.create_product("Espresso Beans", dec!(12.99), true).await;

    let cart_service = &app.state.services.cart;
    let cart = cart_service
        .add_item(user.id, product.id, 2)
        .await
        .expect("add failed");

    cart_service.clear_cart(cart.cart.id).await.expect("clear failed");

    let after = cart_service.get_cart_with_items(user.id).await.unwrap();
    assert_eq!(after.cart.id, cart.cart.id);
    assert!(after.items.is_empty());
}
