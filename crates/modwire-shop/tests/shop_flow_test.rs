use modwire_shop::app::{Request, Response};
use modwire_shop::db::Database;
use modwire_shop::gateway::DECLINED_METHOD;
use modwire_shop::model::{Cart, Order, OrderStatus, PaymentStatus, Product, Role, User};
use modwire_shop::services::auth::Session;
use modwire_shop::services::order::OrderPage;
use modwire_shop::{ShopConfig, ShopSystem};
use serde_json::{json, Value};

async fn started() -> (ShopSystem, Vec<Product>) {
    let system = ShopSystem::start(ShopConfig::default()).expect("shop should resolve");
    let products = system.db().unwrap().seed().await.unwrap();
    (system, products)
}

async fn call(system: &ShopSystem, request: Request) -> Response {
    system.request(request).await.expect("server should answer")
}

async fn register(system: &ShopSystem, email: &str) -> Session {
    let response = call(
        system,
        Request::post(
            "/auth/register",
            json!({
                "email": email,
                "password": "wonderland",
                "first_name": "Alice",
                "last_name": "Liddell",
            }),
        ),
    )
    .await;
    assert_eq!(response.status, 200, "{}", response.body);
    response.json().unwrap()
}

async fn add_to_cart(system: &ShopSystem, token: &str, product: &Product, quantity: u32) {
    let response = call(
        system,
        Request::post(
            "/cart/items",
            json!({ "product_id": product.id, "quantity": quantity }),
        )
        .with_bearer(token),
    )
    .await;
    assert_eq!(response.status, 200, "{}", response.body);
}

fn checkout_body(payment_method: &str, coupon: Option<&str>) -> Value {
    json!({
        "shipping_address": {
            "street": "1 Rabbit Hole",
            "city": "Oxford",
            "state": "Oxfordshire",
            "zip_code": "OX1",
            "country": "GB",
        },
        "payment_method_id": payment_method,
        "coupon_code": coupon,
    })
}

async fn stock(db: &Database, product: &Product) -> u32 {
    db.stock(product.id).await.unwrap()
}

#[tokio::test]
async fn test_checkout_with_coupon() {
    let (system, products) = started().await;
    let session = register(&system, "alice@example.com").await;
    let keyboard = &products[0];
    let mouse = &products[1];

    add_to_cart(&system, &session.token, keyboard, 1).await;
    add_to_cart(&system, &session.token, mouse, 2).await;

    let cart: Cart = call(&system, Request::get("/cart").with_bearer(&session.token))
        .await
        .json()
        .unwrap();
    assert_eq!(cart.total_items, 3);
    assert_eq!(cart.total_amount, 211.0);

    let response = call(
        &system,
        Request::post("/orders", checkout_body("pm_card_visa", Some("WELCOME10")))
            .with_bearer(&session.token),
    )
    .await;
    assert_eq!(response.status, 200, "{}", response.body);
    let order: Order = response.json().unwrap();
    assert_eq!(order.subtotal, 211.0);
    assert_eq!(order.discount, 21.1);
    assert_eq!(order.status, OrderStatus::Processing);
    assert_eq!(order.payment_status, PaymentStatus::Succeeded);
    assert!(order.payment_id.is_some());

    let db = system.db().unwrap();
    assert_eq!(stock(db, keyboard).await, 9);
    assert_eq!(stock(db, mouse).await, 23);

    let cart: Cart = call(&system, Request::get("/cart").with_bearer(&session.token))
        .await
        .json()
        .unwrap();
    assert!(cart.items.is_empty());

    let fetched: Order = call(
        &system,
        Request::get(format!("/orders/{}", order.id.0)).with_bearer(&session.token),
    )
    .await
    .json()
    .unwrap();
    assert_eq!(fetched, order);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_declined_card_releases_stock() {
    let (system, products) = started().await;
    let session = register(&system, "bob@example.com").await;
    let hub = &products[2];
    add_to_cart(&system, &session.token, hub, 2).await;

    let response = call(
        &system,
        Request::post("/orders", checkout_body(DECLINED_METHOD, None)).with_bearer(&session.token),
    )
    .await;
    assert_eq!(response.status, 402, "{}", response.body);
    assert_eq!(stock(system.db().unwrap(), hub).await, 3);

    let page: OrderPage = call(&system, Request::get("/orders").with_bearer(&session.token))
        .await
        .json()
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.orders[0].status, OrderStatus::Cancelled);
    assert_eq!(page.orders[0].payment_status, PaymentStatus::Failed);

    // The cart survives a failed payment so the customer can retry.
    let cart: Cart = call(&system, Request::get("/cart").with_bearer(&session.token))
        .await
        .json()
        .unwrap();
    assert_eq!(cart.total_items, 2);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cancel_refunds_and_restocks() {
    let (system, products) = started().await;
    let session = register(&system, "carol@example.com").await;
    let keyboard = &products[0];
    add_to_cart(&system, &session.token, keyboard, 2).await;

    let order: Order = call(
        &system,
        Request::post("/orders", checkout_body("pm_card_visa", None)).with_bearer(&session.token),
    )
    .await
    .json()
    .unwrap();
    assert_eq!(stock(system.db().unwrap(), keyboard).await, 8);

    let response = call(
        &system,
        Request::post(format!("/orders/{}/cancel", order.id.0), Value::Null)
            .with_bearer(&session.token),
    )
    .await;
    assert_eq!(response.status, 200, "{}", response.body);
    let cancelled: Order = response.json().unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(stock(system.db().unwrap(), keyboard).await, 10);

    let payment_id = order.payment_id.unwrap();
    let intent = call(
        &system,
        Request::get(format!("/payments/{payment_id}")).with_bearer(&session.token),
    )
    .await;
    assert_eq!(intent.body["status"], "refunded");

    let again = call(
        &system,
        Request::post(format!("/orders/{}/cancel", order.id.0), Value::Null)
            .with_bearer(&session.token),
    )
    .await;
    assert_eq!(again.status, 400);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_authentication_failures() {
    let (system, products) = started().await;

    let anonymous = call(&system, Request::get("/cart")).await;
    assert_eq!(anonymous.status, 401);

    let forged = call(&system, Request::get("/auth/me").with_bearer("1.deadbeef")).await;
    assert_eq!(forged.status, 401);

    register(&system, "dave@example.com").await;
    let duplicate = call(
        &system,
        Request::post(
            "/auth/register",
            json!({
                "email": "dave@example.com",
                "password": "wonderland-again",
                "first_name": "Dave",
                "last_name": "Duplicate",
            }),
        ),
    )
    .await;
    assert_eq!(duplicate.status, 409);

    let wrong_password = call(
        &system,
        Request::post(
            "/auth/login",
            json!({ "email": "dave@example.com", "password": "nope" }),
        ),
    )
    .await;
    assert_eq!(wrong_password.status, 401);

    let login = call(
        &system,
        Request::post(
            "/auth/login",
            json!({ "email": "dave@example.com", "password": "wonderland" }),
        ),
    )
    .await;
    assert_eq!(login.status, 200, "{}", login.body);
    let session: Session = login.json().unwrap();
    let me: User = call(&system, Request::get("/auth/me").with_bearer(&session.token))
        .await
        .json()
        .unwrap();
    assert_eq!(me.email, "dave@example.com");

    // Product browsing stays public.
    let listed: Vec<Product> = call(&system, Request::get("/products")).await.json().unwrap();
    assert_eq!(listed, products);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_status_change_requires_admin() {
    let (system, products) = started().await;
    let session = register(&system, "erin@example.com").await;
    add_to_cart(&system, &session.token, &products[1], 1).await;
    let order: Order = call(
        &system,
        Request::post("/orders", checkout_body("pm_card_visa", None)).with_bearer(&session.token),
    )
    .await
    .json()
    .unwrap();

    let path = format!("/orders/{}/status", order.id.0);
    let forbidden = call(
        &system,
        Request::put(path.clone(), json!({ "status": "shipped" })).with_bearer(&session.token),
    )
    .await;
    assert_eq!(forbidden.status, 403);

    let admin: User = system
        .db()
        .unwrap()
        .set_role(session.user.id, Role::Admin)
        .await
        .unwrap();
    assert_eq!(admin.role, Role::Admin);

    let shipped: Order = call(
        &system,
        Request::put(path, json!({ "status": "shipped" })).with_bearer(&session.token),
    )
    .await
    .json()
    .unwrap();
    assert_eq!(shipped.status, OrderStatus::Shipped);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_route_and_health() {
    let (system, _) = started().await;

    let missing = call(&system, Request::get("/nowhere")).await;
    assert_eq!(missing.status, 404);

    let health = call(&system, Request::get("/health")).await;
    assert_eq!(health.body["status"], "healthy");
    assert_eq!(health.body["services"]["database"], "memory://shop");

    system.shutdown().await.unwrap();
}
