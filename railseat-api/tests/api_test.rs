use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use jsonwebtoken::{encode, EncodingKey, Header};
use railseat_api::middleware::CustomerClaims;
use railseat_api::{app, state::{AppState, AuthConfig}};
use railseat_core::models::Train;
use railseat_core::MemoryStore;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const SECRET: &str = "test-secret";

async fn setup() -> (MemoryStore, Router, Train) {
    let store = MemoryStore::new();
    let train = store.provision_train("12951", "A", "B", 10).await.unwrap();
    store.provision_train("12953", "A", "B", 0).await.unwrap();
    store.provision_train("22691", "B", "C", 5).await.unwrap();

    let state = AppState::from_store(
        Arc::new(store.clone()),
        Duration::from_secs(2),
        AuthConfig { secret: SECRET.to_string() },
    );
    (store, app(state), train)
}

fn token(sub: &str) -> String {
    let claims = CustomerClaims {
        sub: sub.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

fn book(train_id: i64, seats: i32, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/bookings")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder
        .body(Body::from(json!({ "trainId": train_id, "seatsToBook": seats }).to_string()))
        .unwrap()
}

fn get(uri: &str, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_availability_returns_full_route_list() {
    let (_store, app, train) = setup().await;

    let (status, body) = send(&app, get("/v1/trains/availability?source=A&destination=B", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["trains"].as_array().unwrap().len(), 2);
    assert_eq!(body["trains"][0]["trainId"], train.id.0);
    assert_eq!(body["trains"][0]["availableSeats"], 10);
    assert_eq!(body["trains"][1]["availableSeats"], 0);
    assert_eq!(body["availableTrainCount"], 1);
    assert_eq!(body["available"], true);
}

#[tokio::test]
async fn test_availability_errors() {
    let (_store, app, _train) = setup().await;

    let (status, body) = send(&app, get("/v1/trains/availability?source=X&destination=Y", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");

    let (status, body) = send(&app, get("/v1/trains/availability?source=A", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn test_booking_decrements_and_shows_in_ledger() {
    let (store, app, train) = setup().await;
    let auth = format!("Bearer {}", token("17"));

    let (status, body) = send(&app, book(train.id.0, 4, Some(auth.as_str()))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["booking"]["seats"], 4);
    assert_eq!(body["booking"]["userId"], 17);
    assert_eq!(body["replayed"], false);
    let booking_id = body["booking"]["id"].as_str().unwrap().to_string();

    assert_eq!(store.train(train.id).await.unwrap().available_seats, 6);

    let (status, body) = send(&app, get("/v1/bookings", Some(auth.as_str()))).await;
    assert_eq!(status, StatusCode::OK);
    let bookings = body.as_array().unwrap();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0]["bookingId"], booking_id.as_str());
    assert_eq!(bookings[0]["trainNumber"], "12951");
    assert_eq!(bookings[0]["source"], "A");
    assert_eq!(bookings[0]["destination"], "B");

    // Other users see nothing.
    let other = format!("Bearer {}", token("18"));
    let (_, body) = send(&app, get("/v1/bookings", Some(other.as_str()))).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_business_rule_and_not_found_rejections() {
    let (store, app, train) = setup().await;
    let auth = token("17");

    let (status, body) = send(&app, book(train.id.0, 11, Some(auth.as_str()))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "insufficient_seats");
    assert_eq!(store.train(train.id).await.unwrap().available_seats, 10);
    assert!(store.bookings().await.is_empty());

    let (status, body) = send(&app, book(9999, 1, Some(auth.as_str()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");

    let (status, body) = send(&app, book(train.id.0, 0, Some(auth.as_str()))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let (_store, app, _train) = setup().await;

    let request = Request::builder()
        .method("POST")
        .uri("/v1/bookings")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, token("17"))
        .body(Body::from(r#"{"trainId": "one"}"#))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn test_credential_is_required() {
    let (_store, app, train) = setup().await;

    let (status, body) = send(&app, book(train.id.0, 1, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "unauthenticated");

    let (status, _) = send(&app, book(train.id.0, 1, Some("Bearer not-a-jwt"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, book(train.id.0, 1, Some(token("guest-abc").as_str()))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, get("/v1/bookings", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_idempotency_key_dedupes_retries() {
    let (store, app, train) = setup().await;
    let auth = token("17");

    let keyed = || {
        let mut request = book(train.id.0, 2, Some(auth.as_str()));
        request
            .headers_mut()
            .insert("idempotency-key", "order-5531".parse().unwrap());
        request
    };

    let (status, first) = send(&app, keyed()).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, retry) = send(&app, keyed()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(retry["replayed"], true);
    assert_eq!(retry["booking"]["id"], first["booking"]["id"]);

    assert_eq!(store.train(train.id).await.unwrap().available_seats, 8);
    assert_eq!(store.bookings().await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_never_oversell() {
    let store = MemoryStore::new();
    let train = store.provision_train("12951", "A", "B", 5).await.unwrap();
    let state = AppState::from_store(
        Arc::new(store.clone()),
        Duration::from_secs(5),
        AuthConfig { secret: SECRET.to_string() },
    );
    let app = app(state);

    let mut handles = Vec::new();
    for user in 1..=20 {
        let app = app.clone();
        let auth = token(&user.to_string());
        handles.push(tokio::spawn(async move {
            app.oneshot(book(train.id.0, 1, Some(auth.as_str()))).await.unwrap().status()
        }));
    }

    let mut created = 0;
    let mut conflicts = 0;
    for handle in handles {
        let status = handle.await.unwrap();
        if status == StatusCode::CREATED {
            created += 1;
        } else if status == StatusCode::CONFLICT {
            conflicts += 1;
        } else {
            panic!("unexpected status {}", status);
        }
    }

    assert_eq!(created, 5);
    assert_eq!(conflicts, 15);
    assert_eq!(store.train(train.id).await.unwrap().available_seats, 0);
    assert_eq!(store.bookings().await.len(), 5);
}

#[tokio::test]
async fn test_health() {
    let (_store, app, _train) = setup().await;
    let response = app.oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
