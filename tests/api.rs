//! End-to-end tests driving the full router over in-memory HTTP requests.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use laserscribe::api::create_router;
use laserscribe::db::Store;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn test_app() -> Router {
    let store = Arc::new(Store::in_memory().await.unwrap());
    store
        .with_conn(|conn| {
            conn.execute_batch(
                r#"
                INSERT INTO brands (name) VALUES ('Epilog');
                INSERT INTO machine_models (brand_id, name) VALUES (1, 'Fusion Pro');
                INSERT INTO material_categories (name) VALUES ('Wood');
                INSERT INTO materials (category_id, name) VALUES (1, 'Baltic Birch');
                INSERT INTO material_aliases (material_id, alias) VALUES (1, 'plywood');
                INSERT INTO operations (name) VALUES ('cut'), ('engrave');
                "#,
            )?;
            Ok(())
        })
        .await
        .unwrap();
    create_router(store)
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Registers a user and returns their bearer token.
async fn register(app: &Router, username: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/register",
            None,
            json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "password": "correct-horse-battery",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    response_json(response).await["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_check() {
    let app = test_app().await;
    let response = app.oneshot(get_request("/api/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["status"], "ok");
}

#[tokio::test]
async fn register_login_roundtrip() {
    let app = test_app().await;
    let token = register(&app, "alice").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/login",
            None,
            json!({ "username": "alice", "password": "correct-horse-battery" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["username"], "alice");
    assert_eq!(body["displayName"], "alice");
    assert_eq!(body["token"].as_str().unwrap(), token);

    // Wrong password and unknown user are indistinguishable.
    let wrong = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/login",
            None,
            json!({ "username": "alice", "password": "nope" }),
        ))
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    let wrong_body = response_json(wrong).await;

    let unknown = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/login",
            None,
            json!({ "username": "nobody", "password": "nope" }),
        ))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response_json(unknown).await, wrong_body);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = test_app().await;
    register(&app, "alice").await;

    let duplicate = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/register",
            None,
            json!({
                "username": "alice",
                "email": "other@example.com",
                "password": "whatever-goes-here",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
    assert!(response_json(duplicate).await["error"].is_string());
}

#[tokio::test]
async fn catalog_endpoints_are_public() {
    let app = test_app().await;

    for uri in [
        "/api/brands",
        "/api/brands/1/models",
        "/api/categories",
        "/api/materials",
        "/api/materials/1/aliases",
        "/api/operations",
    ] {
        let response = app.clone().oneshot(get_request(uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "GET {uri}");
    }

    // Alias search finds the material.
    let response = app
        .clone()
        .oneshot(get_request("/api/materials?search=PLYW", None))
        .await
        .unwrap();
    let body = response_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["name"], "Baltic Birch");
}

#[tokio::test]
async fn settings_require_bearer_token() {
    let app = test_app().await;

    let body = json!({
        "machineModelId": 1, "materialId": 1, "operationId": 1,
        "power": 80, "speed": 20,
    });

    let missing = app
        .clone()
        .oneshot(json_request("POST", "/api/settings", None, body.clone()))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let garbled = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/settings",
            Some("not-a-number"),
            body,
        ))
        .await
        .unwrap();
    assert_eq!(garbled.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn setting_lifecycle() {
    let app = test_app().await;
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;

    // Create.
    let created = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/settings",
            Some(&alice),
            json!({
                "machineModelId": 1, "materialId": 1, "operationId": 1,
                "power": 80, "speed": 20, "notes": "two slow passes",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let id = response_json(created).await["id"].as_i64().unwrap();

    // Duplicate configuration key for the same user conflicts.
    let duplicate = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/settings",
            Some(&alice),
            json!({
                "machineModelId": 1, "materialId": 1, "operationId": 1,
                "power": 50, "speed": 40,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    // Same key from a different user is fine.
    let other = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/settings",
            Some(&bob),
            json!({
                "machineModelId": 1, "materialId": 1, "operationId": 1,
                "power": 60, "speed": 35,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::CREATED);

    // Read back.
    let fetched = app
        .clone()
        .oneshot(get_request(&format!("/api/settings/{}", id), None))
        .await
        .unwrap();
    assert_eq!(fetched.status(), StatusCode::OK);
    let body = response_json(fetched).await;
    assert_eq!(body["power"], 80);
    assert_eq!(body["passes"], 1);
    assert_eq!(body["notes"], "two slow passes");
    assert_eq!(body["frequency"], Value::Null);

    // Non-owner update is rejected and changes nothing.
    let forged = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/settings/{}", id),
            Some(&bob),
            json!({ "power": 1, "speed": 1 }),
        ))
        .await
        .unwrap();
    assert_eq!(forged.status(), StatusCode::NOT_FOUND);

    let unchanged = app
        .clone()
        .oneshot(get_request(&format!("/api/settings/{}", id), None))
        .await
        .unwrap();
    assert_eq!(response_json(unchanged).await["power"], 80);

    // Owner update succeeds.
    let updated = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/settings/{}", id),
            Some(&alice),
            json!({ "power": 65, "speed": 25, "passes": 2 }),
        ))
        .await
        .unwrap();
    assert_eq!(updated.status(), StatusCode::OK);

    // Owner delete succeeds; the row is gone.
    let deleted = app
        .clone()
        .oneshot(json_request(
            "DELETE",
            &format!("/api/settings/{}", id),
            Some(&alice),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::OK);

    let gone = app
        .clone()
        .oneshot(get_request(&format!("/api/settings/{}", id), None))
        .await
        .unwrap();
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn search_filters_compose() {
    let app = test_app().await;
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;

    for (token, operation) in [(&alice, 1), (&alice, 2), (&bob, 1)] {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/settings",
                Some(token),
                json!({
                    "machineModelId": 1, "materialId": 1, "operationId": operation,
                    "power": 80, "speed": 20,
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let all = app
        .clone()
        .oneshot(get_request("/api/settings", None))
        .await
        .unwrap();
    assert_eq!(response_json(all).await.as_array().unwrap().len(), 3);

    let by_operation = app
        .clone()
        .oneshot(get_request("/api/settings?operation_id=1", None))
        .await
        .unwrap();
    assert_eq!(response_json(by_operation).await.as_array().unwrap().len(), 2);

    let narrowed = app
        .clone()
        .oneshot(get_request("/api/settings?operation_id=1&user_id=1", None))
        .await
        .unwrap();
    let narrowed_body = response_json(narrowed).await;
    assert_eq!(narrowed_body.as_array().unwrap().len(), 1);
    assert_eq!(narrowed_body[0]["userId"], 1);
}

#[tokio::test]
async fn voting_flow() {
    let app = test_app().await;
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;

    let created = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/settings",
            Some(&alice),
            json!({
                "machineModelId": 1, "materialId": 1, "operationId": 1,
                "power": 80, "speed": 20,
            }),
        ))
        .await
        .unwrap();
    let id = response_json(created).await["id"].as_i64().unwrap();
    let vote_uri = format!("/api/settings/{}/vote", id);

    // Invalid values are rejected.
    for bad in [0, 2] {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &vote_uri,
                Some(&bob),
                json!({ "value": bad }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    // First vote counts.
    let first = app
        .clone()
        .oneshot(json_request("POST", &vote_uri, Some(&bob), json!({ "value": 1 })))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let body = response_json(first).await;
    assert_eq!(body["score"], 1);
    assert_eq!(body["total"], 1);

    // Flipping the vote moves the score by 2, total unchanged.
    let flipped = app
        .clone()
        .oneshot(json_request("POST", &vote_uri, Some(&bob), json!({ "value": -1 })))
        .await
        .unwrap();
    let body = response_json(flipped).await;
    assert_eq!(body["score"], -1);
    assert_eq!(body["total"], 1);

    // Voting on a setting that does not exist is a 404.
    let missing = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/settings/999/vote",
            Some(&bob),
            json!({ "value": 1 }),
        ))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn profile_lists_own_settings() {
    let app = test_app().await;
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;

    for (token, material) in [(&alice, 1), (&bob, 1)] {
        app.clone()
            .oneshot(json_request(
                "POST",
                "/api/settings",
                Some(token),
                json!({
                    "machineModelId": 1, "materialId": material, "operationId": 1,
                    "power": 80, "speed": 20,
                }),
            ))
            .await
            .unwrap();
    }

    let response = app
        .clone()
        .oneshot(get_request("/api/profile/settings", Some(&alice)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["userId"], 1);
}
