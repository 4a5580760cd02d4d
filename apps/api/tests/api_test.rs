use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use appointment_cell::router::appointment_routes;
use directory_cell::router::{patient_routes, provider_routes};
use encounter_cell::router::encounter_routes;
use shared_database::AppState;
use shared_models::auth::ActorRole;
use shared_utils::test_utils::{test_state, JwtTestUtils, TestActor, TEST_JWT_SECRET};
use slot_cell::router::slot_routes;

fn test_app() -> (Router, Arc<AppState>) {
    let state = test_state();
    let app = Router::new()
        .nest("/providers", provider_routes(state.clone()))
        .nest("/patients", patient_routes(state.clone()))
        .nest("/slots", slot_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/visits", encounter_routes(state.clone()));
    (app, state)
}

fn bearer(actor: &TestActor) -> String {
    format!(
        "Bearer {}",
        JwtTestUtils::create_test_token(actor, TEST_JWT_SECRET, None)
    )
}

async fn send(app: &Router, method: &str, uri: &str, auth: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, auth);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn booking_and_visit_flow_end_to_end() {
    let (app, _state) = test_app();
    let admin = TestActor::admin();
    let admin_auth = bearer(&admin);

    // Register a provider and a patient.
    let (status, body) = send(
        &app,
        "POST",
        "/providers",
        &admin_auth,
        Some(json!({ "full_name": "Dr. Amara Okafor", "specialty": "General Practice" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let provider_id: Uuid = body["provider"]["id"].as_str().unwrap().parse().unwrap();

    let (status, body) = send(
        &app,
        "POST",
        "/patients",
        &admin_auth,
        Some(json!({ "full_name": "Maya Lindqvist" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let patient_id: Uuid = body["patient"]["id"].as_str().unwrap().parse().unwrap();

    let provider_auth = bearer(&TestActor::with_id(provider_id, ActorRole::Provider));
    let patient_auth = bearer(&TestActor::with_id(patient_id, ActorRole::Patient));

    // Provider publishes a slot a week out.
    let start = Utc::now() + Duration::days(7);
    let end = start + Duration::minutes(45);
    let (status, body) = send(
        &app,
        "POST",
        "/slots",
        &provider_auth,
        Some(json!({
            "provider_id": provider_id,
            "start_time": start,
            "end_time": end,
            "modality": "in_person"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let slot_id: Uuid = body["slot"]["id"].as_str().unwrap().parse().unwrap();

    // Patient books it.
    let (status, body) = send(
        &app,
        "POST",
        "/appointments",
        &patient_auth,
        Some(json!({
            "patient_id": patient_id,
            "slot_id": slot_id,
            "reason": "Persistent cough"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "pending");
    let appointment_id: Uuid = body["appointment"]["id"].as_str().unwrap().parse().unwrap();

    // A second booking attempt conflicts.
    let other_patient = {
        let (_, body) = send(
            &app,
            "POST",
            "/patients",
            &admin_auth,
            Some(json!({ "full_name": "Jonas Weber" })),
        )
        .await;
        body["patient"]["id"].as_str().unwrap().to_string()
    };
    let other_auth = bearer(&TestActor::with_id(
        other_patient.parse().unwrap(),
        ActorRole::Patient,
    ));
    let (status, _) = send(
        &app,
        "POST",
        "/appointments",
        &other_auth,
        Some(json!({ "patient_id": other_patient, "slot_id": slot_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Provider starts the visit and completes it with a note.
    let (status, _) = send(
        &app,
        "POST",
        &format!("/appointments/{appointment_id}/transition"),
        &provider_auth,
        Some(json!({ "target_status": "in_progress" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/visits/{appointment_id}/complete-visit"),
        &provider_auth,
        Some(json!({
            "note": { "content": "Chest clear, likely viral." },
            "diagnosis": { "code": "J06.9", "description": "Acute URI" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"]["already_applied"], false);
    assert_eq!(body["outcome"]["appointment"]["status"], "attended");

    // Detail and history read back the records.
    let (status, body) = send(
        &app,
        "GET",
        &format!("/visits/{appointment_id}"),
        &patient_auth,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["detail"]["notes"].as_array().unwrap().len(), 1);
    assert_eq!(body["detail"]["diagnoses"][0]["code"], "J06.9");

    let (status, body) = send(
        &app,
        "GET",
        &format!("/visits/history/{patient_id}"),
        &patient_auth,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["history"]["visits"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn requests_without_a_token_are_unauthorized() {
    let (app, _state) = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/slots?provider_id={}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn patients_cannot_publish_slots() {
    let (app, _state) = test_app();
    let patient_auth = bearer(&TestActor::patient());

    let start = Utc::now() + Duration::days(7);
    let (status, _) = send(
        &app,
        "POST",
        "/slots",
        &patient_auth,
        Some(json!({
            "provider_id": Uuid::new_v4(),
            "start_time": start,
            "end_time": start + Duration::minutes(30),
            "modality": "teleconsult"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn expired_tokens_are_rejected() {
    let (app, _state) = test_app();
    let actor = TestActor::provider();
    let token = JwtTestUtils::create_expired_token(&actor, TEST_JWT_SECRET);

    let (status, _) = send(
        &app,
        "GET",
        &format!("/slots?provider_id={}", actor.id),
        &format!("Bearer {token}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
