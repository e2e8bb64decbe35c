//! Integration tests for the MentorPulse HTTP facade.
//!
//! Every test builds its own router over the in-memory store and drives it with
//! `tower::ServiceExt::oneshot`, so tests are independent of each other and of Postgres.

use api_lib::config::Config;
use api_lib::web::{create_router, state::AppState};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

// =============================================================================
// Helpers
// =============================================================================

fn make_app() -> Router {
    create_router(AppState::in_memory(Config::default())).unwrap()
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn empty_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

/// Registers a user and returns `(token, user_id)`.
async fn register(app: &Router, name: &str, email: &str, role: &str) -> (String, String) {
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/api/auth/register",
            None,
            json!({ "name": name, "email": email, "password": "secret123", "role": role }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
    (
        body["data"]["token"].as_str().unwrap().to_string(),
        body["data"]["user"]["id"].as_str().unwrap().to_string(),
    )
}

async fn book(app: &Router, mentee_token: &str, mentor_id: &str, session_type: &str) -> Value {
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/api/sessions/book",
            Some(mentee_token),
            json!({
                "mentorId": mentor_id,
                "topic": "React hooks",
                "sessionType": session_type,
                "date": "2026-11-02",
                "startTime": "10:00",
                "endTime": "11:00",
                "price": 25.5,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "booking failed: {}", body);
    body["data"].clone()
}

// =============================================================================
// Auth
// =============================================================================

#[tokio::test]
async fn register_login_me_and_logout() {
    let app = make_app();
    let (token, user_id) = register(&app, "Mia", "mia@example.com", "mentee").await;

    let (status, body) = send(&app, empty_request("GET", "/api/auth/me", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["id"], user_id.as_str());
    assert_eq!(body["data"]["role"], "mentee");

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/auth/login",
            None,
            json!({ "email": "MIA@example.com", "password": "secret123" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let second_token = body["data"]["token"].as_str().unwrap().to_string();

    let (status, _) = send(&app, empty_request("POST", "/api/auth/logout", &token)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, empty_request("GET", "/api/auth/me", &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    // Logging out one token leaves the other session alive.
    let (status, _) = send(&app, empty_request("GET", "/api/auth/me", &second_token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn register_rejects_duplicates_admins_and_short_passwords() {
    let app = make_app();
    register(&app, "Theo", "theo@example.com", "mentor").await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/auth/register",
            None,
            json!({ "name": "Theo 2", "email": "theo@example.com", "password": "secret123", "role": "mentee" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/auth/register",
            None,
            json!({ "name": "Root", "email": "root@example.com", "password": "secret123", "role": "admin" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/auth/register",
            None,
            json!({ "name": "Ana", "email": "ana@example.com", "password": "123", "role": "mentee" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("at least 6"));
}

#[tokio::test]
async fn wrong_password_and_missing_token_are_unauthorized() {
    let app = make_app();
    register(&app, "Mia", "mia@example.com", "mentee").await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/auth/login",
            None,
            json!({ "email": "mia@example.com", "password": "wrong-password" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        body,
        json!({ "success": false, "message": "Invalid email or password" })
    );

    let req = Request::get("/api/chat/user/chats")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn malformed_json_gets_structured_error() {
    let app = make_app();
    let req = Request::post("/api/auth/login")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["message"].is_string());
}

// =============================================================================
// Chat
// =============================================================================

#[tokio::test]
async fn chat_is_shared_and_history_marks_messages_read() {
    let app = make_app();
    let (mentee_token, mentee_id) = register(&app, "Mia", "mia@example.com", "mentee").await;
    let (mentor_token, mentor_id) = register(&app, "Theo", "theo@example.com", "mentor").await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/chat/get-or-create",
            Some(&mentee_token),
            json!({ "participantId": mentor_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let chat_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["participants"].as_array().unwrap().len(), 2);

    // The other side resolves to the same chat.
    let (_, body) = send(
        &app,
        json_request(
            "POST",
            "/api/chat/get-or-create",
            Some(&mentor_token),
            json!({ "participantId": mentee_id }),
        ),
    )
    .await;
    assert_eq!(body["data"]["id"], chat_id.as_str());

    // Mentor has no live connection, so the message stays undelivered.
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/api/chat/{}/messages", chat_id),
            Some(&mentee_token),
            json!({ "content": "Hi" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["content"], "Hi");
    assert_eq!(body["data"]["messageType"], "text");
    assert_eq!(body["data"]["isDelivered"], false);

    let (_, body) = send(&app, empty_request("GET", "/api/chat/user/chats", &mentor_token)).await;
    let chats = body["data"].as_array().unwrap();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0]["unreadCount"], 1);
    assert_eq!(chats[0]["otherParticipant"]["id"], mentee_id.as_str());

    // Fetching history delivers and reads everything addressed to the mentor.
    let (status, body) = send(
        &app,
        empty_request("GET", &format!("/api/chat/{}/messages", chat_id), &mentor_token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["hasMore"], false);
    let message = &body["data"]["messages"][0];
    assert_eq!(message["isDelivered"], true);
    assert_eq!(message["isSeen"], true);
    assert_eq!(message["readBy"][0]["userId"], mentor_id.as_str());

    let (_, body) = send(&app, empty_request("GET", "/api/chat/user/chats", &mentor_token)).await;
    assert_eq!(body["data"][0]["unreadCount"], 0);

    // Nothing left to mark.
    let (status, body) = send(
        &app,
        empty_request("PATCH", &format!("/api/chat/{}/read", chat_id), &mentor_token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn mark_read_accepts_specific_messages() {
    let app = make_app();
    let (mentee_token, _) = register(&app, "Mia", "mia@example.com", "mentee").await;
    let (mentor_token, mentor_id) = register(&app, "Theo", "theo@example.com", "mentor").await;
    let (_, body) = send(
        &app,
        json_request(
            "POST",
            "/api/chat/get-or-create",
            Some(&mentee_token),
            json!({ "participantId": mentor_id }),
        ),
    )
    .await;
    let chat_id = body["data"]["id"].as_str().unwrap().to_string();

    let mut ids = Vec::new();
    for text in ["one", "two"] {
        let (_, body) = send(
            &app,
            json_request(
                "POST",
                &format!("/api/chat/{}/messages", chat_id),
                Some(&mentee_token),
                json!({ "content": text }),
            ),
        )
        .await;
        ids.push(body["data"]["id"].as_str().unwrap().to_string());
    }

    let uri = format!("/api/chat/{}/read", chat_id);
    let (status, body) = send(
        &app,
        json_request("PATCH", &uri, Some(&mentor_token), json!({ "messageIds": [ids[0]] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["id"], ids[0].as_str());

    // Marking the same message again changes nothing.
    let (_, body) = send(
        &app,
        json_request("PATCH", &uri, Some(&mentor_token), json!({ "messageIds": [ids[0]] })),
    )
    .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    let (_, body) = send(&app, empty_request("PATCH", &uri, &mentor_token)).await;
    assert_eq!(body["data"][0]["id"], ids[1].as_str());
}

#[tokio::test]
async fn chat_input_is_validated() {
    let app = make_app();
    let (mentee_token, mentee_id) = register(&app, "Mia", "mia@example.com", "mentee").await;
    let (_, mentor_id) = register(&app, "Theo", "theo@example.com", "mentor").await;
    let (outsider_token, _) = register(&app, "Eve", "eve@example.com", "mentee").await;

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/chat/get-or-create",
            Some(&mentee_token),
            json!({ "participantId": mentee_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/chat/get-or-create",
            Some(&mentee_token),
            json!({ "participantId": uuid::Uuid::new_v4() }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Participant not found");

    let (_, body) = send(
        &app,
        json_request(
            "POST",
            "/api/chat/get-or-create",
            Some(&mentee_token),
            json!({ "participantId": mentor_id }),
        ),
    )
    .await;
    let messages_uri = format!("/api/chat/{}/messages", body["data"]["id"].as_str().unwrap());

    let (status, body) = send(
        &app,
        json_request("POST", &messages_uri, Some(&mentee_token), json!({ "content": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Message content cannot be empty");

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &messages_uri,
            Some(&mentee_token),
            json!({ "content": "x".repeat(1001) }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &messages_uri,
            Some(&mentee_token),
            json!({ "content": "Maintenance tonight", "messageType": "system" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, empty_request("GET", &messages_uri, &outsider_token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
}

// =============================================================================
// Sessions
// =============================================================================

#[tokio::test]
async fn booking_to_dual_approved_completion_credits_skills() {
    let app = make_app();
    let (mentee_token, _) = register(&app, "Mia", "mia@example.com", "mentee").await;
    let (mentor_token, mentor_id) = register(&app, "Theo", "theo@example.com", "mentor").await;

    let session = book(&app, &mentee_token, &mentor_id, "video").await;
    assert_eq!(session["status"], "confirmed");
    assert_eq!(session["price"], 25.5);
    assert_eq!(session["startTime"], "10:00");
    assert!(session["meetingLink"]
        .as_str()
        .unwrap()
        .starts_with("https://meet.jit.si/"));
    let session_uri = format!("/api/sessions/{}", session["id"].as_str().unwrap());

    // Only the mentor may initiate.
    let (status, _) = send(
        &app,
        json_request(
            "PATCH",
            &format!("{}/initiate-completion", session_uri),
            Some(&mentee_token),
            json!({ "skills": [{ "name": "React" }] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        json_request(
            "PATCH",
            &format!("{}/initiate-completion", session_uri),
            Some(&mentor_token),
            json!({ "notes": "Covered useEffect", "skills": [{ "name": "React" }] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "pending_verification");

    let (_, body) = send(&app, empty_request("GET", "/api/skills", &mentee_token)).await;
    assert_eq!(body["data"][0]["name"], "React");
    assert_eq!(body["data"][0]["progress"], 10);
    assert_eq!(body["data"][0]["status"], "learning");

    let approve_uri = format!("{}/approve", session_uri);
    let (status, body) = send(
        &app,
        json_request("PATCH", &approve_uri, Some(&mentor_token), json!({ "approved": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["completed"], false);
    assert_eq!(body["data"]["awaiting"], "mentee");

    let (status, body) = send(
        &app,
        json_request(
            "PATCH",
            &approve_uri,
            Some(&mentee_token),
            json!({ "approved": true, "actualDuration": 55 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["completed"], true);
    assert_eq!(body["data"]["session"]["status"], "completed");
    assert_eq!(body["data"]["session"]["verificationStatus"], "both_approved");
    assert_eq!(body["data"]["session"]["actualDuration"], 55);
    let completed_at = body["data"]["session"]["completedAt"].clone();

    // A late approval is refused and does not restamp the completion.
    let (status, _) = send(
        &app,
        json_request("PATCH", &approve_uri, Some(&mentor_token), json!({ "approved": true })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (_, body) = send(&app, empty_request("GET", &session_uri, &mentor_token)).await;
    assert_eq!(body["data"]["completedAt"], completed_at);

    let (_, body) = send(&app, empty_request("GET", "/api/progress", &mentee_token)).await;
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["type"], "session_completed");
    assert_eq!(entries[0]["metrics"]["skillNames"], json!(["React"]));
}

#[tokio::test]
async fn rejection_leaves_session_disputed() {
    let app = make_app();
    let (mentee_token, _) = register(&app, "Mia", "mia@example.com", "mentee").await;
    let (mentor_token, mentor_id) = register(&app, "Theo", "theo@example.com", "mentor").await;
    let session = book(&app, &mentee_token, &mentor_id, "chat").await;
    assert!(session["meetingLink"].is_null());
    let session_uri = format!("/api/sessions/{}", session["id"].as_str().unwrap());

    send(
        &app,
        json_request(
            "PATCH",
            &format!("{}/initiate-completion", session_uri),
            Some(&mentor_token),
            json!({}),
        ),
    )
    .await;
    let (status, body) = send(
        &app,
        json_request(
            "PATCH",
            &format!("{}/approve", session_uri),
            Some(&mentee_token),
            json!({ "approved": false, "notes": "Mentor never joined" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["completed"], false);
    assert_eq!(body["data"]["session"]["status"], "pending_verification");
    assert_eq!(body["data"]["session"]["verificationStatus"], "disputed");
    assert_eq!(body["data"]["session"]["menteeApproval"]["approved"], false);
    assert!(body["data"]["session"]["menteeApproval"]["approvedAt"].is_string());
}

#[tokio::test]
async fn direct_completion_cancel_and_status_updates() {
    let app = make_app();
    let (mentee_token, _) = register(&app, "Mia", "mia@example.com", "mentee").await;
    let (mentor_token, mentor_id) = register(&app, "Theo", "theo@example.com", "mentor").await;

    let first = book(&app, &mentee_token, &mentor_id, "audio").await;
    let first_uri = format!("/api/sessions/{}", first["id"].as_str().unwrap());
    let (status, body) = send(
        &app,
        json_request(
            "PATCH",
            &format!("{}/complete", first_uri),
            Some(&mentor_token),
            json!({ "skills": [{ "name": "Rust", "category": "programming" }], "actualDuration": 60 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(body["data"]["verificationStatus"], "direct_completion");

    // Completed sessions cannot be cancelled.
    let (status, _) = send(
        &app,
        empty_request("PATCH", &format!("{}/cancel", first_uri), &mentee_token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let second = book(&app, &mentee_token, &mentor_id, "video").await;
    let second_uri = format!("/api/sessions/{}", second["id"].as_str().unwrap());

    let (status, _) = send(
        &app,
        json_request(
            "PATCH",
            &format!("{}/status", second_uri),
            Some(&mentee_token),
            json!({ "status": "missed" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        json_request(
            "PATCH",
            &format!("{}/status", second_uri),
            Some(&mentor_token),
            json!({ "status": "completed" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        json_request(
            "PATCH",
            &format!("{}/cancel", second_uri),
            Some(&mentee_token),
            json!({ "reason": "Sick" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "cancelled");
    assert_eq!(body["data"]["cancellationReason"], "Sick");

    let (status, body) = send(
        &app,
        empty_request("PATCH", &format!("{}/cancel", second_uri), &mentor_token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Session is already cancelled");

    let (_, body) = send(&app, empty_request("GET", "/api/sessions", &mentor_token)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn booking_input_is_validated() {
    let app = make_app();
    let (mentee_token, mentee_id) = register(&app, "Mia", "mia@example.com", "mentee").await;
    let (_, mentor_id) = register(&app, "Theo", "theo@example.com", "mentor").await;

    let base = json!({
        "mentorId": mentor_id,
        "topic": "Career",
        "sessionType": "video",
        "date": "2026-11-02",
        "startTime": "10:00",
        "endTime": "11:00",
    });
    let cases = [
        ("date", json!("02/11/2026")),
        ("endTime", json!("09:00")),
        ("sessionType", json!("hologram")),
        ("price", json!(-5)),
        ("mentorId", json!(mentee_id)),
    ];
    for (field, value) in cases {
        let mut body = base.clone();
        body[field] = value;
        let (status, resp) = send(
            &app,
            json_request("POST", "/api/sessions/book", Some(&mentee_token), body),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{} should be rejected: {}", field, resp);
        assert_eq!(resp["success"], false);
    }
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = make_app();
    let req = Request::get("/api-docs/openapi.json")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/sessions/book"].is_object());
}
