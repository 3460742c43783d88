//! Integration tests for the setlist REST API
//!
//! Every test builds the full router over a private in-memory database and
//! drives it with `oneshot`.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use setlist_common::config::ServerConfig;
use setlist_common::db::init::init_memory_database;
use setlist_server::{build_router, AppState};
use tower::util::ServiceExt; // for `oneshot` method

async fn setup_app() -> Router {
    let db = init_memory_database().await.expect("in-memory database");
    let config = ServerConfig {
        tos_path: "does-not-exist/tos.md".into(),
        ..ServerConfig::default()
    };
    build_router(AppState::new(db, &config))
}

async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

/// Registers a user and returns (user id, token)
async fn register(app: &Router, name: &str) -> (String, String) {
    let (status, body) = send(
        app,
        "POST",
        "/api/users",
        None,
        Some(json!({ "name": name, "email": format!("{}@example.com", name.to_lowercase()) })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    (
        body["user"]["id"].as_str().unwrap().to_string(),
        body["token"].as_str().unwrap().to_string(),
    )
}

async fn create_song(app: &Router, token: &str, artist: &str, title: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/songs",
        Some(token),
        Some(json!({ "original_artist": artist, "title": title, "key_signature": "E" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

async fn create_setlist(app: &Router, token: &str, name: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/setlists",
        Some(token),
        Some(json!({ "name": name })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

// =============================================================================
// Public endpoints
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_no_auth_required() {
    let app = setup_app().await;
    let (status, body) = send(&app, "GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "setlist-server");
    assert_eq!(body["database"], true);
}

#[tokio::test]
async fn test_missing_tos_is_not_found() {
    let app = setup_app().await;
    let (status, _) = send(&app, "GET", "/tos", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = setup_app().await;
    let (status, _) = send(&app, "GET", "/api/does-not-exist", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = setup_app().await;

    let (status, body) = send(&app, "GET", "/api/songs", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = send(&app, "GET", "/api/songs", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_first_user_is_admin_and_token_works() {
    let app = setup_app().await;
    let (_, admin_token) = register(&app, "Freddie").await;
    let (_, member_token) = register(&app, "Brian").await;

    let (status, me) = send(&app, "GET", "/api/users/me", Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["name"], "Freddie");
    assert_eq!(me["user_level"], 3);

    let (_, me) = send(&app, "GET", "/api/users/me", Some(&member_token), None).await;
    assert_eq!(me["user_level"], 1);
}

#[tokio::test]
async fn test_rotated_token_replaces_old_one() {
    let app = setup_app().await;
    let (_, token) = register(&app, "Freddie").await;

    let (status, body) = send(&app, "POST", "/api/users/me/token", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let new_token = body["token"].as_str().unwrap().to_string();

    let (status, _) = send(&app, "GET", "/api/users/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, "GET", "/api/users/me", Some(&new_token), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_duplicate_email_registration_conflicts() {
    let app = setup_app().await;
    register(&app, "Freddie").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/users",
        None,
        Some(json!({ "name": "Other", "email": "freddie@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

// =============================================================================
// Songs
// =============================================================================

#[tokio::test]
async fn test_duplicate_song_returns_conflict_message() {
    let app = setup_app().await;
    let (_, token) = register(&app, "Freddie").await;
    create_song(&app, &token, "Queen", "Somebody to Love").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/songs",
        Some(&token),
        Some(json!({ "original_artist": "queen", "title": "somebody to love" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        body["error"]["message"],
        "A song with this title and artist already exists."
    );
}

#[tokio::test]
async fn test_members_cannot_add_songs() {
    let app = setup_app().await;
    register(&app, "Freddie").await;
    let (_, member) = register(&app, "Brian").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/songs",
        Some(&member),
        Some(json!({ "original_artist": "Queen", "title": "Bicycle Race" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_song_search() {
    let app = setup_app().await;
    let (_, token) = register(&app, "Freddie").await;
    create_song(&app, &token, "Queen", "Bohemian Rhapsody").await;
    create_song(&app, &token, "The Beatles", "Yesterday").await;

    let (status, body) = send(&app, "GET", "/api/songs?search=rhaps", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let songs = body.as_array().unwrap();
    assert_eq!(songs.len(), 1);
    assert_eq!(songs[0]["title"], "Bohemian Rhapsody");
}

// =============================================================================
// Setlists and sets
// =============================================================================

#[tokio::test]
async fn test_song_used_twice_in_setlist_reports_duplicates() {
    let app = setup_app().await;
    let (_, token) = register(&app, "Freddie").await;
    let song = create_song(&app, &token, "Queen", "Radio Ga Ga").await;
    let setlist = create_setlist(&app, &token, "Live Aid").await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/setlists/{}/sets", setlist),
        Some(&token),
        Some(json!({ "name": "Set 1", "song_ids": [song] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/setlists/{}/sets", setlist),
        Some(&token),
        Some(json!({ "name": "Set 2", "song_ids": [song] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "DUPLICATES_FOUND");
    assert_eq!(body["error"]["duplicates"][0]["set_name"], "Set 1");
    assert_eq!(body["error"]["duplicates"][0]["title"], "Radio Ga Ga");

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/setlists/{}/sets", setlist),
        Some(&token),
        Some(json!({ "name": "Set 2", "song_ids": [song], "force": true })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["set_order"], 1);
}

#[tokio::test]
async fn test_setlist_detail_lists_sets_in_order() {
    let app = setup_app().await;
    let (_, token) = register(&app, "Freddie").await;
    let a = create_song(&app, &token, "Queen", "Under Pressure").await;
    let b = create_song(&app, &token, "Queen", "We Will Rock You").await;
    let setlist = create_setlist(&app, &token, "Wembley").await;

    for (name, song) in [("Opening", &a), ("Encore", &b)] {
        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/setlists/{}/sets", setlist),
            Some(&token),
            Some(json!({ "name": name, "song_ids": [song] })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(&app, "GET", &format!("/api/setlists/{}", setlist), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Wembley");
    let sets = body["sets"].as_array().unwrap();
    assert_eq!(sets.len(), 2);
    assert_eq!(sets[0]["name"], "Opening");
    assert_eq!(sets[1]["songs"][0]["title"], "We Will Rock You");

    let (_, list) = send(&app, "GET", "/api/setlists", Some(&token), None).await;
    assert_eq!(list[0]["set_count"], 2);
    assert_eq!(list[0]["song_count"], 2);
}

#[tokio::test]
async fn test_deleted_setlist_is_not_listed() {
    let app = setup_app().await;
    let (_, token) = register(&app, "Freddie").await;
    let setlist = create_setlist(&app, &token, "Montreal").await;

    let (status, _) = send(&app, "DELETE", &format!("/api/setlists/{}", setlist), Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, "GET", "/api/setlists", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 0);

    let (status, _) = send(&app, "GET", &format!("/api/setlists/{}", setlist), Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_private_setlist_hidden_from_others() {
    let app = setup_app().await;
    let (_, owner) = register(&app, "Freddie").await;
    let (_, other) = register(&app, "Brian").await;
    let setlist = create_setlist(&app, &owner, "Secret Gig").await;

    let (status, _) = send(&app, "GET", &format!("/api/setlists/{}", setlist), Some(&other), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, list) = send(&app, "GET", "/api/setlists", Some(&other), None).await;
    assert_eq!(list.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_duplicate_setlist_name_conflicts() {
    let app = setup_app().await;
    let (_, token) = register(&app, "Freddie").await;
    create_setlist(&app, &token, "Budokan").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/setlists",
        Some(&token),
        Some(json!({ "name": "Budokan" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["message"], "A setlist with this name already exists.");
}

#[tokio::test]
async fn test_set_from_template() {
    let app = setup_app().await;
    let (_, token) = register(&app, "Freddie").await;
    let a = create_song(&app, &token, "Queen", "Killer Queen").await;
    let b = create_song(&app, &token, "Queen", "Now I'm Here").await;
    let setlist = create_setlist(&app, &token, "Rainbow").await;

    let (status, template) = send(
        &app,
        "POST",
        "/api/set-templates",
        Some(&token),
        Some(json!({ "name": "Classic opener", "song_ids": [b, a] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{template}");
    assert_eq!(template["kind"], "template");

    let (status, set) = send(
        &app,
        "POST",
        &format!("/api/setlists/{}/sets", setlist),
        Some(&token),
        Some(json!({
            "name": "Set 1",
            "source": { "kind": "template", "id": template["id"] },
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{set}");
    let titles: Vec<&str> = set["songs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Now I'm Here", "Killer Queen"]);
}

#[tokio::test]
async fn test_export_pdf() {
    let app = setup_app().await;
    let (_, token) = register(&app, "Freddie").await;
    let setlist = create_setlist(&app, &token, "Hyde Park").await;

    let request = Request::builder()
        .uri(format!("/api/setlists/{}/export.pdf", setlist))
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/pdf"
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.starts_with(b"%PDF"));
}
