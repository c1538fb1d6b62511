//! End-to-end tests driving the full router

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::{build_router, AppState};
use crate::config::{AdminConfig, Config};
use crate::db::{create_test_pool, migrations};
use crate::services::WritePolicy;

const PASSWORD: &str = "Correct-Horse-42";

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

async fn app_with(config: Config) -> (Router, AppState) {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    migrations::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let state = AppState::from_config(pool, &config);
    let router = build_router(state.clone(), "http://localhost:3000").unwrap();
    (router, state)
}

async fn app() -> (Router, AppState) {
    app_with(Config::default()).await
}

async fn call(app: &Router, request: Request<Body>) -> Reply {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    Reply {
        status,
        headers,
        body,
    }
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<&Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Token {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Reply {
    call(app, request(method, uri, token, body.as_ref())).await
}

/// Register an account and return `(pk, token)`
async fn register(app: &Router, email: &str, first_name: &str) -> (i64, String) {
    let reply = send(
        app,
        Method::POST,
        "/api/register",
        None,
        Some(json!({
            "email": email,
            "password": PASSWORD,
            "first_name": first_name,
            "last_name": "Tester",
        })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);

    let pk = reply.body["user"]["pk"].as_i64().unwrap();
    let token = reply.body["token"].as_str().unwrap().to_string();
    (pk, token)
}

async fn login(app: &Router, email: &str, password: &str) -> Reply {
    send(
        app,
        Method::POST,
        "/api/login",
        None,
        Some(json!({ "username": email, "password": password })),
    )
    .await
}

/// Bootstrap a superuser and log them in, returning their token
async fn superuser_token(app: &Router, state: &AppState) -> String {
    let admin = AdminConfig {
        email: Some("root@example.com".to_string()),
        password: Some(PASSWORD.to_string()),
        ..AdminConfig::default()
    };
    state
        .user_service
        .ensure_superuser(&admin)
        .await
        .unwrap()
        .expect("admin is configured");

    let reply = login(app, "root@example.com", PASSWORD).await;
    assert_eq!(reply.status, StatusCode::OK);
    reply.body["token"].as_str().unwrap().to_string()
}

async fn create_post(app: &Router, token: &str, title: &str, content: &str) -> Value {
    let reply = send(
        app,
        Method::POST,
        "/api/blog",
        Some(token),
        Some(json!({ "title": title, "content": content })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    reply.body
}

#[tokio::test]
async fn test_register_returns_user_message_and_token() {
    let (app, _) = app().await;

    let reply = send(
        &app,
        Method::POST,
        "/api/register",
        None,
        Some(json!({
            "email": "ann@example.com",
            "password": PASSWORD,
            "first_name": "Ann",
            "last_name": "Lee",
        })),
    )
    .await;

    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.body["message"], "User created");
    assert_eq!(reply.body["user"]["username"], "ann@example.com");
    assert_eq!(reply.body["user"]["first_name"], "Ann");
    assert!(reply.body["user"].get("password").is_none());
    assert!(reply.body["user"].get("password_hash").is_none());
    assert_eq!(reply.body["token"].as_str().unwrap().len(), 64);
}

#[tokio::test]
async fn test_register_reports_field_errors_and_creates_nothing() {
    let (app, _) = app().await;

    let reply = send(
        &app,
        Method::POST,
        "/api/register",
        None,
        Some(json!({
            "email": "not-an-email",
            "password": "123",
            "first_name": "John3",
            "last_name": "",
        })),
    )
    .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"]["code"], "VALIDATION_ERROR");
    let details = &reply.body["error"]["details"];
    for field in ["email", "password", "first_name", "last_name"] {
        assert!(details[field].is_array(), "missing errors for {field}");
    }

    let reply = send(&app, Method::POST, "/api/login", None, Some(json!({
        "username": "not-an-email",
        "password": "123",
    })))
    .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let (app, _) = app().await;
    register(&app, "ann@example.com", "Ann").await;

    let reply = send(
        &app,
        Method::POST,
        "/api/register",
        None,
        Some(json!({
            "email": "ANN@example.com",
            "password": PASSWORD,
            "first_name": "Ann",
            "last_name": "Lee",
        })),
    )
    .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        reply.body["error"]["details"]["email"][0],
        "This field must be unique."
    );
}

#[tokio::test]
async fn test_cross_user_update_flow() {
    let (app, state) = app().await;
    let (author_pk, author) = register(&app, "ann@example.com", "Ann").await;
    let (_, other) = register(&app, "bob@example.com", "Bob").await;
    let admin = superuser_token(&app, &state).await;

    let post = create_post(&app, &author, "Hello", "<p>World</p>").await;
    assert_eq!(post["author"]["pk"], author_pk);
    let uri = format!("/api/blog/{}", post["pk"]);

    let reply = send(
        &app,
        Method::PUT,
        &uri,
        Some(&other),
        Some(json!({ "title": "Hijacked", "content": "<p>x</p>" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.body["error"]["code"], "FORBIDDEN");

    let reply = send(
        &app,
        Method::PUT,
        &uri,
        None,
        Some(json!({ "title": "Anon", "content": "<p>x</p>" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let reply = send(
        &app,
        Method::PUT,
        &uri,
        Some(&author),
        Some(json!({ "title": "Hello again", "content": "<p>Edited</p>" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["title"], "Hello again");
    assert_eq!(reply.body["author"]["pk"], author_pk);

    let reply = send(
        &app,
        Method::PATCH,
        &uri,
        Some(&admin),
        Some(json!({ "title": "Moderated" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["title"], "Moderated");
    assert_eq!(reply.body["content"], "<p>Edited</p>");
    assert_eq!(reply.body["author"]["pk"], author_pk);

    let reply = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(reply.body["title"], "Moderated");
}

#[tokio::test]
async fn test_missing_post_is_not_found_before_auth() {
    let (app, _) = app().await;

    let reply = send(
        &app,
        Method::PATCH,
        "/api/blog/9999",
        None,
        Some(json!({ "title": "x" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    let reply = send(&app, Method::GET, "/api/blog/not-a-number", None, None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_update_body_checks_permission_first() {
    let (app, _) = app().await;
    let (_, author) = register(&app, "ann@example.com", "Ann").await;
    let (_, other) = register(&app, "bob@example.com", "Bob").await;
    let post = create_post(&app, &author, "Hello", "<p>World</p>").await;
    let uri = format!("/api/blog/{}", post["pk"]);

    let broken = |token: &str| {
        Request::builder()
            .method(Method::PUT)
            .uri(&uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap()
    };

    assert_eq!(call(&app, broken(&other)).await.status, StatusCode::FORBIDDEN);

    let reply = call(&app, broken(&author)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_create_requires_valid_token() {
    let (app, _) = app().await;
    let body = json!({ "title": "Hello", "content": "<p>World</p>" });

    let reply = send(&app, Method::POST, "/api/blog", None, Some(body.clone())).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let bogus = "f".repeat(64);
    let reply = send(&app, Method::POST, "/api/blog", Some(&bogus), Some(body)).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let reply = send(&app, Method::GET, "/api/blog", None, None).await;
    assert_eq!(reply.body, json!([]));
}

#[tokio::test]
async fn test_content_is_sanitized_and_author_is_server_assigned() {
    let (app, _) = app().await;
    let (author_pk, author) = register(&app, "ann@example.com", "Ann").await;
    let (other_pk, _) = register(&app, "bob@example.com", "Bob").await;

    let reply = send(
        &app,
        Method::POST,
        "/api/blog",
        Some(&author),
        Some(json!({
            "title": "  Sneaky  ",
            "content": r#"<p onclick="steal()">Hi<script>alert(1)</script> <a href="javascript:evil()">x</a> <a href="https://example.com">ok</a></p>"#,
            "author": other_pk,
            "created": "2000-01-01T00:00:00Z",
        })),
    )
    .await;

    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.body["author"]["pk"], author_pk);
    assert_eq!(reply.body["title"], "Sneaky");
    assert_ne!(reply.body["created"], "2000-01-01T00:00:00Z");

    let content = reply.body["content"].as_str().unwrap();
    assert!(!content.contains("script"));
    assert!(!content.contains("onclick"));
    assert!(!content.contains("javascript:"));
    assert!(content.contains(r#"href="https://example.com""#));
}

#[tokio::test]
async fn test_blank_post_fields_are_rejected() {
    let (app, _) = app().await;
    let (_, author) = register(&app, "ann@example.com", "Ann").await;

    let reply = send(
        &app,
        Method::POST,
        "/api/blog",
        Some(&author),
        Some(json!({ "title": "   ", "content": "<script>only()</script>" })),
    )
    .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let details = &reply.body["error"]["details"];
    assert!(details["title"].is_array());
    assert!(details["content"].is_array());
}

#[tokio::test]
async fn test_list_search_and_detail_are_public() {
    let (app, _) = app().await;
    let (_, author) = register(&app, "ann@example.com", "Ann").await;
    let first = create_post(&app, &author, "Ownership", "<p>Borrowing rules</p>").await;
    create_post(&app, &author, "Gardening", "<p>Tomatoes</p>").await;

    let reply = send(&app, Method::GET, "/api/blog", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    let titles: Vec<&str> = reply
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|post| post["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, ["Gardening", "Ownership"]);

    let reply = send(&app, Method::GET, "/api/blog?search=BORROW", None, None).await;
    assert_eq!(reply.body.as_array().unwrap().len(), 1);
    assert_eq!(reply.body[0]["pk"], first["pk"]);

    let uri = format!("/api/blog/{}", first["pk"]);
    let reply = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["author"]["email"], "ann@example.com");
}

#[tokio::test]
async fn test_delete_post() {
    let (app, _) = app().await;
    let (_, author) = register(&app, "ann@example.com", "Ann").await;
    let (_, other) = register(&app, "bob@example.com", "Bob").await;
    let post = create_post(&app, &author, "Hello", "<p>World</p>").await;
    let uri = format!("/api/blog/{}", post["pk"]);

    let reply = send(&app, Method::DELETE, &uri, Some(&other), None).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = send(&app, Method::DELETE, &uri, Some(&author), None).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);

    let reply = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_author_only_policy_denies_superuser() {
    let mut config = Config::default();
    config.blog.write_policy = WritePolicy::AuthorOnly;
    let (app, state) = app_with(config).await;

    let (_, author) = register(&app, "ann@example.com", "Ann").await;
    let admin = superuser_token(&app, &state).await;
    let post = create_post(&app, &author, "Hello", "<p>World</p>").await;

    let reply = send(
        &app,
        Method::PATCH,
        &format!("/api/blog/{}", post["pk"]),
        Some(&admin),
        Some(json!({ "title": "Moderated" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_login_sets_cookie_and_logout_revokes() {
    let (app, _) = app().await;
    register(&app, "ann@example.com", "Ann").await;

    let reply = login(&app, "ann@example.com", PASSWORD).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["user"]["email"], "ann@example.com");
    assert!(reply.body["expiry"].is_string());
    let token = reply.body["token"].as_str().unwrap().to_string();

    let cookie = reply.headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with(&format!("session={token};")));
    assert!(cookie.contains("HttpOnly"));

    let by_cookie = Request::builder()
        .uri("/api/users")
        .header(header::COOKIE, format!("session={token}"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(call(&app, by_cookie).await.status, StatusCode::OK);

    let reply = send(&app, Method::POST, "/api/logout", Some(&token), None).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    let cleared = reply.headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cleared.contains("Max-Age=0"));

    let reply = send(&app, Method::GET, "/api/users", Some(&token), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_failures() {
    let (app, _) = app().await;
    register(&app, "ann@example.com", "Ann").await;

    let wrong = login(&app, "ann@example.com", "wrong-password").await;
    let unknown = login(&app, "nobody@example.com", PASSWORD).await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.body["error"]["message"], unknown.body["error"]["message"]);
    assert!(wrong.headers.get(header::SET_COOKIE).is_none());

    let blank = login(&app, "", "").await;
    assert_eq!(blank.status, StatusCode::BAD_REQUEST);

    let malformed = Request::builder()
        .method(Method::POST)
        .uri("/api/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"username\":"))
        .unwrap();
    let reply = call(&app, malformed).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_logout_all_revokes_every_token() {
    let (app, _) = app().await;
    let (_, first) = register(&app, "ann@example.com", "Ann").await;
    let second = login(&app, "ann@example.com", PASSWORD).await.body["token"]
        .as_str()
        .unwrap()
        .to_string();

    let reply = send(&app, Method::POST, "/api/logout/all", Some(&first), None).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);

    for token in [&first, &second] {
        let reply = send(&app, Method::GET, "/api/users", Some(token), None).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_list_users_requires_auth() {
    let (app, _) = app().await;
    let (_, token) = register(&app, "ann@example.com", "Ann").await;
    register(&app, "bob@example.com", "Bob").await;

    let reply = send(&app, Method::GET, "/api/users", None, None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let reply = send(&app, Method::GET, "/api/users", Some(&token), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    let users = reply.body.as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert!(users.iter().all(|user| user.get("password_hash").is_none()));
}
