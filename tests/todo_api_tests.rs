//! End-to-end tests of the todo endpoints through the full router
//! (CORS, recovery, logging, auth gate, handlers, services, in-memory store).

use chrono::{DateTime, Utc};
use http::{Method, StatusCode};
use serde_json::json;

mod common;
use common::TestApp;

fn create(app: &TestApp, session: &str, title: &str) -> i64 {
    let res = app.call(
        Method::POST,
        "/todos",
        Some(session),
        Some(json!({ "title": title })),
    );
    assert_eq!(res.status, StatusCode::CREATED, "{:?}", res.body_json());
    res.body_json()["id"].as_i64().unwrap()
}

#[test]
fn test_create_and_get() {
    let app = TestApp::new();
    let alice = app.login("alice");

    let res = app.call(
        Method::POST,
        "/todos",
        Some(&alice),
        Some(json!({ "title": "Buy milk", "description": "2 litres" })),
    );
    assert_eq!(res.status, StatusCode::CREATED);
    let body = res.body_json();
    assert_eq!(body["title"], "Buy milk");
    assert_eq!(body["description"], "2 litres");
    assert_eq!(body["completed"], false);
    assert!(body.get("deleted_at").is_none());

    let id = body["id"].as_i64().unwrap();
    let res = app.call(Method::GET, &format!("/todos/{id}"), Some(&alice), None);
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body_json()["id"], id);
}

#[test]
fn test_empty_title_is_rejected() {
    let app = TestApp::new();
    let alice = app.login("alice");

    for body in [
        json!({ "title": "" }),
        json!({ "title": "   ", "description": "still no title" }),
        json!({ "description": "no title at all" }),
    ] {
        let res = app.call(Method::POST, "/todos", Some(&alice), Some(body));
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert_eq!(res.body_json()["error"], "Title is required");
    }
}

#[test]
fn test_malformed_body_and_id() {
    let app = TestApp::new();
    let alice = app.login("alice");

    let res = app.send(
        todo_api::server::Request::new(Method::POST, "/todos")
            .with_header("Cookie", &alice)
            .with_body("{not json"),
    );
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body_json()["error"], "Invalid request body");

    for bad in ["abc", "-4", "1.5"] {
        let res = app.call(Method::GET, &format!("/todos/{bad}"), Some(&alice), None);
        assert_eq!(res.status, StatusCode::BAD_REQUEST, "{bad}");
        assert_eq!(res.body_json()["error"], "Invalid ID");
    }

    // Zero is a well-formed id that simply matches nothing.
    let res = app.call(Method::GET, "/todos/0", Some(&alice), None);
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body_json()["error"], "Todo not found");
}

#[test]
fn test_todos_are_isolated_between_users() {
    let app = TestApp::new();
    let alice = app.login("alice");
    let bob = app.login("bob");
    let id = create(&app, &alice, "alice's secret");

    let res = app.call(Method::GET, &format!("/todos/{id}"), Some(&bob), None);
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body_json()["error"], "Todo not found");

    let res = app.call(
        Method::PUT,
        &format!("/todos/{id}"),
        Some(&bob),
        Some(json!({ "title": "hijacked" })),
    );
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = app.call(Method::DELETE, &format!("/todos/{id}"), Some(&bob), None);
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = app.call(Method::GET, "/todos", Some(&bob), None);
    assert_eq!(res.body_json(), json!([]));

    let res = app.call(Method::GET, &format!("/todos/{id}"), Some(&alice), None);
    assert_eq!(res.body_json()["title"], "alice's secret");
}

#[test]
fn test_list_is_newest_first() {
    let app = TestApp::new();
    let alice = app.login("alice");
    let first = create(&app, &alice, "first");
    let second = create(&app, &alice, "second");

    let res = app.call(Method::GET, "/todos", Some(&alice), None);
    assert_eq!(res.status, StatusCode::OK);
    let ids: Vec<i64> = res
        .body_json()
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![second, first]);
}

#[test]
fn test_partial_update_keeps_other_fields() {
    let app = TestApp::new();
    let alice = app.login("alice");
    let res = app.call(
        Method::POST,
        "/todos",
        Some(&alice),
        Some(json!({ "title": "Write report", "description": "Q3 numbers" })),
    );
    let created = res.body_json();
    let id = created["id"].as_i64().unwrap();

    let res = app.call(
        Method::PUT,
        &format!("/todos/{id}"),
        Some(&alice),
        Some(json!({ "completed": true })),
    );
    assert_eq!(res.status, StatusCode::OK);
    let updated = res.body_json();
    assert_eq!(updated["completed"], true);
    assert_eq!(updated["title"], "Write report");
    assert_eq!(updated["description"], "Q3 numbers");
    let stamp = |v: &serde_json::Value| v.as_str().unwrap().parse::<DateTime<Utc>>().unwrap();
    assert!(stamp(&updated["updated_at"]) >= stamp(&created["updated_at"]));

    let res = app.call(
        Method::PUT,
        &format!("/todos/{id}"),
        Some(&alice),
        Some(json!({ "title": "" })),
    );
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[test]
fn test_delete_twice() {
    let app = TestApp::new();
    let alice = app.login("alice");
    let id = create(&app, &alice, "ephemeral");

    let res = app.call(Method::DELETE, &format!("/todos/{id}"), Some(&alice), None);
    assert_eq!(res.status, StatusCode::NO_CONTENT);
    assert!(res.body.is_empty());

    let res = app.call(Method::DELETE, &format!("/todos/{id}"), Some(&alice), None);
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[test]
fn test_batch_complete_reports_partial_success() {
    let app = TestApp::new();
    let alice = app.login("alice");
    let id = create(&app, &alice, "only one");

    let res = app.call(
        Method::POST,
        "/todos/batch-complete",
        Some(&alice),
        Some(json!({ "ids": [id, 999] })),
    );
    assert_eq!(res.status, StatusCode::OK);
    let body = res.body_json();
    let succeeded = body["succeeded"].as_array().unwrap();
    assert_eq!(succeeded.len(), 1);
    assert_eq!(succeeded[0]["id"], id);
    assert_eq!(succeeded[0]["completed"], true);
    assert_eq!(body["failed"], json!([{ "id": 999, "error": "Todo not found" }]));
}

#[test]
fn test_batch_delete_and_limits() {
    let app = TestApp::new();
    let alice = app.login("alice");
    let a = create(&app, &alice, "a");
    let b = create(&app, &alice, "b");

    let res = app.call(
        Method::POST,
        "/todos/batch-delete",
        Some(&alice),
        Some(json!({ "ids": [a, b, a] })),
    );
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body_json(), json!({ "succeeded": [a, b], "failed": [] }));

    let res = app.call(
        Method::POST,
        "/todos/batch-delete",
        Some(&alice),
        Some(json!({ "ids": [] })),
    );
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body_json()["error"], "IDs are required");

    let too_many: Vec<i64> = (1..=101).collect();
    let res = app.call(
        Method::POST,
        "/todos/batch-complete",
        Some(&alice),
        Some(json!({ "ids": too_many })),
    );
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body_json()["error"], "Too many IDs (max 100)");
}

#[test]
fn test_batch_routes_win_over_id_route() {
    let app = TestApp::new();
    let alice = app.login("alice");
    // Registered before `/todos/{id}`, so "batch-delete" is never parsed as an id.
    let res = app.call(
        Method::POST,
        "/todos/batch-delete",
        Some(&alice),
        Some(json!({ "ids": [1] })),
    );
    assert_eq!(res.status, StatusCode::OK);
}

#[test]
fn test_todo_routes_require_session() {
    let app = TestApp::new();
    for (method, path) in [
        (Method::GET, "/todos"),
        (Method::POST, "/todos"),
        (Method::GET, "/todos/1"),
        (Method::PUT, "/todos/1"),
        (Method::DELETE, "/todos/1"),
        (Method::POST, "/todos/batch-complete"),
        (Method::POST, "/todos/batch-delete"),
    ] {
        let res = app.call(method.clone(), path, None, Some(json!({ "title": "x" })));
        assert_eq!(res.status, StatusCode::UNAUTHORIZED, "{method} {path}");
        assert_eq!(res.body_json()["error"], "Unauthorized");
    }
}

#[test]
fn test_public_endpoints() {
    let app = TestApp::new();

    let res = app.call(Method::GET, "/", None, None);
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body_json()["message"], "Todo API");
    assert_eq!(res.body_json()["version"], env!("CARGO_PKG_VERSION"));

    let res = app.call(Method::GET, "/health", None, None);
    assert_eq!(res.body_json(), json!({ "status": "ok" }));

    let res = app.call(Method::GET, "/nope", None, None);
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body_json()["path"], "/nope");
}
