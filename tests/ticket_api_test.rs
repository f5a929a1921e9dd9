use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use ticketserver::build_router;
use ticketserver::directory::{StaticDirectory, UserRole};
use ticketserver::shared::state::AppState;
use ticketserver::tickets::service::TicketService;
use ticketserver::tickets::store::MemoryTicketStore;

struct TestApp {
    router: Router,
    reporter: Uuid,
    agent: Uuid,
}

fn test_app() -> TestApp {
    let store = Arc::new(MemoryTicketStore::new());
    let directory = Arc::new(StaticDirectory::new());
    let reporter = directory.add("rita", "rita@example.com", UserRole::User).id;
    let agent = directory.add("sam", "sam@example.com", UserRole::Agent).id;
    let service = Arc::new(TicketService::new(store, directory.clone()));
    let state = Arc::new(AppState { service, directory });
    TestApp {
        router: build_router(state),
        reporter,
        agent,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("infallible router");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("JSON body")
    };
    (status, body)
}

fn post(uri: &str, actor: Uuid, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-user-id", actor.to_string())
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn put(uri: &str, actor: Uuid, body: Value) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-user-id", actor.to_string())
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

async fn create_ticket(app: &TestApp) -> Value {
    let (status, body) = send(
        &app.router,
        post(
            "/api/tickets",
            app.reporter,
            json!({
                "title": "Broken login",
                "description": "500 on submit",
                "priority": "high",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

#[tokio::test]
async fn create_returns_a_fully_populated_view() {
    let app = test_app();
    let ticket = create_ticket(&app).await;

    assert_eq!(ticket["status"], "open");
    assert_eq!(ticket["priority"], "high");
    assert_eq!(ticket["version"], 1);
    assert_eq!(ticket["is_sla_breached"], false);
    assert!(ticket["sla_due_date"].is_string());
    assert_eq!(ticket["created_by"]["username"], "rita");
    assert_eq!(ticket["comments_count"], 0);
    assert_eq!(ticket["latest_comment"], Value::Null);
}

#[tokio::test]
async fn requests_without_an_actor_are_rejected() {
    let app = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/tickets")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"title": "t", "description": "d"}).to_string(),
        ))
        .expect("request");
    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("x-user-id"));
}

#[tokio::test]
async fn blank_title_is_a_validation_error() {
    let app = test_app();
    let (status, body) = send(
        &app.router,
        post(
            "/api/tickets",
            app.reporter,
            json!({"title": "  ", "description": "d"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Validation error: Title is required");
}

#[tokio::test]
async fn stale_update_yields_a_structured_conflict() {
    let app = test_app();
    let ticket = create_ticket(&app).await;
    let uri = format!("/api/tickets/{}", ticket["id"].as_str().unwrap());

    let (status, _) = send(
        &app.router,
        put(&uri, app.agent, json!({"status": "in_progress", "version": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app.router,
        put(&uri, app.reporter, json!({"status": "closed", "version": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "version_conflict");
    assert_eq!(body["expected"], 2);
    assert_eq!(body["supplied"], 1);
    assert!(body["error"].as_str().unwrap().contains("refresh"));

    // The losing write changed nothing.
    let (status, stored) = send(&app.router, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["status"], "in_progress");
    assert_eq!(stored["version"], 2);
}

#[tokio::test]
async fn assignment_round_trips_with_usernames() {
    let app = test_app();
    let ticket = create_ticket(&app).await;
    let uri = format!("/api/tickets/{}", ticket["id"].as_str().unwrap());

    let (status, updated) = send(
        &app.router,
        put(
            &uri,
            app.agent,
            json!({"assigned_to": app.agent.to_string(), "version": 1}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["assigned_to"]["username"], "sam");

    // Explicit null clears the assignment.
    let (status, cleared) = send(
        &app.router,
        put(&uri, app.agent, json!({"assigned_to": null, "version": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["assigned_to"], Value::Null);
    assert_eq!(cleared["version"], 3);

    let timeline_uri = format!("{uri}/timeline");
    let (_, timeline) = send(&app.router, get(&timeline_uri)).await;
    let entries = timeline.as_array().unwrap();
    // Newest first: unassign rollup, unassign, assign rollup, assign, created.
    assert_eq!(entries[0]["action"], "updated");
    assert_eq!(entries[1]["action"], "assigned");
    assert_eq!(entries[1]["metadata"]["from"], "sam");
    assert_eq!(entries[1]["metadata"]["to"], "Unassigned");
    assert_eq!(entries.last().unwrap()["action"], "created");
}

#[tokio::test]
async fn unknown_assignee_is_a_validation_error() {
    let app = test_app();
    let ticket = create_ticket(&app).await;
    let uri = format!("/api/tickets/{}", ticket["id"].as_str().unwrap());

    let (status, body) = send(
        &app.router,
        put(
            &uri,
            app.agent,
            json!({"assigned_to": Uuid::new_v4().to_string(), "version": 1}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Validation error: Assigned user not found");
}

#[tokio::test]
async fn missing_tickets_are_404() {
    let app = test_app();
    let uri = format!("/api/tickets/{}", Uuid::new_v4());
    let (status, _) = send(&app.router, get(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn comment_threads_nest_in_the_serialized_tree() {
    let app = test_app();
    let ticket = create_ticket(&app).await;
    let id = ticket["id"].as_str().unwrap();
    let comments_uri = format!("/api/tickets/{id}/comments");

    let (status, root) = send(
        &app.router,
        post(&comments_uri, app.reporter, json!({"content": "It fails every time"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, reply) = send(
        &app.router,
        post(
            &comments_uri,
            app.agent,
            json!({"content": "Which browser?", "parent": root["id"]}),
        ),
    )
    .await;
    let (_, _nested) = send(
        &app.router,
        post(
            &comments_uri,
            app.reporter,
            json!({"content": "Firefox", "parent": reply["id"]}),
        ),
    )
    .await;

    let (status, forest) = send(&app.router, get(&comments_uri)).await;
    assert_eq!(status, StatusCode::OK);
    let roots = forest.as_array().unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0]["content"], "It fails every time");
    assert_eq!(roots[0]["author"]["username"], "rita");
    let replies = roots[0]["replies"].as_array().unwrap();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0]["content"], "Which browser?");
    let nested = replies[0]["replies"].as_array().unwrap();
    assert_eq!(nested.len(), 1);
    assert_eq!(nested[0]["content"], "Firefox");
    assert_eq!(nested[0]["replies"].as_array().unwrap().len(), 0);

    // The ticket view reflects the conversation.
    let (_, view) = send(&app.router, get(&format!("/api/tickets/{id}"))).await;
    assert_eq!(view["comments_count"], 3);
    assert_eq!(view["latest_comment"]["content"], "Firefox");
    assert_eq!(view["latest_comment"]["author"], "rita");
}

#[tokio::test]
async fn sla_rules_are_exposed_as_configuration() {
    let app = test_app();
    let (status, rules) = send(&app.router, get("/api/tickets/sla")).await;
    assert_eq!(status, StatusCode::OK);
    let rules = rules.as_array().unwrap();
    assert_eq!(rules.len(), 4);
    let critical = rules
        .iter()
        .find(|rule| rule["priority"] == "critical")
        .expect("critical rule");
    assert_eq!(critical["response_hours"], 4);
    assert_eq!(critical["resolution_hours"], 8);
}

#[tokio::test]
async fn delete_cascades_and_returns_no_content() {
    let app = test_app();
    let ticket = create_ticket(&app).await;
    let id = ticket["id"].as_str().unwrap();
    let uri = format!("/api/tickets/{id}");

    send(
        &app.router,
        post(
            &format!("{uri}/comments"),
            app.reporter,
            json!({"content": "gone soon"}),
        ),
    )
    .await;

    let request = Request::builder()
        .method("DELETE")
        .uri(uri.clone())
        .body(Body::empty())
        .expect("request");
    let (status, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app.router, get(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app.router, get(&format!("{uri}/timeline"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
