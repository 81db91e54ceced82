mod common;

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use serde_json::json;
use shapes_live::models::{
    event::ChangeEvent,
    shape::{NewShape, ShapeKind},
};

use common::{app, login_admin, request};

#[tokio::test]
async fn reads_are_public_and_writes_need_a_token() {
    let app = app();

    let list = request(Method::GET, "/api/shapes/").send(&app.router).await;
    assert_eq!(list.status, StatusCode::OK);
    assert_eq!(list.body, json!([]));

    let create = request(Method::POST, "/api/shapes/")
        .json(json!({ "name": "Sun", "shape": "circle", "color": "#FF0" }))
        .send(&app.router)
        .await;
    assert_eq!(create.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.state.topic.published(), 0);
}

#[tokio::test]
async fn crud_round_trip_emits_one_event_per_commit() {
    let app = app();
    let (access, _) = login_admin(&app.router).await;
    let mut sub = app.state.topic.subscribe().unwrap();

    let created = request(Method::POST, "/api/shapes/")
        .bearer(&access)
        .json(json!({ "name": "Sun", "shape": "circle", "color": "#FFCC00" }))
        .send(&app.router)
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let id = created.body["id"].as_i64().unwrap();
    assert_eq!(created.body["shape"], "circle");

    match &*sub.recv().await.unwrap() {
        ChangeEvent::Created { shape } => assert_eq!(shape.id, id),
        other => panic!("expected created, got {other:?}"),
    }

    let patched = request(Method::PATCH, &format!("/api/shapes/{id}/"))
        .bearer(&access)
        .json(json!({ "color": "#000" }))
        .send(&app.router)
        .await;
    assert_eq!(patched.status, StatusCode::OK);
    assert_eq!(patched.body["color"], "#000");
    assert_eq!(patched.body["name"], "Sun");

    match &*sub.recv().await.unwrap() {
        ChangeEvent::Updated { shape } => assert_eq!(shape.color, "#000"),
        other => panic!("expected updated, got {other:?}"),
    }

    let replaced = request(Method::PUT, &format!("/api/shapes/{id}/"))
        .bearer(&access)
        .json(json!({ "name": "Block", "shape": "square", "color": "#123456" }))
        .send(&app.router)
        .await;
    assert_eq!(replaced.status, StatusCode::OK);
    assert_eq!(replaced.body["shape"], "square");
    assert_eq!(sub.recv().await.unwrap().action(), "updated");

    let fetched = request(Method::GET, &format!("/api/shapes/{id}/"))
        .send(&app.router)
        .await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body["name"], "Block");

    let deleted = request(Method::DELETE, &format!("/api/shapes/{id}/"))
        .bearer(&access)
        .send(&app.router)
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    assert_eq!(*sub.recv().await.unwrap(), ChangeEvent::Deleted { shape_id: id });

    let missing = request(Method::GET, &format!("/api/shapes/{id}/"))
        .send(&app.router)
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    assert_eq!(app.state.topic.published(), 4);
}

#[tokio::test]
async fn rejected_writes_emit_nothing() {
    let app = app();
    let (access, _) = login_admin(&app.router).await;

    let bad_color = request(Method::POST, "/api/shapes/")
        .bearer(&access)
        .json(json!({ "name": "Sun", "shape": "circle", "color": "yellow" }))
        .send(&app.router)
        .await;
    assert_eq!(bad_color.status, StatusCode::BAD_REQUEST);

    let bad_kind = request(Method::POST, "/api/shapes/")
        .bearer(&access)
        .json(json!({ "name": "Sun", "shape": "hexagon", "color": "#fff" }))
        .send(&app.router)
        .await;
    assert_eq!(bad_kind.status, StatusCode::BAD_REQUEST);

    let bad_name = request(Method::POST, "/api/shapes/")
        .bearer(&access)
        .json(json!({ "name": "Sun!", "shape": "circle", "color": "#fff" }))
        .send(&app.router)
        .await;
    assert_eq!(bad_name.status, StatusCode::BAD_REQUEST);

    let missing_row = request(Method::DELETE, "/api/shapes/999/")
        .bearer(&access)
        .send(&app.router)
        .await;
    assert_eq!(missing_row.status, StatusCode::NOT_FOUND);

    let missing_patch = request(Method::PATCH, "/api/shapes/999/")
        .bearer(&access)
        .json(json!({ "name": "Ghost" }))
        .send(&app.router)
        .await;
    assert_eq!(missing_patch.status, StatusCode::NOT_FOUND);

    assert_eq!(app.state.topic.published(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_subscriber_sees_commits_in_the_same_order() {
    const WRITERS: usize = 4;
    const PER_WRITER: usize = 10;
    const SUBSCRIBERS: usize = 3;

    let app = app();
    let mut subs: Vec<_> = (0..SUBSCRIBERS)
        .map(|_| app.state.topic.subscribe().unwrap())
        .collect();

    let mut writers = Vec::new();
    for w in 0..WRITERS {
        let shapes = Arc::clone(&app.state.shapes);
        writers.push(tokio::spawn(async move {
            for i in 0..PER_WRITER {
                shapes
                    .create(NewShape {
                        name: format!("w{w} n{i}"),
                        shape: ShapeKind::Triangle,
                        color: "#abc".into(),
                    })
                    .await
                    .unwrap();
            }
        }));
    }
    for writer in writers {
        writer.await.unwrap();
    }

    let total = WRITERS * PER_WRITER;
    let mut orders = Vec::new();
    for sub in subs.iter_mut() {
        let mut ids = Vec::with_capacity(total);
        for _ in 0..total {
            ids.push(sub.recv().await.unwrap().shape_id());
        }
        orders.push(ids);
    }

    // Commit order is id order for the in-memory store.
    let expected: Vec<i64> = (1..=total as i64).collect();
    for ids in &orders {
        assert_eq!(ids, &expected);
    }
}

#[tokio::test]
async fn dropped_subscriber_leaves_the_topic() {
    let app = app();
    let kept = app.state.topic.subscribe().unwrap();
    let gone = app.state.topic.subscribe().unwrap();
    let gone_id = gone.id();
    assert_eq!(app.state.topic.member_count(), 2);

    drop(gone);
    assert_eq!(app.state.topic.member_count(), 1);
    assert!(!app.state.topic.is_member(&gone_id));
    assert!(kept.is_registered());

    let health = request(Method::GET, "/health").send(&app.router).await;
    assert_eq!(health.status, StatusCode::OK);
    assert_eq!(health.body["subscribers"], 1);
}
