mod common;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use shapes_live::{
    models::shape::{NewShape, ShapeKind},
    services::broadcast::Topic,
};
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn serve(app: &common::TestApp) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("ws://{addr}/ws/shapes/")
}

async fn wait_for_members(topic: &Topic, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while topic.member_count() != n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("topic never reached {n} members"));
}

async fn next_event(client: &mut Client) -> Value {
    let frame = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match client.next().await.expect("stream ended").unwrap() {
                Message::Text(text) => return text,
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected frame {other:?}"),
            }
        }
    })
    .await
    .expect("no event within timeout");
    serde_json::from_str(&frame).unwrap()
}

fn sample(name: &str) -> NewShape {
    NewShape {
        name: name.into(),
        shape: ShapeKind::Circle,
        color: "#0f0".into(),
    }
}

#[tokio::test]
async fn every_connected_client_receives_the_commit() {
    let app = common::app();
    let url = serve(&app).await;

    let (mut a, _) = connect_async(url.as_str()).await.unwrap();
    let (mut b, _) = connect_async(url.as_str()).await.unwrap();
    wait_for_members(&app.state.topic, 2).await;

    let shape = app.state.shapes.create(sample("Lime")).await.unwrap();

    for client in [&mut a, &mut b] {
        let event = next_event(client).await;
        assert_eq!(event["action"], "created");
        assert_eq!(event["shape"]["id"], shape.id);
        assert_eq!(event["shape"]["name"], "Lime");
    }

    app.state.shapes.delete(shape.id).await.unwrap();
    for client in [&mut a, &mut b] {
        let event = next_event(client).await;
        assert_eq!(event["action"], "deleted");
        assert_eq!(event["shape_id"], shape.id);
    }
}

#[tokio::test]
async fn closing_a_client_deregisters_it() {
    let app = common::app();
    let url = serve(&app).await;

    let (mut stays, _) = connect_async(url.as_str()).await.unwrap();
    let (mut leaves, _) = connect_async(url.as_str()).await.unwrap();
    wait_for_members(&app.state.topic, 2).await;

    leaves.send(Message::Close(None)).await.unwrap();
    wait_for_members(&app.state.topic, 1).await;

    let shape = app.state.shapes.create(sample("After")).await.unwrap();
    let event = next_event(&mut stays).await;
    assert_eq!(event["shape"]["id"], shape.id);
}

#[tokio::test]
async fn inbound_frames_are_ignored() {
    let app = common::app();
    let url = serve(&app).await;

    let (mut client, _) = connect_async(url.as_str()).await.unwrap();
    wait_for_members(&app.state.topic, 1).await;

    client
        .send(Message::Text(r#"{"action":"created"}"#.into()))
        .await
        .unwrap();
    assert_eq!(app.state.topic.published(), 0);

    let shape = app.state.shapes.create(sample("Quiet")).await.unwrap();
    let event = next_event(&mut client).await;
    assert_eq!(event["shape"]["id"], shape.id);
    assert_eq!(app.state.topic.member_count(), 1);
}

#[tokio::test]
async fn closed_topic_ends_open_sockets() {
    let app = common::app();
    let url = serve(&app).await;

    let (mut client, _) = connect_async(url.as_str()).await.unwrap();
    wait_for_members(&app.state.topic, 1).await;

    app.state.topic.close();

    let ended = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(ended.is_ok());
    assert_eq!(app.state.topic.member_count(), 0);
}
