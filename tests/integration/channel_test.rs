//! Engine fed by a real Server-Sent Events stream

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use relief_sync::client::event_channel::{ChannelStatus, EventChannel};
use relief_sync::client::offline::RetryPolicy;
use relief_sync::client::sync::ConnectivityState;
use relief_sync::shared::{PushEvent, RequestStatus};

use crate::common::*;

async fn sse_server(body: String) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_pushed_events_reach_visible_queue() {
    let queue = vec![pending("a1"), pending("a2")];
    let body = format!(
        "event: queueState\ndata: {}\n\nevent: statusUpdated\ndata: {}\n\n",
        serde_json::json!({ "queue": queue }),
        serde_json::json!({ "requestId": "a2", "newStatus": "IN_TRANSIT" }),
    );
    let server = sse_server(body).await;

    let api = Arc::new(FakeApi::new());
    api.set_queue(vec![pending("a1"), pending("a2").with_status(RequestStatus::InTransit)]);
    let engine = engine_with(api.clone(), ConnectivityState::Online).await;

    let channel = EventChannel::new(
        format!("{}/events", server.uri()),
        None,
        RetryPolicy::fixed(Duration::from_secs(60), Some(1)),
    )
    .unwrap();
    engine.attach_channel(&channel);

    let mut visible = engine.subscribe_visible();
    let settled = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let queue = visible.borrow_and_update();
                if ids(&queue) == vec!["a1", "a2"] && queue[1].status == RequestStatus::InTransit {
                    return;
                }
            }
            if visible.changed().await.is_err() {
                return;
            }
        }
    })
    .await;
    assert!(settled.is_ok(), "queue never settled: {:?}", engine.visible_queue());

    // the first connection triggered a full refetch
    let api_ref = api.clone();
    assert!(eventually(move || api_ref.queue_fetches() >= 1).await);

    engine.shutdown();
    channel.close();
    assert_eq!(channel.status(), ChannelStatus::Closed);
}

#[tokio::test]
async fn test_shutdown_detaches_handlers() {
    let server = sse_server(String::new()).await;
    let api = Arc::new(FakeApi::new());
    let engine = engine_with(api, ConnectivityState::Offline).await;
    engine.replace_snapshot(pending_queue(2)).await;

    let channel = EventChannel::new(
        format!("{}/events", server.uri()),
        None,
        RetryPolicy::fixed(Duration::from_secs(60), Some(1)),
    )
    .unwrap();
    engine.attach_channel(&channel);
    engine.shutdown();

    channel.dispatch(PushEvent::QueueUpdated { queue: Vec::new() });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(engine.visible_queue().len(), 2);
    channel.close();
}
