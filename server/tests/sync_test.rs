//! Integration tests for delta sync and offline replay.
//!
//! Everything runs against the in-memory event store and cache.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use marksync_engine::{Error, ResourceKind};
use marksync_server::app;
use marksync_server::error::AppError;
use marksync_server::now_millis;
use serde_json::{json, Value};
use tower::ServiceExt;

const MINUTE: u64 = 60_000;

#[cfg(test)]
mod offline_tests {
    use super::*;

    #[tokio::test]
    async fn test_validation_gate() {
        let h = harness();

        assert!(h.state.offline.validate_change_type("bookmark_create"));
        assert!(!h.state.offline.validate_change_type("anything_else"));

        let err = h
            .state
            .offline
            .queue_offline_change(offline_change("anything_else", "b-1", "phone", 1, json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Engine(Error::InvalidChangeType(_))));
        assert!(h.state.offline.list_changes(USER).await.unwrap().is_empty());
        assert_eq!(h.state.offline.stats(USER).await.unwrap().queued_changes, 0);
    }

    #[tokio::test]
    async fn test_replay_partial_failure() {
        let h = harness();
        h.bookmarks.break_resource("b-broken");

        let first = h
            .state
            .offline
            .queue_offline_change(offline_change("bookmark_create", "b-broken", "phone", 10, json!({"title": "A"})))
            .await
            .unwrap();
        let second = h
            .state
            .offline
            .queue_offline_change(offline_change("bookmark_create", "b-ok", "phone", 20, json!({"title": "B"})))
            .await
            .unwrap();

        let report = h
            .state
            .offline
            .process_offline_queue(USER, Some("phone"))
            .await
            .unwrap();

        assert_eq!(report.failed, vec![first.id.clone()]);
        assert_eq!(report.applied, vec![second.id.clone()]);

        let changes = h.state.offline.list_changes(USER).await.unwrap();
        let applied = |id: &str| changes.iter().find(|c| c.id == id).unwrap().applied;
        assert!(!applied(&first.id));
        assert!(applied(&second.id));
        assert_eq!(h.state.offline.stats(USER).await.unwrap().queued_changes, 1);

        // The failed change is retried on the next pass.
        h.bookmarks.repair_resource("b-broken");
        let retry = h.state.offline.process_offline_queue(USER, None).await.unwrap();
        assert_eq!(retry.applied, vec![first.id]);
        assert!(h.bookmarks.inner.get(USER, "b-broken").is_some());
    }

    #[tokio::test]
    async fn test_replay_preserves_device_edit_order() {
        let h = harness();
        let base = now_millis() - 10 * MINUTE;

        // Queued out of order; the update must land after the create.
        h.state
            .offline
            .queue_offline_change(offline_change("bookmark_update", "b-1", "phone", base + 2, json!({"title": "Renamed"})))
            .await
            .unwrap();
        h.state
            .offline
            .queue_offline_change(offline_change("bookmark_create", "b-1", "phone", base + 1, json!({"title": "Original", "url": "https://a"})))
            .await
            .unwrap();

        let report = h.state.offline.process_offline_queue(USER, None).await.unwrap();
        assert_eq!(report.applied.len(), 2);
        assert_eq!(
            h.bookmarks.inner.get(USER, "b-1").unwrap(),
            json!({"title": "Renamed", "url": "https://a"})
        );

        let delta = h
            .state
            .delta
            .get_delta_sync(USER, "laptop", None, now_millis())
            .await
            .unwrap();
        assert_eq!(delta.events.len(), 1);
        assert_eq!(delta.events[0].payload["title"], "Renamed");
    }

    #[tokio::test]
    async fn test_same_timestamp_edits_replay_in_queue_order() {
        let h = harness();
        let t = now_millis() - MINUTE;

        let create = h
            .state
            .offline
            .queue_offline_change(offline_change("bookmark_create", "b-1", "phone", t, json!({"title": "Original"})))
            .await
            .unwrap();
        let update = h
            .state
            .offline
            .queue_offline_change(offline_change("bookmark_update", "b-1", "phone", t, json!({"title": "Renamed"})))
            .await
            .unwrap();

        let listed: Vec<_> = h
            .state
            .offline
            .list_changes(USER)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(listed, vec![create.id.clone(), update.id.clone()]);

        let report = h.state.offline.process_offline_queue(USER, None).await.unwrap();
        assert_eq!(report.applied, vec![create.id, update.id]);
        assert!(report.superseded.is_empty());
        assert_eq!(h.bookmarks.inner.get(USER, "b-1").unwrap()["title"], "Renamed");
    }

    #[tokio::test]
    async fn test_end_to_end_server_write_wins() {
        let h = harness();
        h.probe.set_online(false);
        let base = now_millis() - 10 * MINUTE;

        // Device A edits while disconnected.
        h.state
            .offline
            .queue_offline_change(offline_change(
                "bookmark_update",
                "bookmark-1",
                "device-a",
                base,
                json!({"title": "Local"}),
            ))
            .await
            .unwrap();

        // Device B writes the same bookmark later, while connected.
        let mut write = bookmark_event("bookmark-1", "create", "device-b", 0, json!({"title": "Server"}));
        write.timestamp = base + MINUTE;
        h.state
            .delta
            .apply_mutation(ResourceKind::Bookmark, write)
            .await
            .unwrap();

        assert!(matches!(
            h.state.connectivity.sync_when_online(USER).await,
            Err(AppError::StillOffline(_))
        ));

        h.probe.set_online(true);
        let report = h.state.connectivity.sync_when_online(USER).await.unwrap();
        assert_eq!(report.superseded.len(), 1);
        assert!(report.applied.is_empty());

        assert_eq!(h.bookmarks.inner.get(USER, "bookmark-1").unwrap()["title"], "Server");

        let delta = h
            .state
            .delta
            .get_delta_sync(USER, "device-a", None, now_millis())
            .await
            .unwrap();
        assert_eq!(delta.events.len(), 1);
        assert_eq!(delta.events[0].payload["title"], "Server");
        assert!(h.state.offline.pending_changes(USER, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_newer_offline_change_wins() {
        let h = harness();
        let base = now_millis() - 10 * MINUTE;

        let mut write = bookmark_event("bookmark-1", "create", "device-b", 0, json!({"title": "Server"}));
        write.timestamp = base;
        h.state
            .delta
            .apply_mutation(ResourceKind::Bookmark, write)
            .await
            .unwrap();

        h.state
            .offline
            .queue_offline_change(offline_change(
                "bookmark_update",
                "bookmark-1",
                "device-a",
                base + MINUTE,
                json!({"title": "Local"}),
            ))
            .await
            .unwrap();

        let report = h.state.connectivity.sync_when_online(USER).await.unwrap();
        assert_eq!(report.applied.len(), 1);
        assert_eq!(h.bookmarks.inner.get(USER, "bookmark-1").unwrap()["title"], "Local");
    }
}

#[cfg(test)]
mod http_tests {
    use super::*;

    async fn send(router: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let router = app(harness().state);
        let (status, body) = send(&router, get("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
    }

    #[tokio::test]
    async fn test_record_and_pull_delta() {
        let h = harness();
        let router = app(h.state.clone());

        for (ago, title) in [(3 * MINUTE, "v1"), (MINUTE, "v2")] {
            let event = bookmark_event("b-1", "update", "phone", ago, json!({"title": title}));
            let (status, body) = send(&router, post("/events", serde_json::to_value(event).unwrap())).await;
            assert_eq!(status, StatusCode::CREATED);
            assert_eq!(body["status"], "pending");
        }

        let (status, body) = send(&router, get("/sync?user_id=user-1&device_id=laptop")).await;
        assert_eq!(status, StatusCode::OK);
        let events = body["events"].as_array().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["payload"]["title"], "v2");
        assert_eq!(events[0]["type"], "bookmark_update");

        let state = h.state.delta.sync_state(USER, "laptop").await.unwrap().unwrap();
        assert_eq!(body["last_sync_time"], state.last_sync_time);
    }

    #[tokio::test]
    async fn test_invalid_action_rejected() {
        let h = harness();
        let router = app(h.state.clone());

        let event = bookmark_event("b-1", "archive", "phone", MINUTE, json!({}));
        let (status, body) = send(&router, post("/events", serde_json::to_value(event).unwrap())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("archive"));

        let (_, body) = send(&router, get("/sync?user_id=user-1&device_id=laptop&last_sync_time=garbage")).await;
        assert_eq!(body["events"], json!([]));
    }

    #[tokio::test]
    async fn test_unstorable_timestamp_rejected() {
        let h = harness();
        let router = app(h.state.clone());

        let mut event = bookmark_event("b-1", "create", "phone", 0, json!({}));
        event.timestamp = u64::MAX;
        let (status, body) = send(&router, post("/events", serde_json::to_value(&event).unwrap())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("timestamp"));

        let change = offline_change("bookmark_create", "b-1", "phone", u64::MAX, json!({}));
        let (status, _) = send(&router, post("/offline/changes", serde_json::to_value(change).unwrap())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = send(&router, get("/sync?user_id=user-1&device_id=laptop")).await;
        assert_eq!(body["events"], json!([]));
        assert!(h.state.offline.list_changes(USER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mutation_route() {
        let h = harness();
        let router = app(h.state.clone());

        let event = bookmark_event("b-1", "create", "phone", MINUTE, json!({"title": "Direct"}));
        let (status, _) = send(&router, post("/mutations/bookmark", serde_json::to_value(&event).unwrap())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(h.bookmarks.inner.get(USER, "b-1").unwrap()["title"], "Direct");

        let (status, _) = send(&router, post("/mutations/widget", serde_json::to_value(&event).unwrap())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_offline_routes() {
        let h = harness();
        let router = app(h.state.clone());

        let change = offline_change("bookmark_create", "b-9", "phone", now_millis(), json!({"title": "Queued"}));
        let (status, body) = send(&router, post("/offline/changes", serde_json::to_value(change).unwrap())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["applied"], false);

        let (status, _) = send(&router, post("/offline/changes", json!({
            "user_id": USER, "device_id": "phone", "type": "folder_create",
            "resource_id": "f-1", "timestamp": 1
        }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = send(&router, get("/offline/changes?user_id=user-1&pending=true")).await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (_, body) = send(&router, get("/offline/status?user_id=user-1")).await;
        assert_eq!(body["status"], "online");

        h.probe.set_online(false);
        let (status, _) = send(&router, post("/offline/sync", json!({"user_id": USER}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (_, body) = send(&router, get("/connectivity")).await;
        assert_eq!(body["online"], false);

        h.probe.set_online(true);
        let (status, body) = send(&router, post("/offline/sync", json!({"user_id": USER}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["applied"].as_array().unwrap().len(), 1);

        let (_, body) = send(&router, get("/offline/stats?user_id=user-1")).await;
        assert_eq!(body["queued_changes"], 0);
        assert!(body["last_sync"].is_u64());
    }

    #[tokio::test]
    async fn test_resource_cache_routes() {
        let router = app(harness().state);

        let (status, _) = send(&router, get("/offline/resources/b-1?user_id=user-1")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let put = Request::builder()
            .method("PUT")
            .uri("/offline/resources/b-1?user_id=user-1")
            .header("content-type", "application/json")
            .body(Body::from(json!({"title": "Cached"}).to_string()))
            .unwrap();
        let (status, _) = send(&router, put).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(&router, get("/offline/resources/b-1?user_id=user-1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Cached");
    }
}
