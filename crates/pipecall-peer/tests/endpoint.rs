use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use pipecall_peer::{
    handler_fn, BoxError, Endpoint, EndpointConfig, EndpointState, Handler, RawValue,
    RequestContext, RpcError,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Sample {
    name: String,
    values: Vec<i64>,
    nested: Option<Box<Sample>>,
}

#[derive(Debug, Deserialize)]
struct SleepRequest {
    ms: u64,
    tag: String,
}

fn connected_pair(
    left: Option<Arc<dyn Handler>>,
    right: Option<Arc<dyn Handler>>,
) -> (Endpoint, Endpoint) {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let (a_read, a_write) = tokio::io::split(a);
    let (b_read, b_write) = tokio::io::split(b);
    let left = Endpoint::new(a_read, a_write, left);
    let right = Endpoint::new(b_read, b_write, right);
    left.start();
    right.start();
    (left, right)
}

fn echo_handler() -> Arc<dyn Handler> {
    Arc::new(handler_fn(|_ctx, payload: Box<RawValue>| async move {
        Ok::<_, BoxError>(payload)
    }))
}

fn id_handler() -> Arc<dyn Handler> {
    Arc::new(handler_fn(|ctx: RequestContext, _payload| async move {
        Ok::<_, BoxError>(ctx.id())
    }))
}

fn sleep_handler() -> Arc<dyn Handler> {
    Arc::new(handler_fn(|_ctx, payload: Box<RawValue>| async move {
        let req: SleepRequest = serde_json::from_str(payload.get())?;
        tokio::time::sleep(Duration::from_millis(req.ms)).await;
        Ok::<_, BoxError>(req.tag)
    }))
}

fn stalled_handler() -> Arc<dyn Handler> {
    Arc::new(handler_fn(|_ctx, _payload| async move {
        std::future::pending::<()>().await;
        Ok::<(), BoxError>(())
    }))
}

async fn wait_for_pending(endpoint: &Endpoint, count: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while endpoint.pending_calls() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("calls should register");
}

#[tokio::test]
async fn structured_value_round_trips() {
    let (caller, _server) = connected_pair(None, Some(echo_handler()));

    let sample = Sample {
        name: "outer".to_string(),
        values: vec![-1, 0, i64::MAX],
        nested: Some(Box::new(Sample {
            name: "inner \"quoted\" \u{1F600}".to_string(),
            values: vec![],
            nested: None,
        })),
    };

    let back: Sample = caller.call(&sample).await.unwrap();
    assert_eq!(back, sample);
}

#[tokio::test]
async fn both_sides_call_each_other() {
    let (left, right) = connected_pair(Some(echo_handler()), Some(echo_handler()));

    let (from_left, from_right) = tokio::join!(
        left.call::<_, String>("left"),
        right.call::<_, String>("right"),
    );
    assert_eq!(from_left.unwrap(), "left");
    assert_eq!(from_right.unwrap(), "right");
}

#[tokio::test]
async fn ids_increase_in_issuance_order() {
    let (caller, _server) = connected_pair(None, Some(id_handler()));

    let mut seen = Vec::new();
    for _ in 0..5 {
        seen.push(caller.call::<_, u64>(&()).await.unwrap());
    }
    assert_eq!(seen, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn concurrent_calls_get_distinct_ids() {
    let (caller, _server) = connected_pair(None, Some(id_handler()));

    let calls = (0..50).map(|_| caller.call::<_, u64>(&()));
    let mut ids: Vec<u64> = join_all(calls)
        .await
        .into_iter()
        .map(|result| result.unwrap())
        .collect();

    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 50);
    assert_eq!(caller.stats().calls_issued, 50);
}

#[tokio::test]
async fn responses_match_callers_when_completed_out_of_order() {
    let (caller, _server) = connected_pair(None, Some(sleep_handler()));

    let slow_req = json!({ "ms": 200, "tag": "A" });
    let slow = caller.call::<_, String>(&slow_req);
    let fast = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let tag = caller
            .call::<_, String>(&json!({ "ms": 5, "tag": "B" }))
            .await;
        (tag, tokio::time::Instant::now())
    };

    let started = tokio::time::Instant::now();
    let (slow, (fast, fast_done)) = tokio::join!(slow, fast);
    assert_eq!(slow.unwrap(), "A");
    assert_eq!(fast.unwrap(), "B");
    assert!(fast_done.duration_since(started) < Duration::from_millis(200));
}

#[tokio::test]
async fn close_fails_every_outstanding_call() {
    let (caller, _server) = connected_pair(None, Some(stalled_handler()));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let caller = caller.clone();
            tokio::spawn(async move { caller.call::<_, ()>(&"wait").await })
        })
        .collect();

    wait_for_pending(&caller, 8).await;
    caller.close();
    caller.close();

    for task in tasks {
        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("call should not hang after close")
            .unwrap();
        assert!(matches!(result, Err(RpcError::Closed)));
    }
    assert_eq!(caller.pending_calls(), 0);
    assert_eq!(caller.state(), EndpointState::Closed);
}

#[tokio::test]
async fn call_after_close_fails_immediately() {
    let (caller, _server) = connected_pair(None, Some(echo_handler()));
    caller.close();

    let result = caller.call::<_, ()>(&()).await;
    assert!(matches!(result, Err(RpcError::Closed)));
    assert_eq!(caller.stats().calls_issued, 0);
}

#[tokio::test]
async fn timeout_discards_late_response() {
    let (caller, _server) = connected_pair(None, Some(sleep_handler()));

    let result = caller
        .call_timeout::<_, String>(Duration::from_millis(30), &json!({ "ms": 150, "tag": "late" }))
        .await;
    assert!(matches!(result, Err(RpcError::Timeout(_))));
    assert_eq!(caller.pending_calls(), 0);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(caller.stats().late_responses, 1);

    let after = caller
        .call::<_, String>(&json!({ "ms": 1, "tag": "still works" }))
        .await
        .unwrap();
    assert_eq!(after, "still works");
}

#[tokio::test]
async fn configured_call_timeout_applies_to_call() {
    let (a, b) = tokio::io::duplex(4096);
    let (a_read, a_write) = tokio::io::split(a);
    let (b_read, b_write) = tokio::io::split(b);
    let caller = Endpoint::with_config(
        a_read,
        a_write,
        None,
        EndpointConfig {
            call_timeout: Some(Duration::from_millis(25)),
            ..EndpointConfig::default()
        },
    );
    let server = Endpoint::new(b_read, b_write, Some(stalled_handler()));
    caller.start();
    server.start();

    let result = caller.call::<_, ()>(&()).await;
    assert!(matches!(result, Err(RpcError::Timeout(d)) if d == Duration::from_millis(25)));
}

#[tokio::test]
async fn cancellation_returns_immediately() {
    let (caller, _server) = connected_pair(None, Some(stalled_handler()));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let result = caller.call_with_cancel::<_, ()>(&cancel, &()).await;
    assert!(matches!(result, Err(RpcError::Cancelled)));
    assert_eq!(caller.pending_calls(), 0);
}

#[tokio::test]
async fn pre_cancelled_token_sends_nothing() {
    let (caller, _server) = connected_pair(None, Some(echo_handler()));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = caller.call_with_cancel::<_, ()>(&cancel, &()).await;
    assert!(matches!(result, Err(RpcError::Cancelled)));
    assert_eq!(caller.stats().calls_issued, 0);
}

#[tokio::test]
async fn remote_failure_carries_message() {
    let failing: Arc<dyn Handler> = Arc::new(handler_fn(|_ctx, _payload| async move {
        Err::<(), _>("disk on fire")
    }));
    let (caller, _server) = connected_pair(None, Some(failing));

    match caller.call::<_, ()>(&()).await {
        Err(RpcError::Remote(message)) => assert_eq!(message, "disk on fire"),
        other => panic!("expected remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_handler_rejects_requests() {
    let (caller, _server) = connected_pair(None, None);

    match caller.call::<_, ()>(&json!({ "any": "thing" })).await {
        Err(RpcError::Remote(message)) => assert_eq!(message, "no handler"),
        other => panic!("expected no handler error, got {other:?}"),
    }
}

#[tokio::test]
async fn panicking_handler_still_answers() {
    let panicking: Arc<dyn Handler> = Arc::new(handler_fn(|_ctx, _payload| async move {
        if true {
            panic!("handler bug");
        }
        Ok::<(), BoxError>(())
    }));
    let (caller, _server) = connected_pair(None, Some(panicking));

    match caller.call::<_, ()>(&()).await {
        Err(RpcError::Remote(message)) => assert_eq!(message, "handler panicked"),
        other => panic!("expected remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn handler_panicking_before_its_future_still_answers() {
    let panicking: Arc<dyn Handler> = Arc::new(handler_fn(|_ctx, payload: Box<RawValue>| {
        if payload.get() == "7" {
            panic!("rejected before any await");
        }
        async move { Ok::<_, BoxError>(payload) }
    }));
    let (caller, server) = connected_pair(None, Some(panicking));

    let result = caller
        .call_timeout::<_, u32>(Duration::from_secs(1), &7)
        .await;
    match result {
        Err(RpcError::Remote(message)) => assert_eq!(message, "handler panicked"),
        other => panic!("expected remote error, got {other:?}"),
    }

    let value: u32 = caller.call(&8).await.unwrap();
    assert_eq!(value, 8);
    assert_eq!(server.state(), EndpointState::Running);
}

#[tokio::test]
async fn raw_and_discarded_responses() {
    let fixed: Arc<dyn Handler> = Arc::new(handler_fn(|_ctx, _payload| async move {
        Ok::<_, BoxError>(json!({ "b": 2, "a": [1, 2, 3] }))
    }));
    let (caller, _server) = connected_pair(None, Some(fixed));

    let raw: Box<RawValue> = caller.call(&()).await.unwrap();
    assert_eq!(raw.get(), r#"{"a":[1,2,3],"b":2}"#);

    let raw = caller.call_raw(&()).await.unwrap();
    assert_eq!(raw.get(), r#"{"a":[1,2,3],"b":2}"#);

    let _: serde::de::IgnoredAny = caller.call(&()).await.unwrap();
}

#[tokio::test]
async fn raw_request_is_sent_verbatim() {
    let (caller, _server) = connected_pair(None, Some(echo_handler()));

    let request = RawValue::from_string(r#"{"z": 1,  "a": 2}"#.to_string()).unwrap();
    let echoed = caller.call_raw(&request).await.unwrap();
    assert_eq!(echoed.get(), r#"{"z": 1,  "a": 2}"#);
}

#[tokio::test]
async fn decode_failure_is_reported_locally() {
    let (caller, _server) = connected_pair(None, Some(echo_handler()));

    let result = caller.call::<_, u32>(&"not a number").await;
    assert!(matches!(result, Err(RpcError::Json(_))));
    assert!(!caller.is_closed());
}

#[tokio::test]
async fn stream_end_closes_endpoint() {
    let (caller, server) = connected_pair(None, Some(stalled_handler()));

    let pending = {
        let caller = caller.clone();
        tokio::spawn(async move { caller.call::<_, ()>(&()).await })
    };
    wait_for_pending(&caller, 1).await;

    server.shutdown().await;

    tokio::time::timeout(Duration::from_secs(2), caller.done())
        .await
        .expect("caller should observe end of stream");
    let result = pending.await.unwrap();
    assert!(matches!(result, Err(RpcError::Closed)));
}

#[tokio::test]
async fn malformed_input_closes_endpoint() {
    let (mut raw_side, endpoint_side) = tokio::io::duplex(4096);
    let (read, write) = tokio::io::split(endpoint_side);
    let endpoint = Endpoint::new(read, write, Some(echo_handler()));
    endpoint.start();

    raw_side.write_all(b"{\"type\":\"request\",\"id\":1,\"payload\":1}\n").await.unwrap();
    raw_side.write_all(b"this is not json\n").await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), endpoint.done())
        .await
        .expect("decode failure should close the endpoint");
    assert!(endpoint.is_closed());
}

#[tokio::test]
async fn unknown_message_types_are_skipped() {
    let (mut raw_side, endpoint_side) = tokio::io::duplex(4096);
    let (read, write) = tokio::io::split(endpoint_side);
    let endpoint = Endpoint::new(read, write, Some(echo_handler()));
    endpoint.start();

    raw_side
        .write_all(b"{\"type\":\"notice\",\"id\":99}\n{\"type\":\"response\",\"id\":12345}\n")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(endpoint.state(), EndpointState::Running);
    assert_eq!(endpoint.stats().late_responses, 1);
}

#[tokio::test]
async fn sparse_messages_keep_endpoint_running() {
    let (raw_side, endpoint_side) = tokio::io::duplex(4096);
    let (read, write) = tokio::io::split(endpoint_side);
    let endpoint = Endpoint::new(read, write, None);
    endpoint.start();

    let pending = {
        let endpoint = endpoint.clone();
        tokio::spawn(async move { endpoint.call::<_, ()>(&"hi").await })
    };

    let (raw_read, mut raw_write) = tokio::io::split(raw_side);
    let mut lines = BufReader::new(raw_read).lines();
    let request = lines.next_line().await.unwrap().expect("request line");
    let request: serde_json::Value = serde_json::from_str(&request).unwrap();
    assert_eq!(request["id"], 1);

    raw_write.write_all(b"{\"id\":5}\n").await.unwrap();
    raw_write
        .write_all(b"{\"type\":\"response\",\"id\":1,\"error\":{}}\n")
        .await
        .unwrap();

    match pending.await.unwrap() {
        Err(RpcError::Remote(message)) => assert!(message.is_empty()),
        other => panic!("expected remote error, got {other:?}"),
    }
    assert_eq!(endpoint.state(), EndpointState::Running);
}

#[tokio::test]
async fn lifecycle_transitions_are_one_way() {
    let (a, _b) = tokio::io::duplex(64);
    let (read, write) = tokio::io::split(a);
    let endpoint = Endpoint::new(read, write, None);

    assert_eq!(endpoint.state(), EndpointState::Idle);
    assert!(endpoint.start());
    assert!(!endpoint.start());
    assert_eq!(endpoint.state(), EndpointState::Running);

    endpoint.close();
    endpoint.close();
    assert_eq!(endpoint.state(), EndpointState::Closed);
    assert!(!endpoint.start());
    assert_eq!(endpoint.state(), EndpointState::Closed);

    tokio::time::timeout(Duration::from_millis(100), endpoint.done())
        .await
        .expect("done resolves after close");
}

#[tokio::test]
async fn close_before_start_is_terminal() {
    let (a, _b) = tokio::io::duplex(64);
    let (read, write) = tokio::io::split(a);
    let endpoint = Endpoint::new(read, write, None);

    endpoint.close();
    assert!(!endpoint.start());
    assert!(endpoint.is_closed());
}

#[tokio::test]
async fn handlers_observe_endpoint_close() {
    let (observed_tx, observed_rx) = tokio::sync::oneshot::channel::<u64>();
    let observed_tx = std::sync::Mutex::new(Some(observed_tx));
    let watcher: Arc<dyn Handler> = Arc::new(handler_fn(move |ctx: RequestContext, _payload| {
        let tx = observed_tx.lock().unwrap().take();
        async move {
            ctx.closed().await;
            if let Some(tx) = tx {
                let _ = tx.send(ctx.id());
            }
            Ok::<(), BoxError>(())
        }
    }));
    let (caller, server) = connected_pair(None, Some(watcher));

    let call = {
        let caller = caller.clone();
        tokio::spawn(async move { caller.call::<_, ()>(&()).await })
    };
    wait_for_pending(&caller, 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    server.close();
    let id = tokio::time::timeout(Duration::from_secs(2), observed_rx)
        .await
        .expect("handler should see close")
        .unwrap();
    assert_eq!(id, 1);

    caller.close();
    let _ = call.await.unwrap();
}
