use livedev_protocol::{
    ClientId, Dispatcher, DispatcherConfig, Event, MemoryTransport, Method, RequestError,
    SentFrame, Target, Transport,
};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::mpsc;

async fn setup() -> (Dispatcher, MemoryTransport, mpsc::UnboundedReceiver<SentFrame>) {
    let dispatcher = Dispatcher::spawn(DispatcherConfig::default());
    let transport = MemoryTransport::new();
    let outbox = transport.outbox().unwrap();
    dispatcher.set_transport(transport.clone()).await.unwrap();
    (dispatcher, transport, outbox)
}

fn frame_json(frame: &SentFrame) -> Value {
    serde_json::from_str(&frame.payload).unwrap()
}

fn request_id(frame: &SentFrame) -> u64 {
    frame_json(frame)["id"].as_u64().unwrap()
}

fn respond(transport: &MemoryTransport, client: u64, orig: u64, result: Value) {
    let payload = json!({ "orig": orig, "result": result }).to_string();
    assert!(transport.deliver(ClientId(client), &payload));
}

fn collect_events(dispatcher: &Dispatcher, method: Method) -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    dispatcher
        .on(method, move |event| {
            let _ = tx.send(event.clone());
        })
        .unwrap();
    rx
}

#[tokio::test]
async fn ping_resolves_with_pong() {
    let (dispatcher, transport, mut outbox) = setup().await;
    transport.connect(ClientId(1), "http://localhost/vfs/proj/index.html");

    let call = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move { dispatcher.request(Method::RuntimePing, json!({}), Target::Broadcast).await }
    });

    let frame = outbox.recv().await.unwrap();
    assert_eq!(frame.client, ClientId(1));
    let sent = frame_json(&frame);
    assert_eq!(sent["method"], "Runtime.ping");
    assert_eq!(sent["id"], 1);

    respond(&transport, 1, 1, json!("pong"));
    assert_eq!(call.await.unwrap().unwrap(), json!("pong"));
    assert_eq!(dispatcher.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn disconnect_before_response_rejects() {
    let (dispatcher, transport, mut outbox) = setup().await;
    transport.connect(ClientId(1), "");

    let call = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move { dispatcher.request(Method::RuntimePing, json!({}), Target::Broadcast).await }
    });
    outbox.recv().await.unwrap();
    transport.disconnect(ClientId(1));

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, RequestError::ConnectionClosed(ClientId(1))));
    assert!(err.is_disconnect());
}

#[tokio::test]
async fn responses_correlate_by_id_not_arrival_order() {
    let (dispatcher, transport, mut outbox) = setup().await;
    transport.connect(ClientId(1), "");

    let first = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move {
            dispatcher
                .request(Method::RuntimeEvaluate, json!({"expression": "1"}), ClientId(1))
                .await
        }
    });
    let a = request_id(&outbox.recv().await.unwrap());
    let second = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move {
            dispatcher
                .request(Method::RuntimeEvaluate, json!({"expression": "2"}), ClientId(1))
                .await
        }
    });
    let b = request_id(&outbox.recv().await.unwrap());
    assert_ne!(a, b);

    respond(&transport, 1, b, json!(2));
    respond(&transport, 1, a, json!(1));
    assert_eq!(first.await.unwrap().unwrap(), json!(1));
    assert_eq!(second.await.unwrap().unwrap(), json!(2));
}

#[tokio::test]
async fn closing_a_client_rejects_only_its_exclusive_requests() {
    let (dispatcher, transport, mut outbox) = setup().await;
    transport.connect(ClientId(1), "");
    transport.connect(ClientId(2), "");

    let only_one = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move { dispatcher.request(Method::RuntimePing, Value::Null, ClientId(1)).await }
    });
    outbox.recv().await.unwrap();

    let broadcast = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move { dispatcher.request(Method::RuntimePing, Value::Null, Target::Broadcast).await }
    });
    let to_one = outbox.recv().await.unwrap();
    let to_two = outbox.recv().await.unwrap();
    assert_eq!(request_id(&to_one), request_id(&to_two));
    let broadcast_id = request_id(&to_two);

    let only_two = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move { dispatcher.request(Method::RuntimePing, Value::Null, ClientId(2)).await }
    });
    let only_two_id = request_id(&outbox.recv().await.unwrap());

    transport.disconnect(ClientId(1));
    assert!(matches!(
        only_one.await.unwrap(),
        Err(RequestError::ConnectionClosed(ClientId(1)))
    ));
    assert_eq!(dispatcher.pending_count().await.unwrap(), 2);

    respond(&transport, 2, broadcast_id, json!("b"));
    respond(&transport, 2, only_two_id, json!("c"));
    assert_eq!(broadcast.await.unwrap().unwrap(), json!("b"));
    assert_eq!(only_two.await.unwrap().unwrap(), json!("c"));
}

#[tokio::test]
async fn collect_all_returns_one_reply_per_client() {
    let (dispatcher, transport, mut outbox) = setup().await;
    transport.connect(ClientId(1), "");
    transport.connect(ClientId(2), "");

    let call = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move {
            dispatcher
                .request_all(Method::DomHighlight, json!({"tagId": 4}), Target::Broadcast)
                .await
        }
    });
    let id = request_id(&outbox.recv().await.unwrap());
    outbox.recv().await.unwrap();

    respond(&transport, 2, id, json!({"found": false}));
    respond(&transport, 1, id, json!({"found": true}));

    let replies = call.await.unwrap().unwrap();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].client, ClientId(2));
    assert_eq!(replies[0].outcome.as_ref().unwrap(), &json!({"found": false}));
    assert_eq!(replies[1].client, ClientId(1));
}

#[tokio::test]
async fn remote_errors_reject_with_reason() {
    let (dispatcher, transport, mut outbox) = setup().await;
    transport.connect(ClientId(1), "");

    let call = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move {
            dispatcher
                .request(Method::RuntimeEvaluate, json!({"expression": "x("}), ClientId(1))
                .await
        }
    });
    let id = request_id(&outbox.recv().await.unwrap());
    let payload = json!({"orig": id, "error": {"message": "SyntaxError"}}).to_string();
    transport.deliver(ClientId(1), &payload);

    match call.await.unwrap() {
        Err(RequestError::Remote(err)) => assert_eq!(err.message, "SyntaxError"),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn stray_and_malformed_messages_are_dropped() {
    let (dispatcher, transport, mut outbox) = setup().await;
    transport.connect(ClientId(1), "");

    respond(&transport, 1, 999, json!("late"));
    transport.deliver(ClientId(1), "{not json");
    transport.deliver(ClientId(1), r#"{"method":"Nope.nope"}"#);
    transport.deliver(ClientId(1), r#"{"method":"Connection.close"}"#);

    // Still serving requests afterwards.
    let call = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move { dispatcher.request(Method::RuntimePing, Value::Null, ClientId(1)).await }
    });
    let id = request_id(&outbox.recv().await.unwrap());
    respond(&transport, 1, id, json!("pong"));
    assert_eq!(call.await.unwrap().unwrap(), json!("pong"));
    assert_eq!(dispatcher.connections().await.unwrap().len(), 1);
}

#[tokio::test]
async fn ids_are_never_reused() {
    let (dispatcher, transport, mut outbox) = setup().await;
    transport.connect(ClientId(1), "");

    let mut seen = std::collections::HashSet::new();
    for _ in 0..5 {
        let call = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.request(Method::RuntimePing, Value::Null, ClientId(1)).await }
        });
        let id = request_id(&outbox.recv().await.unwrap());
        assert!(seen.insert(id));
        respond(&transport, 1, id, Value::Null);
        call.await.unwrap().unwrap();
    }
    assert_eq!(seen.len(), 5);
}

#[tokio::test]
async fn events_carry_the_originating_client() {
    let (dispatcher, transport, _outbox) = setup().await;
    let mut connects = collect_events(&dispatcher, Method::ConnectionConnect);
    let mut added = collect_events(&dispatcher, Method::StylesheetAdded);
    let mut closes = collect_events(&dispatcher, Method::ConnectionClose);

    transport.connect(ClientId(7), "http://localhost/vfs/proj/");
    let event = connects.recv().await.unwrap();
    assert_eq!(event.client, ClientId(7));
    assert_eq!(event.params["url"], "http://localhost/vfs/proj/");

    transport.deliver(
        ClientId(7),
        r#"{"method":"Stylesheet.added","params":{"href":"main.css"}}"#,
    );
    let event = added.recv().await.unwrap();
    assert_eq!(event.client, ClientId(7));
    assert_eq!(event.params["href"], "main.css");

    transport.disconnect(ClientId(7));
    assert_eq!(closes.recv().await.unwrap().client, ClientId(7));
}

#[tokio::test]
async fn navigation_updates_the_registry() {
    let (dispatcher, transport, _outbox) = setup().await;
    let mut navigated = collect_events(&dispatcher, Method::PageNavigated);
    transport.connect(ClientId(1), "http://localhost/a.html");
    transport.deliver(
        ClientId(1),
        r#"{"method":"Page.navigated","params":{"url":"http://localhost/b.html"}}"#,
    );
    navigated.recv().await.unwrap();

    let connections = dispatcher.connections().await.unwrap();
    assert_eq!(
        connections[0].navigated_url.as_deref(),
        Some("http://localhost/b.html")
    );
}

#[tokio::test]
async fn replacing_the_transport_rejects_pending_and_clears_connections() {
    let (dispatcher, old, mut outbox) = setup().await;
    let mut closes = collect_events(&dispatcher, Method::ConnectionClose);
    old.connect(ClientId(1), "");

    let call = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move { dispatcher.request(Method::RuntimePing, Value::Null, ClientId(1)).await }
    });
    let id = request_id(&outbox.recv().await.unwrap());

    let new = MemoryTransport::new();
    dispatcher.set_transport(new.clone()).await.unwrap();
    assert!(matches!(
        call.await.unwrap(),
        Err(RequestError::TransportReplaced)
    ));
    assert_eq!(closes.recv().await.unwrap().client, ClientId(1));
    assert!(old.is_stopped());
    assert!(dispatcher.connections().await.unwrap().is_empty());

    // Late traffic from the old transport is ignored.
    old.connect(ClientId(5), "");
    respond(&old, 1, id, json!("late"));
    new.connect(ClientId(6), "");
    let ids: Vec<_> = dispatcher
        .connections()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.client_id)
        .collect();
    assert_eq!(ids, vec![ClientId(6)]);
}

#[tokio::test]
async fn losing_the_transport_rejects_everything() {
    let (dispatcher, transport, mut outbox) = setup().await;
    transport.connect(ClientId(1), "");
    transport.connect(ClientId(2), "");

    let call = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move { dispatcher.request(Method::RuntimePing, Value::Null, Target::Broadcast).await }
    });
    outbox.recv().await.unwrap();
    transport.lose();

    assert!(matches!(call.await.unwrap(), Err(RequestError::TransportLost)));
    assert!(matches!(
        dispatcher.request(Method::RuntimePing, Value::Null, Target::Broadcast).await,
        Err(RequestError::NoTransport)
    ));
}

#[tokio::test(start_paused = true)]
async fn requests_time_out() {
    let (dispatcher, transport, mut outbox) = setup().await;
    transport.connect(ClientId(1), "");

    let call = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move {
            dispatcher
                .request_with_timeout(
                    Method::RuntimePing,
                    Value::Null,
                    ClientId(1),
                    Some(Duration::from_millis(250)),
                )
                .await
        }
    });
    let id = request_id(&outbox.recv().await.unwrap());

    match call.await.unwrap() {
        Err(RequestError::Timeout { id: timed_out, after }) => {
            assert_eq!(timed_out, id);
            assert_eq!(after, Duration::from_millis(250));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(dispatcher.pending_count().await.unwrap(), 0);

    // The late response is logged and dropped.
    respond(&transport, 1, id, json!("late"));
    assert_eq!(dispatcher.connections().await.unwrap().len(), 1);
}

#[tokio::test]
async fn send_failures_surface_immediately() {
    let (dispatcher, transport, _outbox) = setup().await;
    transport.connect(ClientId(1), "");
    transport.fail_sends(true);

    let err = dispatcher
        .request(Method::RuntimePing, Value::Null, ClientId(1))
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::Transport(_)));
    assert_eq!(dispatcher.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn missing_targets_fail_fast() {
    let dispatcher = Dispatcher::spawn(DispatcherConfig::default());
    assert!(matches!(
        dispatcher.request(Method::RuntimePing, Value::Null, Target::Broadcast).await,
        Err(RequestError::NoTransport)
    ));

    let transport = MemoryTransport::new();
    dispatcher.set_transport(transport.clone()).await.unwrap();
    assert!(matches!(
        dispatcher.request(Method::RuntimePing, Value::Null, Target::Broadcast).await,
        Err(RequestError::NoConnections)
    ));

    transport.connect(ClientId(1), "");
    assert!(matches!(
        dispatcher
            .request(
                Method::RuntimePing,
                Value::Null,
                Target::Clients(vec![ClientId(1), ClientId(3)]),
            )
            .await,
        Err(RequestError::UnknownClient(ClientId(3)))
    ));
}

#[tokio::test]
async fn notifications_have_no_id() {
    let (dispatcher, transport, mut outbox) = setup().await;
    transport.connect(ClientId(1), "");

    dispatcher
        .notify(Method::PageReload, json!({"ignoreCache": true}), Target::Broadcast)
        .await
        .unwrap();
    let sent = frame_json(&outbox.recv().await.unwrap());
    assert_eq!(sent, json!({"method": "Page.reload", "params": {"ignoreCache": true}}));
    assert_eq!(dispatcher.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn dropping_a_request_forgets_it() {
    let (dispatcher, transport, mut outbox) = setup().await;
    transport.connect(ClientId(1), "");

    let call = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move { dispatcher.request(Method::RuntimePing, Value::Null, ClientId(1)).await }
    });
    outbox.recv().await.unwrap();
    assert_eq!(dispatcher.pending_count().await.unwrap(), 1);

    call.abort();
    assert!(call.await.unwrap_err().is_cancelled());
    assert_eq!(dispatcher.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn explicit_disconnect_closes_the_client() {
    let (dispatcher, transport, _outbox) = setup().await;
    transport.connect(ClientId(1), "");
    dispatcher.disconnect(ClientId(1)).unwrap();

    assert!(dispatcher.connections().await.unwrap().is_empty());
    assert_eq!(transport.closed(), vec![ClientId(1)]);
}

#[tokio::test]
async fn remote_script_comes_from_the_transport() {
    let dispatcher = Dispatcher::spawn(DispatcherConfig::default());
    assert_eq!(dispatcher.remote_script().await.unwrap(), None);
    dispatcher
        .set_transport(MemoryTransport::with_script("connect()"))
        .await
        .unwrap();
    assert_eq!(
        dispatcher.remote_script().await.unwrap().as_deref(),
        Some("connect()")
    );
}

#[tokio::test]
async fn broadcast_skips_targets_already_gone_from_the_transport() {
    let (dispatcher, transport, mut outbox) = setup().await;
    transport.connect(ClientId(1), "");
    transport.connect(ClientId(2), "");
    // Gone from the transport, close event not delivered yet.
    transport.close(ClientId(2));

    let first = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move { dispatcher.request(Method::RuntimePing, json!({}), Target::Broadcast).await }
    });
    let frame = outbox.recv().await.unwrap();
    assert_eq!(frame.client, ClientId(1));
    respond(&transport, 1, request_id(&frame), json!("pong"));
    assert_eq!(first.await.unwrap().unwrap(), json!("pong"));

    let all = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move {
            dispatcher
                .request_all(Method::RuntimePing, json!({}), Target::Broadcast)
                .await
        }
    });
    let frame = outbox.recv().await.unwrap();
    assert_eq!(frame.client, ClientId(1));
    respond(&transport, 1, request_id(&frame), json!("pong"));

    let replies = all.await.unwrap().unwrap();
    assert_eq!(replies.len(), 2);
    for reply in &replies {
        match reply.client {
            ClientId(1) => assert_eq!(reply.outcome.as_ref().unwrap(), &json!("pong")),
            ClientId(2) => assert!(matches!(
                reply.outcome,
                Err(RequestError::ConnectionClosed(ClientId(2)))
            )),
            other => panic!("unexpected reply from {other}"),
        }
    }
    assert!(outbox.try_recv().is_err());
    assert_eq!(dispatcher.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn request_fails_when_every_target_is_gone_from_the_transport() {
    let (dispatcher, transport, _outbox) = setup().await;
    transport.connect(ClientId(1), "");
    transport.close(ClientId(1));

    let err = dispatcher
        .request(Method::RuntimePing, Value::Null, Target::Broadcast)
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::ConnectionClosed(ClientId(1))));
    assert_eq!(dispatcher.pending_count().await.unwrap(), 0);
}
