// Integration tests for the WebSocket transport: correlation, timeouts,
// broadcast dispatch, and receive-loop resilience, all against an
// in-process mock server.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use companion_link::core::frame::{Request, RequestBody, ResponseBody, ServerFrame};
use companion_link::core::{CommandOptions, HandlerRegistry, Transport};
use companion_link::models::{ChatMessage, EntityPayload, GameTime, TeamInfo};
use companion_link::{CompanionError, ConnectionState, ServerIdentity};

/// Bind a one-connection mock server and return its `host:port`.
async fn start_server<F, Fut>(handler: F) -> String
where
    F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let _ = env_logger::builder().is_test(true).try_init();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            let ws = accept_async(stream).await.unwrap();
            handler(ws).await;
        }
    });

    addr.to_string()
}

fn identity_for(addr: &str) -> ServerIdentity {
    let (host, port) = addr.rsplit_once(':').unwrap();
    ServerIdentity::new(host, Some(port.parse().unwrap()), 76561197960287930, 1437, false)
}

fn game_time(hour: f32) -> GameTime {
    GameTime {
        day_length_minutes: 60.0,
        sunrise: 6.0,
        sunset: 19.0,
        time: hour,
        time_scale: 1.0,
    }
}

async fn read_request(ws: &mut WebSocketStream<TcpStream>) -> Request {
    loop {
        match ws.next().await.expect("connection closed").unwrap() {
            Message::Binary(data) => return Request::decode(&data).unwrap(),
            Message::Text(text) => return Request::decode(text.as_bytes()).unwrap(),
            _ => continue,
        }
    }
}

async fn send_frame(ws: &mut WebSocketStream<TcpStream>, frame: &ServerFrame) {
    ws.send(Message::Binary(frame.encode().unwrap()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_out_of_order_responses_reach_their_callers() {
    let addr = start_server(|mut ws| async move {
        // Collect both requests before answering, then reply in reverse.
        let first = read_request(&mut ws).await;
        let second = read_request(&mut ws).await;

        for request in [&second, &first] {
            let frame = ServerFrame::Response {
                seq: request.seq,
                body: ResponseBody::Time {
                    time: game_time(request.seq as f32),
                },
            };
            send_frame(&mut ws, &frame).await;
        }
    })
    .await;

    let identity = identity_for(&addr);
    let transport = Arc::new(Transport::new(
        identity.clone(),
        None,
        Arc::new(HandlerRegistry::new()),
    ));
    transport.connect().await.unwrap();

    let request_a = Request {
        seq: transport.next_seq(),
        account_id: identity.account_id,
        account_token: identity.account_token,
        body: RequestBody::GetTime,
    };
    let request_b = Request {
        seq: transport.next_seq(),
        account_id: identity.account_id,
        account_token: identity.account_token,
        body: RequestBody::GetTime,
    };
    let (seq_a, seq_b) = (request_a.seq, request_b.seq);
    assert_eq!(seq_b, seq_a + 1);

    let (result_a, result_b) = tokio::join!(
        transport.send_request(request_a),
        transport.send_request(request_b)
    );

    for (result, expected_seq) in [(result_a, seq_a), (result_b, seq_b)] {
        match result.unwrap() {
            ServerFrame::Response { seq, body } => {
                assert_eq!(seq, expected_seq);
                match body {
                    ResponseBody::Time { time } => assert_eq!(time.time, expected_seq as f32),
                    other => panic!("unexpected body: {:?}", other),
                }
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    transport.disconnect().await;
}

#[tokio::test]
async fn test_unanswered_request_times_out_without_leaking() {
    let addr = start_server(|mut ws| async move {
        // Swallow the request and keep the connection open.
        let _ = read_request(&mut ws).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    })
    .await;

    let identity = identity_for(&addr);
    let transport = Transport::new(identity.clone(), None, Arc::new(HandlerRegistry::new()))
        .with_response_timeout(Duration::from_millis(100));
    transport.connect().await.unwrap();

    let request = Request {
        seq: transport.next_seq(),
        account_id: identity.account_id,
        account_token: identity.account_token,
        body: RequestBody::GetInfo,
    };

    match transport.send_request(request).await {
        Err(CompanionError::ResponseTimeout) => {}
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(transport.pending_requests().await, 0);

    transport.disconnect().await;
}

#[tokio::test]
async fn test_malformed_frames_do_not_kill_the_loop() {
    let addr = start_server(|mut ws| async move {
        ws.send(Message::Binary(b"\x00\x01 definitely not an envelope".to_vec()))
            .await
            .unwrap();

        let request = read_request(&mut ws).await;
        let frame = ServerFrame::Response {
            seq: request.seq,
            body: ResponseBody::Flag { value: true },
        };
        send_frame(&mut ws, &frame).await;
    })
    .await;

    let identity = identity_for(&addr);
    let transport = Transport::new(identity.clone(), None, Arc::new(HandlerRegistry::new()));
    transport.connect().await.unwrap();

    // Give the garbage frame time to pass through the receive loop first.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let request = Request {
        seq: transport.next_seq(),
        account_id: identity.account_id,
        account_token: identity.account_token,
        body: RequestBody::CheckSubscription { entity_id: 1 },
    };

    match transport.send_request(request).await.unwrap() {
        ServerFrame::Response { body, .. } => {
            assert_eq!(body, ResponseBody::Flag { value: true })
        }
        other => panic!("unexpected frame: {:?}", other),
    }

    transport.disconnect().await;
}

#[tokio::test]
async fn test_disconnect_resolves_in_flight_requests() {
    let addr = start_server(|mut ws| async move {
        // Never answer anything.
        while ws.next().await.is_some() {}
    })
    .await;

    let identity = identity_for(&addr);
    let transport = Arc::new(
        Transport::new(identity.clone(), None, Arc::new(HandlerRegistry::new()))
            .with_response_timeout(Duration::from_secs(5)),
    );
    transport.connect().await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..2 {
        let transport = transport.clone();
        let request = Request {
            seq: transport.next_seq(),
            account_id: identity.account_id,
            account_token: identity.account_token,
            body: RequestBody::GetTime,
        };
        tasks.push(tokio::spawn(
            async move { transport.send_request(request).await },
        ));
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.pending_requests().await, 2);

    transport.disconnect().await;

    for task in tasks {
        let result = task.await.unwrap();
        assert!(result.is_err(), "in-flight request must not hang or succeed");
    }
    assert_eq!(transport.pending_requests().await, 0);
    assert_eq!(transport.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_broadcasts_are_dispatched_by_kind() {
    let addr = start_server(|mut ws| async move {
        send_frame(
            &mut ws,
            &ServerFrame::ChatBroadcast {
                message: ChatMessage {
                    steam_id: 42,
                    name: "survivor".to_string(),
                    message: "hello team".to_string(),
                    color: "#ffffff".to_string(),
                    time: 1700000000,
                },
            },
        )
        .await;
        send_frame(
            &mut ws,
            &ServerFrame::EntityBroadcast {
                entity_id: 100,
                payload: EntityPayload {
                    value: true,
                    items: vec![],
                    capacity: 0,
                    has_protection: false,
                    protection_expiry: 0,
                },
            },
        )
        .await;
        send_frame(
            &mut ws,
            &ServerFrame::TeamBroadcast {
                player_id: 42,
                team_info: TeamInfo {
                    leader_steam_id: 42,
                    members: vec![],
                    map_notes: vec![],
                    leader_map_notes: vec![],
                },
            },
        )
        .await;
        tokio::time::sleep(Duration::from_secs(2)).await;
    })
    .await;

    let identity = identity_for(&addr);
    let registry = Arc::new(HandlerRegistry::new());

    let (chat_tx, mut chat_rx) = mpsc::channel(4);
    registry
        .register_chat(&identity, move |event| {
            let tx = chat_tx.clone();
            async move {
                tx.send(event).await.ok();
            }
        })
        .await;

    let (entity_tx, mut entity_rx) = mpsc::channel(4);
    registry
        .register_entity(&identity, 100, move |event| {
            let tx = entity_tx.clone();
            async move {
                tx.send(event).await.ok();
            }
        })
        .await;

    let (team_tx, mut team_rx) = mpsc::channel(4);
    registry
        .register_team(&identity, move |event| {
            let tx = team_tx.clone();
            async move {
                tx.send(event).await.ok();
            }
        })
        .await;

    let transport = Transport::new(identity.clone(), None, registry);
    transport.connect().await.unwrap();

    let chat = tokio::time::timeout(Duration::from_secs(1), chat_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(chat.message.message, "hello team");

    let entity = tokio::time::timeout(Duration::from_secs(1), entity_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entity.entity_id, 100);
    assert!(entity.payload.value);

    let team = tokio::time::timeout(Duration::from_secs(1), team_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(team.player_id, 42);

    transport.disconnect().await;
}

#[tokio::test]
async fn test_broadcast_without_listeners_is_a_no_op() {
    let addr = start_server(|mut ws| async move {
        // A broadcast nobody listens for, then a normal exchange.
        send_frame(
            &mut ws,
            &ServerFrame::EntityBroadcast {
                entity_id: 999,
                payload: EntityPayload {
                    value: false,
                    items: vec![],
                    capacity: 0,
                    has_protection: false,
                    protection_expiry: 0,
                },
            },
        )
        .await;

        let request = read_request(&mut ws).await;
        send_frame(
            &mut ws,
            &ServerFrame::Response {
                seq: request.seq,
                body: ResponseBody::Empty,
            },
        )
        .await;
    })
    .await;

    let identity = identity_for(&addr);
    let transport = Transport::new(identity.clone(), None, Arc::new(HandlerRegistry::new()));
    transport.connect().await.unwrap();

    let request = Request {
        seq: transport.next_seq(),
        account_id: identity.account_id,
        account_token: identity.account_token,
        body: RequestBody::GetTeamInfo,
    };
    assert!(transport.send_request(request).await.is_ok());

    transport.disconnect().await;
}

#[tokio::test]
async fn test_raw_listeners_see_every_frame() {
    let addr = start_server(|mut ws| async move {
        send_frame(
            &mut ws,
            &ServerFrame::TeamBroadcast {
                player_id: 1,
                team_info: TeamInfo {
                    leader_steam_id: 1,
                    members: vec![],
                    map_notes: vec![],
                    leader_map_notes: vec![],
                },
            },
        )
        .await;
        // Raw fan-out happens before decoding, so garbage counts too.
        ws.send(Message::Binary(b"garbage".to_vec())).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
    })
    .await;

    let identity = identity_for(&addr);
    let registry = Arc::new(HandlerRegistry::new());

    let (raw_tx, mut raw_rx) = mpsc::channel(4);
    registry
        .register_raw(&identity, move |data| {
            let tx = raw_tx.clone();
            async move {
                tx.send(data).await.ok();
            }
        })
        .await;

    let transport = Transport::new(identity.clone(), None, registry);
    transport.connect().await.unwrap();

    let mut seen = Vec::new();
    for _ in 0..2 {
        let data = tokio::time::timeout(Duration::from_secs(1), raw_rx.recv())
            .await
            .unwrap()
            .unwrap();
        seen.push(data);
    }
    assert!(seen.iter().any(|d| d == b"garbage"));

    transport.disconnect().await;
}

#[tokio::test]
async fn test_commands_dispatch_with_tokenized_args() {
    let addr = start_server(|mut ws| async move {
        for text in ["!time", "!time now", "!unknown thing"] {
            send_frame(
                &mut ws,
                &ServerFrame::ChatBroadcast {
                    message: ChatMessage {
                        steam_id: 42,
                        name: "survivor".to_string(),
                        message: text.to_string(),
                        color: "#ffffff".to_string(),
                        time: 1700000000,
                    },
                },
            )
            .await;
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    })
    .await;

    let identity = identity_for(&addr);
    let registry = Arc::new(HandlerRegistry::new());

    let (cmd_tx, mut cmd_rx) = mpsc::channel(4);
    registry
        .register_command(&identity, "time", vec![], None, move |ctx| {
            let tx = cmd_tx.clone();
            async move {
                tx.send(ctx).await.ok();
            }
        })
        .await;

    let transport = Transport::new(
        identity.clone(),
        Some(CommandOptions::new("!")),
        registry,
    );
    transport.connect().await.unwrap();

    let first = tokio::time::timeout(Duration::from_secs(1), cmd_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.command, "time");
    assert!(first.args.is_empty());
    assert_eq!(first.sender_name, "survivor");

    let second = tokio::time::timeout(Duration::from_secs(1), cmd_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.command, "time");
    assert_eq!(second.args, vec!["now"]);

    // The unmatched "!unknown" must be a no-op, not a third invocation.
    assert!(
        tokio::time::timeout(Duration::from_millis(200), cmd_rx.recv())
            .await
            .is_err()
    );

    transport.disconnect().await;
}
