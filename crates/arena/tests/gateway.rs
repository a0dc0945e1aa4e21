//! End-to-end tests for the WebSocket gateway: handshake, command routing,
//! rejections and reconnects.

use std::cell::Cell;
use std::time::Duration;

use arena::prelude::*;
use arena::protocol::{FightEnvelope, Invitation};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Test game
// =========================================================================

/// A coin is flipped on start; whoever claims it first wins.
///
/// `CoinEvent` holds a `Cell`, so it is `Send` but not `Sync`.
struct Coin;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum CoinAction {
    Claim,
    Pass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
enum CoinEvent {
    Flipped { face: Cell<u8> },
}

impl FightGame for Coin {
    type Config = ();
    type View = ();
    type Action = CoinAction;
    type Event = CoinEvent;

    const NAME: &'static str = "coin";

    fn create(_config: &(), _players: &[UserId]) -> Self {
        Coin
    }

    fn initial_view(&self) {}

    fn on_start(&mut self, ctx: &mut FightContext<Self>) {
        ctx.emit_game(Recipient::All, CoinEvent::Flipped { face: Cell::new(1) });
    }

    fn handle_action(
        &mut self,
        ctx: &mut FightContext<Self>,
        player: &UserId,
        action: CoinAction,
    ) -> Result<(), FightError> {
        match action {
            CoinAction::Claim => ctx.end(FightOutcome::won(player.clone())),
            CoinAction::Pass => Err(FightError::Rejected("passing is not allowed".into())),
        }
    }

    fn destroy(&mut self) {}
}

type Registry = FightRegistry<Coin, MemoryStore, AllowAll>;
type Frame = ServerMessage<CoinEvent>;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Starts a server on a random port.
async fn start_server() -> (String, Registry) {
    let server = ArenaServerBuilder::new()
        .bind("127.0.0.1:0")
        .build::<Coin, _, _, _>((), MemoryStore::new(), AllowAll, TokenAuth)
        .await
        .expect("server should build");

    let addr = server.local_addr().expect("local addr").to_string();
    let registry = server.registry();

    tokio::spawn(async move {
        let _ = server.run().await;
    });
    (addr, registry)
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, command: serde_json::Value) {
    ws.send(Message::text(command.to_string()))
        .await
        .expect("send");
}

async fn recv(ws: &mut ClientWs) -> Frame {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("frame within 2s")
            .expect("stream open")
            .expect("frame");
        match message {
            Message::Text(text) => return serde_json::from_str(text.as_str()).expect("decode"),
            Message::Binary(data) => return serde_json::from_slice(&data).expect("decode"),
            _ => continue,
        }
    }
}

/// Skips frames until one matches.
async fn recv_until(ws: &mut ClientWs, wanted: impl Fn(&Frame) -> bool) -> Frame {
    for _ in 0..32 {
        let frame = recv(ws).await;
        if wanted(&frame) {
            return frame;
        }
    }
    panic!("no matching frame");
}

async fn recv_fight_event(ws: &mut ClientWs, name: &str) -> FightEnvelope<CoinEvent> {
    let frame = recv_until(ws, |frame| match frame {
        ServerMessage::Notice(notice) => notice.as_fight().is_some_and(|env| env.event.name() == name),
        _ => false,
    })
    .await;
    match frame {
        ServerMessage::Notice(Notice::Fight(envelope)) => envelope,
        other => panic!("expected fight notice, got {other:?}"),
    }
}

/// Connects and completes the `hello` handshake.
async fn login(addr: &str, name: &str) -> ClientWs {
    let mut ws = connect(addr).await;
    send(&mut ws, json!({ "type": "hello", "token": name })).await;
    match recv(&mut ws).await {
        ServerMessage::Welcome { user_id } => assert_eq!(user_id, UserId::new(name)),
        other => panic!("expected welcome, got {other:?}"),
    }
    ws
}

/// Alice challenges Bob and both of them join and ready up.
async fn started_fight(addr: &str) -> (ClientWs, ClientWs, FightId) {
    let mut alice = login(addr, "alice").await;
    let mut bob = login(addr, "bob").await;

    send(&mut alice, json!({ "type": "challenge", "opponent": "bob" })).await;
    let fight_id = match recv(&mut alice).await {
        ServerMessage::FightCreated { fight_id } => fight_id,
        other => panic!("expected fightCreated, got {other:?}"),
    };

    for ws in [&mut alice, &mut bob] {
        send(ws, json!({ "type": "join", "fightId": fight_id })).await;
    }
    for ws in [&mut alice, &mut bob] {
        send(ws, json!({ "type": "ready", "fightId": fight_id })).await;
    }
    recv_fight_event(&mut alice, "game").await;
    recv_fight_event(&mut bob, "game").await;
    (alice, bob, fight_id)
}

fn assert_send<T: Send>(_: &T) {}

// =========================================================================
// Handshake
// =========================================================================

#[tokio::test]
async fn test_server_future_is_send_with_non_sync_events() {
    let server = ArenaServerBuilder::new()
        .bind("127.0.0.1:0")
        .build::<Coin, _, _, _>((), MemoryStore::new(), AllowAll, TokenAuth)
        .await
        .expect("server should build");
    let running = server.run();
    assert_send(&running);
    drop(running);
}

#[tokio::test]
async fn test_hello_is_answered_with_welcome() {
    let (addr, _) = start_server().await;
    login(&addr, "alice").await;
}

#[tokio::test]
async fn test_blank_token_is_unauthorized() {
    let (addr, _) = start_server().await;
    let mut ws = connect(&addr).await;

    send(&mut ws, json!({ "type": "hello", "token": "  " })).await;
    match recv(&mut ws).await {
        ServerMessage::Rejected { code, .. } => assert_eq!(code, 401),
        other => panic!("expected rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_first_command_must_be_hello() {
    let (addr, _) = start_server().await;
    let mut ws = connect(&addr).await;

    send(&mut ws, json!({ "type": "challenge", "opponent": "bob" })).await;
    match recv(&mut ws).await {
        ServerMessage::Rejected { code, message } => {
            assert_eq!(code, 400);
            assert_eq!(message, "expected hello");
        }
        other => panic!("expected rejected, got {other:?}"),
    }
}

// =========================================================================
// Routing
// =========================================================================

#[tokio::test]
async fn test_undecodable_frame_is_rejected_and_connection_survives() {
    let (addr, _) = start_server().await;
    let mut ws = login(&addr, "alice").await;

    ws.send(Message::text("not json")).await.expect("send");
    match recv(&mut ws).await {
        ServerMessage::Rejected { code, .. } => assert_eq!(code, 400),
        other => panic!("expected rejected, got {other:?}"),
    }

    send(&mut ws, json!({ "type": "challenge", "opponent": "alice" })).await;
    match recv(&mut ws).await {
        ServerMessage::Rejected { code, message } => {
            assert_eq!(code, 400);
            assert!(message.contains("alice"));
        }
        other => panic!("expected rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_challenge_invites_the_opponent() {
    let (addr, _) = start_server().await;
    let mut alice = login(&addr, "alice").await;
    let mut bob = login(&addr, "bob").await;

    send(&mut alice, json!({ "type": "challenge", "opponent": "bob" })).await;
    let fight_id = match recv(&mut alice).await {
        ServerMessage::FightCreated { fight_id } => fight_id,
        other => panic!("expected fightCreated, got {other:?}"),
    };

    match recv(&mut bob).await {
        ServerMessage::Notice(Notice::Invitation(invitation)) => assert_eq!(
            invitation,
            Invitation {
                fight_id,
                game: "coin".into(),
                from: UserId::new("alice"),
            }
        ),
        other => panic!("expected invitation, got {other:?}"),
    }

    send(&mut alice, json!({ "type": "challenge", "opponent": "bob" })).await;
    match recv(&mut alice).await {
        ServerMessage::Rejected { code, .. } => assert_eq!(code, 409),
        other => panic!("expected rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_join_unknown_fight_is_not_found() {
    let (addr, _) = start_server().await;
    let mut ws = login(&addr, "alice").await;

    send(&mut ws, json!({ "type": "join", "fightId": FightId::new() })).await;
    match recv(&mut ws).await {
        ServerMessage::Rejected { code, .. } => assert_eq!(code, 404),
        other => panic!("expected rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fight_is_played_and_scored_over_websocket() {
    let (addr, registry) = start_server().await;
    let (mut alice, mut bob, fight_id) = started_fight(&addr).await;

    // Refused actions only reach the player who sent them.
    send(&mut bob, json!({ "type": "action", "fightId": fight_id, "action": { "kind": "pass" } })).await;
    match recv(&mut bob).await {
        ServerMessage::Rejected { code, message } => {
            assert_eq!(code, 422);
            assert!(message.contains("passing is not allowed"));
        }
        other => panic!("expected rejected, got {other:?}"),
    }

    send(&mut alice, json!({ "type": "action", "fightId": fight_id, "action": { "kind": "claim" } })).await;
    for ws in [&mut alice, &mut bob] {
        match recv(ws).await {
            ServerMessage::Notice(Notice::Fight(envelope)) => {
                assert_eq!(envelope.fight_id, fight_id);
                assert_eq!(
                    envelope.event,
                    FightEvent::End {
                        winner: Some(UserId::new("alice")),
                    }
                );
            }
            other => panic!("expected end, got {other:?}"),
        }
    }

    let mut ranking = Vec::new();
    for _ in 0..100 {
        ranking = registry.ranking().await.unwrap();
        if !ranking.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(ranking[0].user, UserId::new("alice"));
    assert_eq!(ranking[0].score, 100);
}

// =========================================================================
// Connection lifecycle
// =========================================================================

#[tokio::test]
async fn test_dropped_socket_is_relayed_and_reconnect_resumes() {
    let (addr, _) = start_server().await;
    let (mut alice, bob, fight_id) = started_fight(&addr).await;

    drop(bob);
    let gone = recv_fight_event(&mut alice, "disconnect").await;
    assert_eq!(
        gone.event,
        FightEvent::Disconnect {
            player: UserId::new("bob"),
        }
    );

    let mut bob = login(&addr, "bob").await;
    let back = recv_fight_event(&mut alice, "reconnect").await;
    assert_eq!(
        back.event,
        FightEvent::Reconnect {
            player: UserId::new("bob"),
        }
    );

    send(&mut alice, json!({ "type": "action", "fightId": fight_id, "action": { "kind": "claim" } })).await;
    let end = recv_fight_event(&mut bob, "end").await;
    assert_eq!(
        end.event,
        FightEvent::End {
            winner: Some(UserId::new("alice")),
        }
    );
}

#[tokio::test]
async fn test_run_until_aborts_live_fights_on_shutdown() {
    let server = ArenaServerBuilder::new()
        .bind("127.0.0.1:0")
        .build::<Coin, _, _, _>((), MemoryStore::new(), AllowAll, TokenAuth)
        .await
        .expect("server should build");
    let addr = server.local_addr().unwrap().to_string();
    let registry = server.registry();
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let running = tokio::spawn(server.run_until(async {
        let _ = stopped.await;
    }));

    let (mut alice, _bob, _) = started_fight(&addr).await;
    assert_eq!(registry.fight_count().await, 1);

    stop.send(()).unwrap();
    running.await.unwrap().unwrap();

    let end = recv_fight_event(&mut alice, "end").await;
    assert_eq!(end.event, FightEvent::End { winner: None });
    assert_eq!(registry.fight_count().await, 0);
}
