mod game;

use arena::prelude::*;

use crate::game::{RockPaperScissors, RpsConfig};

#[tokio::main]
async fn main() -> Result<(), ArenaError> {
    init_tracing();

    let addr = std::env::var("ARENA_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let server = ArenaServerBuilder::new()
        .bind(&addr)
        .build::<RockPaperScissors, _, _, _>(RpsConfig::default(), MemoryStore::new(), AllowAll, TokenAuth)
        .await?;
    tracing::info!(%addr, "rock-paper-scissors server listening");

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use serde_json::{Value, json};
    use tokio_tungstenite::tungstenite::Message;

    use super::*;

    type Ws = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn start() -> String {
        let server = ArenaServerBuilder::new()
            .bind("127.0.0.1:0")
            .build::<RockPaperScissors, _, _, _>(RpsConfig::default(), MemoryStore::new(), AllowAll, TokenAuth)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        addr
    }

    async fn send(ws: &mut Ws, value: Value) {
        ws.send(Message::text(value.to_string())).await.unwrap();
    }

    async fn recv(ws: &mut Ws) -> Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
                .await
                .expect("timed out")
                .unwrap()
                .unwrap();
            if let Message::Text(text) = msg {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    /// Reads until a fight event with the given game `kind` (or base `event`) arrives.
    async fn recv_event(ws: &mut Ws, name: &str) -> Value {
        for _ in 0..32 {
            let frame = recv(ws).await;
            let body = &frame["body"]["body"];
            if body["event"] == name || body["data"]["kind"] == name {
                return body.clone();
            }
        }
        panic!("no {name} event");
    }

    async fn login(addr: &str, name: &str) -> Ws {
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}")).await.unwrap();
        send(&mut ws, json!({ "type": "hello", "token": name })).await;
        assert_eq!(recv(&mut ws).await["type"], "welcome");
        ws
    }

    async fn choose(ws: &mut Ws, fight_id: &Value, hand: &str) {
        send(
            ws,
            json!({ "type": "action", "fightId": fight_id, "action": { "kind": "choose", "hand": hand } }),
        )
        .await;
    }

    #[tokio::test]
    async fn test_full_match_over_websocket() {
        let addr = start().await;
        let mut alice = login(&addr, "alice").await;
        let mut bob = login(&addr, "bob").await;

        send(&mut alice, json!({ "type": "challenge", "opponent": "bob" })).await;
        let created = recv(&mut alice).await;
        assert_eq!(created["type"], "fightCreated");
        let fight_id = created["body"]["fightId"].clone();

        let invitation = recv(&mut bob).await;
        assert_eq!(invitation["body"]["type"], "invitation");
        assert_eq!(invitation["body"]["body"]["game"], "rock-paper-scissors");

        for ws in [&mut alice, &mut bob] {
            send(ws, json!({ "type": "join", "fightId": fight_id })).await;
        }
        for ws in [&mut alice, &mut bob] {
            send(ws, json!({ "type": "ready", "fightId": fight_id })).await;
        }
        let round = recv_event(&mut bob, "roundStarted").await;
        assert_eq!(round["data"]["round"], 1);

        choose(&mut alice, &fight_id, "paper").await;
        choose(&mut bob, &fight_id, "rock").await;
        let result = recv_event(&mut bob, "roundResult").await;
        assert_eq!(result["data"]["winner"], "alice");

        choose(&mut alice, &fight_id, "scissors").await;
        choose(&mut bob, &fight_id, "paper").await;
        let end = recv_event(&mut bob, "end").await;
        assert_eq!(end["data"]["winner"], "alice");
        assert_eq!(end["fightId"], fight_id);
    }
}
