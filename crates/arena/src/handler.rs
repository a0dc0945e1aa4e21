//! Per-connection handler: handshake, hub subscription and command routing.
//!
//! Each accepted socket gets its own task running this handler:
//!   1. Receive `hello` and authenticate the token.
//!   2. Subscribe the user to the hub, report the (re)connection to their
//!      live fight, if any, and reply `welcome`.
//!   3. Loop: forward notices to the socket and route client commands to
//!      the registry. A refused command is answered with `rejected` on
//!      this socket only.
//!   4. On close, unsubscribe and mark the user disconnected in their fight.

use std::net::SocketAddr;
use std::sync::Arc;

use arena_fight::{FightGame, PlayerSender};
use arena_protocol::{ClientCommand, Codec, ProtocolError, ServerMessage, UserId};
use arena_registry::{FightStore, RoleCheck};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::server::ServerState;
use crate::{ArenaError, Authenticator};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// Unsubscribes the user and reports the disconnect when the handler exits,
/// including when it exits early with an error.
///
/// `Drop` is synchronous, so the cleanup runs in a spawned task.
struct ConnectionGuard<G, S, R, A, C>
where
    G: FightGame,
    S: FightStore,
    R: RoleCheck,
    A: Authenticator,
    C: Codec,
{
    user: UserId,
    channel: PlayerSender<G::Event>,
    state: Arc<ServerState<G, S, R, A, C>>,
}

impl<G, S, R, A, C> Drop for ConnectionGuard<G, S, R, A, C>
where
    G: FightGame,
    S: FightStore,
    R: RoleCheck,
    A: Authenticator,
    C: Codec,
{
    fn drop(&mut self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let user = self.user.clone();
        let channel = self.channel.clone();
        let state = Arc::clone(&self.state);
        runtime.spawn(async move {
            let registry = &state.registry;
            // A newer connection of the same user owns the subscription now.
            if !registry.hub().unsubscribe(&user, &channel).await {
                return;
            }
            if let Err(err) = registry.disconnect_user(&user).await {
                tracing::debug!(%user, %err, "disconnect not delivered");
            }
        });
    }
}

/// Handles one socket from accept to close.
pub(crate) async fn handle_connection<G, S, R, A, C>(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<ServerState<G, S, R, A, C>>,
) -> Result<(), ArenaError>
where
    G: FightGame,
    S: FightStore,
    R: RoleCheck,
    A: Authenticator,
    C: Codec,
{
    let socket = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut source) = socket.split();
    tracing::debug!(%peer, "websocket accepted");

    let user = perform_handshake(&mut sink, &mut source, &state).await?;
    tracing::info!(%peer, %user, "user authenticated");

    // Subscribed before `welcome`, so nothing sent after it is missed.
    let (channel, mut notices) = state.registry.hub().subscribe(user.clone()).await;
    let _guard = ConnectionGuard {
        user: user.clone(),
        channel: channel.clone(),
        state: Arc::clone(&state),
    };
    if let Err(err) = state.registry.connect_user(&user, channel).await {
        tracing::debug!(%user, %err, "reconnect not delivered");
    }
    let welcome = encode_frame(
        &state.codec,
        &ServerMessage::<G::Event>::Welcome {
            user_id: user.clone(),
        },
    )?;
    sink.send(welcome).await?;

    loop {
        tokio::select! {
            frame = next_frame(&mut source) => match frame {
                Ok(Some(data)) => handle_frame(&mut sink, &state, &user, &data).await?,
                Ok(None) => {
                    tracing::info!(%user, "connection closed");
                    break;
                }
                Err(err) => {
                    tracing::debug!(%user, %err, "recv error");
                    break;
                }
            },
            Some(notice) = notices.recv() => {
                let frame = encode_frame(&state.codec, &ServerMessage::Notice(notice))?;
                sink.send(frame).await?;
            }
        }
    }

    Ok(())
}

/// Waits for `hello` and authenticates its token.
async fn perform_handshake<G, S, R, A, C>(
    sink: &mut WsSink,
    source: &mut WsSource,
    state: &ServerState<G, S, R, A, C>,
) -> Result<UserId, ArenaError>
where
    G: FightGame,
    S: FightStore,
    R: RoleCheck,
    A: Authenticator,
    C: Codec,
{
    let data = match tokio::time::timeout(state.gateway.handshake_timeout, next_frame(source))
        .await
    {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage("connection closed before hello".into()).into());
        }
        Ok(Err(err)) => return Err(err),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("hello timed out".into()).into());
        }
    };

    let token = match state.codec.decode::<ClientCommand<G::Action>>(&data) {
        Ok(ClientCommand::Hello { token }) => token,
        _ => {
            send_rejected(sink, &state.codec, 400, "expected hello").await?;
            return Err(ProtocolError::InvalidMessage("first command must be hello".into()).into());
        }
    };

    match state.auth.authenticate(&token).await {
        Ok(user) => Ok(user),
        Err(err) => {
            send_rejected(sink, &state.codec, 401, "unauthorized").await?;
            Err(err.into())
        }
    }
}

/// Decodes one client frame and routes it to the registry.
///
/// Only socket failures are returned; refused commands are reported to the
/// client and the connection stays open.
async fn handle_frame<G, S, R, A, C>(
    sink: &mut WsSink,
    state: &ServerState<G, S, R, A, C>,
    user: &UserId,
    data: &[u8],
) -> Result<(), ArenaError>
where
    G: FightGame,
    S: FightStore,
    R: RoleCheck,
    A: Authenticator,
    C: Codec,
{
    let command: ClientCommand<G::Action> = match state.codec.decode(data) {
        Ok(command) => command,
        Err(err) => {
            tracing::debug!(%user, %err, "undecodable command");
            return send_rejected(sink, &state.codec, 400, &err.to_string()).await;
        }
    };

    let registry = &state.registry;
    let refused: Result<(), ArenaError> = match command {
        ClientCommand::Hello { .. } => {
            Err(ProtocolError::InvalidMessage("already authenticated".into()).into())
        }
        ClientCommand::Challenge { opponent } => {
            match registry.create_fight(user.clone(), opponent).await {
                Ok(ticket) => {
                    let created = encode_frame(
                        &state.codec,
                        &ServerMessage::<G::Event>::FightCreated {
                            fight_id: ticket.fight_id,
                        },
                    )?;
                    sink.send(created).await?;
                    return Ok(());
                }
                Err(err) => Err(err.into()),
            }
        }
        ClientCommand::Join { fight_id } => registry
            .join(fight_id, user.clone())
            .await
            .map_err(ArenaError::from),
        ClientCommand::Ready { fight_id } => registry
            .ready(fight_id, user.clone())
            .await
            .map_err(ArenaError::from),
        ClientCommand::Action { fight_id, action } => registry
            .act(fight_id, user.clone(), action)
            .await
            .map_err(ArenaError::from),
    };

    if let Err(err) = refused {
        tracing::debug!(%user, %err, "command refused");
        send_rejected(sink, &state.codec, err.status_code(), &err.to_string()).await?;
    }
    Ok(())
}

/// Next data frame, or `None` once the peer closed.
async fn next_frame(source: &mut WsSource) -> Result<Option<Vec<u8>>, ArenaError> {
    while let Some(message) = source.next().await {
        match message? {
            Message::Text(text) => return Ok(Some(text.as_str().as_bytes().to_vec())),
            Message::Binary(data) => return Ok(Some(data.to_vec())),
            Message::Close(_) => return Ok(None),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }
    Ok(None)
}

/// Encodes a frame up front, so no borrow of a game event is held across
/// a socket write. JSON codecs produce UTF-8, which goes out as text.
fn encode_frame<E: Serialize, C: Codec>(
    codec: &C,
    message: &ServerMessage<E>,
) -> Result<Message, ArenaError> {
    Ok(match String::from_utf8(codec.encode(message)?) {
        Ok(text) => Message::text(text),
        Err(err) => Message::binary(err.into_bytes()),
    })
}

async fn send_rejected<C: Codec>(
    sink: &mut WsSink,
    codec: &C,
    code: u16,
    message: &str,
) -> Result<(), ArenaError> {
    let rejected = encode_frame(
        codec,
        &ServerMessage::<()>::Rejected {
            code,
            message: message.to_string(),
        },
    )?;
    sink.send(rejected).await?;
    Ok(())
}
