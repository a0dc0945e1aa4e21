//! `ArenaServer` builder and accept loop.
//!
//! The server owns one [`FightRegistry`] and its [`Hub`]. Every accepted
//! socket runs [`handle_connection`] in its own task; the registry and the
//! fight actors do the rest.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arena_fight::FightGame;
use arena_protocol::{Codec, JsonCodec};
use arena_registry::{FightRegistry, FightStore, Hub, RegistryConfig, RoleCheck};
use tokio::net::TcpListener;

use crate::handler::handle_connection;
use crate::{ArenaError, Authenticator};

/// Connection timing for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// How long a new socket has to send `hello`.
    pub handshake_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

/// Shared by every connection task.
pub(crate) struct ServerState<G: FightGame, S, R, A, C> {
    pub(crate) registry: FightRegistry<G, S, R>,
    pub(crate) auth: A,
    pub(crate) codec: C,
    pub(crate) gateway: GatewayConfig,
}

/// Builder for an [`ArenaServer`].
///
/// ```rust,ignore
/// use arena::prelude::*;
///
/// let server = ArenaServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .registry_config(RegistryConfig::default())
///     .build::<MyGame, _, _, _>(config, MemoryStore::new(), AllowAll, TokenAuth)
///     .await?;
/// server.run().await
/// ```
#[derive(Debug, Clone)]
pub struct ArenaServerBuilder {
    bind_addr: String,
    registry_config: RegistryConfig,
    gateway: GatewayConfig,
}

impl ArenaServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            registry_config: RegistryConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }

    /// Sets the address to listen on.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets scoring and the other registry knobs.
    pub fn registry_config(mut self, config: RegistryConfig) -> Self {
        self.registry_config = config;
        self
    }

    pub fn gateway_config(mut self, config: GatewayConfig) -> Self {
        self.gateway = config;
        self
    }

    /// Binds the listener and creates the registry.
    ///
    /// Frames are JSON.
    pub async fn build<G, S, R, A>(
        self,
        game_config: G::Config,
        store: S,
        roles: R,
        auth: A,
    ) -> Result<ArenaServer<G, S, R, A, JsonCodec>, ArenaError>
    where
        G: FightGame,
        S: FightStore,
        R: RoleCheck,
        A: Authenticator,
    {
        let listener = TcpListener::bind(&self.bind_addr).await?;
        let registry = FightRegistry::new(
            self.registry_config,
            game_config,
            store,
            roles,
            Arc::new(Hub::new()),
        );
        tracing::info!(addr = %listener.local_addr()?, game = G::NAME, "arena server bound");

        Ok(ArenaServer {
            listener,
            state: Arc::new(ServerState {
                registry,
                auth,
                codec: JsonCodec,
                gateway: self.gateway,
            }),
        })
    }
}

impl Default for ArenaServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Arena server. Call [`run`](Self::run) to accept connections.
pub struct ArenaServer<G: FightGame, S, R, A, C> {
    listener: TcpListener,
    state: Arc<ServerState<G, S, R, A, C>>,
}

impl<G, S, R, A, C> ArenaServer<G, S, R, A, C>
where
    G: FightGame,
    S: FightStore,
    R: RoleCheck,
    A: Authenticator,
    C: Codec,
{
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The registry behind the gateway, for rankings and administration.
    pub fn registry(&self) -> FightRegistry<G, S, R> {
        self.state.registry.clone()
    }

    /// Accepts connections until the process ends.
    pub async fn run(self) -> Result<(), ArenaError> {
        self.run_until(std::future::pending()).await
    }

    /// Accepts connections until `shutdown` resolves, then shuts the
    /// registry down, which aborts and settles every live fight.
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), ArenaError> {
        tracing::info!("arena server running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(err) = handle_connection(stream, peer, state).await {
                                tracing::debug!(%peer, %err, "connection ended with error");
                            }
                        });
                    }
                    Err(err) => tracing::error!(%err, "accept failed"),
                },
                () = &mut shutdown => break,
            }
        }

        tracing::info!("arena server stopping");
        self.state.registry.shutdown().await;
        Ok(())
    }
}
