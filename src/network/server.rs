//! WebSocket Lottery Server
//!
//! Async WebSocket front door for wallets and round operators.
//! Each connection authenticates once with a wallet JWT; every later
//! request acts as that wallet. Background work closes expired rounds
//! and resubmits commitments the ledger did not take.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::{interval, sleep_until};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{LotteryError, LotteryResult};
use crate::network::auth::{validate_token, AuthConfig};
use crate::network::protocol::{AuthResult, ClientMessage, ErrorCode, ServerMessage};
use crate::seal::SealingKey;
use crate::service::TicketService;
use crate::ticket::{Owner, TicketId};

/// Longest sales window an operator can request (one year).
const MAX_ROUND_SECS: u64 = 365 * 24 * 60 * 60;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Connections silent this long are dropped.
    pub idle_timeout: Duration,
    /// How often expired rounds and pending submissions are swept.
    pub maintenance_interval: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            maintenance_interval: Duration::from_secs(15),
            version: crate::VERSION.to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ServerError> {
        let defaults = Self::default();

        let bind_addr = match std::env::var("SPIN_BIND_ADDR") {
            Ok(v) => v
                .parse()
                .map_err(|e| ServerError::Config(format!("SPIN_BIND_ADDR={}: {}", v, e)))?,
            Err(_) => defaults.bind_addr,
        };
        Ok(Self {
            bind_addr,
            max_connections: std::env::var("SPIN_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            idle_timeout: env_secs("SPIN_IDLE_TIMEOUT_SECS", defaults.idle_timeout),
            maintenance_interval: env_secs("SPIN_MAINTENANCE_SECS", defaults.maintenance_interval),
            version: defaults.version,
        })
    }
}

/// Positive whole seconds from `name`, else `fallback`.
fn env_secs(name: &str, fallback: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(fallback)
}

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Bad configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Who a connection is acting as.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    /// Wallet, once authenticated.
    pub owner: Option<Owner>,
    /// Token carried the admin claim.
    pub admin: bool,
}

impl Identity {
    /// Whether a wallet token was accepted.
    pub fn is_authenticated(&self) -> bool {
        self.owner.is_some()
    }
}

/// Connected client state.
struct ConnectedClient {
    owner: Option<Owner>,
    connected_at: Instant,
}

/// The lottery server.
pub struct LotteryServer {
    config: ServerConfig,
    auth: AuthConfig,
    service: Arc<TicketService>,
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl LotteryServer {
    /// Create a new server over `service`.
    pub fn new(config: ServerConfig, auth: AuthConfig, service: Arc<TicketService>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            auth,
            service,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        info!("Lottery server listening on {}", listener.local_addr()?);
        if !self.auth.is_configured() {
            warn!("No AUTH_SECRET or AUTH_PUBLIC_KEY_PEM set; every auth attempt will fail");
        }

        let maintenance = {
            let service = self.service.clone();
            let every = self.config.maintenance_interval;
            tokio::spawn(async move { Self::run_maintenance_loop(service, every).await })
        };

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        maintenance.abort();
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let service = self.service.clone();
        let auth = self.auth.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            clients.write().await.insert(
                addr,
                ConnectedClient {
                    owner: None,
                    connected_at: Instant::now(),
                },
            );

            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            let mut identity = Identity::default();
            let mut idle_deadline = tokio::time::Instant::now() + config.idle_timeout;

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        idle_deadline = tokio::time::Instant::now() + config.idle_timeout;
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let reply = match ClientMessage::from_json(&text) {
                                    Ok(client_msg) => {
                                        let was_authenticated = identity.is_authenticated();
                                        let reply = handle_request(
                                            &service,
                                            &auth,
                                            &config.version,
                                            &mut identity,
                                            client_msg,
                                        ).await;
                                        if !was_authenticated && identity.is_authenticated() {
                                            if let Some(client) = clients.write().await.get_mut(&addr) {
                                                client.owner = identity.owner.clone();
                                            }
                                        }
                                        reply
                                    }
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        ServerMessage::error(ErrorCode::InvalidInput, "Invalid message format")
                                    }
                                };
                                if msg_tx.send(reply).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Binary(_))) => {
                                let _ = msg_tx.send(ServerMessage::error(
                                    ErrorCode::InvalidInput,
                                    "Binary frames are not supported",
                                )).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = sleep_until(idle_deadline) => {
                        info!("Dropping idle client {}", addr);
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // let the sender flush whatever is queued, then stop it
            drop(msg_tx);
            if tokio::time::timeout(Duration::from_secs(1), sender_task).await.is_err() {
                debug!("Sender for {} did not drain in time", addr);
            }

            if let Some(client) = clients.write().await.remove(&addr) {
                info!(
                    "Client {} ({}) cleaned up after {:?}",
                    addr,
                    client.owner.as_ref().map(Owner::as_str).unwrap_or("anonymous"),
                    client.connected_at.elapsed()
                );
            }
        });
    }

    /// Close expired rounds and retry failed ledger submissions.
    async fn run_maintenance_loop(service: Arc<TicketService>, every: Duration) {
        let mut interval = interval(every);

        loop {
            interval.tick().await;

            if let Some(round_id) = service.close_expired_rounds() {
                info!("Round {} expired and was closed", round_id);
            }

            let resubmitted = service.retry_pending_submissions().await;
            if resubmitted > 0 {
                info!("Resubmitted {} pending commitments", resubmitted);
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

// =============================================================================
// REQUEST HANDLING
// =============================================================================

/// Answer one client message on behalf of `identity`.
///
/// `Auth` updates `identity`; everything else is checked against it.
pub async fn handle_request(
    service: &TicketService,
    auth: &AuthConfig,
    version: &str,
    identity: &mut Identity,
    msg: ClientMessage,
) -> ServerMessage {
    if let ClientMessage::Auth { token } = &msg {
        return authenticate(auth, version, identity, token);
    }

    if msg.requires_auth() && !identity.is_authenticated() {
        return ServerMessage::error(ErrorCode::NotAuthenticated, "Authenticate first");
    }
    if msg.requires_admin() && !identity.admin {
        return ServerMessage::error(ErrorCode::Forbidden, "Admin claim required");
    }

    match dispatch(service, identity, msg).await {
        Ok(reply) => reply,
        Err(e) => ServerMessage::from(&e),
    }
}

fn authenticate(auth: &AuthConfig, version: &str, identity: &mut Identity, token: &str) -> ServerMessage {
    match validate_token(token, auth) {
        Ok(claims) => {
            let owner = claims.owner();
            debug!("Authenticated wallet {} (admin: {})", owner, claims.admin);
            identity.owner = Some(owner.clone());
            identity.admin = claims.admin;
            ServerMessage::AuthResult(AuthResult {
                success: true,
                owner: Some(owner.to_string()),
                admin: claims.admin,
                error: None,
                server_version: version.to_string(),
            })
        }
        Err(e) => {
            debug!("Authentication failed: {}", e);
            ServerMessage::AuthResult(AuthResult {
                success: false,
                owner: None,
                admin: false,
                error: Some(e.to_string()),
                server_version: version.to_string(),
            })
        }
    }
}

async fn dispatch(
    service: &TicketService,
    identity: &Identity,
    msg: ClientMessage,
) -> LotteryResult<ServerMessage> {
    let reply = match msg {
        ClientMessage::Auth { .. } => {
            return Err(LotteryError::Internal("auth reached dispatch".into()));
        }
        ClientMessage::Ping { timestamp } => ServerMessage::Pong {
            timestamp,
            server_time: Utc::now().timestamp_millis().max(0) as u64,
        },
        ClientMessage::CurrentRound => ServerMessage::Round {
            round: service.current_round(),
        },
        ClientMessage::OpenRound {
            ticket_price,
            jackpot,
            duration_secs,
        } => {
            if duration_secs == Some(0) {
                return Ok(ServerMessage::error(ErrorCode::InvalidInput, "duration_secs must be positive"));
            }
            let duration = duration_secs
                .map(|secs| chrono::Duration::seconds(secs.min(MAX_ROUND_SECS) as i64));
            ServerMessage::Round {
                round: Some(service.open_round(ticket_price, jackpot, duration)?),
            }
        }
        ClientMessage::CloseRound { round_id } => ServerMessage::Round {
            round: Some(service.close_round(&round_id)?),
        },
        ClientMessage::CompleteRound { round_id } => {
            let winning_numbers = service.complete_round(&round_id)?;
            ServerMessage::RoundCompleted {
                round_id,
                winning_numbers,
            }
        }
        ClientMessage::Purchase { round_id, price } => {
            let owner = caller(identity)?;
            ServerMessage::Purchased(service.purchase(owner, price, &round_id).await?)
        }
        ClientMessage::Reveal { ticket_id, key } => {
            ensure_owned(service, identity, &ticket_id)?;
            let key = SealingKey::from_hex(&key)?;
            let numbers = service.reveal(&ticket_id, &key)?;
            ServerMessage::Revealed { ticket_id, numbers }
        }
        ClientMessage::RevealStored { ticket_id } => {
            ensure_owned(service, identity, &ticket_id)?;
            let numbers = service.reveal_with_custody(&ticket_id).await?;
            ServerMessage::Revealed { ticket_id, numbers }
        }
        ClientMessage::ListTickets => ServerMessage::Tickets {
            tickets: service.list_by_owner(caller(identity)?),
        },
        ClientMessage::TicketResult { ticket_id } => {
            ensure_owned(service, identity, &ticket_id)?;
            ServerMessage::TicketResult(service.ticket_result(&ticket_id)?)
        }
        ClientMessage::RetrySubmission { ticket_id } => {
            ensure_owned(service, identity, &ticket_id)?;
            let tx_ref = service.retry_submission(&ticket_id).await?;
            ServerMessage::Submission { ticket_id, tx_ref }
        }
    };
    Ok(reply)
}

fn caller(identity: &Identity) -> LotteryResult<&Owner> {
    identity
        .owner
        .as_ref()
        .ok_or_else(|| LotteryError::Internal("unauthenticated request reached dispatch".into()))
}

/// Other wallets' tickets look the same as missing ones.
fn ensure_owned(service: &TicketService, identity: &Identity, ticket_id: &TicketId) -> LotteryResult<()> {
    let owner = caller(identity)?;
    let ticket = service.ticket(ticket_id)?;
    if &ticket.owner != owner {
        return Err(LotteryError::ticket_not_found(ticket_id));
    }
    Ok(())
}
