//! Network Layer
//!
//! WebSocket server, wire messages and wallet authentication.
//! Everything here is a thin shell over `service/`; no lottery rules
//! live in this layer.

pub mod auth;
pub mod protocol;
pub mod server;

pub use auth::{validate_token, AuthConfig, AuthError, TokenClaims};
pub use protocol::{AuthResult, ClientMessage, ErrorCode, ErrorInfo, ServerMessage};
pub use server::{handle_request, Identity, LotteryServer, ServerConfig, ServerError};
