//! The protocol implementation: both roles, the relay between them, and
//! everything they share.

pub mod auth;
pub mod client;
pub mod codec;
pub mod commands;
pub mod error;
pub mod log;
pub mod relay;
pub mod response;
pub mod server;
pub mod session;
pub mod transaction;

pub use auth::Credential;
pub use client::ClientDriver;
pub use error::SmtpError;
pub use relay::Relay;
pub use response::{ProtocolState, Reply};
pub use server::SmtpServer;
pub use session::ServerSession;
pub use transaction::{Transaction, TransactionError};
