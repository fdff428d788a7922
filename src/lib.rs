//! # minipost
//!
//! minipost implements a minimal SMTP dialect: a server that accepts mail
//! submissions over a line-oriented text protocol, CRAM-MD5 challenge
//! response authentication, a batch submission client, and an
//! eavesdropping relay that impersonates each peer to the other while the
//! real server keeps the final say on credentials.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::thread;
//! use minipost::{ClientDriver, Credential, SmtpServer, Transaction};
//!
//! let server = SmtpServer::new(
//!     PathBuf::from("/tmp/inbox"),
//!     Credential::new("7D444D", "b4b52156ba5213240a2315b0bc5412ed"),
//! );
//! thread::spawn(move || {
//!     server.start(("localhost", 2525)).unwrap();
//! });
//!
//! let mut client = ClientDriver::new("127.0.0.1", 2525);
//! client.connect().unwrap();
//! client.receive().unwrap(); // 220 greeting
//! client.run("EHLO", &["127.0.0.1"]).unwrap();
//!
//! let txn = Transaction::from_text("From: <a@b.com>\nTo: <c@d.com>\nhello\n").unwrap();
//! client.send_transaction(&txn).unwrap();
//! client.run("QUIT", &[]).unwrap();
//! client.disconnect();
//! ```
//!
//! ## Supported commands
//!
//! - `EHLO` - identify the client by its IPv4 literal
//! - `AUTH CRAM-MD5` - challenge/response authentication
//! - `MAIL FROM` - open a transaction with its sender
//! - `RCPT TO` - add a recipient (repeatable)
//! - `DATA` - collect header and body lines until a lone `.`
//! - `RSET` - discard the current transaction
//! - `NOOP` - do nothing
//! - `QUIT` - close the session
//!
//! ## Notes
//!
//! - Commands are case-sensitive four-character tokens.
//! - Every inbound unit must be CRLF-terminated; anything else resets
//!   that session.
//! - Completed, well-formed transactions are persisted one file per
//!   transaction, named by the `Date:` header's Unix timestamp or
//!   `unknown`.
//! - Authentication is optional: a session may submit mail without ever
//!   running `AUTH`.

pub mod config;
pub mod smtp;

pub use smtp::{
    ClientDriver, Credential, ProtocolState, Relay, Reply, ServerSession, SmtpError, SmtpServer,
    Transaction, TransactionError,
};

use tracing_subscriber::EnvFilter;

/// Install the diagnostic log subscriber for a binary. Diagnostics go to
/// stderr; stdout stays reserved for session logs.
pub fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
