//! Command dispatch and the per-command guards.
//!
//! A handler either transitions to its success state or falls out early
//! with the guard's error state; either way the caller gets the reply to
//! put on the wire and the session continues.

use tracing::debug;

use crate::smtp::auth;
use crate::smtp::codec;
use crate::smtp::response::{ProtocolState, Reply};
use crate::smtp::session::ServerSession;
use crate::smtp::transaction::Transaction;

impl ServerSession {
    /// Split an inbound line into the 4-character command token and its
    /// argument tail, then run it.
    pub(crate) fn dispatch(&mut self, line: &str) -> Reply {
        if line.len() < 4 || !line.is_char_boundary(4) {
            return self.transit(ProtocolState::CommandUnrecognized);
        }
        let (cmd, arg_str) = line.split_at(4);
        debug!(cmd, "dispatching command");
        self.run_command(cmd, arg_str)
    }

    fn run_command(&mut self, cmd: &str, arg_str: &str) -> Reply {
        let args: Vec<&str> = arg_str.split_whitespace().collect();
        match cmd {
            "EHLO" => {
                if args.len() != 1 || !codec::is_ipv4_literal(args[0]) {
                    return self.transit(ProtocolState::SyntaxError);
                }
                self.client_hostname = Some(args[0].to_string());
                self.state = ProtocolState::ActionOkay;
                Reply::ehlo_capabilities()
            }
            "AUTH" => {
                if args.len() != 1 {
                    return self.transit(ProtocolState::SyntaxError);
                }
                if args[0] != "CRAM-MD5" {
                    return self.transit(ProtocolState::ParamNotImplemented);
                }
                let hostname = self.client_hostname.as_deref().unwrap_or_default();
                self.challenge = Some(auth::generate_challenge(hostname));
                self.transit(ProtocolState::Base64Challenge)
            }
            "MAIL" => {
                if self.client_hostname.is_none() || self.txn.is_some() {
                    return self.transit(ProtocolState::BadSequence);
                }
                if args.len() != 1 {
                    return self.transit(ProtocolState::SyntaxError);
                }
                let Some(addr) = parse_path(args[0], "FROM:") else {
                    return self.transit(ProtocolState::SyntaxError);
                };
                if !codec::is_valid_address(addr) {
                    return self.transit(ProtocolState::SyntaxError);
                }
                let mut txn = Transaction::new();
                txn.sender = Some(addr.to_string());
                self.txn = Some(txn);
                self.in_header = true;
                self.transit(ProtocolState::ActionOkay)
            }
            "RCPT" => {
                if self.txn.is_none() {
                    return self.transit(ProtocolState::BadSequence);
                }
                if args.len() != 1 {
                    return self.transit(ProtocolState::SyntaxError);
                }
                let Some(addr) = parse_path(args[0], "TO:") else {
                    return self.transit(ProtocolState::SyntaxError);
                };
                if !codec::is_valid_address(addr) {
                    return self.transit(ProtocolState::SyntaxError);
                }
                if let Some(txn) = self.txn.as_mut() {
                    txn.recipients.push(addr.to_string());
                }
                self.transit(ProtocolState::ActionOkay)
            }
            "DATA" => {
                if self.txn.is_none() {
                    return self.transit(ProtocolState::BadSequence);
                }
                if !arg_str.is_empty() {
                    return self.transit(ProtocolState::SyntaxError);
                }
                self.transit(ProtocolState::StartMailInput)
            }
            "RSET" => {
                if !arg_str.is_empty() {
                    return self.transit(ProtocolState::SyntaxError);
                }
                self.txn = None;
                self.transit(ProtocolState::ActionOkay)
            }
            "NOOP" => {
                if !arg_str.is_empty() {
                    return self.transit(ProtocolState::SyntaxError);
                }
                self.transit(ProtocolState::ActionOkay)
            }
            "QUIT" => {
                if !arg_str.is_empty() {
                    return self.transit(ProtocolState::SyntaxError);
                }
                self.transit(ProtocolState::ServiceClosing)
            }
            _ => self.transit(ProtocolState::CommandUnrecognized),
        }
    }
}

/// Extract the address from a `FROM:<addr>` / `TO:<addr>` argument.
fn parse_path<'a>(arg: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = arg.strip_prefix(prefix)?;
    let inner = rest.strip_prefix('<')?.strip_suffix('>')?;
    if inner.is_empty() { None } else { Some(inner) }
}
