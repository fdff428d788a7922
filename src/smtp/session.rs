//! Per-connection server state: one session owns its protocol state, the
//! active transaction, and its traffic logs. Command dispatch lives in
//! `commands.rs`; the consuming states (auth response, mail input) are
//! handled here.

use std::io;
use std::path::PathBuf;

use tracing::debug;

use crate::smtp::auth::{self, Credential};
use crate::smtp::codec;
use crate::smtp::error::SmtpError;
use crate::smtp::log::{self, Side, TrafficLog};
use crate::smtp::response::{ProtocolState, Reply};
use crate::smtp::transaction::Transaction;

#[derive(Debug)]
pub struct ServerSession {
    pub(crate) state: ProtocolState,
    pub(crate) client_hostname: Option<String>,
    pub(crate) txn: Option<Transaction>,
    pub(crate) in_header: bool,
    pub(crate) challenge: Option<String>,
    pub(crate) credential: Option<Credential>,
    pub(crate) mailbox_dir: PathBuf,
    pub(crate) prefix: String,
    pub(crate) instant_logging: bool,
    pub(crate) own_log: TrafficLog,
    pub(crate) peer_log: TrafficLog,
}

impl ServerSession {
    /// A fresh session persisting completed transactions into
    /// `mailbox_dir`. Starts in `ServiceReady`, without a credential (the
    /// relay's server role runs this way; real servers call
    /// [`set_credential`]).
    ///
    /// [`set_credential`]: ServerSession::set_credential
    pub fn new(mailbox_dir: PathBuf) -> Self {
        Self {
            state: ProtocolState::ServiceReady,
            client_hostname: None,
            txn: None,
            in_header: false,
            challenge: None,
            credential: None,
            mailbox_dir,
            prefix: String::new(),
            instant_logging: false,
            own_log: TrafficLog::new(),
            peer_log: TrafficLog::new(),
        }
    }

    pub fn set_credential(&mut self, credential: Credential) {
        self.credential = Some(credential);
    }

    /// Prefix for log lines and persisted file names, e.g. `[pid][order]`
    /// on the concurrent server.
    pub fn set_prefix(&mut self, prefix: &str) {
        self.prefix = prefix.to_string();
    }

    /// Print log entries as they are recorded instead of queueing them
    /// for an ordered drain at session end.
    pub fn set_instant_logging(&mut self, instant: bool) {
        self.instant_logging = instant;
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The greeting emitted on connection accept.
    pub fn greeting(&mut self) -> Reply {
        self.transit(ProtocolState::ServiceReady)
    }

    /// Consume one CRLF-stripped inbound line and produce the reply.
    pub fn handle_line(&mut self, line: &str) -> Result<Reply, SmtpError> {
        match self.state {
            ProtocolState::Base64Challenge => Ok(self.finish_auth(line)),
            ProtocolState::StartMailInput => self.ingest_data(line),
            _ => Ok(self.dispatch(line)),
        }
    }

    /// Take on a peer state machine's authoritative state and return the
    /// canonical reply for it. The relay's only cross-machine state
    /// transfer goes through here.
    pub fn adopt_state(&mut self, peer_state: ProtocolState) -> Reply {
        debug!(?peer_state, "adopting peer state");
        self.transit(peer_state)
    }

    /// Verify the client's answer to an outstanding challenge.
    fn finish_auth(&mut self, line: &str) -> Reply {
        let verdict = match auth::decode_response(line) {
            None => ProtocolState::SyntaxError,
            Some((identity, digest)) => {
                let challenge = self.challenge.as_deref().unwrap_or_default();
                let accepted = self
                    .credential
                    .as_ref()
                    .is_some_and(|c| c.verify(challenge, &identity, &digest));
                if accepted {
                    ProtocolState::AuthSucceeded
                } else {
                    ProtocolState::AuthInvalid
                }
            }
        };
        self.transit(verdict)
    }

    /// Feed one line of the DATA phase.
    fn ingest_data(&mut self, line: &str) -> Result<Reply, SmtpError> {
        if line == "." {
            if let Some(txn) = self.txn.take() {
                if txn.check_formation() {
                    let path = txn.save_as(&self.mailbox_dir, &self.prefix)?;
                    debug!(path = %path.display(), "transaction persisted");
                }
            }
            return Ok(self.transit(ProtocolState::ActionOkay));
        }

        let Some(txn) = self.txn.as_mut() else {
            return Err(SmtpError::Io(io::Error::other(
                "mail input state without an active transaction",
            )));
        };
        match txn.add_entry(line, self.in_header) {
            Ok(was_header) => {
                self.in_header = was_header;
                Ok(self.transit(ProtocolState::StartMailInput))
            }
            Err(err) => {
                // a malformed header aborts the transaction, not the session
                debug!(%err, "discarding transaction");
                self.txn = None;
                self.in_header = false;
                Ok(self.transit(ProtocolState::SyntaxError))
            }
        }
    }

    pub(crate) fn transit(&mut self, next: ProtocolState) -> Reply {
        self.state = next;
        match next {
            ProtocolState::Base64Challenge => {
                Reply::challenge(&codec::encode_base64(self.challenge.as_deref().unwrap_or_default()))
            }
            _ => Reply::for_state(next),
        }
    }

    /// Record a response of our own, instantly or for the end-of-session
    /// drain.
    pub fn record_own(&mut self, msg: &str) {
        if self.instant_logging {
            log::emit(msg, Side::Server, false, &self.prefix);
        } else {
            self.own_log.push(msg);
        }
    }

    /// Record a line received from the peer.
    pub fn record_peer(&mut self, msg: &str) {
        if self.instant_logging {
            log::emit(msg, Side::Client, false, &self.prefix);
        } else {
            self.peer_log.push(msg);
        }
    }

    /// Replay this session's traffic, alternating our responses with the
    /// peer's lines.
    pub fn drain_log(&mut self) {
        let prefix = self.prefix.clone();
        log::drain_round_robin(
            &mut [
                (&mut self.own_log, Side::Server, false),
                (&mut self.peer_log, Side::Client, false),
            ],
            &prefix,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smtp::auth::{TEST_CHALLENGE, compute_digest, encode_response};

    const IDENTITY: &str = "7D444D";
    const SECRET: &str = "b4b52156ba5213240a2315b0bc5412ed";

    fn test_session(dir: &std::path::Path) -> ServerSession {
        let mut session = ServerSession::new(dir.to_path_buf());
        session.set_credential(Credential::new(IDENTITY, SECRET));
        session
    }

    fn handle(session: &mut ServerSession, line: &str) -> Reply {
        session.handle_line(line).unwrap()
    }

    #[test]
    fn test_greeting() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = test_session(dir.path());
        assert_eq!(session.greeting().code, 220);
        assert_eq!(session.state(), ProtocolState::ServiceReady);
    }

    #[test]
    fn test_auth_success_with_fixed_challenge() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = test_session(dir.path());
        assert_eq!(handle(&mut session, "EHLO 1.2.3.4").code, 250);

        let reply = handle(&mut session, "AUTH CRAM-MD5");
        assert_eq!(reply.code, 334);
        assert_eq!(reply.message, codec::encode_base64(TEST_CHALLENGE));

        let digest = compute_digest(SECRET, TEST_CHALLENGE);
        let reply = handle(&mut session, &encode_response(IDENTITY, &digest));
        assert_eq!(reply.code, 235);
        assert_eq!(session.state(), ProtocolState::AuthSucceeded);
    }

    #[test]
    fn test_auth_rejects_wrong_secret() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = test_session(dir.path());
        handle(&mut session, "EHLO 1.2.3.4");
        handle(&mut session, "AUTH CRAM-MD5");

        let digest = compute_digest("wrong-secret", TEST_CHALLENGE);
        let reply = handle(&mut session, &encode_response(IDENTITY, &digest));
        assert_eq!(reply.code, 535);
    }

    #[test]
    fn test_auth_rejects_wrong_identity() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = test_session(dir.path());
        handle(&mut session, "EHLO 1.2.3.4");
        handle(&mut session, "AUTH CRAM-MD5");

        let digest = compute_digest(SECRET, TEST_CHALLENGE);
        let reply = handle(&mut session, &encode_response("0D444D", &digest));
        assert_eq!(reply.code, 535);
    }

    #[test]
    fn test_auth_abort_and_garbage_are_syntax_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = test_session(dir.path());
        handle(&mut session, "EHLO 1.2.3.4");
        handle(&mut session, "AUTH CRAM-MD5");
        assert_eq!(handle(&mut session, &codec::encode_base64("*")).code, 501);

        handle(&mut session, "AUTH CRAM-MD5");
        assert_eq!(handle(&mut session, "&&& not base64").code, 501);
    }

    #[test]
    fn test_mail_input_flow_persists_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = test_session(dir.path());
        handle(&mut session, "EHLO 1.2.3.4");
        handle(&mut session, "MAIL FROM:<a@b.com>");
        handle(&mut session, "RCPT TO:<c@d.com>");
        assert_eq!(handle(&mut session, "DATA").code, 354);
        assert_eq!(handle(&mut session, "hello").code, 354);
        assert_eq!(handle(&mut session, ".").code, 250);
        assert_eq!(session.state(), ProtocolState::ActionOkay);

        let saved = std::fs::read_to_string(dir.path().join("unknown.txt")).unwrap();
        assert!(saved.contains("From: <a@b.com>"));
        assert!(saved.contains("To: <c@d.com>"));
        assert!(saved.contains("hello"));
    }

    #[test]
    fn test_mail_input_header_fault_aborts_transaction_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = test_session(dir.path());
        handle(&mut session, "EHLO 1.2.3.4");
        handle(&mut session, "MAIL FROM:<a@b.com>");
        handle(&mut session, "RCPT TO:<c@d.com>");
        handle(&mut session, "DATA");
        assert_eq!(handle(&mut session, "From: no brackets").code, 501);
        assert!(session.txn.is_none());

        // the session keeps going: a new transaction can start
        assert_eq!(handle(&mut session, "MAIL FROM:<x@y.com>").code, 250);
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_malformed_transaction_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = test_session(dir.path());
        handle(&mut session, "EHLO 1.2.3.4");
        handle(&mut session, "MAIL FROM:<a@b.com>");
        handle(&mut session, "DATA");
        handle(&mut session, "no recipients here");
        assert_eq!(handle(&mut session, ".").code, 250);
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_adopt_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ServerSession::new(dir.path().to_path_buf());
        let reply = session.adopt_state(ProtocolState::AuthSucceeded);
        assert_eq!(reply.code, 235);
        assert_eq!(session.state(), ProtocolState::AuthSucceeded);
    }
}
