//! Accept loops and the per-connection session runner.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::process;
use std::thread;

use tracing::{error, info, warn};

use crate::smtp::auth::Credential;
use crate::smtp::error::SmtpError;
use crate::smtp::log::{self, Side};
use crate::smtp::response::{ProtocolState, Reply};
use crate::smtp::session::ServerSession;

/// The mail-receiving server. Sessions share nothing but the inbox path
/// and the credential, both immutable after construction.
#[derive(Debug, Clone)]
pub struct SmtpServer {
    inbox_dir: PathBuf,
    credential: Credential,
}

impl SmtpServer {
    pub fn new(inbox_dir: PathBuf, credential: Credential) -> Self {
        Self {
            inbox_dir,
            credential,
        }
    }

    /// Serve sessions one at a time, dumping each session's ordered log
    /// when it ends (blocking).
    pub fn start(&self, addr: impl ToSocketAddrs) -> Result<(), SmtpError> {
        let listener = TcpListener::bind(addr)?;
        self.start_with_listener(listener)
    }

    /// Like [`start`], with an existing listener.
    ///
    /// [`start`]: SmtpServer::start
    pub fn start_with_listener(&self, listener: TcpListener) -> Result<(), SmtpError> {
        info!(addr = %listener.local_addr()?, "serving sessions serially");
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => self.serve_one(stream),
                Err(err) => warn!(%err, "failed to accept connection"),
            }
        }
        Ok(())
    }

    /// Serve every connection on its own worker thread so the accept loop
    /// never blocks on session processing (blocking). Sessions log
    /// instantly, prefixed `[<pid>][<order>]`.
    pub fn start_concurrent(&self, addr: impl ToSocketAddrs) -> Result<(), SmtpError> {
        let listener = TcpListener::bind(addr)?;
        self.start_concurrent_with_listener(listener)
    }

    /// Like [`start_concurrent`], with an existing listener.
    ///
    /// [`start_concurrent`]: SmtpServer::start_concurrent
    pub fn start_concurrent_with_listener(&self, listener: TcpListener) -> Result<(), SmtpError> {
        info!(addr = %listener.local_addr()?, "serving sessions concurrently");
        let mut order: u32 = 0;
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    order += 1;
                    let prefix = format!("[{}][{:02}]", process::id(), order);
                    let server = self.clone();
                    thread::spawn(move || {
                        let mut session = server.new_session();
                        session.set_prefix(&prefix);
                        session.set_instant_logging(true);
                        if let Err(err) = run_session(&mut session, stream) {
                            if err.is_connection_reset() {
                                log::emit("Connection lost", Side::Server, false, &prefix);
                            } else {
                                error!(%err, "session failed");
                            }
                        }
                    });
                }
                Err(err) => warn!(%err, "failed to accept connection"),
            }
        }
        Ok(())
    }

    pub fn new_session(&self) -> ServerSession {
        let mut session = ServerSession::new(self.inbox_dir.clone());
        session.set_credential(self.credential.clone());
        session
    }

    fn serve_one(&self, stream: TcpStream) {
        let mut session = self.new_session();
        let result = run_session(&mut session, stream);
        session.drain_log();
        match result {
            Ok(()) => {}
            Err(err) if err.is_connection_reset() => {
                log::emit("Connection lost", Side::Server, false, session.prefix());
            }
            Err(err) => error!(%err, "session failed"),
        }
    }
}

/// Drive one session over a connected stream: emit the greeting, then
/// read a line, produce the reply, write it, until the closing state.
pub fn run_session(session: &mut ServerSession, stream: TcpStream) -> Result<(), SmtpError> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;

    let greeting = session.greeting();
    send_reply(&mut writer, session, &greeting)?;

    while session.state() != ProtocolState::ServiceClosing {
        let line = read_wire_line(&mut reader)?;
        session.record_peer(&line);
        let reply = session.handle_line(&line)?;
        send_reply(&mut writer, session, &reply)?;
    }
    Ok(())
}

/// Write a reply to the peer and record it in the session log.
pub(crate) fn send_reply(
    writer: &mut TcpStream,
    session: &mut ServerSession,
    reply: &Reply,
) -> Result<(), SmtpError> {
    writer.write_all(reply.format().as_bytes())?;
    writer.flush()?;
    session.record_own(&reply.logical_text());
    Ok(())
}

/// Read one inbound line, without its terminator.
///
/// Bare `\n` endings are accepted for interoperability with line-mode
/// tools; the absence of any terminator (EOF, truncated read) is a
/// framing violation surfaced as a connection reset. Input must be ASCII.
pub(crate) fn read_wire_line(reader: &mut impl BufRead) -> Result<String, SmtpError> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Err(SmtpError::ConnectionReset);
    }
    if !buf.ends_with(b"\n") {
        return Err(SmtpError::ConnectionReset);
    }
    if !buf.is_ascii() {
        return Err(SmtpError::NonAscii);
    }
    let mut line = String::from_utf8(buf).map_err(|_| SmtpError::NonAscii)?;
    if line.ends_with("\r\n") {
        line.truncate(line.len() - 2);
    } else {
        line.truncate(line.len() - 1);
    }
    Ok(line)
}
