//! The initiating side of the protocol: sends command lines, waits for
//! exactly one logical reply per line, and can feed a whole transaction
//! through MAIL/RCPT/DATA one round-trip at a time.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;

use tracing::debug;

use crate::smtp::codec;
use crate::smtp::error::SmtpError;
use crate::smtp::log::{self, Side, TrafficLog};
use crate::smtp::response::ProtocolState;
use crate::smtp::transaction::Transaction;

#[derive(Debug)]
pub struct ClientDriver {
    address: String,
    port: u16,
    stream: Option<TcpStream>,
    reader: Option<BufReader<TcpStream>>,
    state: Option<ProtocolState>,
    sent_log: TrafficLog,
    received_log: TrafficLog,
}

impl ClientDriver {
    pub fn new(address: &str, port: u16) -> Self {
        Self {
            address: address.to_string(),
            port,
            stream: None,
            reader: None,
            state: None,
            sent_log: TrafficLog::new(),
            received_log: TrafficLog::new(),
        }
    }

    pub fn connect(&mut self) -> Result<(), SmtpError> {
        let stream = TcpStream::connect((self.address.as_str(), self.port))?;
        debug!(address = %self.address, port = self.port, "connected");
        self.reader = Some(BufReader::new(stream.try_clone()?));
        self.stream = Some(stream);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.stream = None;
        self.reader = None;
    }

    /// The state implied by the last reply's code, if any was read yet.
    pub fn state(&self) -> Option<ProtocolState> {
        self.state
    }

    /// Read one logical reply: the first line plus every dash-continuation
    /// line belonging to it. Returns the per-line parameter texts and
    /// tracks the reply's code as the peer's state.
    pub fn receive(&mut self) -> Result<Vec<String>, SmtpError> {
        let mut raw_lines = Vec::new();
        let mut params = Vec::new();
        let mut code = 0u16;
        loop {
            let raw = self.read_reply_line()?;
            let (line_code, last, text) = parse_reply_line(&raw)?;
            if raw_lines.is_empty() {
                code = line_code;
            }
            raw_lines.push(raw);
            params.push(text);
            if last {
                break;
            }
        }
        self.received_log.push(raw_lines.join("\r\n"));
        self.state = Some(ProtocolState::from_code(code).ok_or(SmtpError::BadResponse)?);
        Ok(params)
    }

    /// Send a command line (`CMD[ arg...]`) and wait for its reply.
    pub fn run(&mut self, cmd: &str, params: &[&str]) -> Result<Vec<String>, SmtpError> {
        let line = if params.is_empty() {
            cmd.to_string()
        } else {
            format!("{} {}", cmd, params.join(" "))
        };
        self.request(&line)
    }

    /// Send a raw line (no command formatting) and wait for its reply.
    pub fn request(&mut self, line: &str) -> Result<Vec<String>, SmtpError> {
        self.send_raw(line)?;
        self.receive()
    }

    /// Send a raw line without waiting for a reply. Used by the relay to
    /// forward a closing command whose reply is drained separately.
    pub fn send_raw(&mut self, line: &str) -> Result<(), SmtpError> {
        self.sent_log.push(line);
        let stream = self.stream.as_mut().ok_or(SmtpError::NotConnected)?;
        stream.write_all(line.as_bytes())?;
        stream.write_all(b"\r\n")?;
        stream.flush()?;
        Ok(())
    }

    /// Run the full MAIL -> RCPT xN -> DATA -> header lines -> body lines
    /// -> `.` sequence, one round-trip per line. Reply codes are recorded
    /// in the session log but not judged.
    pub fn send_transaction(&mut self, txn: &Transaction) -> Result<(), SmtpError> {
        let sender = txn.sender.as_deref().unwrap_or_default();
        let mail_arg = format!("FROM:<{sender}>");
        self.run("MAIL", &[mail_arg.as_str()])?;
        for recipient in &txn.recipients {
            let rcpt_arg = format!("TO:<{recipient}>");
            self.run("RCPT", &[rcpt_arg.as_str()])?;
        }
        self.run("DATA", &[])?;
        if let Some(raw) = &txn.created_time_raw {
            self.request(&format!("Date: {raw}"))?;
        }
        if let Some(subject) = &txn.subject {
            self.request(&format!("Subject: {subject}"))?;
        }
        for line in &txn.content {
            self.request(line)?;
        }
        self.request(".")?;
        Ok(())
    }

    /// Replay this session's traffic, alternating the server's replies
    /// with our own lines.
    pub fn drain_log(&mut self) {
        log::drain_round_robin(
            &mut [
                (&mut self.received_log, Side::Server, false),
                (&mut self.sent_log, Side::Client, false),
            ],
            "",
        );
    }

    pub(crate) fn logs_mut(&mut self) -> (&mut TrafficLog, &mut TrafficLog) {
        (&mut self.sent_log, &mut self.received_log)
    }

    /// Read one CRLF-terminated reply line, without the terminator. A
    /// reply that does not end in CRLF is a connection-reset condition.
    fn read_reply_line(&mut self) -> Result<String, SmtpError> {
        let reader = self.reader.as_mut().ok_or(SmtpError::NotConnected)?;
        let mut buf = Vec::new();
        let n = reader.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Err(SmtpError::ConnectionReset);
        }
        if !buf.is_ascii() {
            return Err(SmtpError::NonAscii);
        }
        let raw = String::from_utf8(buf).map_err(|_| SmtpError::NonAscii)?;
        if !codec::is_smtp_message(&raw) {
            return Err(SmtpError::ConnectionReset);
        }
        Ok(raw[..raw.len() - 2].to_string())
    }
}

/// Split a reply line into (code, is-last-line, parameter text).
fn parse_reply_line(line: &str) -> Result<(u16, bool, String), SmtpError> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(|b| b.is_ascii_digit()) {
        return Err(SmtpError::BadResponse);
    }
    let code: u16 = line[..3].parse().map_err(|_| SmtpError::BadResponse)?;
    match bytes.get(3) {
        None => Ok((code, true, String::new())),
        Some(b'-') => Ok((code, false, line[4..].to_string())),
        Some(b' ') => Ok((code, true, line[4..].to_string())),
        Some(_) => Err(SmtpError::BadResponse),
    }
}
