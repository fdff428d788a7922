//! The mail transaction: envelope, optional headers, body lines, and the
//! flat-file form used for both the send queue and the mailbox.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use thiserror::Error;

use crate::smtp::codec;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("malformed {0} header")]
    HeaderSyntax(&'static str),
}

/// A single mail transaction.
///
/// Created when a `MAIL` command is accepted, grown by `RCPT` and by the
/// DATA phase, and discarded after the end-of-data marker or `RSET`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Transaction {
    pub sender: Option<String>,
    pub recipients: Vec<String>,
    pub created_time: Option<DateTime<FixedOffset>>,
    /// The original `Date:` header text, kept verbatim for round-trip
    /// output. Present only when the text parsed.
    pub created_time_raw: Option<String>,
    pub subject: Option<String>,
    /// Body lines in arrival order, trailing CR/LF stripped.
    pub content: Vec<String>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transaction is well-formed once it has a sender and at least one
    /// recipient.
    pub fn check_formation(&self) -> bool {
        self.sender.is_some() && !self.recipients.is_empty()
    }

    /// Record the creation time from an RFC 5322 date string. Returns
    /// whether the string parsed; nothing is stored on failure.
    pub fn set_created_time(&mut self, raw: &str) -> bool {
        match codec::parse_rfc5322_time(raw) {
            Some(parsed) => {
                self.created_time = Some(parsed);
                self.created_time_raw = Some(raw.to_string());
                true
            }
            None => false,
        }
    }

    /// Feed one line into the transaction.
    ///
    /// While `allow_header` holds, lines shaped like `From: `, `To: `,
    /// `Date: ` or `Subject: ` headers are parsed as such; a header-shaped
    /// line that fails its grammar is a hard error. Anything else becomes
    /// body content, and once content has started headers are never
    /// recognized again. The returned flag is the caller's next
    /// `allow_header` value.
    pub fn add_entry(&mut self, line: &str, allow_header: bool) -> Result<bool, TransactionError> {
        if allow_header {
            if line.len() > 6 && line.starts_with("From: ") {
                let addr = bracketed(&line[6..]).ok_or(TransactionError::HeaderSyntax("From"))?;
                self.sender = Some(addr.to_string());
                return Ok(true);
            }
            if line.len() > 4 && line.starts_with("To: ") {
                self.recipients = parse_recipient_list(&line[4..])
                    .ok_or(TransactionError::HeaderSyntax("To"))?;
                return Ok(true);
            }
            if line.len() > 6 && line.starts_with("Date: ") {
                if !self.set_created_time(&line[6..]) {
                    return Err(TransactionError::HeaderSyntax("Date"));
                }
                return Ok(true);
            }
            if line.len() > 8 && line.starts_with("Subject: ") {
                let text = &line[9..];
                if text.is_empty() {
                    return Err(TransactionError::HeaderSyntax("Subject"));
                }
                self.subject = Some(text.to_string());
                return Ok(true);
            }
        }
        self.content
            .push(line.trim_end_matches(['\r', '\n']).to_string());
        Ok(false)
    }

    /// Parse the full text of a queue file into a transaction.
    pub fn from_text(text: &str) -> Result<Self, TransactionError> {
        let mut txn = Self::new();
        let mut allow_header = true;
        for line in text.lines() {
            allow_header = txn.add_entry(line, allow_header)?;
        }
        Ok(txn)
    }

    /// Persist the transaction as `<prefix><unix-timestamp|"unknown">.txt`
    /// inside `dir`. The written file parses back via [`from_text`] into an
    /// equal transaction.
    ///
    /// [`from_text`]: Transaction::from_text
    pub fn save_as(&self, dir: &Path, prefix: &str) -> io::Result<PathBuf> {
        let sender = match &self.sender {
            Some(sender) if !self.recipients.is_empty() => sender,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "transaction is missing its sender or recipients",
                ));
            }
        };

        let stamp = match (&self.created_time, &self.created_time_raw) {
            (Some(time), Some(_)) => time.timestamp().to_string(),
            _ => "unknown".to_string(),
        };
        let path = dir.join(format!("{prefix}{stamp}.txt"));

        let mut text = String::new();
        text.push_str(&format!("From: <{sender}>\n"));
        let list: Vec<String> = self.recipients.iter().map(|r| format!("<{r}>")).collect();
        text.push_str(&format!("To: {}\n", list.join(",")));
        if let Some(raw) = &self.created_time_raw {
            text.push_str(&format!("Date: {raw}\n"));
        }
        if let Some(subject) = &self.subject {
            text.push_str(&format!("Subject: {subject}\n"));
        }
        for line in &self.content {
            text.push_str(line);
            text.push('\n');
        }

        fs::write(&path, text)?;
        Ok(path)
    }
}

fn bracketed(s: &str) -> Option<&str> {
    let inner = s.strip_prefix('<')?.strip_suffix('>')?;
    if inner.is_empty() { None } else { Some(inner) }
}

/// `<a>[,<b>...]` with no spaces between entries.
fn parse_recipient_list(s: &str) -> Option<Vec<String>> {
    let mut recipients = Vec::new();
    for part in s.split(',') {
        recipients.push(bracketed(part)?.to_string());
    }
    Some(recipients)
}
