//! Protocol states and the replies they render on the wire.

/// The closed set of protocol states. The current state is exactly what
/// decides how the next inbound line is interpreted, and every state maps
/// to one canonical response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    /// 220, emitted on connection accept
    ServiceReady,
    /// 250
    ActionOkay,
    /// 221, terminal: the connection closes after this response
    ServiceClosing,
    /// 334, consuming: the next line is the client's auth response
    Base64Challenge,
    /// 235
    AuthSucceeded,
    /// 535
    AuthInvalid,
    /// 500
    CommandUnrecognized,
    /// 503
    BadSequence,
    /// 504
    ParamNotImplemented,
    /// 501
    SyntaxError,
    /// 354, consuming: lines feed the transaction until a lone `.`
    StartMailInput,
}

impl ProtocolState {
    pub fn code(self) -> u16 {
        match self {
            ProtocolState::ServiceReady => 220,
            ProtocolState::ActionOkay => 250,
            ProtocolState::ServiceClosing => 221,
            ProtocolState::Base64Challenge => 334,
            ProtocolState::AuthSucceeded => 235,
            ProtocolState::AuthInvalid => 535,
            ProtocolState::CommandUnrecognized => 500,
            ProtocolState::BadSequence => 503,
            ProtocolState::ParamNotImplemented => 504,
            ProtocolState::SyntaxError => 501,
            ProtocolState::StartMailInput => 354,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        let state = match code {
            220 => ProtocolState::ServiceReady,
            250 => ProtocolState::ActionOkay,
            221 => ProtocolState::ServiceClosing,
            334 => ProtocolState::Base64Challenge,
            235 => ProtocolState::AuthSucceeded,
            535 => ProtocolState::AuthInvalid,
            500 => ProtocolState::CommandUnrecognized,
            503 => ProtocolState::BadSequence,
            504 => ProtocolState::ParamNotImplemented,
            501 => ProtocolState::SyntaxError,
            354 => ProtocolState::StartMailInput,
            _ => return None,
        };
        Some(state)
    }

    /// Canonical response text. `Base64Challenge` replies carry the
    /// challenge instead and are built with [`Reply::challenge`].
    pub fn text(self) -> &'static str {
        match self {
            ProtocolState::ServiceReady => "Service ready",
            ProtocolState::ActionOkay => "Requested mail action okay completed",
            ProtocolState::ServiceClosing => "Service closing transmission channel",
            ProtocolState::Base64Challenge => "",
            ProtocolState::AuthSucceeded => "Authentication successful",
            ProtocolState::AuthInvalid => "Authentication credentials invalid",
            ProtocolState::CommandUnrecognized => "Syntax error, command unrecognized",
            ProtocolState::BadSequence => "Bad sequence of commands",
            ProtocolState::ParamNotImplemented => "Command parameter not implemented",
            ProtocolState::SyntaxError => "Syntax error in parameters or arguments",
            ProtocolState::StartMailInput => "Start mail input end <CRLF>.<CRLF>",
        }
    }
}

/// One logical reply: a code, a first line, and optional continuation
/// lines rendered with the dash marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub message: String,
    pub extra_lines: Vec<String>,
}

impl Reply {
    pub fn new(code: u16, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
            extra_lines: Vec::new(),
        }
    }

    pub fn for_state(state: ProtocolState) -> Self {
        Self::new(state.code(), state.text())
    }

    /// The EHLO rendering of 250: the server's address plus the
    /// capability announcement.
    pub fn ehlo_capabilities() -> Self {
        Self {
            code: 250,
            message: "127.0.0.1".to_string(),
            extra_lines: vec!["AUTH CRAM-MD5".to_string()],
        }
    }

    /// A 334 carrying the base64-encoded challenge.
    pub fn challenge(encoded: &str) -> Self {
        Self::new(334, encoded)
    }

    fn wire_lines(&self) -> Vec<String> {
        if self.extra_lines.is_empty() {
            return vec![format!("{} {}", self.code, self.message)];
        }
        let mut lines = vec![format!("{}-{}", self.code, self.message)];
        for (i, line) in self.extra_lines.iter().enumerate() {
            if i == self.extra_lines.len() - 1 {
                lines.push(format!("{} {}", self.code, line));
            } else {
                lines.push(format!("{}-{}", self.code, line));
            }
        }
        lines
    }

    /// The reply as sent, CRLF after every line.
    pub fn format(&self) -> String {
        let mut out = String::new();
        for line in self.wire_lines() {
            out.push_str(&line);
            out.push_str("\r\n");
        }
        out
    }

    /// The reply for the session log: lines joined by CRLF, no trailing
    /// terminator.
    pub fn logical_text(&self) -> String {
        self.wire_lines().join("\r\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_mapping_round_trips() {
        for state in [
            ProtocolState::ServiceReady,
            ProtocolState::ActionOkay,
            ProtocolState::ServiceClosing,
            ProtocolState::Base64Challenge,
            ProtocolState::AuthSucceeded,
            ProtocolState::AuthInvalid,
            ProtocolState::CommandUnrecognized,
            ProtocolState::BadSequence,
            ProtocolState::ParamNotImplemented,
            ProtocolState::SyntaxError,
            ProtocolState::StartMailInput,
        ] {
            assert_eq!(ProtocolState::from_code(state.code()), Some(state));
        }
        assert_eq!(ProtocolState::from_code(999), None);
        assert_eq!(ProtocolState::from_code(0), None);
    }

    #[test]
    fn test_single_line_format() {
        let reply = Reply::for_state(ProtocolState::ServiceReady);
        assert_eq!(reply.format(), "220 Service ready\r\n");
        assert_eq!(reply.logical_text(), "220 Service ready");
    }

    #[test]
    fn test_ehlo_format_uses_dash_continuation() {
        let reply = Reply::ehlo_capabilities();
        assert_eq!(reply.format(), "250-127.0.0.1\r\n250 AUTH CRAM-MD5\r\n");
        assert_eq!(reply.logical_text(), "250-127.0.0.1\r\n250 AUTH CRAM-MD5");
    }

    #[test]
    fn test_challenge_format() {
        let reply = Reply::challenge("MTIzNDU=");
        assert_eq!(reply.format(), "334 MTIzNDU=\r\n");
    }
}
