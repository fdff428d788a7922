//! Per-session traffic logs.
//!
//! Every session owns its own append-only queues; nothing here is shared
//! across sessions. A queue either drains at session end (ordered replay)
//! or each entry is printed the moment it is recorded (instant mode, used
//! by the concurrent server).

use std::collections::VecDeque;
use std::io::Write;

/// Which peer a logged line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Server,
    Client,
}

impl Side {
    fn marker(self) -> &'static str {
        match self {
            Side::Server => "S",
            Side::Client => "C",
        }
    }
}

/// An append-only, FIFO log of wire messages for one direction of one session.
#[derive(Debug, Default)]
pub struct TrafficLog {
    entries: VecDeque<String>,
}

impl TrafficLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, msg: impl Into<String>) {
        self.entries.push_back(msg.into());
    }

    pub fn pop(&mut self) -> Option<String> {
        self.entries.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Render a wire message as log lines: `<prefix>[A]{S|C}: <line>` per
/// CRLF-separated piece. Multi-line replies become one log line each.
pub fn format_lines(msg: &str, side: Side, agent: bool, prefix: &str) -> Vec<String> {
    let agent_marker = if agent { "A" } else { "" };
    msg.split("\r\n")
        .map(|piece| format!("{prefix}{agent_marker}{}: {piece}", side.marker()))
        .collect()
}

pub fn emit_to(out: &mut impl Write, msg: &str, side: Side, agent: bool, prefix: &str) {
    for line in format_lines(msg, side, agent, prefix) {
        let _ = write!(out, "{line}\r\n");
    }
    let _ = out.flush();
}

/// Print one wire message to stdout in session-log form.
pub fn emit(msg: &str, side: Side, agent: bool, prefix: &str) {
    emit_to(&mut std::io::stdout(), msg, side, agent, prefix);
}

/// Replay a set of logs in a fixed round-robin: one entry from each stream
/// in turn, stopping the moment any stream runs dry mid-cycle.
pub fn drain_round_robin_to(
    out: &mut impl Write,
    streams: &mut [(&mut TrafficLog, Side, bool)],
    prefix: &str,
) {
    'replay: loop {
        for (log, side, agent) in streams.iter_mut() {
            match log.pop() {
                Some(msg) => emit_to(out, &msg, *side, *agent, prefix),
                None => break 'replay,
            }
        }
    }
}

/// Replay to stdout. See [`drain_round_robin_to`].
pub fn drain_round_robin(streams: &mut [(&mut TrafficLog, Side, bool)], prefix: &str) {
    drain_round_robin_to(&mut std::io::stdout(), streams, prefix);
}
