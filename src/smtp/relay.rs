//! The eavesdropping relay: a server role facing the real client and a
//! client role (the agent) connected to the real server, run in lock-step
//! so both peers see a plausible session while every line and the
//! authentication outcome pass through the middle.

use std::io::BufReader;
use std::net::TcpStream;
use std::path::PathBuf;

use tracing::debug;

use crate::smtp::client::ClientDriver;
use crate::smtp::error::SmtpError;
use crate::smtp::log::{self, Side};
use crate::smtp::response::ProtocolState;
use crate::smtp::server::{read_wire_line, send_reply};
use crate::smtp::session::ServerSession;

#[derive(Debug)]
pub struct Relay {
    server: ServerSession,
    agent: ClientDriver,
}

impl Relay {
    /// A relay that captures spied transactions into `spy_dir` and talks
    /// to the real server through `agent`. The server role carries no
    /// credential: credentials are never verified here.
    pub fn new(spy_dir: PathBuf, agent: ClientDriver) -> Self {
        Self {
            server: ServerSession::new(spy_dir),
            agent,
        }
    }

    /// Proxy one full session over the accepted client stream.
    pub fn run(&mut self, stream: TcpStream) -> Result<(), SmtpError> {
        self.agent.connect()?;
        // the real server greets on accept; take that greeting before
        // emitting our own so command replies stay in lock-step
        self.agent.receive()?;

        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = stream;
        let greeting = self.server.greeting();
        send_reply(&mut writer, &mut self.server, &greeting)?;

        loop {
            let line = read_wire_line(&mut reader)?;
            self.server.record_peer(&line);

            if self.server.state() == ProtocolState::Base64Challenge {
                // hand the credential exchange to the real server and
                // mirror its verdict; never approve or deny locally
                self.agent.request(&line)?;
                let verdict = self.agent.state().ok_or(SmtpError::BadResponse)?;
                debug!(?verdict, "mirroring authentication outcome");
                let reply = self.server.adopt_state(verdict);
                send_reply(&mut writer, &mut self.server, &reply)?;
                continue;
            }

            if line == "QUIT" {
                self.agent.send_raw(&line)?;
                let reply = self.server.handle_line(&line)?;
                send_reply(&mut writer, &mut self.server, &reply)?;
                // drain the real server's closing response before
                // tearing both connections down
                self.agent.receive()?;
                break;
            }

            self.agent.request(&line)?;
            let reply = self.server.handle_line(&line)?;
            send_reply(&mut writer, &mut self.server, &reply)?;
        }

        self.agent.disconnect();
        Ok(())
    }

    /// Replay the four traffic streams in a fixed round-robin: our
    /// responses, the agent's inbound, the client's lines, the agent's
    /// outbound.
    pub fn drain_log(&mut self) {
        let (agent_sent, agent_received) = self.agent.logs_mut();
        log::drain_round_robin(
            &mut [
                (&mut self.server.own_log, Side::Server, false),
                (agent_received, Side::Client, true),
                (&mut self.server.peer_log, Side::Client, false),
                (agent_sent, Side::Server, true),
            ],
            "",
        );
    }
}
