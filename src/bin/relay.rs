use std::env;
use std::net::TcpListener;
use std::path::Path;
use std::process;

use minipost::config::RelayConfig;
use minipost::smtp::log::{self, Side};
use minipost::smtp::{ClientDriver, Relay};

fn main() {
    minipost::setup_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: {} <config-file>", args[0]);
        process::exit(1);
    }

    let config = match RelayConfig::load(Path::new(&args[1])) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            process::exit(2);
        }
    };

    // the agent speaks to the real server on the real client's behalf
    let agent = ClientDriver::new("localhost", config.server_port);
    // the false server faces the real client
    let mut relay = Relay::new(config.spy_dir, agent);

    let listener = match TcpListener::bind(("localhost", config.client_port)) {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("{err}");
            process::exit(3);
        }
    };
    let stream = match listener.accept() {
        Ok((stream, _)) => stream,
        Err(err) => {
            eprintln!("{err}");
            process::exit(3);
        }
    };

    match relay.run(stream) {
        Ok(()) => relay.drain_log(),
        Err(err) if err.is_connection_refused() => {
            relay.drain_log();
            log::emit("Cannot establish connection", Side::Server, true, "");
            process::exit(3);
        }
        Err(err) if err.is_connection_reset() => {
            relay.drain_log();
            log::emit("Connection lost", Side::Client, true, "");
        }
        Err(err) => {
            relay.drain_log();
            eprintln!("{err}");
            process::exit(3);
        }
    }
}
