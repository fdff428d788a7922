use std::env;
use std::path::Path;
use std::process;

use minipost::SmtpServer;
use minipost::config::ServerConfig;

fn main() {
    minipost::setup_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: {} <config-file>", args[0]);
        process::exit(1);
    }

    let config = match ServerConfig::load(Path::new(&args[1])) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            process::exit(2);
        }
    };

    let server = SmtpServer::new(config.inbox_dir, config.credential);
    if let Err(err) = server.start(("localhost", config.port)) {
        eprintln!("{err}");
        process::exit(1);
    }
}
