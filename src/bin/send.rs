use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use tracing::warn;

use minipost::config::SendConfig;
use minipost::smtp::log::{self, Side};
use minipost::smtp::{ClientDriver, SmtpError, Transaction, auth, codec};

fn main() {
    minipost::setup_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: {} <config-file>", args[0]);
        process::exit(1);
    }

    let config = match SendConfig::load(Path::new(&args[1])) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            process::exit(2);
        }
    };

    for path in queued_files(&config.send_dir) {
        let display_path = path
            .canonicalize()
            .unwrap_or_else(|_| path.clone())
            .display()
            .to_string();

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                warn!(%err, file = %display_path, "skipping unreadable queue file");
                continue;
            }
        };

        let txn = match Transaction::from_text(&text) {
            Ok(txn) if txn.check_formation() => txn,
            _ => {
                log::emit(&format!("{display_path}: Bad formation"), Side::Client, false, "");
                continue;
            }
        };

        let mut driver = ClientDriver::new("127.0.0.1", config.server_port);
        match submit(&mut driver, &txn, &path, &config) {
            Ok(()) => driver.drain_log(),
            Err(err) => {
                // a connection failure aborts the whole remaining queue
                driver.drain_log();
                if err.is_connection_refused() {
                    log::emit("Cannot establish connection", Side::Client, false, "");
                } else {
                    log::emit("Connection lost", Side::Client, false, "");
                }
                process::exit(3);
            }
        }
    }
}

fn queued_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect(),
        Err(err) => {
            warn!(%err, dir = %dir.display(), "cannot list send queue");
            Vec::new()
        }
    };
    files.sort();
    files
}

/// One full session for one queue file: greeting, EHLO, the CRAM-MD5
/// exchange when the file asks for it, the transaction, QUIT.
fn submit(
    driver: &mut ClientDriver,
    txn: &Transaction,
    path: &Path,
    config: &SendConfig,
) -> Result<(), SmtpError> {
    driver.connect()?;
    driver.receive()?;
    let capabilities = driver.run("EHLO", &["127.0.0.1"])?;

    let wants_auth = path.to_string_lossy().contains("auth");
    if wants_auth && capabilities.iter().any(|c| c == "AUTH CRAM-MD5") {
        let params = driver.run("AUTH", &["CRAM-MD5"])?;
        let encoded = params.first().cloned().unwrap_or_default();
        let challenge = codec::decode_base64(&encoded).ok_or(SmtpError::BadResponse)?;
        let digest = auth::compute_digest(&config.credential.secret, &challenge);
        driver.request(&auth::encode_response(&config.credential.identity, &digest))?;
    }

    driver.send_transaction(txn)?;
    driver.run("QUIT", &[])?;
    driver.disconnect();
    Ok(())
}
