//! Wire-level tests for the server and the client driver.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

use minipost::smtp::auth::{TEST_CHALLENGE, compute_digest, encode_response};
use minipost::smtp::codec;
use minipost::{ClientDriver, Credential, ProtocolState, SmtpServer, Transaction};

const IDENTITY: &str = "7D444D";
const SECRET: &str = "b4b52156ba5213240a2315b0bc5412ed";

fn start_test_server() -> (String, u16, tempfile::TempDir) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let inbox = tempfile::tempdir().unwrap();
    let server = SmtpServer::new(inbox.path().to_path_buf(), Credential::new(IDENTITY, SECRET));

    thread::spawn(move || {
        let _ = server.start_with_listener(listener);
    });

    (addr.to_string(), addr.port(), inbox)
}

fn connect(addr: &str) -> (TcpStream, BufReader<TcpStream>) {
    let stream = TcpStream::connect(addr).unwrap();
    let reader = BufReader::new(stream.try_clone().unwrap());
    (stream, reader)
}

fn send_line(stream: &mut TcpStream, line: &str) {
    write!(stream, "{line}\r\n").unwrap();
    stream.flush().unwrap();
}

fn read_line(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    line.trim_end().to_string()
}

#[test]
fn test_complete_session_persists_mail() {
    let (addr, _port, inbox) = start_test_server();
    let (mut stream, mut reader) = connect(&addr);

    assert_eq!(read_line(&mut reader), "220 Service ready");

    send_line(&mut stream, "EHLO 1.2.3.4");
    assert_eq!(read_line(&mut reader), "250-127.0.0.1");
    assert_eq!(read_line(&mut reader), "250 AUTH CRAM-MD5");

    send_line(&mut stream, "MAIL FROM:<a@b.com>");
    assert!(read_line(&mut reader).starts_with("250"));
    send_line(&mut stream, "RCPT TO:<c@d.com>");
    assert!(read_line(&mut reader).starts_with("250"));
    send_line(&mut stream, "DATA");
    assert!(read_line(&mut reader).starts_with("354"));

    // every body line gets its own 354 until the end-of-data marker
    send_line(&mut stream, "Subject: wire test");
    assert!(read_line(&mut reader).starts_with("354"));
    send_line(&mut stream, "hello");
    assert!(read_line(&mut reader).starts_with("354"));
    send_line(&mut stream, ".");
    assert!(read_line(&mut reader).starts_with("250"));

    send_line(&mut stream, "QUIT");
    assert_eq!(read_line(&mut reader), "221 Service closing transmission channel");

    let saved = std::fs::read_to_string(inbox.path().join("unknown.txt")).unwrap();
    assert!(saved.contains("From: <a@b.com>"));
    assert!(saved.contains("To: <c@d.com>"));
    assert!(saved.contains("Subject: wire test"));
    assert!(saved.contains("hello"));
}

#[test]
fn test_multiple_recipients() {
    let (addr, _port, inbox) = start_test_server();
    let (mut stream, mut reader) = connect(&addr);
    read_line(&mut reader);

    send_line(&mut stream, "EHLO 1.2.3.4");
    read_line(&mut reader);
    read_line(&mut reader);
    send_line(&mut stream, "MAIL FROM:<a@b.com>");
    read_line(&mut reader);
    send_line(&mut stream, "RCPT TO:<one@example.com>");
    read_line(&mut reader);
    send_line(&mut stream, "RCPT TO:<two@example.com>");
    read_line(&mut reader);
    send_line(&mut stream, "DATA");
    read_line(&mut reader);
    send_line(&mut stream, "hi");
    read_line(&mut reader);
    send_line(&mut stream, ".");
    assert!(read_line(&mut reader).starts_with("250"));
    send_line(&mut stream, "QUIT");
    read_line(&mut reader);

    let saved = std::fs::read_to_string(inbox.path().join("unknown.txt")).unwrap();
    assert!(saved.contains("To: <one@example.com>,<two@example.com>"));
}

#[test]
fn test_guard_responses() {
    let (addr, _port, _inbox) = start_test_server();
    let (mut stream, mut reader) = connect(&addr);
    read_line(&mut reader);

    send_line(&mut stream, "MAIL FROM:<a@b.com>");
    assert_eq!(read_line(&mut reader), "503 Bad sequence of commands");

    send_line(&mut stream, "NO");
    assert!(read_line(&mut reader).starts_with("500"));

    send_line(&mut stream, "FROB a b c");
    assert!(read_line(&mut reader).starts_with("500"));

    send_line(&mut stream, "EHLO not-an-ip");
    assert!(read_line(&mut reader).starts_with("501"));

    send_line(&mut stream, "AUTH LOGIN");
    assert!(read_line(&mut reader).starts_with("504"));

    send_line(&mut stream, "QUIT");
    assert!(read_line(&mut reader).starts_with("221"));
}

#[test]
fn test_auth_exchange_on_the_wire() {
    let (addr, _port, _inbox) = start_test_server();
    let (mut stream, mut reader) = connect(&addr);
    read_line(&mut reader);

    send_line(&mut stream, "EHLO 1.2.3.4");
    read_line(&mut reader);
    read_line(&mut reader);

    send_line(&mut stream, "AUTH CRAM-MD5");
    let challenge_line = read_line(&mut reader);
    let encoded = challenge_line.strip_prefix("334 ").unwrap();
    assert_eq!(codec::decode_base64(encoded).unwrap(), TEST_CHALLENGE);

    let digest = compute_digest(SECRET, TEST_CHALLENGE);
    send_line(&mut stream, &encode_response(IDENTITY, &digest));
    assert_eq!(read_line(&mut reader), "235 Authentication successful");

    // a failed attempt afterwards: the session carries on
    send_line(&mut stream, "AUTH CRAM-MD5");
    read_line(&mut reader);
    let bad_digest = compute_digest("wrong-secret", TEST_CHALLENGE);
    send_line(&mut stream, &encode_response(IDENTITY, &bad_digest));
    assert_eq!(read_line(&mut reader), "535 Authentication credentials invalid");

    send_line(&mut stream, "MAIL FROM:<a@b.com>");
    assert!(read_line(&mut reader).starts_with("250"));
}

#[test]
fn test_bare_newline_lines_are_accepted() {
    let (addr, _port, _inbox) = start_test_server();
    let (mut stream, mut reader) = connect(&addr);
    read_line(&mut reader);

    write!(stream, "EHLO 1.2.3.4\n").unwrap();
    stream.flush().unwrap();
    assert_eq!(read_line(&mut reader), "250-127.0.0.1");
    assert_eq!(read_line(&mut reader), "250 AUTH CRAM-MD5");
}

#[test]
fn test_unterminated_line_resets_session() {
    let (addr, _port, _inbox) = start_test_server();
    let (mut stream, mut reader) = connect(&addr);
    read_line(&mut reader);

    write!(stream, "QUIT").unwrap();
    stream.flush().unwrap();
    stream.shutdown(std::net::Shutdown::Write).unwrap();

    // no response: the session is torn down without answering
    let mut rest = String::new();
    reader.read_line(&mut rest).unwrap();
    assert_eq!(rest, "");
}

#[test]
fn test_client_driver_groups_ehlo_reply() {
    let (_addr, port, _inbox) = start_test_server();
    let mut driver = ClientDriver::new("127.0.0.1", port);
    driver.connect().unwrap();

    let greeting = driver.receive().unwrap();
    assert_eq!(greeting, vec!["Service ready"]);
    assert_eq!(driver.state(), Some(ProtocolState::ServiceReady));

    let capabilities = driver.run("EHLO", &["127.0.0.1"]).unwrap();
    assert_eq!(capabilities, vec!["127.0.0.1", "AUTH CRAM-MD5"]);
    assert_eq!(driver.state(), Some(ProtocolState::ActionOkay));

    driver.run("QUIT", &[]).unwrap();
    assert_eq!(driver.state(), Some(ProtocolState::ServiceClosing));
    driver.disconnect();
}

#[test]
fn test_client_driver_sends_dated_transaction() {
    let (_addr, port, inbox) = start_test_server();
    let mut driver = ClientDriver::new("127.0.0.1", port);
    driver.connect().unwrap();
    driver.receive().unwrap();
    driver.run("EHLO", &["127.0.0.1"]).unwrap();

    let text = concat!(
        "From: <a@b.com>\n",
        "To: <c@d.com>\n",
        "Date: Tue, 15 Mar 2022 10:30:00 +1100\n",
        "Subject: stamped\n",
        "body line\n",
    );
    let txn = Transaction::from_text(text).unwrap();
    driver.send_transaction(&txn).unwrap();
    driver.run("QUIT", &[]).unwrap();
    driver.disconnect();

    let saved = std::fs::read_to_string(inbox.path().join("1647300600.txt")).unwrap();
    let reread = Transaction::from_text(&saved).unwrap();
    assert_eq!(reread, txn);
}

#[test]
fn test_concurrent_server_accepts_while_session_open() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let inbox = tempfile::tempdir().unwrap();
    let server = SmtpServer::new(inbox.path().to_path_buf(), Credential::new(IDENTITY, SECRET));
    thread::spawn(move || {
        let _ = server.start_concurrent_with_listener(listener);
    });

    // keep the first session open; the second must still be served
    let (mut first, mut first_reader) = connect(&addr);
    assert_eq!(read_line(&mut first_reader), "220 Service ready");

    let (mut second, mut second_reader) = connect(&addr);
    assert_eq!(read_line(&mut second_reader), "220 Service ready");

    send_line(&mut second, "QUIT");
    assert!(read_line(&mut second_reader).starts_with("221"));
    send_line(&mut first, "QUIT");
    assert!(read_line(&mut first_reader).starts_with("221"));
}
