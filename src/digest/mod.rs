//! Digest Engine
//!
//! Pure functions for the two digest schemes ONVIF devices accept:
//!
//! - WS-Security UsernameToken PasswordDigest: `Base64(SHA1(nonce + created + password))`
//! - HTTP Digest (RFC 2617, MD5, `qop=auth` or unqualified)
//!
//! Fresh nonces and cnonces are drawn by the thin wrappers; the hashing
//! functions themselves are deterministic.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use lazy_static::lazy_static;
use md5::Md5;
use rand::Rng;
use regex::Regex;
use sha1::{Digest, Sha1};

/// Nonce count sent with every Digest retry. Single-shot: never incremented.
pub const NONCE_COUNT: &str = "00000001";

lazy_static! {
    static ref CHALLENGE_PARAM: Regex =
        Regex::new(r#"(\w+)\s*=\s*(?:"([^"]*)"|([^\s,]+))"#).expect("valid regex");
}

/// Compute a WS-Security PasswordDigest
pub fn ws_security_digest(nonce: &[u8], created: &str, password: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// RFC3339 timestamp with millisecond precision, as used in `wsu:Created`
pub fn created_timestamp(now: chrono::DateTime<chrono::Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// A ready-to-embed UsernameToken
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsernameToken {
    pub username: String,
    pub password_digest: String,
    pub nonce_b64: String,
    pub created: String,
}

impl UsernameToken {
    /// Build a token with a fresh 16-byte nonce and the current time
    pub fn generate(username: &str, password: &str) -> Self {
        let nonce: [u8; 16] = rand::thread_rng().gen();
        let created = created_timestamp(chrono::Utc::now());
        Self::with_nonce(username, password, &nonce, &created)
    }

    pub fn with_nonce(username: &str, password: &str, nonce: &[u8], created: &str) -> Self {
        Self {
            username: username.to_string(),
            password_digest: ws_security_digest(nonce, created, password),
            nonce_b64: STANDARD.encode(nonce),
            created: created.to_string(),
        }
    }
}

/// Parsed `WWW-Authenticate: Digest ...` challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    /// `Some("auth")` when the server asked for a qualified response
    pub qop: Option<String>,
    pub opaque: Option<String>,
    pub algorithm: Option<String>,
}

impl DigestChallenge {
    /// Parse a challenge header.
    ///
    /// Returns `None` for anything this client cannot answer: a non-Digest
    /// scheme, missing realm or nonce, a non-MD5 algorithm, or a qop list
    /// without `auth`.
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let scheme_end = header.find(char::is_whitespace).unwrap_or(header.len());
        if !header[..scheme_end].eq_ignore_ascii_case("digest") {
            return None;
        }

        let mut realm = None;
        let mut nonce = None;
        let mut qop_list = None;
        let mut opaque = None;
        let mut algorithm = None;

        for caps in CHALLENGE_PARAM.captures_iter(&header[scheme_end..]) {
            let key = caps.get(1)?.as_str().to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            match key.as_str() {
                "realm" => realm = Some(value),
                "nonce" => nonce = Some(value),
                "qop" => qop_list = Some(value),
                "opaque" => opaque = Some(value),
                "algorithm" => algorithm = Some(value),
                _ => {}
            }
        }

        if let Some(alg) = &algorithm {
            if !alg.eq_ignore_ascii_case("md5") {
                return None;
            }
        }

        let qop = match qop_list {
            None => None,
            Some(list) => {
                if list.split(',').any(|q| q.trim().eq_ignore_ascii_case("auth")) {
                    Some("auth".to_string())
                } else {
                    return None;
                }
            }
        };

        let nonce = nonce.filter(|n| !n.is_empty())?;

        Some(Self {
            realm: realm?,
            nonce,
            qop,
            opaque,
            algorithm,
        })
    }
}

fn hex_md5(parts: &[&str]) -> String {
    let mut h = Md5::new();
    for (i, p) in parts.iter().enumerate() {
        if i > 0 {
            h.update(b":");
        }
        h.update(p.as_bytes());
    }
    format!("{:x}", h.finalize())
}

/// Compute the `response` value of an HTTP Digest authorization
pub fn digest_response_hash(
    username: &str,
    password: &str,
    method: &str,
    uri_path: &str,
    challenge: &DigestChallenge,
    cnonce: &str,
) -> String {
    let ha1 = hex_md5(&[username, &challenge.realm, password]);
    let ha2 = hex_md5(&[method, uri_path]);
    match &challenge.qop {
        Some(qop) => hex_md5(&[&ha1, &challenge.nonce, NONCE_COUNT, cnonce, qop, &ha2]),
        None => hex_md5(&[&ha1, &challenge.nonce, &ha2]),
    }
}

/// Build the full `Authorization` header value with a caller-chosen cnonce
pub fn http_digest_response(
    username: &str,
    password: &str,
    method: &str,
    uri_path: &str,
    challenge: &DigestChallenge,
    cnonce: &str,
) -> String {
    let response = digest_response_hash(username, password, method, uri_path, challenge, cnonce);

    let mut header = format!(
        r#"Digest username="{}", realm="{}", nonce="{}", uri="{}", response="{}""#,
        username, challenge.realm, challenge.nonce, uri_path, response
    );
    if let Some(qop) = &challenge.qop {
        header.push_str(&format!(
            r#", qop={}, nc={}, cnonce="{}""#,
            qop, NONCE_COUNT, cnonce
        ));
    }
    if let Some(opaque) = &challenge.opaque {
        header.push_str(&format!(r#", opaque="{}""#, opaque));
    }
    if challenge.algorithm.is_some() {
        header.push_str(", algorithm=MD5");
    }
    header
}

/// Same as [`http_digest_response`] with a fresh random cnonce
pub fn http_digest_authorization(
    username: &str,
    password: &str,
    method: &str,
    uri_path: &str,
    challenge: &DigestChallenge,
) -> String {
    let cnonce = format!("{:032x}", rand::thread_rng().gen::<u128>());
    http_digest_response(username, password, method, uri_path, challenge, &cnonce)
}

/// `Authorization: Basic ...` value
pub fn basic_authorization(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
}
