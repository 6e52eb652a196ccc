//! Short server tokens for callback payloads.
//!
//! Telegram caps callback data at 64 bytes, which a full endpoint URL plus a
//! process name easily exceeds. Buttons carry an 8-character digest of the
//! server's `host:port` instead, and the router maps it back by scanning the
//! configured endpoints.

use sha1::{Digest, Sha1};

pub const TOKEN_LEN: usize = 8;

/// `host:port` portion of an endpoint; the whole string when there is no scheme.
fn host_port(endpoint: &str) -> &str {
    match endpoint.split_once("://") {
        Some((_, rest)) => rest.split('/').next().unwrap_or(rest),
        None => endpoint,
    }
}

pub fn shorten(endpoint: &str) -> String {
    let digest = Sha1::digest(host_port(endpoint).as_bytes());
    let mut token = hex::encode(digest);
    token.truncate(TOKEN_LEN);
    token
}

/// First known endpoint whose token matches. Collisions resolve to the
/// earliest configured server.
pub fn resolve<'a, I>(token: &str, known: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    known.into_iter().find(|endpoint| shorten(endpoint) == token)
}
