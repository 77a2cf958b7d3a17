//! Password seals for PEM credential stores.
//!
//! A sealed store is a PEM document followed by a trailing section
//!
//! ```text
//! -----BEGIN STORE SEAL-----
//! <hex HMAC-SHA256 of every preceding byte, keyed by the password>
//! -----END STORE SEAL-----
//! ```
//!
//! The seal gives the store password the same role a keystore password
//! plays: a wrong password is detected before any material is used.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SEAL_BEGIN: &[u8] = b"-----BEGIN STORE SEAL-----";
const SEAL_END: &[u8] = b"-----END STORE SEAL-----";

/// Outcome of checking a store against a password.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SealCheck<'a> {
    /// Seal verified, or no password was supplied; the PEM body follows.
    Verified(&'a [u8]),
    Mismatch,
    Missing,
    Malformed,
}

/// Append a seal for `password` to a PEM document.
///
/// Any existing seal is replaced.
///
/// # Examples
///
/// ```
/// use busbridge::tls::seal_store;
///
/// let sealed = seal_store(b"-----BEGIN CERTIFICATE-----\n", "changeit");
/// assert!(sealed.ends_with(b"-----END STORE SEAL-----\n"));
/// ```
#[must_use]
pub fn seal_store(pem: &[u8], password: &str) -> Vec<u8> {
    let (body, _) = split_seal(pem);
    let mut sealed = body.to_vec();
    if !sealed.is_empty() && !sealed.ends_with(b"\n") {
        sealed.push(b'\n');
    }
    let tag = hex::encode(mac_for(password, &sealed).finalize().into_bytes());
    sealed.extend_from_slice(SEAL_BEGIN);
    sealed.push(b'\n');
    sealed.extend_from_slice(tag.as_bytes());
    sealed.push(b'\n');
    sealed.extend_from_slice(SEAL_END);
    sealed.push(b'\n');
    sealed
}

/// Check `store` against an optional password and return the PEM body.
///
/// Without a password the seal is ignored and only stripped.
pub(crate) fn check_seal<'a>(store: &'a [u8], password: Option<&str>) -> SealCheck<'a> {
    let (body, seal) = split_seal(store);
    let Some(password) = password else {
        return SealCheck::Verified(body);
    };
    let Some(seal) = seal else {
        return SealCheck::Missing;
    };
    let Some(tag) = parse_tag(seal) else {
        return SealCheck::Malformed;
    };
    match mac_for(password, body).verify_slice(&tag) {
        Ok(()) => SealCheck::Verified(body),
        Err(_) => SealCheck::Mismatch,
    }
}

fn mac_for(password: &str, body: &[u8]) -> HmacSha256 {
    // HMAC accepts keys of any length, including empty ones.
    let mut mac = HmacSha256::new_from_slice(password.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC keys have no length limit"));
    mac.update(body);
    mac
}

fn split_seal(store: &[u8]) -> (&[u8], Option<&[u8]>) {
    match find(store, SEAL_BEGIN) {
        Some(start) => (&store[..start], Some(&store[start + SEAL_BEGIN.len()..])),
        None => (store, None),
    }
}

fn parse_tag(seal: &[u8]) -> Option<Vec<u8>> {
    let end = find(seal, SEAL_END)?;
    let text = std::str::from_utf8(&seal[..end]).ok()?;
    hex::decode(text.trim()).ok()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
