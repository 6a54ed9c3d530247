// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic job identifiers.
//!
//! A Job's ID is derived from its JobRequest ID and action name, so
//! re-expanding the same request always produces the same set of IDs and a
//! rebuilt database mid-request never creates orphan jobs.

use sha1::{Digest, Sha1};

/// Lowercase RFC 4648 base32 alphabet, no padding.
const BASE32_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

/// Returns a string slice truncated to at most `n` characters.
pub fn short(s: &str, n: usize) -> &str {
    if s.len() <= n {
        s
    } else {
        &s[..n]
    }
}

/// Derive the ID for the job of `action` within `job_request_id`.
///
/// Actions are unique within a request, so the pair is globally unique.
pub fn deterministic_job_id(job_request_id: &str, action: &str) -> String {
    deterministic_id(&format!("{}\n{}", job_request_id, action))
}

/// First 16 base32 characters (10 bytes) of the SHA-1 of `seed`.
pub fn deterministic_id(seed: &str) -> String {
    let digest = Sha1::digest(seed.as_bytes());
    base32_lower(&digest[..10])
}

/// Random 10-hex-char ID for synthetic job requests created by the CLI.
pub fn random_id() -> String {
    let ns = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let digest = Sha1::digest(format!("{}\n{}", ns, std::process::id()).as_bytes());
    digest[..5].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Base32-encode `bytes` with the lowercase alphabet and no padding.
///
/// Input length must be a multiple of 5 bytes (it always is: we encode
/// exactly 10 digest bytes into 16 characters).
fn base32_lower(bytes: &[u8]) -> String {
    debug_assert!(bytes.len() % 5 == 0);
    let mut out = String::with_capacity(bytes.len() / 5 * 8);
    for chunk in bytes.chunks(5) {
        let mut buf: u64 = 0;
        for &b in chunk {
            buf = (buf << 8) | u64::from(b);
        }
        for shift in (0..8).rev() {
            let index = ((buf >> (shift * 5)) & 0x1f) as usize;
            out.push(BASE32_ALPHABET[index] as char);
        }
    }
    out
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod id_tests;
