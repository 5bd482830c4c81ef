// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Random credentials and the password hash written into the session config.
//!
//! Clear-text passwords only ever live in memory and in the returned
//! [`Env`](crate::Env); the config file gets the salted PBKDF2 form.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rand_core::{OsRng, RngCore};
use sha1::Sha1;
use std::fmt::Write;

/// Dbase32 alphabet: URL and filename safe, sorts the same as the raw bytes.
pub const ID_ALPHABET: &str = "3456789ABCDEFGHIJKLMNOPQRSTUVWXY";

/// Length of the ids produced by [`random_id`].
pub const ID_LEN: usize = 24;

/// Length of the hex salts produced by [`random_salt`].
pub const SALT_LEN: usize = 32;

pub const PBKDF2_ITERATIONS: u32 = 10;

const ID_BYTES: usize = 15;
const SALT_BYTES: usize = 16;
const DERIVED_KEY_BYTES: usize = 20;

/// A 120-bit random identifier, 24 characters over [`ID_ALPHABET`].
pub fn random_id() -> String {
    let mut buf = [0u8; ID_BYTES];
    OsRng.fill_bytes(&mut buf);
    db32encode(&buf)
}

/// A 128-bit random salt, hex encoded.
pub fn random_salt() -> String {
    let mut buf = [0u8; SALT_BYTES];
    OsRng.fill_bytes(&mut buf);
    hex(&buf)
}

/// Hash `password` with `salt` into the `-pbkdf2-` form accepted by the
/// engine's `[admins]` section.
pub fn couch_hashed(password: &str, salt: &str) -> String {
    let mut key = [0u8; DERIVED_KEY_BYTES];
    pbkdf2::pbkdf2_hmac::<Sha1>(
        password.as_bytes(),
        salt.as_bytes(),
        PBKDF2_ITERATIONS,
        &mut key,
    );
    format!("-pbkdf2-{},{salt},{PBKDF2_ITERATIONS}", hex(&key))
}

/// Value for an `Authorization` header using HTTP basic auth.
pub fn basic_auth_header(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

fn db32encode(data: &[u8; ID_BYTES]) -> String {
    let alphabet = ID_ALPHABET.as_bytes();
    let mut out = String::with_capacity(ID_LEN);
    for chunk in data.chunks(5) {
        let taxi = chunk.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
        for shift in (0..8).rev() {
            let idx = ((taxi >> (shift * 5)) & 0x1f) as usize;
            if let Some(&c) = alphabet.get(idx) {
                out.push(char::from(c));
            }
        }
    }
    out
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}
