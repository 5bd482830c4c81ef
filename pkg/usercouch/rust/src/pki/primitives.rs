// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! File based key, CA, request and signing operations.
//!
//! Every operation writes exactly one new file and refuses to overwrite an
//! existing one with [`Error::FileExists`].

use crate::error::{Error, IoContext, Result};
use log::info;
use rcgen::{
    BasicConstraints, CertificateParams, CertificateSigningRequestParams, DistinguishedName,
    DnType, IsCa, KeyPair, KeyUsagePurpose, SerialNumber,
};
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::Path;
use time::{Duration, OffsetDateTime};

pub const VALIDITY_DAYS: i64 = 3650;

/// Generate a private key into `dst`.
pub fn gen_key(dst: &Path) -> Result<()> {
    ensure_absent(dst)?;
    let key = KeyPair::generate()?;
    write_new(dst, &key.serialize_pem())?;
    info!("generated key {}", dst.display());
    Ok(())
}

/// Self-sign a CA certificate for `subject` with the key in `key`.
pub fn gen_ca(key: &Path, subject: &str, dst: &Path) -> Result<()> {
    ensure_absent(dst)?;
    let key = load_key(key)?;
    let mut params = subject_params(subject)?;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    set_validity(&mut params);
    let cert = params.self_signed(&key)?;
    write_new(dst, &cert.pem())?;
    info!("generated CA {} for CN={subject}", dst.display());
    Ok(())
}

/// Write a signing request for `subject` with the key in `key`.
pub fn gen_csr(key: &Path, subject: &str, dst: &Path) -> Result<()> {
    ensure_absent(dst)?;
    let key = load_key(key)?;
    let csr = subject_params(subject)?.serialize_request(&key)?;
    write_new(dst, &csr.pem()?)?;
    info!("generated request {} for CN={subject}", dst.display());
    Ok(())
}

/// Sign the request in `csr` with the CA in `ca`/`ca_key`. The serial comes
/// from the counter in `srl`, which is created on first use and only advanced
/// once the certificate is on disk.
pub fn sign_csr(csr: &Path, ca: &Path, ca_key: &Path, srl: &Path, dst: &Path) -> Result<()> {
    ensure_absent(dst)?;
    let ca_pem = read(ca)?;
    let ca_key = load_key(ca_key)?;
    let issuer = CertificateParams::from_ca_cert_pem(&ca_pem)?.self_signed(&ca_key)?;

    let mut request = CertificateSigningRequestParams::from_pem(&read(csr)?)?;
    let serial = read_serial(srl)?.checked_add(1).ok_or_else(|| {
        Error::io(
            format!("reading {}", srl.display()),
            io::Error::new(ErrorKind::InvalidData, "serial counter exhausted"),
        )
    })?;
    request.params.serial_number = Some(serial_number(serial));
    set_validity(&mut request.params);
    let cert = request.signed_by(&issuer, &ca_key)?;
    write_new(dst, &cert.pem())?;
    fs::write(srl, format!("{serial:02X}\n"))
        .io_context(|| format!("writing {}", srl.display()))?;
    info!("signed {} (serial {serial:02X})", dst.display());
    Ok(())
}

fn subject_params(subject: &str) -> Result<CertificateParams> {
    let mut params = CertificateParams::new(Vec::<String>::new())?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, subject);
    params.distinguished_name = dn;
    Ok(params)
}

fn set_validity(params: &mut CertificateParams) {
    let now = OffsetDateTime::now_utc();
    params.not_before = now - Duration::hours(1);
    params.not_after = now + Duration::days(VALIDITY_DAYS);
}

/// The last serial recorded in `srl`, zero if none was issued yet.
fn read_serial(srl: &Path) -> Result<u64> {
    match fs::read_to_string(srl) {
        Ok(text) => u64::from_str_radix(text.trim(), 16).map_err(|e| {
            Error::io(
                format!("reading {}", srl.display()),
                io::Error::new(ErrorKind::InvalidData, e),
            )
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
        Err(e) => Err(Error::io(format!("reading {}", srl.display()), e)),
    }
}

fn serial_number(serial: u64) -> SerialNumber {
    let bytes = serial.to_be_bytes();
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);
    SerialNumber::from_slice(bytes.get(start..).unwrap_or(&bytes))
}

fn load_key(path: &Path) -> Result<KeyPair> {
    Ok(KeyPair::from_pem(&read(path)?)?)
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).io_context(|| format!("reading {}", path.display()))
}

fn ensure_absent(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(Error::FileExists {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

fn write_new(path: &Path, contents: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => Error::FileExists {
                path: path.to_path_buf(),
            },
            _ => Error::io(format!("creating {}", path.display()), e),
        })?;
    file.write_all(contents.as_bytes())
        .io_context(|| format!("writing {}", path.display()))
}
