//! # Verify and Checksum Subcommands
//!
//! Offline checks of a credential document. `verify` runs the same
//! structure, signature and expiry checks as the public API, in the same
//! order, but cannot know about revocation: that needs the issuer's
//! ledger.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Args;
use serde_json::Value;

use agricert_core::Timestamp;
use agricert_crypto::Ed25519PublicKey;
use agricert_vc::{
    document_checksum, document_expiration, validate_structure, verify_checksum,
    verify_ed25519_document,
};

use crate::read_json;

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Signed credential document (JSON).
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
    /// Issuer public key, 64 hex characters.
    #[arg(long)]
    pub public_key: String,
}

#[derive(Args, Debug)]
pub struct ChecksumArgs {
    /// Credential document (JSON).
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
    /// Compare against this checksum instead of printing it.
    #[arg(long)]
    pub expect: Option<String>,
}

/// Why an offline verification failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Structure(Vec<String>),
    Signature(String),
    Expired(Timestamp),
    MissingExpiry,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Structure(errors) => write!(f, "malformed document: {}", errors.join("; ")),
            Self::Signature(reason) => write!(f, "invalid signature: {reason}"),
            Self::Expired(at) => write!(f, "credential expired at {}", at.to_iso8601()),
            Self::MissingExpiry => f.write_str("expiration date is missing or malformed"),
        }
    }
}

/// Structure, then signature, then expiry; first failure wins.
pub fn check_document(
    document: &Value,
    public_key: &Ed25519PublicKey,
    now: Timestamp,
) -> Result<(), Rejection> {
    validate_structure(document).map_err(Rejection::Structure)?;
    let signature = verify_ed25519_document(document, public_key);
    if !signature.valid {
        return Err(Rejection::Signature(
            signature.reason.unwrap_or_else(|| "unknown".to_string()),
        ));
    }
    match document_expiration(document) {
        Some(expires) if expires < now => Err(Rejection::Expired(expires)),
        Some(_) => Ok(()),
        None => Err(Rejection::MissingExpiry),
    }
}

pub fn run_verify(args: &VerifyArgs) -> Result<u8> {
    let public_key = Ed25519PublicKey::from_hex(args.public_key.trim())
        .map_err(|e| anyhow!("invalid public key: {e}"))?;
    let document = read_json(&args.file)?;

    match check_document(&document, &public_key, Timestamp::now()) {
        Ok(()) => {
            println!("OK: credential is valid (revocation not checked offline)");
            Ok(0)
        }
        Err(rejection) => {
            println!("FAIL: {rejection}");
            Ok(1)
        }
    }
}

pub fn run_checksum(args: &ChecksumArgs) -> Result<u8> {
    let document = read_json(&args.file)?;
    match &args.expect {
        None => {
            println!("{}", document_checksum(&document)?);
            Ok(0)
        }
        Some(expected) if verify_checksum(&document, expected) => {
            println!("OK: checksum matches");
            Ok(0)
        }
        Some(_) => {
            println!("FAIL: checksum does not match");
            Ok(1)
        }
    }
}
