//! # agricert-cli: Offline Credential Tooling
//!
//! Provides the `agricert` command-line interface for operators and
//! verifiers who hold a credential document but no API access.
//!
//! ## Subcommands
//!
//! - `agricert keygen`: generate the issuing Ed25519 key (`SIGNING_KEY_HEX`).
//! - `agricert verify <file> --public-key <hex>`: structure, signature
//!   and expiry of a signed document.
//! - `agricert checksum <file>`: the QR integrity checksum of a document.
//! - `agricert template [--path]`: print the effective credential template.

pub mod document;
pub mod keys;
pub mod template;

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

/// Read and parse a JSON document.
pub fn read_json(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read document: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse JSON: {}", path.display()))
}
