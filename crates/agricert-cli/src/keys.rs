//! # Keygen Subcommand
//!
//! Generates the Ed25519 key the API signs credentials with. The seed is
//! what `SIGNING_KEY_HEX` expects; the public key is what verifiers pass
//! to `agricert verify --public-key`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use agricert_crypto::Ed25519KeyPair;

#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Write `<prefix>.key` and `<prefix>.pub` here instead of printing
    /// the seed.
    #[arg(long, short)]
    pub output: Option<PathBuf>,
    /// File name prefix for written keys.
    #[arg(long, default_value = "agricert")]
    pub prefix: String,
}

pub fn run_keygen(args: &KeygenArgs) -> Result<u8> {
    let key = Ed25519KeyPair::generate();
    let public_hex = key.public_key().to_hex();

    match &args.output {
        Some(dir) => {
            let (seed_path, public_path) = write_keypair(&key, dir, &args.prefix)?;
            println!("OK: generated Ed25519 keypair");
            println!("  Seed:       {}", seed_path.display());
            println!("  Public key: {}", public_path.display());
        }
        None => {
            println!("SIGNING_KEY_HEX={}", key.seed_hex().as_str());
        }
    }
    println!("  Public key (hex): {public_hex}");
    Ok(0)
}

fn write_keypair(key: &Ed25519KeyPair, dir: &Path, prefix: &str) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory: {}", dir.display()))?;
    let seed_path = dir.join(format!("{prefix}.key"));
    let public_path = dir.join(format!("{prefix}.pub"));
    std::fs::write(&seed_path, key.seed_hex().as_str())
        .with_context(|| format!("failed to write seed: {}", seed_path.display()))?;
    std::fs::write(&public_path, key.public_key().to_hex())
        .with_context(|| format!("failed to write public key: {}", public_path.display()))?;
    Ok((seed_path, public_path))
}
