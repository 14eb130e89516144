//! # agricert-crypto: Cryptographic Primitives
//!
//! - **Ed25519** issuer keys and signatures over `CanonicalBytes`.
//! - Hex encoding for keys, base64url for proof values embedded in
//!   credential documents.
//! - Seed loading from configuration with zeroization of intermediate
//!   buffers.
//!
//! ## Crate Policy
//!
//! - Depends only on `agricert-core` internally.
//! - No mocking of cryptographic operations in tests.

pub mod ed25519;
pub mod error;

pub use ed25519::{verify, verify_with_public_key, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
pub use error::CryptoError;
