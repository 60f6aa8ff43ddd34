//! # Cryptographic Primitives for Agora
//!
//! Every hash, signature and ciphertext in the system flows through here.
//! We deliberately chose boring, well-audited cryptography:
//!
//! - **BLAKE3** for hashing and key derivation.
//! - **Ed25519** for signatures.
//! - **X25519** for sealed-box key agreement.
//! - **AES-256-GCM** for both group and sealed-box encryption.
//!
//! The memory-hard Argon2id puzzle lives in [`crate::pow`]. It is a work
//! factor, not a cryptographic primitive in its own right.
//!
//! Everything here is a thin, type-safe wrapper around audited
//! implementations. If you're tempted to optimize these functions, please
//! reconsider.

pub mod encryption;
pub mod hash;
pub mod keys;
pub mod sealed;
pub mod signatures;

pub use hash::{generic_hash, record_hash, ContentHash};
pub use keys::{IdentityKeyPair, PublicHalf};
