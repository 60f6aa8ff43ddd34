//! # Proof of Work
//!
//! Every object and every peer record carries a nonce proving that its
//! author burned memory-hard CPU time proportional to the record's size and
//! lifetime. Admission checks one trial; creation may run thousands.
//!
//! ## Difficulty
//!
//! ```text
//! len    = payload_len + PAYLOAD_LENGTH_EXTRA_BYTES
//! target = 2^64 / (NONCE_TRIALS_PER_BYTE * (len + ttl * len / 2^16))
//! ```
//!
//! Integer division throughout, evaluated in saturating `u128` arithmetic. A
//! denominator that would overflow saturates, pushing the target toward zero
//! and making the puzzle effectively unsolvable rather than trivially easy.
//!
//! ## Trials
//!
//! `initial_hash = BLAKE3(payload)`, and a nonce `n` succeeds when the first
//! eight bytes (big-endian) of `Argon2id(n_be16 || initial_hash)` are at or
//! below the target. Argon2id runs with the smallest legal parameters and a
//! zero salt. The point is a memory-touching work factor that GPUs do not
//! trivially parallelize. It is not a password hash.
//!
//! ## Worker
//!
//! [`PowWorker`] moves the solve loop onto tokio's blocking pool so it never
//! stalls the reactor, and it owns a cancellation flag. Node shutdown flips
//! the flag and every running solve returns [`PowError::Cancelled`] within
//! [`POW_CANCEL_CHECK_INTERVAL`] trials.

use argon2::{Algorithm, Argon2, Params, Version};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::{
    NONCE_TRIALS_PER_BYTE, PAYLOAD_LENGTH_EXTRA_BYTES, POW_CANCEL_CHECK_INTERVAL,
    POW_ITERATIONS, POW_MEMORY_KIB, POW_OUTPUT_LENGTH, POW_PARALLELISM, POW_SALT, TTL_DIVISOR,
};
use crate::crypto::hash::generic_hash;

/// A proof-of-work nonce. As wide as timestamps so the bootstrap sentinel fits.
pub type Nonce = u128;

/// Errors from the proof-of-work engine.
#[derive(Debug, Error)]
pub enum PowError {
    #[error("argon2 failure: {0}")]
    Hash(String),

    #[error("proof of work cancelled")]
    Cancelled,

    #[error("nonce space exhausted")]
    Exhausted,

    #[error("worker task failed: {0}")]
    Worker(String),
}

// ---------------------------------------------------------------------------
// Difficulty
// ---------------------------------------------------------------------------

/// Highest trial value accepted for a payload of `payload_len` bytes living
/// `ttl` seconds.
pub fn target(payload_len: usize, ttl: u128) -> u64 {
    let length = (payload_len as u128).saturating_add(PAYLOAD_LENGTH_EXTRA_BYTES);
    let denominator = NONCE_TRIALS_PER_BYTE
        .saturating_mul(length.saturating_add(ttl.saturating_mul(length) / TTL_DIVISOR))
        .max(1);
    u64::try_from((1u128 << 64) / denominator).unwrap_or(u64::MAX)
}

/// `BLAKE3(payload)`, computed once per solve or verify.
pub fn initial_hash(payload: &[u8]) -> [u8; 32] {
    generic_hash(payload)
}

// ---------------------------------------------------------------------------
// Trials
// ---------------------------------------------------------------------------

fn hasher() -> Result<Argon2<'static>, PowError> {
    let params = Params::new(
        POW_MEMORY_KIB,
        POW_ITERATIONS,
        POW_PARALLELISM,
        Some(POW_OUTPUT_LENGTH),
    )
    .map_err(|e| PowError::Hash(e.to_string()))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

fn trial(argon: &Argon2<'_>, nonce: Nonce, initial_hash: &[u8; 32]) -> Result<u64, PowError> {
    let mut input = [0u8; 48];
    input[..16].copy_from_slice(&nonce.to_be_bytes());
    input[16..].copy_from_slice(initial_hash);

    let mut output = [0u8; POW_OUTPUT_LENGTH];
    argon
        .hash_password_into(&input, &POW_SALT, &mut output)
        .map_err(|e| PowError::Hash(e.to_string()))?;

    let mut head = [0u8; 8];
    head.copy_from_slice(&output[..8]);
    Ok(u64::from_be_bytes(head))
}

/// Trial value of `nonce` against `payload`. Exposed for diagnostics.
pub fn trial_value(payload: &[u8], nonce: Nonce) -> Result<u64, PowError> {
    trial(&hasher()?, nonce, &initial_hash(payload))
}

/// Checks a nonce with a single trial.
pub fn verify(payload: &[u8], ttl: u128, nonce: Nonce) -> bool {
    let Ok(argon) = hasher() else {
        return false;
    };
    match trial(&argon, nonce, &initial_hash(payload)) {
        Ok(value) => value <= target(payload.len(), ttl),
        Err(_) => false,
    }
}

/// Searches nonces upward from zero until one meets the target, checking
/// `cancel` every [`POW_CANCEL_CHECK_INTERVAL`] trials.
pub fn solve_with_cancel(payload: &[u8], ttl: u128, cancel: &AtomicBool) -> Result<Nonce, PowError> {
    let argon = hasher()?;
    let hash = initial_hash(payload);
    let goal = target(payload.len(), ttl);

    let mut nonce: Nonce = 0;
    loop {
        if nonce % POW_CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
            return Err(PowError::Cancelled);
        }
        if trial(&argon, nonce, &hash)? <= goal {
            return Ok(nonce);
        }
        nonce = nonce.checked_add(1).ok_or(PowError::Exhausted)?;
    }
}

/// Blocking, uncancellable solve.
pub fn solve(payload: &[u8], ttl: u128) -> Result<Nonce, PowError> {
    solve_with_cancel(payload, ttl, &AtomicBool::new(false))
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Runs solves off the async reactor. Clones share one cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct PowWorker {
    cancelled: Arc<AtomicBool>,
}

impl PowWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Solves on the blocking pool.
    pub async fn solve(&self, payload: Vec<u8>, ttl: u128) -> Result<Nonce, PowError> {
        let cancelled = Arc::clone(&self.cancelled);
        let started = std::time::Instant::now();
        let result = tokio::task::spawn_blocking(move || solve_with_cancel(&payload, ttl, &cancelled))
            .await
            .map_err(|e| PowError::Worker(e.to_string()))?;
        if let Ok(nonce) = &result {
            debug!(
                nonce = %nonce,
                ttl = %ttl,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "proof of work solved"
            );
        }
        result
    }

    /// Aborts every running and future solve on this worker.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
