//! Peer records: self-advertised `host:port` addresses.
//!
//! Peers pay for their lifetime at [`PEER_TTL_MULTIPLIER`] times the object
//! rate. A two-minute advertisement costs what a multi-day object would,
//! which keeps the peer table expensive to flood.

use serde::{Deserialize, Serialize};

use super::{Admission, Record};
use crate::config::{BOOTSTRAP_NONCE, MAX_ADDRESS_LENGTH, NEVER_EXPIRES, PEER_TTL_MULTIPLIER};
use crate::crypto::hash::{record_hash, timestamp_bytes, ContentHash};
use crate::encoding::decimal;
use crate::pow::{self, Nonce, PowError, PowWorker};
use crate::time::{remaining_ttl, Timestamp};

/// A reachable node, as advertised on the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    pub address: String,
    #[serde(with = "decimal")]
    pub nonce: Nonce,
    #[serde(with = "decimal")]
    pub expiration_time: Timestamp,
}

impl Peer {
    /// A trusted seed peer. It carries placeholder proof-of-work values and is
    /// only ever inserted with [`Repository::insert_trusted`](super::Repository::insert_trusted).
    pub fn bootstrap(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            nonce: BOOTSTRAP_NONCE,
            expiration_time: NEVER_EXPIRES,
        }
    }

    /// Bytes the puzzle is mined over: `address || expiration (16 bytes BE)`.
    pub fn pow_input(address: &str, expiration_time: Timestamp) -> Vec<u8> {
        let mut input = Vec::with_capacity(address.len() + 16);
        input.extend_from_slice(address.as_bytes());
        input.extend_from_slice(&timestamp_bytes(expiration_time));
        input
    }

    /// Lifetime the puzzle is scaled for when a peer lives `ttl` seconds.
    pub fn pow_ttl(ttl: u128) -> u128 {
        ttl.saturating_mul(PEER_TTL_MULTIPLIER)
    }

    /// Mines an advertisement for `address`, valid `ttl` seconds after `now`.
    pub async fn mine(
        worker: &PowWorker,
        address: impl Into<String>,
        ttl: u128,
        now: Timestamp,
    ) -> Result<Self, PowError> {
        let address = address.into();
        let expiration_time = now.saturating_add(ttl);
        let nonce = worker
            .solve(Self::pow_input(&address, expiration_time), Self::pow_ttl(ttl))
            .await?;
        Ok(Self {
            address,
            nonce,
            expiration_time,
        })
    }
}

impl Record for Peer {
    fn content_hash(&self) -> ContentHash {
        record_hash(self.address.as_bytes(), self.expiration_time)
    }

    fn expiration_time(&self) -> Timestamp {
        self.expiration_time
    }

    fn check_admission(&self, now: Timestamp) -> Admission {
        if self.address.len() > MAX_ADDRESS_LENGTH {
            return Admission::AddressTooLong;
        }
        let Some(ttl) = remaining_ttl(self.expiration_time, now) else {
            return Admission::Expired;
        };
        let input = Self::pow_input(&self.address, self.expiration_time);
        if pow::verify(&input, Self::pow_ttl(ttl), self.nonce) {
            Admission::Admitted
        } else {
            Admission::InvalidProofOfWork
        }
    }
}
