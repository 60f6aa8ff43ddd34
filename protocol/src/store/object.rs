//! Gossip objects: opaque, expiring, proof-of-work-stamped payloads.

use serde::{Deserialize, Serialize};

use super::{Admission, Record};
use crate::crypto::hash::{record_hash, timestamp_bytes, ContentHash};
use crate::encoding::{base64_bytes, decimal};
use crate::pow::{self, Nonce, PowError, PowWorker};
use crate::time::{remaining_ttl, Timestamp};

/// A payload in flight through the network. In practice the payload is a
/// group or sealed-box ciphertext, but the network never looks inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GossipObject {
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    #[serde(with = "decimal")]
    pub nonce: Nonce,
    #[serde(with = "decimal")]
    pub expiration_time: Timestamp,
    #[serde(with = "decimal")]
    pub receive_time: Timestamp,
}

impl GossipObject {
    /// Bytes the puzzle is mined over: `payload || expiration (16 bytes BE)`.
    pub fn pow_input(payload: &[u8], expiration_time: Timestamp) -> Vec<u8> {
        let mut input = Vec::with_capacity(payload.len() + 16);
        input.extend_from_slice(payload);
        input.extend_from_slice(&timestamp_bytes(expiration_time));
        input
    }

    /// Mines a new object expiring `ttl` seconds after `now`.
    pub async fn mine(
        worker: &PowWorker,
        payload: Vec<u8>,
        ttl: u128,
        now: Timestamp,
    ) -> Result<Self, PowError> {
        let expiration_time = now.saturating_add(ttl);
        let nonce = worker
            .solve(Self::pow_input(&payload, expiration_time), ttl)
            .await?;
        Ok(Self {
            payload,
            nonce,
            expiration_time,
            receive_time: now,
        })
    }
}

impl Record for GossipObject {
    fn content_hash(&self) -> ContentHash {
        record_hash(&self.payload, self.expiration_time)
    }

    fn expiration_time(&self) -> Timestamp {
        self.expiration_time
    }

    fn check_admission(&self, now: Timestamp) -> Admission {
        let Some(ttl) = remaining_ttl(self.expiration_time, now) else {
            return Admission::Expired;
        };
        let input = Self::pow_input(&self.payload, self.expiration_time);
        if pow::verify(&input, ttl, self.nonce) {
            Admission::Admitted
        } else {
            Admission::InvalidProofOfWork
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ObjectStore;

    const NOW: Timestamp = 1_700_000_000;

    fn mined(payload: &[u8], ttl: u128) -> GossipObject {
        let expiration_time = NOW + ttl;
        let input = GossipObject::pow_input(payload, expiration_time);
        GossipObject {
            payload: payload.to_vec(),
            nonce: pow::solve(&input, ttl).unwrap(),
            expiration_time,
            receive_time: NOW,
        }
    }

    #[test]
    fn hash_ignores_nonce_and_receive_time() {
        let a = mined(b"hello", 60);
        let mut b = a.clone();
        b.nonce += 1;
        b.receive_time += 500;
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn valid_object_is_admitted_once() {
        let store = ObjectStore::new();
        let object = mined(b"hello", 60);
        assert_eq!(store.admit(object.clone(), NOW), Admission::Admitted);
        assert_eq!(store.admit(object, NOW + 1), Admission::Duplicate);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn expired_object_is_rejected() {
        let object = mined(b"late", 10);
        assert_eq!(object.check_admission(NOW + 11), Admission::Expired);
        // Zero remaining lifetime is still admissible.
        assert_eq!(object.check_admission(NOW + 10), Admission::Admitted);
    }

    #[test]
    fn forged_nonce_is_rejected() {
        let mut object = mined(b"payload", 60);
        // Find a nonce that does not meet the target.
        let input = GossipObject::pow_input(&object.payload, object.expiration_time);
        let goal = pow::target(input.len(), 60);
        object.nonce = (0u128..)
            .find(|n| pow::trial_value(&input, *n).unwrap() > goal)
            .unwrap();
        assert_eq!(object.check_admission(NOW), Admission::InvalidProofOfWork);
    }

    #[test]
    fn wire_form_uses_decimal_strings() {
        let object = mined(b"hi", 5);
        let json = serde_json::to_value(&object).unwrap();
        assert_eq!(json["payload"], "aGk=");
        assert_eq!(json["expirationTime"], (NOW + 5).to_string());
        assert!(json["nonce"].is_string());
    }

    #[tokio::test]
    async fn worker_mined_object_is_admissible() {
        let worker = PowWorker::new();
        let object = GossipObject::mine(&worker, b"mined".to_vec(), 30, NOW)
            .await
            .unwrap();
        assert_eq!(object.expiration_time, NOW + 30);
        assert_eq!(object.check_admission(NOW), Admission::Admitted);
    }
}
