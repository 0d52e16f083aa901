//! Portable note commitment used by the stub proof backend.
//!
//! Mirrors the shape of the ledger's note id derivation with BLAKE3 standing
//! in for the ledger hash:
//!
//! ```text
//! recipient = merge(merge(merge(serial_num, EMPTY), script_root), inputs_commitment)
//! note_id   = merge(recipient, asset_commitment)
//! ```
//!
//! The native backend never uses this module; it takes ids from
//! `miden-protocol`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{FungibleAssetData, NoteId, RevealedNote};
use crate::chain::MidenAccountAddress;

const MERGE_DOMAIN: &[u8] = b"x402-miden:merge:v1";
const INPUTS_DOMAIN: &[u8] = b"x402-miden:inputs:v1";
const ASSETS_DOMAIN: &[u8] = b"x402-miden:assets:v1";
const P2ID_SCRIPT_LABEL: &[u8] = b"x402-miden:script:p2id";

/// A 32-byte hash value, hex-encoded on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    pub const EMPTY: Digest = Digest([0; 32]);

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hashes two digests into one.
    pub fn merge(left: &Digest, right: &Digest) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(MERGE_DOMAIN);
        hasher.update(&left.0);
        hasher.update(&right.0);
        Digest(*hasher.finalize().as_bytes())
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(&s))
            .map_err(serde::de::Error::custom)?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("digest must be 32 bytes"))?;
        Ok(Digest(array))
    }
}

/// Script root of the pay-to-id note script.
pub fn p2id_script_root() -> Digest {
    Digest(*blake3::hash(P2ID_SCRIPT_LABEL).as_bytes())
}

/// Full content of a note in the portable encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortableNote {
    /// Randomizing serial number chosen by the note creator.
    pub serial_num: Digest,
    pub script_root: Digest,
    /// Note input: the account allowed to consume a pay-to-id note.
    pub target: MidenAccountAddress,
    pub assets: Vec<FungibleAssetData>,
}

impl PortableNote {
    /// Creates a pay-to-id note.
    pub fn p2id(
        target: MidenAccountAddress,
        assets: Vec<FungibleAssetData>,
        serial_num: Digest,
    ) -> Self {
        Self {
            serial_num,
            script_root: p2id_script_root(),
            target,
            assets,
        }
    }

    pub fn inputs_commitment(&self) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(INPUTS_DOMAIN);
        hasher.update(self.target.as_bytes());
        Digest(*hasher.finalize().as_bytes())
    }

    pub fn recipient_digest(&self) -> Digest {
        let serial = Digest::merge(&self.serial_num, &Digest::EMPTY);
        let with_script = Digest::merge(&serial, &self.script_root);
        Digest::merge(&with_script, &self.inputs_commitment())
    }

    pub fn asset_commitment(&self) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(ASSETS_DOMAIN);
        hasher.update(&(self.assets.len() as u64).to_le_bytes());
        for asset in &self.assets {
            hasher.update(asset.faucet_id.as_bytes());
            hasher.update(&asset.amount.to_le_bytes());
        }
        Digest(*hasher.finalize().as_bytes())
    }

    pub fn id(&self) -> NoteId {
        NoteId::new(Digest::merge(&self.recipient_digest(), &self.asset_commitment()).to_hex())
    }

    /// Computes the id and exposes the note's payment-relevant content.
    pub fn reveal(&self) -> RevealedNote {
        RevealedNote {
            id: self.id(),
            target: (self.script_root == p2id_script_root()).then_some(self.target),
            assets: self.assets.clone(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PortableNote {
        PortableNote::p2id(
            MidenAccountAddress::new([0x0b; 15]),
            vec![FungibleAssetData {
                faucet_id: MidenAccountAddress::new([0x0c; 15]),
                amount: 1_000_000,
            }],
            Digest::new([3; 32]),
        )
    }

    #[test]
    fn test_id_is_deterministic() {
        assert_eq!(sample().id(), sample().id());
        assert_eq!(sample().reveal().id, sample().id());
    }

    #[test]
    fn test_every_field_feeds_the_id() {
        let base = sample().id();

        let mut n = sample();
        n.serial_num = Digest::new([4; 32]);
        assert_ne!(n.id(), base);

        let mut n = sample();
        n.target = MidenAccountAddress::new([0x0d; 15]);
        assert_ne!(n.id(), base);

        let mut n = sample();
        n.assets[0].amount -= 1;
        assert_ne!(n.id(), base);

        let mut n = sample();
        n.assets[0].faucet_id = MidenAccountAddress::new([0x0e; 15]);
        assert_ne!(n.id(), base);

        let mut n = sample();
        n.script_root = Digest::EMPTY;
        assert_ne!(n.id(), base);
    }

    #[test]
    fn test_merge_is_order_sensitive() {
        let a = Digest::new([1; 32]);
        let b = Digest::new([2; 32]);
        assert_ne!(Digest::merge(&a, &b), Digest::merge(&b, &a));
    }

    #[test]
    fn test_bytes_roundtrip_preserves_id() {
        let note = sample();
        let decoded = PortableNote::from_bytes(&note.to_bytes()).unwrap();
        assert_eq!(decoded.id(), note.id());
    }

    #[test]
    fn test_non_p2id_reveals_no_target() {
        let mut note = sample();
        note.script_root = Digest::new([9; 32]);
        assert!(note.reveal().target.is_none());
    }
}
