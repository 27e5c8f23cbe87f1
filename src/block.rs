// Block model: immutable record plus a canonical SHA-256 hash.
// Canonical form is JSON with sorted keys; stake and ai_score are rounded to 8 places first.

use crate::error::Result;
use crate::identity::{self, Signer};
use crate::GENESIS_HASH;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Decimal places kept for `stake`/`ai_score` in the hash input.
pub const HASH_FLOAT_PRECISION: i32 = 8;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub kind: String,
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
}

impl Transaction {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    fn canonical_value(&self) -> Value {
        json!({ "kind": self.kind, "data": self.data })
    }
}

/// Genesis descriptor, read once when the ledger log is empty.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisSeed {
    pub owner: String,
    pub epoch: f64,
}

/// A proposed or accepted block.
///
/// Fields are public for inspection, but a block must not be changed once
/// `hash` is set: any edit makes `verify` fail.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub prev_hash: String,
    pub timestamp: f64,
    pub proposer: String,
    pub stake: f64,
    pub ai_score: f64,
    #[serde(default)]
    pub txs: Vec<Transaction>,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub hash: String,
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

impl Block {
    /// Unsigned, unhashed block. Call [`Block::seal`] to finish it.
    pub fn new(
        index: u64,
        prev_hash: impl Into<String>,
        timestamp: f64,
        proposer: impl Into<String>,
        stake: f64,
        ai_score: f64,
        txs: Vec<Transaction>,
    ) -> Self {
        Self {
            index,
            prev_hash: prev_hash.into(),
            timestamp,
            proposer: proposer.into(),
            stake,
            ai_score,
            txs,
            signature: String::new(),
            hash: String::new(),
        }
    }

    /// Sentinel first block. Its hash is the literal `"genesis"`, not a digest.
    pub fn genesis(seed: &GenesisSeed) -> Self {
        let tx = Transaction::new("genesis").with("owner", seed.owner.clone());
        let mut block = Self::new(0, "", seed.epoch, seed.owner.clone(), 0.0, 0.0, vec![tx]);
        block.hash = GENESIS_HASH.to_string();
        block
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.prev_hash.is_empty() && self.hash == GENESIS_HASH
    }

    /// Consensus weight: `stake * ai_score`.
    pub fn score(&self) -> f64 {
        self.stake * self.ai_score
    }

    fn hash_material(&self, signature: &str) -> Vec<u8> {
        let txs: Vec<Value> = self.txs.iter().map(Transaction::canonical_value).collect();
        // serde_json maps are BTreeMap-backed, so keys serialize sorted.
        let payload = json!({
            "index": self.index,
            "prev_hash": self.prev_hash,
            "timestamp": self.timestamp,
            "proposer": self.proposer,
            "stake": round_to(self.stake, HASH_FLOAT_PRECISION),
            "ai_score": round_to(self.ai_score, HASH_FLOAT_PRECISION),
            "txs": txs,
            "signature": signature,
        });
        payload.to_string().into_bytes()
    }

    fn digest(material: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(material);
        hex::encode(hasher.finalize())
    }

    /// Canonical hash over every field except `hash` itself.
    pub fn compute_hash(&self) -> String {
        Self::digest(&self.hash_material(&self.signature))
    }

    /// The message a proposer signs: the canonical hash with an empty signature.
    pub fn signing_hash(&self) -> String {
        Self::digest(&self.hash_material(""))
    }

    /// Sign with `signer` and fix the final hash.
    pub fn seal(mut self, signer: &dyn Signer) -> Result<Self> {
        let sig = signer.sign(self.signing_hash().as_bytes())?;
        self.signature = sig;
        self.hash = self.compute_hash();
        Ok(self)
    }

    /// True iff the stored hash equals the recomputed canonical hash.
    pub fn verify(&self) -> bool {
        !self.hash.is_empty() && self.compute_hash() == self.hash
    }

    /// True iff `signature` was produced by the key behind `proposer`.
    pub fn verify_signature(&self) -> bool {
        identity::verify(&self.proposer, self.signing_hash().as_bytes(), &self.signature)
    }

    /// One-line canonical JSON (sorted keys), as written to the ledger log.
    pub fn to_line(&self) -> Result<String> {
        let value = serde_json::to_value(self)?;
        Ok(value.to_string())
    }

    pub fn from_line(line: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}
