//! Core transaction types shared by the script interpreter and sighash code

use serde::{Deserialize, Serialize};

/// Hash type: 256-bit hash
pub type Hash = [u8; 32];

/// Byte string type (stack elements, scripts, witness items)
pub type ByteString = Vec<u8>;

/// Monetary amount in kria (demurrage-adjusted at spend time by callers)
pub type Amount = i64;

/// Reference to a previous transaction output
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u32,
}

impl OutPoint {
    pub fn null() -> Self {
        OutPoint {
            hash: [0u8; 32],
            index: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.hash == [0u8; 32] && self.index == u32::MAX
    }
}

/// Transaction input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: ByteString,
    pub sequence: u32,
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub value: Amount,
    pub script_pubkey: ByteString,
}

/// Witness data for one input: a stack of byte strings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptWitness {
    pub stack: Vec<ByteString>,
}

impl ScriptWitness {
    pub fn is_null(&self) -> bool {
        self.stack.is_empty()
    }
}

/// A transaction, including the lock_height field which anchors demurrage
/// accounting and participates in signature hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    /// Per-input witness stacks; missing entries are treated as empty.
    pub witness: Vec<ScriptWitness>,
    pub lock_time: u32,
    pub lock_height: i32,
}

impl Transaction {
    /// A "legacy-shaped" transaction (version 1, a single null-prevout input)
    /// has no meaningful lock_height and omits it from serialization and
    /// signature hashes.
    pub fn omits_lock_height(&self) -> bool {
        self.version == 1 && self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }

    pub fn witness_for(&self, input: usize) -> Option<&ScriptWitness> {
        self.witness.get(input).filter(|w| !w.is_null())
    }
}
