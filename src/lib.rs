//! # Freicoin consensus
//!
//! Pure, side-effect-free implementation of Freicoin's script and Merkle
//! tree consensus rules: the script interpreter with its segregated witness
//! extension, legacy and witness signature digests carrying the
//! `lock_height`/`refheight` demurrage fields, and the fast Merkle tree
//! structures that witness programs and OP_MERKLEBRANCHVERIFY build on.
//!
//! ## Design principles
//!
//! 1. **Pure functions**: evaluation takes explicit inputs (scripts, stacks,
//!    flags, a checker) and returns explicit results; no globals, no I/O
//! 2. **Exact version pinning**: all consensus-critical cryptography
//!    dependencies are pinned to exact versions
//! 3. **Flags over heights**: scheduled rule changes (protocol cleanup, size
//!    expansion) are expressed as verification flags; activation policy
//!    lives with the caller
//!
//! ## Usage
//!
//! ```rust
//! use freicoin_consensus::interpreter::verify_script;
//! use freicoin_consensus::checker::BaseSignatureChecker;
//! use freicoin_consensus::constants::VERIFY_NONE;
//!
//! // scriptSig: OP_1; scriptPubKey: empty
//! let result = verify_script(&[0x51], &[], None, VERIFY_NONE, &BaseSignatureChecker);
//! assert!(result.is_ok());
//! ```

pub mod checker;
pub mod constants;
pub mod error;
pub mod interpreter;
pub mod merkle;
pub mod merkleproof;
pub mod opcodes;
pub mod script;
pub mod scriptnum;
pub mod sighash;
pub mod types;

// Re-export the main entry points
pub use checker::{BaseSignatureChecker, SignatureChecker, TransactionSignatureChecker};
pub use error::{ConsensusError, ScriptError, ScriptResult};
pub use interpreter::{eval_script, verify_script};
pub use merkle::{
    compute_fast_merkle_branch, compute_fast_merkle_root, compute_fast_merkle_root_from_branch,
    compute_merkle_branch, compute_merkle_root, compute_merkle_root_from_branch,
    compute_stable_merkle_branch, compute_stable_merkle_root_from_branch,
};
pub use merkleproof::{MerkleBranch, MerkleProof, MerkleTree};
pub use sighash::{signature_hash, PrecomputedTransactionData, SigVersion};
pub use types::{OutPoint, ScriptWitness, Transaction, TxIn, TxOut};

use types::{Amount, Hash};

/// Facade over the consensus entry points
///
/// Stateless; exists so callers that hold "a consensus engine" have a single
/// value to pass around instead of a bag of free functions.
pub struct ConsensusEngine;

impl ConsensusEngine {
    /// Create a new consensus engine
    ///
    /// # Examples
    ///
    /// ```
    /// use freicoin_consensus::ConsensusEngine;
    ///
    /// let engine = ConsensusEngine::new();
    /// ```
    pub fn new() -> Self {
        Self
    }

    /// Verify a scriptSig/scriptPubKey pair, with optional witness data
    ///
    /// # Examples
    ///
    /// ```
    /// use freicoin_consensus::ConsensusEngine;
    /// use freicoin_consensus::checker::BaseSignatureChecker;
    /// use freicoin_consensus::constants::VERIFY_NONE;
    ///
    /// let engine = ConsensusEngine::new();
    /// // scriptSig: OP_1; scriptPubKey: empty
    /// let result = engine.verify_script(&[0x51], &[], None, VERIFY_NONE, &BaseSignatureChecker);
    /// assert!(result.is_ok());
    /// ```
    pub fn verify_script(
        &self,
        script_sig: &[u8],
        script_pubkey: &[u8],
        witness: Option<&ScriptWitness>,
        flags: u32,
        checker: &dyn SignatureChecker,
    ) -> ScriptResult {
        interpreter::verify_script(script_sig, script_pubkey, witness, flags, checker)
    }

    /// Compute the signature digest for one input of a transaction
    #[allow(clippy::too_many_arguments)]
    pub fn signature_hash(
        &self,
        script_code: &[u8],
        tx: &Transaction,
        input_index: usize,
        hash_type: u32,
        amount: Amount,
        refheight: i64,
        sigversion: SigVersion,
    ) -> Hash {
        sighash::signature_hash(
            script_code,
            tx,
            input_index,
            hash_type,
            amount,
            refheight,
            sigversion,
            None,
        )
    }

    /// Compute the fast Merkle root of a list of leaf hashes
    ///
    /// # Examples
    ///
    /// ```
    /// use freicoin_consensus::ConsensusEngine;
    /// use freicoin_consensus::merkle::double_sha256;
    ///
    /// let engine = ConsensusEngine::new();
    /// let leaf = double_sha256(b"leaf");
    /// assert_eq!(engine.fast_merkle_root(&[leaf]), leaf);
    /// ```
    pub fn fast_merkle_root(&self, leaves: &[Hash]) -> Hash {
        merkle::compute_fast_merkle_root(leaves)
    }

    /// Compute the classic Merkle root of a list of leaf hashes
    ///
    /// Returns the root and whether the leaf list is mutated (contains the
    /// duplicate-subtree ambiguity).
    pub fn merkle_root(&self, leaves: &[Hash]) -> (Hash, bool) {
        merkle::compute_merkle_root(leaves)
    }
}

impl Default for ConsensusEngine {
    fn default() -> Self {
        Self::new()
    }
}
