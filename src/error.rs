//! Error types for script and Merkle-proof validation

use thiserror::Error;

/// Script verification failure codes. One variant per consensus error
/// condition; callers map these to transaction rejection reasons.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Unknown error")]
    UnknownError,
    #[error("Script evaluated without error but finished with a false/empty top stack element")]
    EvalFalse,
    #[error("OP_RETURN was encountered")]
    OpReturn,

    // Max sizes
    #[error("Script is too big")]
    ScriptSize,
    #[error("Push value size limit exceeded")]
    PushSize,
    #[error("Operation limit exceeded")]
    OpCount,
    #[error("Stack size limit exceeded")]
    StackSize,
    #[error("Signature count negative or greater than pubkey count")]
    SigCount,
    #[error("Pubkey count negative or limit exceeded")]
    PubkeyCount,

    // Failed verify operations
    #[error("Script failed an OP_VERIFY operation")]
    Verify,
    #[error("Script failed an OP_EQUALVERIFY operation")]
    EqualVerify,
    #[error("Script failed an OP_CHECKMULTISIGVERIFY operation")]
    CheckMultisigVerify,
    #[error("Script failed an OP_CHECKSIGVERIFY operation")]
    CheckSigVerify,
    #[error("Script failed an OP_NUMEQUALVERIFY operation")]
    NumEqualVerify,

    // Logical/format/canonical errors
    #[error("Opcode missing or not understood")]
    BadOpcode,
    #[error("Attempted to use a disabled opcode")]
    DisabledOpcode,
    #[error("Operation not valid with the current stack size")]
    InvalidStackOperation,
    #[error("Operation not valid with the current altstack size")]
    InvalidAltstackOperation,
    #[error("Invalid OP_IF construction")]
    UnbalancedConditional,

    // CHECKLOCKTIMEVERIFY and CHECKSEQUENCEVERIFY
    #[error("Negative locktime")]
    NegativeLocktime,
    #[error("Locktime requirement not satisfied")]
    UnsatisfiedLocktime,

    // Malleability
    #[error("Signature hash type missing or not understood")]
    SigHashType,
    #[error("Non-canonical DER signature")]
    SigDer,
    #[error("Data push larger than necessary")]
    MinimalData,
    #[error("Only push operators allowed in signatures")]
    SigPushOnly,
    #[error("Non-canonical signature: S value is unnecessarily high")]
    SigHighS,
    #[error("Non-canonical public key")]
    PubkeyType,
    #[error("Stack size must be exactly one after execution")]
    CleanStack,
    #[error("Signature must be zero for failed CHECK(MULTI)SIG operation")]
    NullFail,

    // Softfork safeness (policy only)
    #[error("NOPx reserved for soft-fork upgrades")]
    DiscourageUpgradableNops,
    #[error("Witness version reserved for soft-fork upgrades")]
    DiscourageUpgradableWitnessProgram,

    // Segregated witness
    #[error("Witness program was passed an empty witness")]
    WitnessProgramWitnessEmpty,
    #[error("Witness program hash mismatch")]
    WitnessProgramMismatch,
    #[error("Invalid Merkle proof in witness program")]
    WitnessProgramInvalidProof,
    #[error("Witness requires empty scriptSig")]
    WitnessMalleated,
    #[error("Witness provided for non-witness script")]
    WitnessUnexpected,
    #[error("Using non-compressed keys in segwit")]
    WitnessPubkeyType,

    // Merkle branch verification
    #[error("Hash is not 32 bytes")]
    InvalidHashLength,
    #[error("Merkle proof is structurally invalid")]
    InvalidMerkleProof,
    #[error("Merkle branch root does not match")]
    MerkleBranchVerify,

    // Require valid signatures
    #[error("Multisig hint does not match provided signatures")]
    MultisigHint,
    #[error("Signature checked by a CHECK(MULTI)SIG operation must be valid")]
    FailedSignatureCheck,
}

/// Outcome of a script-level operation: `Ok(())` on success, the specific
/// failure code otherwise. No panic crosses this boundary.
pub type ScriptResult = std::result::Result<(), ScriptError>;

/// Crate-level error for non-script operations (deserialization, proof
/// construction helpers).
#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("Script execution failed: {0}")]
    ScriptExecution(ScriptError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Merkle proof error: {0}")]
    MerkleProof(String),
}

impl From<ScriptError> for ConsensusError {
    fn from(err: ScriptError) -> Self {
        ConsensusError::ScriptExecution(err)
    }
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
