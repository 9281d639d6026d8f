//! Script interpreter
//!
//! Implements script evaluation for both legacy (base) scripts and version 0
//! segregated witness scripts, where the scriptPubKey commits to a fast
//! Merkle root of spendable scripts. Rule changes scheduled for the
//! protocol-cleanup fork are expressed through verification flags rather
//! than activation heights; the caller decides which rule set applies.

use ripemd::Ripemd160;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::checker::SignatureChecker;
use crate::constants::*;
use crate::error::{ScriptError, ScriptResult};
use crate::merkle::{compute_fast_merkle_root_from_branch, double_sha256};
use crate::merkleproof::{MerkleProof, MerkleTree};
use crate::opcodes::*;
use crate::script::{
    cast_to_bool, check_minimal_push, find_and_delete, get_op, is_pay_to_script_hash,
    is_push_only, is_witness_program, push_encoding,
};
use crate::scriptnum::ScriptNum;
use crate::sighash::SigVersion;
use crate::types::{ByteString, Hash, ScriptWitness};

/// Which keys of a CHECKMULTISIG are *not* backed by a signature. The
/// otherwise-unused extra stack argument consumed by CHECKMULTISIG carries
/// this bitfield when the hint rule is enforced, letting the verifier skip
/// signature checks that are known to fail. Bit 0 is the key closest to the
/// top of the stack.
#[derive(Debug, Clone, Copy)]
pub struct MultiSigHint {
    nkeys: usize,
    skipped_keys: u32,
}

impl MultiSigHint {
    /// A hint claiming every key has a signature.
    pub fn new(nkeys: usize) -> Self {
        MultiSigHint {
            nkeys,
            skipped_keys: 0,
        }
    }

    pub fn with_skips(nkeys: usize, skipped_keys: u32) -> Self {
        MultiSigHint {
            nkeys,
            skipped_keys,
        }
    }

    /// Replace the skip bitfield from its serialized numeric form.
    pub fn set_skips(&mut self, bits: u32) {
        self.skipped_keys = bits;
    }

    /// Number of keys the hint claims are backed by signatures.
    pub fn count_sigs(&self) -> usize {
        self.nkeys - (self.skipped_keys.count_ones() as usize)
    }

    pub fn have_sig_for_key(&self, key: usize) -> bool {
        self.skipped_keys & (1 << key) == 0
    }
}

fn popstack(stack: &mut Vec<ByteString>) -> Result<ByteString, ScriptError> {
    stack.pop().ok_or(ScriptError::UnknownError)
}

fn stacktop(stack: &[ByteString], depth: usize) -> &ByteString {
    &stack[stack.len() - depth]
}

/// Strict-DER check for the signature-plus-hashtype blob consumed by the
/// CHECK(MULTI)SIG opcodes: 0x30 [total-length] 0x02 [R-length] [R] 0x02
/// [S-length] [S] [sighash]. R and S must be positive and minimally padded.
pub fn is_valid_signature_encoding(sig: &[u8]) -> bool {
    if sig.len() < 9 || sig.len() > 73 {
        return false;
    }
    if sig[0] != 0x30 {
        return false;
    }
    if sig[1] as usize != sig.len() - 3 {
        return false;
    }
    let len_r = sig[3] as usize;
    if 5 + len_r >= sig.len() {
        return false;
    }
    let len_s = sig[5 + len_r] as usize;
    if len_r + len_s + 7 != sig.len() {
        return false;
    }
    if sig[2] != 0x02 {
        return false;
    }
    if len_r == 0 {
        return false;
    }
    if sig[4] & 0x80 != 0 {
        return false;
    }
    if len_r > 1 && sig[4] == 0x00 && sig[5] & 0x80 == 0 {
        return false;
    }
    if sig[len_r + 4] != 0x02 {
        return false;
    }
    if len_s == 0 {
        return false;
    }
    if sig[len_r + 6] & 0x80 != 0 {
        return false;
    }
    if len_s > 1 && sig[len_r + 6] == 0x00 && sig[len_r + 7] & 0x80 == 0 {
        return false;
    }
    true
}

fn is_low_der_signature(sig: &[u8]) -> ScriptResult {
    if !is_valid_signature_encoding(sig) {
        return Err(ScriptError::SigDer);
    }
    let der = &sig[..sig.len() - 1];
    let parsed = match secp256k1::ecdsa::Signature::from_der(der) {
        Ok(s) => s,
        Err(_) => return Err(ScriptError::SigHighS),
    };
    let mut normalized = parsed;
    normalized.normalize_s();
    if normalized.serialize_compact() != parsed.serialize_compact() {
        return Err(ScriptError::SigHighS);
    }
    Ok(())
}

fn is_defined_hashtype_signature(sig: &[u8]) -> bool {
    if sig.is_empty() {
        return false;
    }
    let hash_type = (sig[sig.len() - 1] as u32) & !SIGHASH_ANYONECANPAY;
    (SIGHASH_ALL..=SIGHASH_SINGLE).contains(&hash_type)
}

pub fn check_signature_encoding(sig: &[u8], flags: u32) -> ScriptResult {
    // An empty signature is not strictly DER, but is allowed as a compact
    // way of providing a deliberately invalid signature to CHECK(MULTI)SIG.
    if sig.is_empty() {
        return Ok(());
    }
    if flags & (VERIFY_DERSIG | VERIFY_LOW_S | VERIFY_STRICTENC) != 0
        && !is_valid_signature_encoding(sig)
    {
        return Err(ScriptError::SigDer);
    }
    if flags & VERIFY_LOW_S != 0 {
        is_low_der_signature(sig)?;
    }
    if flags & VERIFY_STRICTENC != 0 && !is_defined_hashtype_signature(sig) {
        return Err(ScriptError::SigHashType);
    }
    Ok(())
}

fn is_compressed_or_uncompressed_pubkey(pubkey: &[u8]) -> bool {
    if pubkey.len() < 33 {
        return false;
    }
    match pubkey[0] {
        0x04 => pubkey.len() == 65,
        0x02 | 0x03 => pubkey.len() == 33,
        _ => false,
    }
}

fn is_compressed_pubkey(pubkey: &[u8]) -> bool {
    pubkey.len() == 33 && (pubkey[0] == 0x02 || pubkey[0] == 0x03)
}

pub fn check_pub_key_encoding(pubkey: &[u8], flags: u32, sigversion: SigVersion) -> ScriptResult {
    if flags & VERIFY_STRICTENC != 0 && !is_compressed_or_uncompressed_pubkey(pubkey) {
        return Err(ScriptError::PubkeyType);
    }
    // Only compressed keys are accepted in segwit.
    if flags & VERIFY_WITNESS_PUBKEYTYPE != 0
        && sigversion == SigVersion::WitnessV0
        && !is_compressed_pubkey(pubkey)
    {
        return Err(ScriptError::WitnessPubkeyType);
    }
    Ok(())
}

/// Evaluate a script against a stack, mutating the stack in place.
///
/// Legacy resource limits (script size, push size, opcode and stack depth
/// caps) apply only to base-version scripts before the protocol-cleanup
/// fork. Witness scripts and post-cleanup scripts treat unknown opcodes as
/// unconditional success, for forward compatibility with script upgrades.
pub fn eval_script(
    stack: &mut Vec<ByteString>,
    script: &[u8],
    flags: u32,
    checker: &dyn SignatureChecker,
    sigversion: SigVersion,
) -> ScriptResult {
    let protocol_cleanup = flags & VERIFY_PROTOCOL_CLEANUP != 0;
    let discourage_upgradable_nops = flags & VERIFY_DISCOURAGE_UPGRADABLE_NOPS != 0;
    let enforce_nullfail =
        sigversion != SigVersion::Base || flags & VERIFY_NULLFAIL != 0;
    let enforce_multisig_hint =
        sigversion != SigVersion::Base || flags & VERIFY_MULTISIG_HINT != 0;
    let require_minimal =
        sigversion != SigVersion::Base || flags & VERIFY_MINIMALDATA != 0;
    let legacy_limits = !protocol_cleanup && sigversion == SigVersion::Base;

    if legacy_limits && script.len() > MAX_SCRIPT_SIZE {
        return Err(ScriptError::ScriptSize);
    }

    let mut pc = 0usize;
    let mut pbegincodehash = 0usize;
    let mut vf_exec: Vec<bool> = Vec::new();
    let mut altstack: Vec<ByteString> = Vec::new();
    let mut op_count = 0usize;

    while pc < script.len() {
        let f_exec = !vf_exec.contains(&false);

        // GetOp only fails on a malformed push or a truncated script, so
        // this error is not relaxed by the protocol cleanup. Validly decoded
        // but unrecognized instructions are handled below.
        let (opcode, push_value) = match get_op(script, &mut pc) {
            Some(op) => op,
            None => return Err(ScriptError::BadOpcode),
        };
        if legacy_limits && push_value.len() > MAX_SCRIPT_ELEMENT_SIZE {
            return Err(ScriptError::PushSize);
        }

        // OP_RESERVED does not count towards the opcode limit.
        if legacy_limits && opcode > OP_16 {
            op_count += 1;
            if op_count > MAX_OPS_PER_SCRIPT {
                return Err(ScriptError::OpCount);
            }
        }

        if legacy_limits
            && matches!(
                opcode,
                OP_CAT
                    | OP_SUBSTR
                    | OP_LEFT
                    | OP_RIGHT
                    | OP_INVERT
                    | OP_AND
                    | OP_OR
                    | OP_XOR
                    | OP_2MUL
                    | OP_2DIV
                    | OP_MUL
                    | OP_DIV
                    | OP_MOD
                    | OP_LSHIFT
                    | OP_RSHIFT
            )
        {
            return Err(ScriptError::DisabledOpcode);
        }

        if f_exec && opcode <= OP_PUSHDATA4 {
            if require_minimal && !check_minimal_push(&push_value, opcode) {
                return Err(ScriptError::MinimalData);
            }
            stack.push(push_value);
        } else if f_exec || (OP_IF..=OP_ENDIF).contains(&opcode) {
            match opcode {
                //
                // Push value
                //
                OP_1NEGATE | OP_1 | OP_2 | OP_3 | OP_4 | OP_5 | OP_6 | OP_7 | OP_8 | OP_9
                | OP_10 | OP_11 | OP_12 | OP_13 | OP_14 | OP_15 | OP_16 => {
                    // These encodings are already minimal, no push check.
                    let bn = ScriptNum::new(opcode as i64 - (OP_1 as i64 - 1));
                    stack.push(bn.to_bytes());
                }

                //
                // Control
                //
                OP_NOP => {}

                OP_CHECKLOCKTIMEVERIFY => {
                    if sigversion == SigVersion::Base {
                        // Not enabled in legacy scripts; same as a NOP there,
                        // and an unconditional success after the cleanup.
                        if discourage_upgradable_nops {
                            return Err(ScriptError::DiscourageUpgradableNops);
                        }
                        if protocol_cleanup {
                            altstack.clear();
                            stack.clear();
                            stack.push(vec![1]);
                            return Ok(());
                        }
                    } else {
                        if stack.is_empty() {
                            return Err(ScriptError::InvalidStackOperation);
                        }
                        // nLockTime is an unsigned 32-bit field; 5-byte
                        // operands keep comparisons meaningful past 2038.
                        let lock_time = ScriptNum::from_bytes(stacktop(stack, 1), true, 5)?;
                        if lock_time.value() < 0 {
                            return Err(ScriptError::NegativeLocktime);
                        }
                        if !checker.check_lock_time(lock_time.value()) {
                            return Err(ScriptError::UnsatisfiedLocktime);
                        }
                        popstack(stack)?;
                    }
                }

                OP_CHECKSEQUENCEVERIFY => {
                    if sigversion == SigVersion::Base {
                        if discourage_upgradable_nops {
                            return Err(ScriptError::DiscourageUpgradableNops);
                        }
                        if protocol_cleanup {
                            altstack.clear();
                            stack.clear();
                            stack.push(vec![1]);
                            return Ok(());
                        }
                    } else {
                        if stack.is_empty() {
                            return Err(ScriptError::InvalidStackOperation);
                        }
                        let operand = stacktop(stack, 1).clone();
                        let sequence = ScriptNum::from_bytes(&operand, true, 5)?;
                        // If the operand has the disable flag set, the
                        // relative-lock checks are not performed; the operand
                        // is reserved for soft-fork extensibility.
                        if operand.len() <= 4 || operand[3] & 0x80 == 0 {
                            if sequence.value() < 0 {
                                return Err(ScriptError::NegativeLocktime);
                            }
                            if !checker.check_sequence(sequence.value()) {
                                return Err(ScriptError::UnsatisfiedLocktime);
                            }
                        }
                        popstack(stack)?;
                    }
                }

                OP_MERKLEBRANCHVERIFY => {
                    if sigversion == SigVersion::Base {
                        if discourage_upgradable_nops {
                            return Err(ScriptError::DiscourageUpgradableNops);
                        }
                        if protocol_cleanup {
                            altstack.clear();
                            stack.clear();
                            stack.push(vec![1]);
                            return Ok(());
                        }
                    } else {
                        // ([...verify leaves...] proof root 2*count+prehashed)
                        if stack.len() < 3 {
                            return Err(ScriptError::InvalidStackOperation);
                        }
                        let vch_count = stacktop(stack, 1).clone();
                        let vch_root = stacktop(stack, 2).clone();
                        let vch_proof = stacktop(stack, 3).clone();

                        // The count of leaf values, with the sign carrying
                        // whether the leaves are already hashes. The stack
                        // depth cap keeps it within a 2-byte number.
                        let param = match ScriptNum::from_bytes(&vch_count, true, 2) {
                            Ok(n) => n.to_int(),
                            Err(_) => return Err(ScriptError::MinimalData),
                        };
                        let prehashed = param < 0;
                        let count = param.unsigned_abs() as usize;

                        if stack.len() < 3 + count {
                            return Err(ScriptError::InvalidStackOperation);
                        }
                        // The root is pushed as plain data, not a number.
                        if vch_root.len() != 32 {
                            return Err(ScriptError::InvalidHashLength);
                        }
                        let mut root = [0u8; 32];
                        root.copy_from_slice(&vch_root);

                        let mut cursor = 0usize;
                        let proof = match MerkleProof::deserialize(&vch_proof, &mut cursor) {
                            Ok(p) => p,
                            Err(_) => return Err(ScriptError::InvalidMerkleProof),
                        };
                        if cursor != vch_proof.len() {
                            // Trailing bytes would be witness malleability.
                            return Err(ScriptError::InvalidMerkleProof);
                        }
                        if proof.path.dirty() != 0 {
                            // So would unused bits in the final packed byte.
                            return Err(ScriptError::InvalidMerkleProof);
                        }
                        // Any binary tree has one more leaf than internal
                        // node. The empty 0-node, 0-verify, 0-skip tree is
                        // exempt.
                        if (!proof.path.is_empty() || count != 0 || !proof.skip.is_empty())
                            && count + proof.skip.len() != proof.path.len() + 1
                        {
                            return Err(ScriptError::InvalidMerkleProof);
                        }

                        let mut verify: Vec<Hash> = Vec::with_capacity(count);
                        for k in 0..count {
                            let leaf = stacktop(stack, 4 + k);
                            if prehashed {
                                if leaf.len() != 32 {
                                    return Err(ScriptError::InvalidHashLength);
                                }
                                let mut hash = [0u8; 32];
                                hash.copy_from_slice(leaf);
                                verify.push(hash);
                            } else {
                                verify.push(double_sha256(leaf));
                            }
                        }

                        let tree = MerkleTree { proof, verify };
                        let result = match tree.get_hash(None) {
                            Some(hash) => hash,
                            None => return Err(ScriptError::InvalidMerkleProof),
                        };
                        if result != root {
                            return Err(ScriptError::MerkleBranchVerify);
                        }

                        // Drop count, root, and proof; the leaves remain.
                        popstack(stack)?;
                        popstack(stack)?;
                        popstack(stack)?;
                    }
                }

                OP_NOP1 | OP_NOP5 | OP_NOP6 | OP_NOP7 | OP_NOP8 | OP_NOP9 | OP_NOP10 => {
                    // In legacy scripts, same as NOP; in post-cleanup or
                    // witness scripts these return to the undefined pool.
                    if discourage_upgradable_nops {
                        return Err(ScriptError::DiscourageUpgradableNops);
                    }
                    if protocol_cleanup || sigversion != SigVersion::Base {
                        altstack.clear();
                        stack.clear();
                        stack.push(vec![1]);
                        return Ok(());
                    }
                }

                OP_IF | OP_NOTIF => {
                    // <expression> if [statements] [else [statements]] endif
                    let mut value = false;
                    if f_exec {
                        if stack.is_empty() {
                            return Err(ScriptError::UnbalancedConditional);
                        }
                        value = cast_to_bool(stacktop(stack, 1));
                        if opcode == OP_NOTIF {
                            value = !value;
                        }
                        popstack(stack)?;
                    }
                    vf_exec.push(value);
                }

                OP_ELSE => {
                    match vf_exec.last_mut() {
                        Some(last) => *last = !*last,
                        None => return Err(ScriptError::UnbalancedConditional),
                    }
                }

                OP_ENDIF => {
                    if vf_exec.pop().is_none() {
                        return Err(ScriptError::UnbalancedConditional);
                    }
                }

                OP_VERIFY => {
                    // (true -- ) or (false -- false) and return
                    if stack.is_empty() {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    if cast_to_bool(stacktop(stack, 1)) {
                        popstack(stack)?;
                    } else {
                        return Err(ScriptError::Verify);
                    }
                }

                OP_RETURN => {
                    return Err(ScriptError::OpReturn);
                }

                //
                // Stack ops
                //
                OP_TOALTSTACK => {
                    if stack.is_empty() {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    altstack.push(popstack(stack)?);
                }

                OP_FROMALTSTACK => {
                    if altstack.is_empty() {
                        return Err(ScriptError::InvalidAltstackOperation);
                    }
                    stack.push(popstack(&mut altstack)?);
                }

                OP_2DROP => {
                    // (x1 x2 -- )
                    if stack.len() < 2 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    popstack(stack)?;
                    popstack(stack)?;
                }

                OP_2DUP => {
                    // (x1 x2 -- x1 x2 x1 x2)
                    if stack.len() < 2 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let vch1 = stacktop(stack, 2).clone();
                    let vch2 = stacktop(stack, 1).clone();
                    stack.push(vch1);
                    stack.push(vch2);
                }

                OP_3DUP => {
                    // (x1 x2 x3 -- x1 x2 x3 x1 x2 x3)
                    if stack.len() < 3 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let vch1 = stacktop(stack, 3).clone();
                    let vch2 = stacktop(stack, 2).clone();
                    let vch3 = stacktop(stack, 1).clone();
                    stack.push(vch1);
                    stack.push(vch2);
                    stack.push(vch3);
                }

                OP_2OVER => {
                    // (x1 x2 x3 x4 -- x1 x2 x3 x4 x1 x2)
                    if stack.len() < 4 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let vch1 = stacktop(stack, 4).clone();
                    let vch2 = stacktop(stack, 3).clone();
                    stack.push(vch1);
                    stack.push(vch2);
                }

                OP_2ROT => {
                    // (x1 x2 x3 x4 x5 x6 -- x3 x4 x5 x6 x1 x2)
                    if stack.len() < 6 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let vch1 = stacktop(stack, 6).clone();
                    let vch2 = stacktop(stack, 5).clone();
                    let len = stack.len();
                    stack.drain(len - 6..len - 4);
                    stack.push(vch1);
                    stack.push(vch2);
                }

                OP_2SWAP => {
                    // (x1 x2 x3 x4 -- x3 x4 x1 x2)
                    if stack.len() < 4 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let len = stack.len();
                    stack.swap(len - 4, len - 2);
                    stack.swap(len - 3, len - 1);
                }

                OP_IFDUP => {
                    // (x -- 0 | x x)
                    if stack.is_empty() {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let vch = stacktop(stack, 1).clone();
                    if cast_to_bool(&vch) {
                        stack.push(vch);
                    }
                }

                OP_DEPTH => {
                    // ( -- stacksize)
                    let bn = ScriptNum::new(stack.len() as i64);
                    stack.push(bn.to_bytes());
                }

                OP_DROP => {
                    // (x -- )
                    if stack.is_empty() {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    popstack(stack)?;
                }

                OP_DUP => {
                    // (x -- x x)
                    if stack.is_empty() {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let vch = stacktop(stack, 1).clone();
                    stack.push(vch);
                }

                OP_NIP => {
                    // (x1 x2 -- x2)
                    if stack.len() < 2 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let len = stack.len();
                    stack.remove(len - 2);
                }

                OP_OVER => {
                    // (x1 x2 -- x1 x2 x1)
                    if stack.len() < 2 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let vch = stacktop(stack, 2).clone();
                    stack.push(vch);
                }

                OP_PICK | OP_ROLL => {
                    // OP_ROLL moves to the undefined-success pool in witness
                    // scripts; a linear stack shuffle is too easy a DoS lever.
                    if opcode == OP_ROLL && sigversion != SigVersion::Base {
                        if discourage_upgradable_nops {
                            return Err(ScriptError::DiscourageUpgradableNops);
                        }
                        altstack.clear();
                        stack.clear();
                        stack.push(vec![1]);
                        return Ok(());
                    }
                    // (xn ... x2 x1 x0 n -- xn ... x2 x1 x0 xn) for PICK
                    // (xn ... x2 x1 x0 n -- ... x2 x1 x0 xn) for ROLL
                    if stack.len() < 2 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let n = ScriptNum::from_bytes(stacktop(stack, 1), require_minimal, 4)?
                        .to_int();
                    popstack(stack)?;
                    if n < 0 || n as usize >= stack.len() {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let n = n as usize;
                    let vch = stacktop(stack, n + 1).clone();
                    if opcode == OP_ROLL {
                        let len = stack.len();
                        stack.remove(len - n - 1);
                    }
                    stack.push(vch);
                }

                OP_ROT => {
                    // (x1 x2 x3 -- x2 x3 x1)
                    if stack.len() < 3 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let len = stack.len();
                    stack.swap(len - 3, len - 2);
                    stack.swap(len - 2, len - 1);
                }

                OP_SWAP => {
                    // (x1 x2 -- x2 x1)
                    if stack.len() < 2 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let len = stack.len();
                    stack.swap(len - 2, len - 1);
                }

                OP_TUCK => {
                    // (x1 x2 -- x2 x1 x2)
                    if stack.len() < 2 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let vch = stacktop(stack, 1).clone();
                    let len = stack.len();
                    stack.insert(len - 2, vch);
                }

                OP_SIZE => {
                    // (in -- in size)
                    if stack.is_empty() {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let bn = ScriptNum::new(stacktop(stack, 1).len() as i64);
                    stack.push(bn.to_bytes());
                }

                //
                // Bitwise logic
                //
                OP_EQUAL | OP_EQUALVERIFY => {
                    // (x1 x2 -- bool)
                    if stack.len() < 2 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let equal = stacktop(stack, 2) == stacktop(stack, 1);
                    popstack(stack)?;
                    popstack(stack)?;
                    stack.push(if equal { vec![1] } else { vec![] });
                    if opcode == OP_EQUALVERIFY {
                        if equal {
                            popstack(stack)?;
                        } else {
                            return Err(ScriptError::EqualVerify);
                        }
                    }
                }

                //
                // Numeric
                //
                OP_1ADD | OP_1SUB | OP_NEGATE | OP_ABS | OP_NOT | OP_0NOTEQUAL => {
                    // (in -- out)
                    if stack.is_empty() {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let bn = ScriptNum::from_bytes(stacktop(stack, 1), require_minimal, 4)?;
                    let result = match opcode {
                        OP_1ADD => bn + ScriptNum::new(1),
                        OP_1SUB => bn - ScriptNum::new(1),
                        OP_NEGATE => -bn,
                        OP_ABS => {
                            if bn.value() < 0 {
                                -bn
                            } else {
                                bn
                            }
                        }
                        OP_NOT => ScriptNum::new((bn.value() == 0) as i64),
                        _ => ScriptNum::new((bn.value() != 0) as i64),
                    };
                    popstack(stack)?;
                    stack.push(result.to_bytes());
                }

                OP_ADD | OP_SUB | OP_BOOLAND | OP_BOOLOR | OP_NUMEQUAL | OP_NUMEQUALVERIFY
                | OP_NUMNOTEQUAL | OP_LESSTHAN | OP_GREATERTHAN | OP_LESSTHANOREQUAL
                | OP_GREATERTHANOREQUAL | OP_MIN | OP_MAX => {
                    // (x1 x2 -- out)
                    if stack.len() < 2 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let bn1 = ScriptNum::from_bytes(stacktop(stack, 2), require_minimal, 4)?;
                    let bn2 = ScriptNum::from_bytes(stacktop(stack, 1), require_minimal, 4)?;
                    let (v1, v2) = (bn1.value(), bn2.value());
                    let result = match opcode {
                        OP_ADD => bn1 + bn2,
                        OP_SUB => bn1 - bn2,
                        OP_BOOLAND => ScriptNum::new((v1 != 0 && v2 != 0) as i64),
                        OP_BOOLOR => ScriptNum::new((v1 != 0 || v2 != 0) as i64),
                        OP_NUMEQUAL | OP_NUMEQUALVERIFY => ScriptNum::new((v1 == v2) as i64),
                        OP_NUMNOTEQUAL => ScriptNum::new((v1 != v2) as i64),
                        OP_LESSTHAN => ScriptNum::new((v1 < v2) as i64),
                        OP_GREATERTHAN => ScriptNum::new((v1 > v2) as i64),
                        OP_LESSTHANOREQUAL => ScriptNum::new((v1 <= v2) as i64),
                        OP_GREATERTHANOREQUAL => ScriptNum::new((v1 >= v2) as i64),
                        OP_MIN => {
                            if v1 < v2 {
                                bn1
                            } else {
                                bn2
                            }
                        }
                        _ => {
                            if v1 > v2 {
                                bn1
                            } else {
                                bn2
                            }
                        }
                    };
                    popstack(stack)?;
                    popstack(stack)?;
                    stack.push(result.to_bytes());

                    if opcode == OP_NUMEQUALVERIFY {
                        if cast_to_bool(stacktop(stack, 1)) {
                            popstack(stack)?;
                        } else {
                            return Err(ScriptError::NumEqualVerify);
                        }
                    }
                }

                OP_WITHIN => {
                    // (x min max -- out)
                    if stack.len() < 3 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let bn1 = ScriptNum::from_bytes(stacktop(stack, 3), require_minimal, 4)?;
                    let bn2 = ScriptNum::from_bytes(stacktop(stack, 2), require_minimal, 4)?;
                    let bn3 = ScriptNum::from_bytes(stacktop(stack, 1), require_minimal, 4)?;
                    let within = bn2.value() <= bn1.value() && bn1.value() < bn3.value();
                    popstack(stack)?;
                    popstack(stack)?;
                    popstack(stack)?;
                    stack.push(if within { vec![1] } else { vec![] });
                }

                //
                // Crypto
                //
                // SHA1 is thoroughly broken; in witness scripts the opcode
                // returns to the pool of unallocated opcodes.
                OP_SHA1 if sigversion != SigVersion::Base => {
                    if discourage_upgradable_nops {
                        return Err(ScriptError::DiscourageUpgradableNops);
                    }
                    altstack.clear();
                    stack.clear();
                    stack.push(vec![1]);
                    return Ok(());
                }

                OP_RIPEMD160 | OP_SHA1 | OP_SHA256 | OP_HASH160 | OP_HASH256 => {
                    // (in -- hash)
                    if stack.is_empty() {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let vch = popstack(stack)?;
                    let hash: ByteString = match opcode {
                        OP_RIPEMD160 => Ripemd160::digest(&vch).to_vec(),
                        OP_SHA1 => Sha1::digest(&vch).to_vec(),
                        OP_SHA256 => Sha256::digest(&vch).to_vec(),
                        OP_HASH160 => Ripemd160::digest(Sha256::digest(&vch)).to_vec(),
                        _ => double_sha256(&vch).to_vec(),
                    };
                    stack.push(hash);
                }

                OP_CODESEPARATOR => {
                    // Hash starts after the code separator
                    pbegincodehash = pc;
                }

                OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                    // (sig pubkey -- bool)
                    if stack.len() < 2 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let sig = stacktop(stack, 2).clone();
                    let pubkey = stacktop(stack, 1).clone();

                    // Subset of script starting at the most recent
                    // codeseparator. The signature cannot commit to itself,
                    // so in pre-segwit scripts its push is dropped.
                    let mut script_code = script[pbegincodehash..].to_vec();
                    if sigversion == SigVersion::Base {
                        let (stripped, _) = find_and_delete(&script_code, &push_encoding(&sig));
                        script_code = stripped;
                    }

                    check_signature_encoding(&sig, flags)?;
                    check_pub_key_encoding(&pubkey, flags, sigversion)?;
                    let success = checker.check_sig(&sig, &pubkey, &script_code, sigversion);

                    if !success && enforce_nullfail && !sig.is_empty() {
                        return Err(ScriptError::NullFail);
                    }

                    popstack(stack)?;
                    popstack(stack)?;
                    stack.push(if success { vec![1] } else { vec![] });
                    if opcode == OP_CHECKSIGVERIFY {
                        if success {
                            popstack(stack)?;
                        } else {
                            return Err(ScriptError::CheckSigVerify);
                        }
                    }
                }

                OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                    // ([sig ...] num_of_signatures [pubkey ...] num_of_pubkeys -- bool)
                    let mut i = 1usize;
                    if stack.len() < i {
                        return Err(ScriptError::InvalidStackOperation);
                    }

                    let nkeys_count =
                        ScriptNum::from_bytes(stacktop(stack, i), require_minimal, 4)?.to_int();
                    if nkeys_count < 0 || nkeys_count as usize > MAX_PUBKEYS_PER_MULTISIG {
                        return Err(ScriptError::PubkeyCount);
                    }
                    let mut nkeys = nkeys_count as usize;
                    op_count += nkeys;
                    if legacy_limits && op_count > MAX_OPS_PER_SCRIPT {
                        return Err(ScriptError::OpCount);
                    }
                    i += 1;
                    let mut ikey = i;
                    // ikey2 tracks the position of the last non-signature
                    // item during stack cleanup, for the NULLFAIL check.
                    let mut ikey2 = nkeys + 2;
                    i += nkeys;
                    if stack.len() < i {
                        return Err(ScriptError::InvalidStackOperation);
                    }

                    let nsigs_count =
                        ScriptNum::from_bytes(stacktop(stack, i), require_minimal, 4)?.to_int();
                    if nsigs_count < 0 || nsigs_count > nkeys_count {
                        return Err(ScriptError::SigCount);
                    }
                    let mut nsigs = nsigs_count as usize;
                    i += 1;
                    let mut isig = i;
                    i += nsigs;
                    if stack.len() < i {
                        return Err(ScriptError::InvalidStackOperation);
                    }

                    // Subset of script starting at the most recent
                    // codeseparator. While dropping signature pushes in
                    // pre-segwit scripts, record whether any signature is
                    // empty; that constrains the allowed hint values.
                    let mut script_code = script[pbegincodehash..].to_vec();
                    let mut empty_sigs = false;
                    for k in 0..nsigs {
                        let sig = stacktop(stack, isig + k).clone();
                        if sigversion == SigVersion::Base {
                            let (stripped, _) =
                                find_and_delete(&script_code, &push_encoding(&sig));
                            script_code = stripped;
                        }
                        empty_sigs = empty_sigs || sig.is_empty();
                    }

                    // A bug in the original CHECKMULTISIG popped one extra,
                    // unexamined stack item. When the hint rule is enforced
                    // that item is a bitfield of keys NOT backed by a
                    // signature, so failing signature checks can be skipped.
                    let mut hint = MultiSigHint::new(nkeys);
                    if enforce_multisig_hint {
                        // At most 20 keys, so 20 unsigned bits, which fits a
                        // 3-byte signed number.
                        let ser_hint = ScriptNum::from_bytes(stacktop(stack, i), true, 3)?;
                        if ser_hint.value() < 0 || ser_hint.value() >= 1i64 << nkeys {
                            return Err(ScriptError::MultisigHint);
                        }
                        hint.set_skips(ser_hint.value() as u32);
                        // For k-of-n, exactly (n-k) skip bits must be set,
                        // including for trailing unused keys the
                        // verification loop never reaches. All-empty
                        // signatures demand an all-skips hint.
                        let expected = if empty_sigs { 0 } else { nsigs };
                        if hint.count_sigs() != expected {
                            return Err(ScriptError::MultisigHint);
                        }
                    }

                    let mut success = true;
                    while success && nsigs > 0 {
                        let sig = stacktop(stack, isig).clone();
                        let pubkey = stacktop(stack, ikey).clone();

                        // The exact order of pubkey/signature evaluation is
                        // observable through CHECKMULTISIG NOT when the
                        // STRICTENC flag is set.
                        check_signature_encoding(&sig, flags)?;
                        check_pub_key_encoding(&pubkey, flags, sigversion)?;

                        // The first pubkey sits at depth 2, which is bit
                        // index 0 of the hint.
                        let have_sig = hint.have_sig_for_key(ikey - 2);
                        let ok =
                            have_sig && checker.check_sig(&sig, &pubkey, &script_code, sigversion);

                        // Keys that fail their check MUST have been skipped
                        // in the hint when the hint rule is enforced.
                        if !ok && enforce_multisig_hint && have_sig {
                            return Err(ScriptError::FailedSignatureCheck);
                        }

                        if ok {
                            isig += 1;
                            nsigs -= 1;
                        }
                        ikey += 1;
                        nkeys -= 1;

                        // More signatures left than keys left means too many
                        // have failed; exit without further checks.
                        if nsigs > nkeys {
                            success = false;
                        }
                    }

                    // Clean up the actual arguments. Once ikey2 counts down
                    // past the key block, only signatures remain, and on
                    // failure each must be the empty vector.
                    while i > 1 {
                        i -= 1;
                        if !success
                            && enforce_nullfail
                            && ikey2 == 0
                            && !stacktop(stack, 1).is_empty()
                        {
                            return Err(ScriptError::NullFail);
                        }
                        if ikey2 > 0 {
                            ikey2 -= 1;
                        }
                        popstack(stack)?;
                    }

                    // The extra argument consumed by the original bug; its
                    // contents were validated above when hints are enforced.
                    if stack.is_empty() {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    popstack(stack)?;

                    stack.push(if success { vec![1] } else { vec![] });

                    if opcode == OP_CHECKMULTISIGVERIFY {
                        if success {
                            popstack(stack)?;
                        } else {
                            return Err(ScriptError::CheckMultisigVerify);
                        }
                    }
                }

                OP_VERIF | OP_VERNOTIF
                    if (protocol_cleanup || sigversion != SigVersion::Base) && !f_exec =>
                {
                    // OP_VERIF and OP_VERNOTIF fall between OP_IF and
                    // OP_ENDIF, so they are evaluated even in a skipped
                    // branch. Originally that meant decoding one always
                    // failed the script; as members of the undefined
                    // "return true" pool they must instead be inert when
                    // not executed.
                }

                _ => {
                    // Either a live branch or a pre-segwit script; undefined
                    // opcodes (including OP_VER, the reserved opcodes, and
                    // retired ones) are handled uniformly.
                    if !protocol_cleanup && sigversion == SigVersion::Base {
                        return Err(ScriptError::BadOpcode);
                    }
                    if discourage_upgradable_nops {
                        return Err(ScriptError::DiscourageUpgradableNops);
                    }
                    altstack.clear();
                    stack.clear();
                    stack.push(vec![1]);
                    return Ok(());
                }
            }
        }

        // Size limits
        if legacy_limits && stack.len() + altstack.len() > MAX_STACK_SIZE {
            return Err(ScriptError::StackSize);
        }
        if stack.len() + altstack.len() > MAX_WITNESS_STACK_SIZE {
            return Err(ScriptError::StackSize);
        }
    }

    if !vf_exec.is_empty() {
        return Err(ScriptError::UnbalancedConditional);
    }

    Ok(())
}

/// Verify the witness against a version-0 witness program.
///
/// The program is either a 32-byte fast Merkle root of spendable scripts,
/// or its 20-byte RIPEMD160. The last witness element is a serialized
/// Merkle branch; the second-to-last is the script being proven, prefixed
/// with an inner version byte. The remaining elements become the initial
/// stack.
fn verify_witness_program(
    witness: &ScriptWitness,
    witversion: u8,
    program: &[u8],
    flags: u32,
    checker: &dyn SignatureChecker,
) -> ScriptResult {
    let mut stack: Vec<ByteString>;
    let script_pubkey: ByteString;

    if witversion == 0 {
        if program.len() == 20 || program.len() == 32 {
            if witness.stack.len() <= 1 {
                return Err(ScriptError::WitnessProgramWitnessEmpty);
            }
            // The proof is a minimally-serialized Merkle branch: an N-bit
            // path bitfield followed by N 32-byte hashes. The maximum
            // supported depth is 33 layers including the root, so the whole
            // proof fits in 32*32 + 32/8 bytes.
            let proof_field = &witness.stack[witness.stack.len() - 1];
            if proof_field.len() > 1028 {
                return Err(ScriptError::WitnessProgramInvalidProof);
            }
            let bytes_in_path = proof_field.len() % 32;
            let max_bytes_in_path = (proof_field.len() / 32 + 7) / 8;
            if bytes_in_path > max_bytes_in_path {
                return Err(ScriptError::WitnessProgramInvalidProof);
            }
            if bytes_in_path > 0 && proof_field[bytes_in_path - 1] == 0 {
                return Err(ScriptError::WitnessProgramInvalidProof);
            }
            let mut path: u32 = 0;
            for (idx, &byte) in proof_field[..bytes_in_path].iter().enumerate() {
                path |= (byte as u32) << (8 * idx);
            }
            let mut branch: Vec<Hash> = Vec::with_capacity(proof_field.len() / 32);
            for chunk in proof_field[bytes_in_path..].chunks_exact(32) {
                let mut hash = [0u8; 32];
                hash.copy_from_slice(chunk);
                branch.push(hash);
            }

            let script_field = &witness.stack[witness.stack.len() - 2];
            let leaf = double_sha256(script_field);
            let (root_hash, invalid) =
                compute_fast_merkle_root_from_branch(&leaf, &branch, path);
            if invalid {
                return Err(ScriptError::WitnessProgramInvalidProof);
            }
            let matches = if program.len() == 20 {
                let short: [u8; 20] = Ripemd160::digest(root_hash).into();
                short[..] == program[..]
            } else {
                root_hash[..] == program[..]
            };
            if !matches {
                return Err(ScriptError::WitnessProgramMismatch);
            }

            if !script_field.is_empty() && script_field[0] == 0x00 {
                script_pubkey = script_field[1..].to_vec();
                stack = witness.stack[..witness.stack.len() - 2].to_vec();
            } else if flags & VERIFY_DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM != 0 {
                return Err(ScriptError::DiscourageUpgradableWitnessProgram);
            } else {
                // Higher inner versions succeed for soft-fork compatibility.
                return Ok(());
            }
        } else if flags & VERIFY_DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM != 0 {
            return Err(ScriptError::DiscourageUpgradableWitnessProgram);
        } else {
            // Unrecognized payload lengths succeed for soft-fork compatibility.
            return Ok(());
        }
    } else if flags & VERIFY_DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM != 0 {
        return Err(ScriptError::DiscourageUpgradableWitnessProgram);
    } else {
        // Higher outer versions succeed for soft-fork compatibility.
        return Ok(());
    }

    if stack.len() > MAX_WITNESS_STACK_SIZE {
        return Err(ScriptError::StackSize);
    }

    eval_script(&mut stack, &script_pubkey, flags, checker, SigVersion::WitnessV0)?;

    match stack.last() {
        Some(top) if cast_to_bool(top) => Ok(()),
        _ => Err(ScriptError::EvalFalse),
    }
}

/// Full verification of a spend: scriptSig, scriptPubKey, optional witness,
/// with pay-to-script-hash and witness-program indirection.
pub fn verify_script(
    script_sig: &[u8],
    script_pubkey: &[u8],
    witness: Option<&ScriptWitness>,
    flags: u32,
    checker: &dyn SignatureChecker,
) -> ScriptResult {
    let empty_witness = ScriptWitness::default();
    let witness = witness.unwrap_or(&empty_witness);
    let mut had_witness = false;

    if flags & VERIFY_SIGPUSHONLY != 0 && !is_push_only(script_sig) {
        return Err(ScriptError::SigPushOnly);
    }

    let mut stack: Vec<ByteString> = Vec::new();
    eval_script(&mut stack, script_sig, flags, checker, SigVersion::Base)?;
    let stack_copy = if flags & VERIFY_P2SH != 0 {
        stack.clone()
    } else {
        Vec::new()
    };
    eval_script(&mut stack, script_pubkey, flags, checker, SigVersion::Base)?;
    match stack.last() {
        Some(top) if cast_to_bool(top) => {}
        _ => return Err(ScriptError::EvalFalse),
    }

    // Bare witness programs
    if flags & VERIFY_WITNESS != 0 {
        if let Some((witversion, program)) = is_witness_program(script_pubkey) {
            had_witness = true;
            if !script_sig.is_empty() {
                // The scriptSig must be exactly empty or we reintroduce
                // malleability.
                return Err(ScriptError::WitnessMalleated);
            }
            verify_witness_program(witness, witversion, &program, flags, checker)?;
            // The actual stack is not clean for witness programs; bypass the
            // cleanstack check below.
            stack.truncate(1);
        }
    }

    // Additional validation for spend-to-script-hash outputs:
    if flags & VERIFY_P2SH != 0 && is_pay_to_script_hash(script_pubkey) {
        // scriptSig must be literals-only or validation fails.
        if !is_push_only(script_sig) {
            return Err(ScriptError::SigPushOnly);
        }

        // Restore the stack from before the scriptPubKey evaluation. It
        // cannot be empty: the HASH160 <hash> EQUAL pattern over an empty
        // stack would have failed the EvalFalse check above.
        stack = stack_copy;
        let redeem_script = popstack(&mut stack)?;

        eval_script(&mut stack, &redeem_script, flags, checker, SigVersion::Base)?;
        match stack.last() {
            Some(top) if cast_to_bool(top) => {}
            _ => return Err(ScriptError::EvalFalse),
        }
    }

    if flags & VERIFY_WITNESS != 0 {
        // Unexpected witness data can only be detected with P2SH active;
        // WITNESS without P2SH would not be a softfork.
        debug_assert!(flags & VERIFY_P2SH != 0);
        if !had_witness && !witness.is_null() {
            return Err(ScriptError::WitnessUnexpected);
        }
    }

    // Only meaningful after any P2SH or witness indirection, whose outer
    // evaluation necessarily leaves extra items behind.
    if flags & VERIFY_CLEANSTACK != 0 {
        debug_assert!(flags & VERIFY_P2SH != 0);
        debug_assert!(flags & VERIFY_WITNESS != 0);
        if stack.len() != 1 {
            return Err(ScriptError::CleanStack);
        }
    }

    Ok(())
}
