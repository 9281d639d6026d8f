//! Transaction signature hashes
//!
//! Two digest algorithms are in force. The legacy algorithm reserializes the
//! transaction with the script code spliced into the input being signed; it
//! is quadratic in the worst case because the whole transaction is rehashed
//! per input. The v0 witness algorithm hashes the prevouts, sequences, and
//! outputs once and reuses those midhashes for every input, and additionally
//! commits to the amount and reference height of the coin being spent.
//!
//! Both digests commit to the transaction lock_height (and the witness
//! digest to the coin refheight) unless the SIGHASH_NO_LOCK_HEIGHT flag is
//! set, which exists only to validate signatures imported from bitcoin-format
//! test vectors. The flag itself is masked out of the hash type committed to
//! in the digest.

use crate::constants::{
    SIGHASH_ANYONECANPAY, SIGHASH_NONE, SIGHASH_NO_LOCK_HEIGHT, SIGHASH_SINGLE,
};
use crate::merkle::double_sha256;
use crate::opcodes::OP_CODESEPARATOR;
use crate::script::get_op;
use crate::types::{Amount, Transaction, TxOut};

pub use crate::types::Hash;

/// Which digest algorithm a signature commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigVersion {
    Base,
    WitnessV0,
}

/// Digest returned for structurally unsignable requests under the legacy
/// algorithm (input index out of range, or SIGHASH_SINGLE without a matching
/// output). Signatures over it can never validate.
fn one_hash() -> Hash {
    let mut one = [0u8; 32];
    one[0] = 1;
    one
}

pub fn write_compact_size(out: &mut Vec<u8>, n: u64) {
    if n < 253 {
        out.push(n as u8);
    } else if n <= 0xffff {
        out.push(0xfd);
        out.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        out.push(0xfe);
        out.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&n.to_le_bytes());
    }
}

fn write_output(out: &mut Vec<u8>, txout: &TxOut) {
    out.extend_from_slice(&txout.value.to_le_bytes());
    write_compact_size(out, txout.script_pubkey.len() as u64);
    out.extend_from_slice(&txout.script_pubkey);
}

/// A null output, serialized in place of outputs not committed to under
/// SIGHASH_SINGLE: value -1 and an empty script.
fn write_null_output(out: &mut Vec<u8>) {
    out.extend_from_slice(&(-1i64).to_le_bytes());
    write_compact_size(out, 0);
}

/// The script code with all OP_CODESEPARATOR opcodes removed, length
/// prefixed. Push operands are untouched; only separators at opcode
/// boundaries are dropped. A trailing malformed push is copied through.
fn write_script_code(out: &mut Vec<u8>, script: &[u8]) {
    let mut stripped = Vec::with_capacity(script.len());
    let mut pc = 0;
    let mut segment_start = 0;
    while pc < script.len() {
        let op_start = pc;
        match get_op(script, &mut pc) {
            Some((opcode, _)) => {
                if opcode == OP_CODESEPARATOR {
                    stripped.extend_from_slice(&script[segment_start..op_start]);
                    segment_start = pc;
                }
            }
            None => break,
        }
    }
    stripped.extend_from_slice(&script[segment_start..]);
    write_compact_size(out, stripped.len() as u64);
    out.extend_from_slice(&stripped);
}

/// Midhashes shared by every input of a transaction under the witness
/// digest. Computing them once turns per-input hashing linear.
#[derive(Debug, Clone)]
pub struct PrecomputedTransactionData {
    pub hash_prevouts: Hash,
    pub hash_sequence: Hash,
    pub hash_outputs: Hash,
}

impl PrecomputedTransactionData {
    pub fn new(tx: &Transaction) -> Self {
        let mut prevouts = Vec::new();
        let mut sequences = Vec::new();
        let mut outputs = Vec::new();
        for input in &tx.inputs {
            prevouts.extend_from_slice(&input.prevout.hash);
            prevouts.extend_from_slice(&input.prevout.index.to_le_bytes());
            sequences.extend_from_slice(&input.sequence.to_le_bytes());
        }
        for output in &tx.outputs {
            write_output(&mut outputs, output);
        }
        PrecomputedTransactionData {
            hash_prevouts: double_sha256(&prevouts),
            hash_sequence: double_sha256(&sequences),
            hash_outputs: double_sha256(&outputs),
        }
    }
}

/// Compute the digest a signature on `tx.inputs[input_index]` commits to.
///
/// `script_code` is the script being satisfied (with the executed
/// code-separator prefix already removed by the caller). `amount` and
/// `refheight` are properties of the coin being spent and participate only
/// in the witness digest. `cache` may carry precomputed midhashes for the
/// witness digest; they are recomputed when absent.
pub fn signature_hash(
    script_code: &[u8],
    tx: &Transaction,
    input_index: usize,
    hash_type: u32,
    amount: Amount,
    refheight: i64,
    sigversion: SigVersion,
    cache: Option<&PrecomputedTransactionData>,
) -> Hash {
    let base_type = hash_type & 0x1f;
    let anyone_can_pay = hash_type & SIGHASH_ANYONECANPAY != 0;
    let no_lock_height = hash_type & SIGHASH_NO_LOCK_HEIGHT != 0;

    if sigversion == SigVersion::WitnessV0 {
        return witness_v0_hash(
            script_code,
            tx,
            input_index,
            hash_type,
            amount,
            refheight,
            cache,
        );
    }

    if input_index >= tx.inputs.len() {
        return one_hash();
    }
    if base_type == SIGHASH_SINGLE && input_index >= tx.outputs.len() {
        return one_hash();
    }

    let mut ss = Vec::new();
    ss.extend_from_slice(&tx.version.to_le_bytes());

    let input_count = if anyone_can_pay { 1 } else { tx.inputs.len() };
    write_compact_size(&mut ss, input_count as u64);
    for i in 0..input_count {
        let idx = if anyone_can_pay { input_index } else { i };
        let input = &tx.inputs[idx];
        ss.extend_from_slice(&input.prevout.hash);
        ss.extend_from_slice(&input.prevout.index.to_le_bytes());
        if idx == input_index {
            write_script_code(&mut ss, script_code);
        } else {
            write_compact_size(&mut ss, 0);
        }
        if idx != input_index && (base_type == SIGHASH_SINGLE || base_type == SIGHASH_NONE) {
            ss.extend_from_slice(&0u32.to_le_bytes());
        } else {
            ss.extend_from_slice(&input.sequence.to_le_bytes());
        }
    }

    let output_count = if base_type == SIGHASH_NONE {
        0
    } else if base_type == SIGHASH_SINGLE {
        input_index + 1
    } else {
        tx.outputs.len()
    };
    write_compact_size(&mut ss, output_count as u64);
    for i in 0..output_count {
        if base_type == SIGHASH_SINGLE && i != input_index {
            write_null_output(&mut ss);
        } else {
            write_output(&mut ss, &tx.outputs[i]);
        }
    }

    ss.extend_from_slice(&tx.lock_time.to_le_bytes());
    if !no_lock_height && !tx.omits_lock_height() {
        ss.extend_from_slice(&tx.lock_height.to_le_bytes());
    }
    ss.extend_from_slice(&(hash_type & !SIGHASH_NO_LOCK_HEIGHT).to_le_bytes());
    double_sha256(&ss)
}

fn witness_v0_hash(
    script_code: &[u8],
    tx: &Transaction,
    input_index: usize,
    hash_type: u32,
    amount: Amount,
    refheight: i64,
    cache: Option<&PrecomputedTransactionData>,
) -> Hash {
    let base_type = hash_type & 0x1f;
    let anyone_can_pay = hash_type & SIGHASH_ANYONECANPAY != 0;
    let no_lock_height = hash_type & SIGHASH_NO_LOCK_HEIGHT != 0;

    let zero = [0u8; 32];
    let hash_prevouts = if anyone_can_pay {
        zero
    } else if let Some(cache) = cache {
        cache.hash_prevouts
    } else {
        PrecomputedTransactionData::new(tx).hash_prevouts
    };
    let hash_sequence = if anyone_can_pay
        || base_type == SIGHASH_SINGLE
        || base_type == SIGHASH_NONE
    {
        zero
    } else if let Some(cache) = cache {
        cache.hash_sequence
    } else {
        PrecomputedTransactionData::new(tx).hash_sequence
    };
    let hash_outputs = if base_type != SIGHASH_SINGLE && base_type != SIGHASH_NONE {
        if let Some(cache) = cache {
            cache.hash_outputs
        } else {
            PrecomputedTransactionData::new(tx).hash_outputs
        }
    } else if base_type == SIGHASH_SINGLE && input_index < tx.outputs.len() {
        let mut single = Vec::new();
        write_output(&mut single, &tx.outputs[input_index]);
        double_sha256(&single)
    } else {
        zero
    };

    let input = &tx.inputs[input_index];
    let mut ss = Vec::new();
    ss.extend_from_slice(&tx.version.to_le_bytes());
    ss.extend_from_slice(&hash_prevouts);
    ss.extend_from_slice(&hash_sequence);
    ss.extend_from_slice(&input.prevout.hash);
    ss.extend_from_slice(&input.prevout.index.to_le_bytes());
    write_compact_size(&mut ss, script_code.len() as u64);
    ss.extend_from_slice(script_code);
    ss.extend_from_slice(&amount.to_le_bytes());
    if !no_lock_height {
        ss.extend_from_slice(&refheight.to_le_bytes());
    }
    ss.extend_from_slice(&input.sequence.to_le_bytes());
    ss.extend_from_slice(&hash_outputs);
    ss.extend_from_slice(&tx.lock_time.to_le_bytes());
    if !no_lock_height {
        ss.extend_from_slice(&tx.lock_height.to_le_bytes());
    }
    ss.extend_from_slice(&(hash_type & !SIGHASH_NO_LOCK_HEIGHT).to_le_bytes());
    double_sha256(&ss)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SIGHASH_ALL;
    use crate::types::{OutPoint, TxIn};

    fn sample_tx() -> Transaction {
        Transaction {
            version: 2,
            inputs: vec![
                TxIn {
                    prevout: OutPoint {
                        hash: [0x11; 32],
                        index: 0,
                    },
                    script_sig: vec![0x51],
                    sequence: 0xfffffffe,
                },
                TxIn {
                    prevout: OutPoint {
                        hash: [0x22; 32],
                        index: 1,
                    },
                    script_sig: Vec::new(),
                    sequence: 0xffffffff,
                },
            ],
            outputs: vec![
                TxOut {
                    value: 50_000,
                    script_pubkey: vec![0x76, 0xa9],
                },
                TxOut {
                    value: 25_000,
                    script_pubkey: vec![0x51],
                },
            ],
            witness: Vec::new(),
            lock_time: 0,
            lock_height: 100,
        }
    }

    fn digest(tx: &Transaction, input: usize, hash_type: u32, sigversion: SigVersion) -> Hash {
        signature_hash(&[0xac], tx, input, hash_type, 50_000, 90, sigversion, None)
    }

    #[test]
    fn test_out_of_range_input_returns_one() {
        let tx = sample_tx();
        let mut one = [0u8; 32];
        one[0] = 1;
        assert_eq!(digest(&tx, 5, SIGHASH_ALL, SigVersion::Base), one);
    }

    #[test]
    fn test_single_without_matching_output_returns_one() {
        let mut tx = sample_tx();
        tx.outputs.truncate(1);
        let mut one = [0u8; 32];
        one[0] = 1;
        assert_eq!(digest(&tx, 1, SIGHASH_SINGLE, SigVersion::Base), one);
        // The matching input still has a real digest.
        assert_ne!(digest(&tx, 0, SIGHASH_SINGLE, SigVersion::Base), one);
    }

    #[test]
    fn test_lock_height_commitment() {
        for sigversion in [SigVersion::Base, SigVersion::WitnessV0] {
            let tx = sample_tx();
            let mut moved = tx.clone();
            moved.lock_height = 999;
            assert_ne!(
                digest(&tx, 0, SIGHASH_ALL, sigversion),
                digest(&moved, 0, SIGHASH_ALL, sigversion),
            );
            // With the compatibility flag the lock_height is not committed.
            assert_eq!(
                digest(&tx, 0, SIGHASH_ALL | SIGHASH_NO_LOCK_HEIGHT, sigversion),
                digest(&moved, 0, SIGHASH_ALL | SIGHASH_NO_LOCK_HEIGHT, sigversion),
            );
            // But flagged and unflagged digests differ.
            assert_ne!(
                digest(&tx, 0, SIGHASH_ALL, sigversion),
                digest(&tx, 0, SIGHASH_ALL | SIGHASH_NO_LOCK_HEIGHT, sigversion),
            );
        }
    }

    #[test]
    fn test_none_ignores_outputs() {
        for sigversion in [SigVersion::Base, SigVersion::WitnessV0] {
            let tx = sample_tx();
            let mut altered = tx.clone();
            altered.outputs[1].value = 1;
            assert_eq!(
                digest(&tx, 0, SIGHASH_NONE, sigversion),
                digest(&altered, 0, SIGHASH_NONE, sigversion),
            );
            assert_ne!(
                digest(&tx, 0, SIGHASH_ALL, sigversion),
                digest(&altered, 0, SIGHASH_ALL, sigversion),
            );
        }
    }

    #[test]
    fn test_single_ignores_other_outputs() {
        for sigversion in [SigVersion::Base, SigVersion::WitnessV0] {
            let tx = sample_tx();
            let mut altered = tx.clone();
            altered.outputs[1].value = 1;
            assert_eq!(
                digest(&tx, 0, SIGHASH_SINGLE, sigversion),
                digest(&altered, 0, SIGHASH_SINGLE, sigversion),
            );
            let mut altered = tx.clone();
            altered.outputs[0].value = 1;
            assert_ne!(
                digest(&tx, 0, SIGHASH_SINGLE, sigversion),
                digest(&altered, 0, SIGHASH_SINGLE, sigversion),
            );
        }
    }

    #[test]
    fn test_anyonecanpay_ignores_other_inputs() {
        for sigversion in [SigVersion::Base, SigVersion::WitnessV0] {
            let tx = sample_tx();
            let mut altered = tx.clone();
            altered.inputs[1].prevout.index = 7;
            let flags = SIGHASH_ALL | SIGHASH_ANYONECANPAY;
            assert_eq!(
                digest(&tx, 0, flags, sigversion),
                digest(&altered, 0, flags, sigversion),
            );
            assert_ne!(
                digest(&tx, 0, SIGHASH_ALL, sigversion),
                digest(&altered, 0, SIGHASH_ALL, sigversion),
            );
        }
    }

    #[test]
    fn test_witness_cache_matches_uncached() {
        let tx = sample_tx();
        let cache = PrecomputedTransactionData::new(&tx);
        for hash_type in [SIGHASH_ALL, SIGHASH_NONE, SIGHASH_SINGLE] {
            let cached = signature_hash(
                &[0xac],
                &tx,
                0,
                hash_type,
                50_000,
                90,
                SigVersion::WitnessV0,
                Some(&cache),
            );
            let uncached = signature_hash(
                &[0xac],
                &tx,
                0,
                hash_type,
                50_000,
                90,
                SigVersion::WitnessV0,
                None,
            );
            assert_eq!(cached, uncached);
        }
    }

    #[test]
    fn test_witness_commits_to_amount_and_refheight() {
        let tx = sample_tx();
        let a = signature_hash(&[0xac], &tx, 0, SIGHASH_ALL, 50_000, 90, SigVersion::WitnessV0, None);
        let b = signature_hash(&[0xac], &tx, 0, SIGHASH_ALL, 50_001, 90, SigVersion::WitnessV0, None);
        let c = signature_hash(&[0xac], &tx, 0, SIGHASH_ALL, 50_000, 91, SigVersion::WitnessV0, None);
        assert_ne!(a, b);
        assert_ne!(a, c);
        // The legacy digest commits to neither.
        let d = signature_hash(&[0xac], &tx, 0, SIGHASH_ALL, 50_000, 90, SigVersion::Base, None);
        let e = signature_hash(&[0xac], &tx, 0, SIGHASH_ALL, 50_001, 91, SigVersion::Base, None);
        assert_eq!(d, e);
    }

    #[test]
    fn test_codeseparators_stripped_from_legacy_digest() {
        use crate::opcodes::OP_CODESEPARATOR;
        let tx = sample_tx();
        let with = signature_hash(
            &[OP_CODESEPARATOR, 0xac],
            &tx,
            0,
            SIGHASH_ALL,
            0,
            0,
            SigVersion::Base,
            None,
        );
        let without =
            signature_hash(&[0xac], &tx, 0, SIGHASH_ALL, 0, 0, SigVersion::Base, None);
        assert_eq!(with, without);
        // The witness digest hashes the script code as given.
        let with = signature_hash(
            &[OP_CODESEPARATOR, 0xac],
            &tx,
            0,
            SIGHASH_ALL,
            0,
            0,
            SigVersion::WitnessV0,
            None,
        );
        let without = signature_hash(
            &[0xac],
            &tx,
            0,
            SIGHASH_ALL,
            0,
            0,
            SigVersion::WitnessV0,
            None,
        );
        assert_ne!(with, without);
    }
}
