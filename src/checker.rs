//! Signature and lock-time checkers
//!
//! The interpreter calls back through the `SignatureChecker` trait whenever
//! an opcode needs transaction context: CHECKSIG needs the signature digest,
//! CHECKLOCKTIMEVERIFY and CHECKSEQUENCEVERIFY need the lock fields. Keeping
//! the context behind a trait lets scripts be evaluated without any
//! transaction at all (e.g. for static analysis), failing every such check.

use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1};

use crate::constants::{
    LOCKTIME_THRESHOLD, SEQUENCE_FINAL, SEQUENCE_LOCKTIME_DISABLE_FLAG, SEQUENCE_LOCKTIME_MASK,
    SEQUENCE_LOCKTIME_TYPE_FLAG, SIGHASH_NO_LOCK_HEIGHT,
};
use crate::sighash::{signature_hash, PrecomputedTransactionData, SigVersion};
use crate::types::{Amount, Transaction};

pub trait SignatureChecker {
    fn check_sig(
        &self,
        _sig: &[u8],
        _pubkey: &[u8],
        _script_code: &[u8],
        _sigversion: SigVersion,
    ) -> bool {
        false
    }

    fn check_lock_time(&self, _lock_time: i64) -> bool {
        false
    }

    fn check_sequence(&self, _sequence: i64) -> bool {
        false
    }
}

/// A checker with no transaction context. Every check fails.
pub struct BaseSignatureChecker;

impl SignatureChecker for BaseSignatureChecker {}

/// Checker bound to one input of a transaction and the coin it spends.
pub struct TransactionSignatureChecker<'a> {
    tx: &'a Transaction,
    input_index: usize,
    amount: Amount,
    refheight: i64,
    no_lock_height: bool,
    txdata: Option<&'a PrecomputedTransactionData>,
}

impl<'a> TransactionSignatureChecker<'a> {
    pub fn new(
        tx: &'a Transaction,
        input_index: usize,
        amount: Amount,
        refheight: i64,
        no_lock_height: bool,
    ) -> Self {
        TransactionSignatureChecker {
            tx,
            input_index,
            amount,
            refheight,
            no_lock_height,
            txdata: None,
        }
    }

    pub fn with_cache(
        tx: &'a Transaction,
        input_index: usize,
        amount: Amount,
        refheight: i64,
        no_lock_height: bool,
        txdata: &'a PrecomputedTransactionData,
    ) -> Self {
        TransactionSignatureChecker {
            tx,
            input_index,
            amount,
            refheight,
            no_lock_height,
            txdata: Some(txdata),
        }
    }
}

/// Parse a signature in relaxed DER: sloppy length encodings and redundant
/// integer padding are tolerated. Values too wide for the curve order, or
/// byte strings that do not even resemble a DER sequence, yield `None`.
fn parse_signature_lax(input: &[u8]) -> Option<Signature> {
    let mut pos = 0usize;

    if input.get(pos) != Some(&0x30) {
        return None;
    }
    pos += 1;
    // The sequence length is not validated, only skipped over.
    let mut lenbyte = *input.get(pos)? as usize;
    pos += 1;
    if lenbyte & 0x80 != 0 {
        lenbyte -= 0x80;
        if lenbyte > input.len() - pos {
            return None;
        }
        pos += lenbyte;
    }

    let (rpos, rlen) = read_lax_integer(input, &mut pos)?;
    let (spos, slen) = read_lax_integer(input, &mut pos)?;
    if rlen > 32 || slen > 32 {
        return None;
    }

    let mut compact = [0u8; 64];
    compact[32 - rlen..32].copy_from_slice(&input[rpos..rpos + rlen]);
    compact[64 - slen..64].copy_from_slice(&input[spos..spos + slen]);
    Signature::from_compact(&compact).ok()
}

/// Read one DER integer leniently, returning the offset and length of its
/// value with leading zero bytes stripped.
fn read_lax_integer(input: &[u8], pos: &mut usize) -> Option<(usize, usize)> {
    if input.get(*pos) != Some(&0x02) {
        return None;
    }
    *pos += 1;

    let mut lenbyte = *input.get(*pos)? as usize;
    *pos += 1;
    let mut len = lenbyte;
    if lenbyte & 0x80 != 0 {
        lenbyte -= 0x80;
        if lenbyte > input.len() - *pos {
            return None;
        }
        while lenbyte > 0 && input[*pos] == 0 {
            *pos += 1;
            lenbyte -= 1;
        }
        if lenbyte >= core::mem::size_of::<usize>() {
            return None;
        }
        len = 0;
        while lenbyte > 0 {
            len = (len << 8) + input[*pos] as usize;
            *pos += 1;
            lenbyte -= 1;
        }
    }
    if len > input.len() - *pos {
        return None;
    }

    let mut start = *pos;
    *pos += len;
    while len > 0 && input[start] == 0 {
        start += 1;
        len -= 1;
    }
    Some((start, len))
}

impl SignatureChecker for TransactionSignatureChecker<'_> {
    fn check_sig(
        &self,
        sig: &[u8],
        pubkey: &[u8],
        script_code: &[u8],
        sigversion: SigVersion,
    ) -> bool {
        let pubkey = match PublicKey::from_slice(pubkey) {
            Ok(pk) => pk,
            Err(_) => return false,
        };

        // Hash type is one byte tacked on to the end of the signature.
        let (hash_type, sig) = match sig.split_last() {
            Some((last, rest)) => (*last as u32, rest),
            None => return false,
        };
        // In bitcoin compatibility mode the lock_height field must be left
        // out of the digest; signal it through the hash type.
        let hash_type = if self.no_lock_height {
            hash_type | SIGHASH_NO_LOCK_HEIGHT
        } else {
            hash_type
        };

        let digest = signature_hash(
            script_code,
            self.tx,
            self.input_index,
            hash_type,
            self.amount,
            self.refheight,
            sigversion,
            self.txdata,
        );
        let message = match Message::from_digest_slice(&digest) {
            Ok(m) => m,
            Err(_) => return false,
        };
        // Strict encoding is enforced by the interpreter's signature gates
        // when the relevant flags are set; the checker itself accepts the
        // relaxed DER historically seen on the network.
        let mut signature = match parse_signature_lax(sig) {
            Some(s) => s,
            None => return false,
        };
        // High-S signatures are valid unless the LOW_S policy rejects them
        // earlier; the backend only accepts normalized signatures.
        signature.normalize_s();

        let secp = Secp256k1::new();
        secp.verify_ecdsa(&message, &signature, &pubkey).is_ok()
    }

    fn check_lock_time(&self, lock_time: i64) -> bool {
        // There are two kinds of nLockTime: lock-by-blockheight and
        // lock-by-blocktime, distinguished by the threshold. The operand
        // must be of the same kind as the transaction's lock time for the
        // numeric comparison to mean anything.
        let tx_lock_time = self.tx.lock_time as i64;
        if !((tx_lock_time < LOCKTIME_THRESHOLD && lock_time < LOCKTIME_THRESHOLD)
            || (tx_lock_time >= LOCKTIME_THRESHOLD && lock_time >= LOCKTIME_THRESHOLD))
        {
            return false;
        }

        if lock_time > tx_lock_time {
            return false;
        }

        // The nLockTime feature is disabled when the input is final, which
        // would let the transaction into a block regardless. Testing this
        // input alone is sufficient to prevent that bypass.
        if self.tx.inputs[self.input_index].sequence == SEQUENCE_FINAL {
            return false;
        }

        true
    }

    fn check_sequence(&self, sequence: i64) -> bool {
        let tx_sequence = self.tx.inputs[self.input_index].sequence as i64;

        // Sequence numbers with the disable bit set are not consensus
        // constrained and cannot satisfy a relative lock.
        if tx_sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG as i64 != 0 {
            return false;
        }

        // Mask off the bits without consensus-enforced meaning before
        // comparing.
        let mask = (SEQUENCE_LOCKTIME_TYPE_FLAG | SEQUENCE_LOCKTIME_MASK) as i64;
        let tx_sequence_masked = tx_sequence & mask;
        let sequence_masked = sequence & mask;

        // Height-based and time-based relative locks are distinguished by
        // the type flag; the operand must match the input's kind.
        let type_flag = SEQUENCE_LOCKTIME_TYPE_FLAG as i64;
        if !((tx_sequence_masked < type_flag && sequence_masked < type_flag)
            || (tx_sequence_masked >= type_flag && sequence_masked >= type_flag))
        {
            return false;
        }

        if sequence_masked > tx_sequence_masked {
            return false;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OutPoint, TxIn, TxOut};
    use secp256k1::SecretKey;

    fn tx_with(sequence: u32, lock_time: u32) -> Transaction {
        Transaction {
            version: 2,
            inputs: vec![TxIn {
                prevout: OutPoint {
                    hash: [0x33; 32],
                    index: 0,
                },
                script_sig: Vec::new(),
                sequence,
            }],
            outputs: vec![TxOut {
                value: 1000,
                script_pubkey: Vec::new(),
            }],
            witness: Vec::new(),
            lock_time,
            lock_height: 0,
        }
    }

    #[test]
    fn test_base_checker_fails_everything() {
        let checker = BaseSignatureChecker;
        assert!(!checker.check_sig(&[1], &[2], &[], SigVersion::Base));
        assert!(!checker.check_lock_time(0));
        assert!(!checker.check_sequence(0));
    }

    #[test]
    fn test_lock_time_by_height() {
        let tx = tx_with(0xfffffffe, 100);
        let checker = TransactionSignatureChecker::new(&tx, 0, 0, 0, false);
        assert!(checker.check_lock_time(100));
        assert!(checker.check_lock_time(50));
        assert!(!checker.check_lock_time(101));
        // Time-based operand against a height-based lock is a type mismatch.
        assert!(!checker.check_lock_time(LOCKTIME_THRESHOLD));
    }

    #[test]
    fn test_lock_time_final_input_bypasses() {
        let tx = tx_with(SEQUENCE_FINAL, 100);
        let checker = TransactionSignatureChecker::new(&tx, 0, 0, 0, false);
        assert!(!checker.check_lock_time(50));
    }

    #[test]
    fn test_sequence_by_height() {
        let tx = tx_with(10, 0);
        let checker = TransactionSignatureChecker::new(&tx, 0, 0, 0, false);
        assert!(checker.check_sequence(10));
        assert!(checker.check_sequence(5));
        assert!(!checker.check_sequence(11));
        // Time-based operand against a height-based input sequence.
        assert!(!checker.check_sequence(SEQUENCE_LOCKTIME_TYPE_FLAG as i64 | 5));
    }

    #[test]
    fn test_sequence_disable_flag() {
        let tx = tx_with(SEQUENCE_LOCKTIME_DISABLE_FLAG | 10, 0);
        let checker = TransactionSignatureChecker::new(&tx, 0, 0, 0, false);
        assert!(!checker.check_sequence(5));
    }

    #[test]
    fn test_sequence_masks_high_bits() {
        // Bits between the mask and the type flag carry no meaning.
        let tx = tx_with((1 << 25) | 10, 0);
        let checker = TransactionSignatureChecker::new(&tx, 0, 0, 0, false);
        assert!(checker.check_sequence(10));
        assert!(!checker.check_sequence(11));
    }

    #[test]
    fn test_check_sig_accepts_lax_der() {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[0x5a; 32]).unwrap();
        let pubkey = PublicKey::from_secret_key(&secp, &secret);
        let tx = tx_with(0xffffffff, 0);
        let checker = TransactionSignatureChecker::new(&tx, 0, 1000, 5, false);

        let script_code = vec![0xac];
        let digest = signature_hash(
            &script_code,
            &tx,
            0,
            crate::constants::SIGHASH_ALL,
            1000,
            5,
            SigVersion::Base,
            None,
        );
        let message = Message::from_digest_slice(&digest).unwrap();
        let compact = secp.sign_ecdsa(&message, &secret).serialize_compact();

        // Re-encode with redundant zero padding on both integers. Strict DER
        // parsers reject this, but signatures encoded this way exist in the
        // chain and must still verify.
        let mut lax = vec![0x30, 0x00];
        for half in [&compact[..32], &compact[32..]] {
            lax.push(0x02);
            lax.push((half.len() + 2) as u8);
            lax.extend_from_slice(&[0x00, 0x00]);
            lax.extend_from_slice(half);
        }
        lax[1] = (lax.len() - 2) as u8;
        assert!(Signature::from_der(&lax).is_err());

        lax.push(crate::constants::SIGHASH_ALL as u8);
        assert!(checker.check_sig(&lax, &pubkey.serialize(), &script_code, SigVersion::Base));

        // Byte strings that are not even lax DER still fail cleanly.
        assert!(!checker.check_sig(
            &[0x31, 0x00, 0x01],
            &pubkey.serialize(),
            &script_code,
            SigVersion::Base
        ));
    }

    #[test]
    fn test_check_sig_round_trip() {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[0x42; 32]).unwrap();
        let pubkey = PublicKey::from_secret_key(&secp, &secret);
        let tx = tx_with(0xffffffff, 0);
        let checker = TransactionSignatureChecker::new(&tx, 0, 1000, 5, false);

        let script_code = vec![0xac];
        let digest = signature_hash(
            &script_code,
            &tx,
            0,
            crate::constants::SIGHASH_ALL,
            1000,
            5,
            SigVersion::WitnessV0,
            None,
        );
        let message = Message::from_digest_slice(&digest).unwrap();
        let mut sig = secp.sign_ecdsa(&message, &secret).serialize_der().to_vec();
        sig.push(crate::constants::SIGHASH_ALL as u8);

        assert!(checker.check_sig(
            &sig,
            &pubkey.serialize(),
            &script_code,
            SigVersion::WitnessV0
        ));
        // A flipped digest input must not verify.
        let mut bad = sig.clone();
        let last = bad.len() - 1;
        bad[last] = crate::constants::SIGHASH_NONE as u8;
        assert!(!checker.check_sig(
            &bad,
            &pubkey.serialize(),
            &script_code,
            SigVersion::WitnessV0
        ));
        // Empty signature fails outright.
        assert!(!checker.check_sig(&[], &pubkey.serialize(), &script_code, SigVersion::Base));
    }
}
