//! Consensus constants for script evaluation and signature hashing

/// Maximum script length in bytes (legacy rules only)
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Maximum size of a single pushed stack element (legacy rules only)
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Maximum number of non-push opcodes per script (legacy rules only)
pub const MAX_OPS_PER_SCRIPT: usize = 201;

/// Maximum combined stack + altstack depth (legacy rules only)
pub const MAX_STACK_SIZE: usize = 1000;

/// Hard ceiling on combined stack depth, applied under every rule set
pub const MAX_WITNESS_STACK_SIZE: usize = 32_767;

/// Maximum number of public keys in a CHECKMULTISIG
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;

/// Lock times below this are block heights; at or above, unix timestamps
pub const LOCKTIME_THRESHOLD: i64 = 500_000_000;

/// Sequence number that finalizes an input and disables nLockTime
pub const SEQUENCE_FINAL: u32 = 0xffffffff;

/// If set, the input's sequence number carries no relative-lock meaning
pub const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;

/// If set, the relative lock time is time-based rather than height-based
pub const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;

/// Mask extracting the relative lock time value from a sequence number
pub const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000ffff;

// Signature hash types
pub const SIGHASH_ALL: u32 = 1;
pub const SIGHASH_NONE: u32 = 2;
pub const SIGHASH_SINGLE: u32 = 3;
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;
/// Compatibility shim: omit lock_height/refheight from the digest. Used only
/// to validate signatures imported from bitcoin-format test vectors.
pub const SIGHASH_NO_LOCK_HEIGHT: u32 = 0x100;

// Script verification flags. Each bit is an independently activated rule.
pub const VERIFY_NONE: u32 = 0;
pub const VERIFY_P2SH: u32 = 1 << 0;
pub const VERIFY_STRICTENC: u32 = 1 << 1;
pub const VERIFY_DERSIG: u32 = 1 << 2;
pub const VERIFY_LOW_S: u32 = 1 << 3;
pub const VERIFY_SIGPUSHONLY: u32 = 1 << 5;
pub const VERIFY_MINIMALDATA: u32 = 1 << 6;
pub const VERIFY_DISCOURAGE_UPGRADABLE_NOPS: u32 = 1 << 7;
pub const VERIFY_CLEANSTACK: u32 = 1 << 8;
pub const VERIFY_WITNESS: u32 = 1 << 11;
pub const VERIFY_DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM: u32 = 1 << 12;
pub const VERIFY_NULLFAIL: u32 = 1 << 14;
pub const VERIFY_WITNESS_PUBKEYTYPE: u32 = 1 << 15;
pub const VERIFY_MULTISIG_HINT: u32 = 1 << 16;
/// Scheduled protocol-cleanup fork: lifts legacy size limits and retires
/// unused opcodes to the future-opcode pool.
pub const VERIFY_PROTOCOL_CLEANUP: u32 = 1 << 28;
/// Scheduled size-expansion fork (activation gating lives outside this crate).
pub const VERIFY_SIZE_EXPANSION: u32 = 1 << 29;
/// Bitcoin test-vector compatibility: signature hashes skip lock_height.
pub const VERIFY_LOCK_HEIGHT_NOT_UNDER_SIGNATURE: u32 = 1 << 30;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_bits_distinct() {
        let flags = [
            VERIFY_P2SH,
            VERIFY_STRICTENC,
            VERIFY_DERSIG,
            VERIFY_LOW_S,
            VERIFY_SIGPUSHONLY,
            VERIFY_MINIMALDATA,
            VERIFY_DISCOURAGE_UPGRADABLE_NOPS,
            VERIFY_CLEANSTACK,
            VERIFY_WITNESS,
            VERIFY_DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM,
            VERIFY_NULLFAIL,
            VERIFY_WITNESS_PUBKEYTYPE,
            VERIFY_MULTISIG_HINT,
            VERIFY_PROTOCOL_CLEANUP,
            VERIFY_SIZE_EXPANSION,
            VERIFY_LOCK_HEIGHT_NOT_UNDER_SIGNATURE,
        ];
        let mut combined = 0u32;
        for f in flags {
            assert_eq!(combined & f, 0);
            combined |= f;
        }
    }

    #[test]
    fn test_sequence_type_flag_below_disable_flag() {
        assert!(SEQUENCE_LOCKTIME_TYPE_FLAG < SEQUENCE_LOCKTIME_DISABLE_FLAG);
    }
}
