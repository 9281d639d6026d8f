//! Script parsing and structural predicates

use crate::opcodes::*;
use crate::types::ByteString;

/// Decode the next opcode starting at `*pc`, advancing the cursor. Push
/// opcodes return their operand. Returns `None` if the cursor is at the end
/// of the script or a push operand overruns the script (a malformed push).
pub fn get_op(script: &[u8], pc: &mut usize) -> Option<(u8, ByteString)> {
    if *pc >= script.len() {
        return None;
    }
    let opcode = script[*pc];
    *pc += 1;

    if opcode > OP_PUSHDATA4 {
        return Some((opcode, Vec::new()));
    }

    let size = if opcode < OP_PUSHDATA1 {
        opcode as usize
    } else if opcode == OP_PUSHDATA1 {
        if script.len() - *pc < 1 {
            return None;
        }
        let n = script[*pc] as usize;
        *pc += 1;
        n
    } else if opcode == OP_PUSHDATA2 {
        if script.len() - *pc < 2 {
            return None;
        }
        let n = u16::from_le_bytes([script[*pc], script[*pc + 1]]) as usize;
        *pc += 2;
        n
    } else {
        if script.len() - *pc < 4 {
            return None;
        }
        let n = u32::from_le_bytes([
            script[*pc],
            script[*pc + 1],
            script[*pc + 2],
            script[*pc + 3],
        ]) as usize;
        *pc += 4;
        n
    };

    if script.len() - *pc < size {
        return None;
    }
    let data = script[*pc..*pc + size].to_vec();
    *pc += size;
    Some((opcode, data))
}

/// Boolean interpretation of a stack element: false iff every byte is zero,
/// treating negative zero (trailing 0x80) as false.
pub fn cast_to_bool(vch: &[u8]) -> bool {
    for (i, &byte) in vch.iter().enumerate() {
        if byte != 0 {
            if i == vch.len() - 1 && byte == 0x80 {
                return false;
            }
            return true;
        }
    }
    false
}

/// Whether `opcode` is the unique shortest encoding for pushing `data`.
pub fn check_minimal_push(data: &[u8], opcode: u8) -> bool {
    if data.is_empty() {
        // Could have used OP_0.
        opcode == OP_0
    } else if data.len() == 1 && data[0] >= 1 && data[0] <= 16 {
        // Could have used OP_1 .. OP_16.
        opcode == OP_1 + (data[0] - 1)
    } else if data.len() == 1 && data[0] == 0x81 {
        // Could have used OP_1NEGATE.
        opcode == OP_1NEGATE
    } else if data.len() <= 75 {
        // Could have used a direct push.
        opcode as usize == data.len()
    } else if data.len() <= 255 {
        opcode == OP_PUSHDATA1
    } else if data.len() <= 65535 {
        opcode == OP_PUSHDATA2
    } else {
        true
    }
}

/// Canonical push encoding of `data`, as produced by script builders.
pub fn push_encoding(data: &[u8]) -> ByteString {
    let mut out = Vec::with_capacity(data.len() + 5);
    if data.len() < OP_PUSHDATA1 as usize {
        out.push(data.len() as u8);
    } else if data.len() <= 0xff {
        out.push(OP_PUSHDATA1);
        out.push(data.len() as u8);
    } else if data.len() <= 0xffff {
        out.push(OP_PUSHDATA2);
        out.extend_from_slice(&(data.len() as u16).to_le_bytes());
    } else {
        out.push(OP_PUSHDATA4);
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    }
    out.extend_from_slice(data);
    out
}

/// True if every operation in the script is a push (opcodes through OP_16).
/// OP_RESERVED counts as a push here, matching the original rule.
pub fn is_push_only(script: &[u8]) -> bool {
    let mut pc = 0;
    while pc < script.len() {
        match get_op(script, &mut pc) {
            Some((opcode, _)) if opcode <= OP_16 => {}
            _ => return false,
        }
    }
    true
}

/// Fast structural test for the pay-to-script-hash pattern.
pub fn is_pay_to_script_hash(script: &[u8]) -> bool {
    script.len() == 23
        && script[0] == OP_HASH160
        && script[1] == 0x14
        && script[22] == OP_EQUAL
}

/// A witness program is a valid script consisting of one of 31 single-byte
/// version opcodes, a required 2-75 byte push (the program), an optional
/// shard-prefix specifier, and an optional 2-75 byte extension push.
/// Returns the decoded outer version and program on match.
pub fn is_witness_program(script: &[u8]) -> Option<(u8, ByteString)> {
    if script.len() < 4 || script.len() > 155 {
        return None;
    }
    // The second byte is a push between 2 and 75 bytes in length.
    if script[1] < 2 || script[1] > 75 {
        return None;
    }
    let mut pos = 2 + script[1] as usize;
    if pos > script.len() {
        return None;
    }
    if pos < script.len() {
        // Optional shard prefix: either a one-byte push of a value without
        // a special small-integer encoding, or a small-integer opcode.
        match script[pos] {
            0x01 => {
                pos += 1;
                if pos >= script.len() || script[pos] < 0x10 || script[pos] == 0x80 {
                    return None;
                }
                pos += 1;
            }
            op if op == OP_1NEGATE || (OP_1..=OP_16).contains(&op) => {
                pos += 1;
            }
            _ => {}
        }
        // Optional extension output, another 2-75 byte push.
        if pos != script.len() {
            if pos >= script.len() || script[pos] < 2 || script[pos] > 75 {
                return None;
            }
            if pos + 1 + script[pos] as usize != script.len() {
                return None;
            }
        }
    }
    // The 31 single-byte opcodes which can start a script under the legacy
    // rules, ordered by opcode, are the outer version bytes.
    let version = match script[0] {
        OP_0 => 0,
        OP_1NEGATE => 1,
        op if (OP_1..=OP_16).contains(&op) => 2 + op - OP_1,
        OP_NOP => 18,
        OP_DEPTH => 19,
        OP_CODESEPARATOR => 20,
        op if (OP_NOP1..=OP_NOP10).contains(&op) => 21 + op - OP_NOP1,
        _ => return None,
    };
    Some((version, script[2..2 + script[1] as usize].to_vec()))
}

/// Remove every occurrence of `pattern` that begins at an opcode boundary.
/// Used to strip signature pushes out of the script code under legacy
/// sighash rules. Returns the rewritten script and the occurrence count.
pub fn find_and_delete(script: &[u8], pattern: &[u8]) -> (ByteString, usize) {
    if pattern.is_empty() {
        return (script.to_vec(), 0);
    }
    let mut result = Vec::with_capacity(script.len());
    let mut found = 0;
    let mut pc = 0;
    let mut copied_to = 0;
    loop {
        result.extend_from_slice(&script[copied_to..pc]);
        while script.len() - pc >= pattern.len() && script[pc..pc + pattern.len()] == *pattern {
            pc += pattern.len();
            found += 1;
        }
        copied_to = pc;
        if get_op(script, &mut pc).is_none() {
            break;
        }
    }
    if found > 0 {
        result.extend_from_slice(&script[copied_to..]);
        (result, found)
    } else {
        (script.to_vec(), 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_op_direct_push() {
        let script = vec![0x02, 0xaa, 0xbb, OP_DUP];
        let mut pc = 0;
        assert_eq!(get_op(&script, &mut pc), Some((0x02, vec![0xaa, 0xbb])));
        assert_eq!(get_op(&script, &mut pc), Some((OP_DUP, vec![])));
        assert_eq!(get_op(&script, &mut pc), None);
    }

    #[test]
    fn test_get_op_pushdata() {
        let mut script = vec![OP_PUSHDATA1, 3, 1, 2, 3];
        let mut pc = 0;
        assert_eq!(get_op(&script, &mut pc), Some((OP_PUSHDATA1, vec![1, 2, 3])));

        script = vec![OP_PUSHDATA2, 2, 0, 9, 8];
        pc = 0;
        assert_eq!(get_op(&script, &mut pc), Some((OP_PUSHDATA2, vec![9, 8])));
    }

    #[test]
    fn test_get_op_truncated_push() {
        let script = vec![0x05, 0x01];
        let mut pc = 0;
        assert_eq!(get_op(&script, &mut pc), None);

        let script = vec![OP_PUSHDATA1];
        pc = 0;
        assert_eq!(get_op(&script, &mut pc), None);
    }

    #[test]
    fn test_cast_to_bool() {
        assert!(!cast_to_bool(&[]));
        assert!(!cast_to_bool(&[0x00]));
        assert!(!cast_to_bool(&[0x00, 0x00]));
        assert!(!cast_to_bool(&[0x80]));
        assert!(!cast_to_bool(&[0x00, 0x80]));
        assert!(cast_to_bool(&[0x01]));
        assert!(cast_to_bool(&[0x80, 0x00]));
    }

    #[test]
    fn test_check_minimal_push_boundaries() {
        assert!(check_minimal_push(&[], OP_0));
        assert!(!check_minimal_push(&[], 0x01));

        assert!(check_minimal_push(&[1], OP_1));
        assert!(check_minimal_push(&[16], OP_16));
        assert!(!check_minimal_push(&[16], 0x01));
        assert!(check_minimal_push(&[0x81], OP_1NEGATE));

        // 17 has no small-integer opcode; a direct push is minimal.
        assert!(check_minimal_push(&[17], 0x01));

        let d75 = vec![0xcc; 75];
        assert!(check_minimal_push(&d75, 75));
        assert!(!check_minimal_push(&d75, OP_PUSHDATA1));

        let d76 = vec![0xcc; 76];
        assert!(check_minimal_push(&d76, OP_PUSHDATA1));
        assert!(!check_minimal_push(&d76, OP_PUSHDATA2));

        let d255 = vec![0xcc; 255];
        assert!(check_minimal_push(&d255, OP_PUSHDATA1));
        let d256 = vec![0xcc; 256];
        assert!(check_minimal_push(&d256, OP_PUSHDATA2));
        assert!(!check_minimal_push(&d256, OP_PUSHDATA1));
        let d65535 = vec![0xcc; 65535];
        assert!(check_minimal_push(&d65535, OP_PUSHDATA2));
        let d65536 = vec![0xcc; 65536];
        assert!(check_minimal_push(&d65536, OP_PUSHDATA4));
        // Anything goes above 65535 bytes.
        assert!(check_minimal_push(&d65536, OP_PUSHDATA2));
    }

    #[test]
    fn test_push_encoding_round_trip() {
        for size in [0usize, 1, 75, 76, 255, 256, 65535] {
            let data = vec![0xab; size];
            let encoded = push_encoding(&data);
            let mut pc = 0;
            let (_, decoded) = get_op(&encoded, &mut pc).unwrap();
            assert_eq!(decoded, data);
            assert_eq!(pc, encoded.len());
        }
    }

    #[test]
    fn test_is_push_only() {
        assert!(is_push_only(&[]));
        assert!(is_push_only(&[OP_0, 0x01, 0xaa, OP_16, OP_RESERVED]));
        assert!(!is_push_only(&[OP_DUP]));
        assert!(!is_push_only(&[0x02, 0xaa])); // truncated push
    }

    #[test]
    fn test_is_pay_to_script_hash() {
        let mut script = vec![OP_HASH160, 0x14];
        script.extend_from_slice(&[0u8; 20]);
        script.push(OP_EQUAL);
        assert!(is_pay_to_script_hash(&script));
        script.push(OP_NOP);
        assert!(!is_pay_to_script_hash(&script));
    }

    #[test]
    fn test_is_witness_program_v0() {
        let mut script = vec![OP_0, 32];
        script.extend_from_slice(&[0x11u8; 32]);
        let (version, program) = is_witness_program(&script).unwrap();
        assert_eq!(version, 0);
        assert_eq!(program, vec![0x11u8; 32]);

        let mut short = vec![OP_0, 20];
        short.extend_from_slice(&[0x22u8; 20]);
        assert_eq!(is_witness_program(&short).unwrap().0, 0);
    }

    #[test]
    fn test_is_witness_program_versions() {
        let mut script = vec![OP_1NEGATE, 2, 0xaa, 0xbb];
        assert_eq!(is_witness_program(&script).unwrap().0, 1);
        script[0] = OP_1;
        assert_eq!(is_witness_program(&script).unwrap().0, 2);
        script[0] = OP_16;
        assert_eq!(is_witness_program(&script).unwrap().0, 17);
        script[0] = OP_NOP;
        assert_eq!(is_witness_program(&script).unwrap().0, 18);
        script[0] = OP_MERKLEBRANCHVERIFY;
        assert_eq!(is_witness_program(&script).unwrap().0, 24);
        script[0] = OP_DUP;
        assert!(is_witness_program(&script).is_none());
    }

    #[test]
    fn test_is_witness_program_rejects_bad_shapes() {
        // Push length below minimum.
        assert!(is_witness_program(&[OP_0, 1, 0xaa, OP_NOP]).is_none());
        // Trailing byte that is not a valid extension push.
        let mut script = vec![OP_0, 2, 0xaa, 0xbb, OP_DUP];
        assert!(is_witness_program(&script).is_none());
        // Valid extension output.
        script = vec![OP_0, 2, 0xaa, 0xbb, 2, 0xcc, 0xdd];
        assert!(is_witness_program(&script).is_some());
        // Shard prefix as a small integer, then extension.
        script = vec![OP_0, 2, 0xaa, 0xbb, OP_5, 2, 0xcc, 0xdd];
        assert!(is_witness_program(&script).is_some());
    }

    #[test]
    fn test_find_and_delete() {
        // Pattern at an opcode boundary is removed.
        let sig_push = push_encoding(&[0x30, 0x01, 0x02]);
        let mut script = sig_push.clone();
        script.push(OP_CHECKSIG);
        let (result, found) = find_and_delete(&script, &sig_push);
        assert_eq!(found, 1);
        assert_eq!(result, vec![OP_CHECKSIG]);

        // Pattern embedded inside a push operand is untouched.
        let outer = push_encoding(&sig_push);
        let (result, found) = find_and_delete(&outer, &sig_push);
        assert_eq!(found, 0);
        assert_eq!(result, outer);

        // Repeated occurrences all removed.
        let mut doubled = sig_push.clone();
        doubled.extend_from_slice(&sig_push);
        doubled.push(OP_DUP);
        let (result, found) = find_and_delete(&doubled, &sig_push);
        assert_eq!(found, 2);
        assert_eq!(result, vec![OP_DUP]);
    }
}
