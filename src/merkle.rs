//! Merkle root and branch computation
//!
//! Three related tree constructions share one constant-space algorithm:
//!
//! - The legacy (mutable) tree duplicates the last entry of any odd-length
//!   level, which is why callers must watch the `mutated` output
//!   (CVE-2012-2459: duplicating trailing leaves leaves the root unchanged).
//! - The fast tree promotes a lone entry to its parent unchanged and combines
//!   siblings with a single SHA-256 compression round from a fixed midstate,
//!   so every leaf has a unique (branch, path) proof.
//! - The stable tree hashes like the legacy tree but describes proofs with an
//!   explicit (path, mask) pair so a branch never contains duplicated hashes.

use sha2::compress256;
use sha2::digest::generic_array::GenericArray;
use sha2::{Digest, Sha256};

use crate::types::Hash;

/// SHA-256 midstate after compressing one block consisting of the SHA-256
/// digest of the empty string, twice. Domain-separates fast-tree nodes from
/// plain SHA-256 data hashes.
const MIDSTATE_IV: [u32; 8] = [
    0x1e4e0f95, 0x5a4bc81c, 0x08c8af1c, 0x94f34b9d, 0x0af2f450, 0xdc24a3bc, 0xef98318f, 0xaf5e2506,
];

/// Double SHA-256 of an arbitrary byte string.
pub fn double_sha256(data: &[u8]) -> Hash {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

/// Legacy inner-node combinator: double SHA-256 of the concatenated children.
pub fn combine_hash256(left: &Hash, right: &Hash) -> Hash {
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(left);
    data[32..].copy_from_slice(right);
    double_sha256(&data)
}

/// Fast-tree inner-node combinator: one compression round over the two
/// children, starting from the fixed midstate.
pub fn fast_merkle_hash(left: &Hash, right: &Hash) -> Hash {
    let mut block = [0u8; 64];
    block[..32].copy_from_slice(left);
    block[32..].copy_from_slice(right);
    let mut state = MIDSTATE_IV;
    compress256(&mut state, &[*GenericArray::from_slice(&block)]);
    let mut out = [0u8; 32];
    for (i, word) in state.iter().enumerate() {
        out[4 * i..4 * i + 4].copy_from_slice(&word.to_be_bytes());
    }
    out
}

const COMPUTATION_MUTABLE: u32 = 0x1;
const COMPUTATION_FAST: u32 = 0x2;
const COMPUTATION_STABLE: u32 = 0x4;

struct MerkleComputation {
    root: Hash,
    mutated: bool,
    branch: Vec<Hash>,
}

/// Constant-space Merkle root/branch calculator, limited to 2^32 leaves.
///
/// `inner` holds the eagerly computed subtree hashes, indexed by tree level
/// with 0 being the leaves. When `count` is 25 (binary 11001), `inner[4]` is
/// the hash of the first 16 leaves, `inner[3]` of the next 8, and `inner[0]`
/// the last leaf; other entries are stale.
fn merkle_computation(leaves: &[Hash], branchpos: Option<u32>, flags: u32) -> MerkleComputation {
    if leaves.is_empty() {
        return MerkleComputation {
            root: [0u8; 32],
            mutated: false,
            branch: Vec::new(),
        };
    }
    let is_mutable = flags & COMPUTATION_MUTABLE != 0;
    let is_stable = flags & COMPUTATION_STABLE != 0;
    let merkle_hash = if flags & COMPUTATION_FAST != 0 {
        fast_merkle_hash
    } else {
        combine_hash256
    };
    let want_branch = branchpos.is_some();

    let mut branch = Vec::new();
    let mut mutated = false;
    let mut inner = [[0u8; 32]; 32];
    // Which position in inner holds a hash that depends on the matching leaf.
    let mut matchlevel: i32 = -1;
    let mut count: u64 = 0;

    // First process all leaves into inner values.
    while (count as usize) < leaves.len() {
        let mut h = leaves[count as usize];
        let mut matchh = branchpos == Some(count as u32);
        count += 1;
        // For each low zero bit in count, an inner value existed before this
        // leaf and needs a hash to combine it.
        let mut level = 0;
        while count & (1 << level) == 0 {
            if want_branch {
                if matchh {
                    branch.push(inner[level]);
                } else if matchlevel == level as i32 {
                    branch.push(h);
                    matchh = true;
                }
            }
            mutated |= inner[level] == h;
            h = merkle_hash(&inner[level], &h);
            level += 1;
        }
        inner[level] = h;
        if matchh {
            matchlevel = level as i32;
        }
    }

    // Final sweep over the rightmost tree branch to reduce odd levels.
    let mut level = 0;
    while count & (1 << level) == 0 {
        level += 1;
    }
    let mut h = inner[level];
    let mut matchh = matchlevel == level as i32;
    while count != 1 << level {
        // h is an inner value that is not the top. The mutable tree combines
        // it with itself to produce the next level; the fast tree promotes it
        // unchanged.
        if is_mutable && !is_stable && want_branch && matchh {
            branch.push(h);
        }
        if is_mutable {
            h = merkle_hash(&h, &h);
        }
        count += 1 << level;
        level += 1;
        // Propagate the result upwards.
        while count & (1 << level) == 0 {
            if want_branch {
                if matchh {
                    branch.push(inner[level]);
                } else if matchlevel == level as i32 {
                    branch.push(h);
                    matchh = true;
                }
            }
            h = merkle_hash(&inner[level], &h);
            level += 1;
        }
    }

    MerkleComputation {
        root: h,
        mutated,
        branch,
    }
}

/// Root of the legacy duplicate-last-entry tree. The second return value is
/// true when a level ended with two identical hashes, which renders the root
/// ambiguous and must be treated as an invalid tree.
pub fn compute_merkle_root(leaves: &[Hash]) -> (Hash, bool) {
    let result = merkle_computation(leaves, None, COMPUTATION_MUTABLE);
    (result.root, result.mutated)
}

/// Sibling hashes proving membership of the leaf at `position` in the legacy
/// tree, ordered from the leaf level upwards.
pub fn compute_merkle_branch(leaves: &[Hash], position: u32) -> Vec<Hash> {
    merkle_computation(leaves, Some(position), COMPUTATION_MUTABLE).branch
}

/// Recompute the legacy root from a leaf, its branch, and its index. The
/// index bits select the side each sibling is hashed on, low bit first.
pub fn compute_merkle_root_from_branch(leaf: &Hash, branch: &[Hash], index: u32) -> Hash {
    let mut hash = *leaf;
    let mut index = index;
    for h in branch {
        if index & 1 != 0 {
            hash = combine_hash256(h, &hash);
        } else {
            hash = combine_hash256(&hash, h);
        }
        index >>= 1;
    }
    hash
}

/// Root of the fast tree. The empty tree hashes to the double SHA-256 of the
/// empty string, a value that cannot collide with any inner node.
pub fn compute_fast_merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return double_sha256(&[]);
    }
    merkle_computation(leaves, None, COMPUTATION_FAST).root
}

/// Derive the (path, mask) pair describing the position of a leaf whose
/// branch has `branchlen` hashes in a tree where it sits at `position`.
///
/// When the branch is shorter than the leaf's depth would suggest, the leaf
/// lies along the right-most path of an unbalanced tree: some ancestors had
/// no sibling. Each such level contributes no branch hash. The path is the
/// position with those bits squeezed out, and the mask records which levels
/// were skipped.
pub fn compute_merkle_path_and_mask(branchlen: usize, position: u32) -> (u32, u32) {
    // Largest possible branch length: one more than the zero-based index of
    // the highest set bit of position.
    let mut max: usize = 32;
    while max > 0 {
        if position & (1 << (max - 1)) != 0 {
            break;
        }
        max -= 1;
    }
    let mut mask: u32 = 0;
    let mut path = position;
    while max > branchlen {
        // Find the first zero bit below the most significant set bit. One
        // always exists here, else the computation would have produced more
        // branch hashes.
        let mut i: i32 = max as i32 - 1;
        while i >= 0 {
            if path & (1 << i) == 0 {
                break;
            }
            i -= 1;
        }
        if i < 0 {
            return (0, 0);
        }
        mask |= 1 << i;
        // Drop the i'th bit of path, shifting the higher bits down.
        path = ((path & !((1u32 << (i + 1)) - 1)) >> 1) | (path & ((1u32 << i) - 1));
        max -= 1;
    }
    (path, mask)
}

/// Branch and path for the leaf at `position` of the fast tree.
pub fn compute_fast_merkle_branch(leaves: &[Hash], position: u32) -> (Vec<Hash>, u32) {
    let branch = merkle_computation(leaves, Some(position), COMPUTATION_FAST).branch;
    let (path, _) = compute_merkle_path_and_mask(branch.len(), position);
    (branch, path)
}

/// Recompute the fast-tree root from a leaf and its proof. The second return
/// value is true when path bits remain after the branch is consumed, meaning
/// the proof does not describe a position in any tree of that shape.
pub fn compute_fast_merkle_root_from_branch(leaf: &Hash, branch: &[Hash], path: u32) -> (Hash, bool) {
    let mut hash = *leaf;
    let mut path = path;
    for h in branch {
        if path & 1 != 0 {
            hash = fast_merkle_hash(h, &hash);
        } else {
            hash = fast_merkle_hash(&hash, h);
        }
        path >>= 1;
    }
    (hash, path != 0)
}

/// Branch, path, and mask for the leaf at `position` of the stable tree.
pub fn compute_stable_merkle_branch(leaves: &[Hash], position: u32) -> (Vec<Hash>, u32, u32) {
    let branch = merkle_computation(
        leaves,
        Some(position),
        COMPUTATION_MUTABLE | COMPUTATION_STABLE,
    )
    .branch;
    let (path, mask) = compute_merkle_path_and_mask(branch.len(), position);
    (branch, path, mask)
}

/// Recompute the stable-tree root from a leaf and its proof. Mask bits mark
/// levels where the running hash is combined with itself instead of a branch
/// hash. Trailing mask bits are processed even after the branch runs out, so
/// the result matches the value that appears in sibling branches; this is
/// what subtree recomputation (e.g. of a block-final branch) relies on. The
/// second return value is true when unconsumed path or mask bits remain.
pub fn compute_stable_merkle_root_from_branch(
    leaf: &Hash,
    branch: &[Hash],
    path: u32,
    mask: u32,
) -> (Hash, bool) {
    let mut hash = *leaf;
    let mut path = path;
    let mut mask = mask;
    let mut iter = branch.iter();
    let mut next = iter.next();
    while let Some(h) = next {
        if mask & 1 != 0 {
            hash = combine_hash256(&hash, &hash);
        } else {
            if path & 1 != 0 {
                hash = combine_hash256(h, &hash);
            } else {
                hash = combine_hash256(&hash, h);
            }
            path >>= 1;
            next = iter.next();
        }
        mask >>= 1;
    }
    while mask & 1 != 0 {
        hash = combine_hash256(&hash, &hash);
        mask >>= 1;
    }
    (hash, path != 0 || mask != 0)
}

fn key_bit(key: &Hash, idx: usize) -> bool {
    key[31 - idx / 8] & (1 << (idx % 8)) != 0
}

/// The bits of `key` from position `begin` (exclusive of higher bits) up to
/// `end`, reversed into the low bits of the result, with a terminator bit set
/// just above them. Bit positions count down from the most significant end of
/// the key.
fn calc_bits(key: &Hash, begin: usize, end: usize) -> Hash {
    let mut ret = [0u8; 32];
    for idx in begin..end {
        let src = 255 - idx;
        let dst = end - idx - 1;
        if key_bit(key, src) {
            ret[31 - dst / 8] |= 1 << (dst % 8);
        }
    }
    ret[31 - (end - begin) / 8] |= 1 << ((end - begin) % 8);
    ret
}

/// The low `256 - used` bits of `key`, the portion not yet consumed by inner
/// nodes above the leaf.
fn calc_remainder(key: &Hash, used: usize) -> Hash {
    if used == 0 {
        return *key;
    }
    let mut ret = [0u8; 32];
    for idx in 0..(256 - used) {
        if key_bit(key, idx) {
            ret[31 - idx / 8] |= 1 << (idx % 8);
        }
    }
    ret
}

/// Recompute the root of a binary-prefix-tree commitment (a Merkle map) from
/// a value, its key, and a branch of (skipped-bit-count, sibling) pairs
/// ordered from the leaf upwards. The second return value is true when the
/// branch consumes 256 or more key bits, which no key can satisfy.
pub fn compute_merkle_map_root_from_branch(
    value: &Hash,
    branch: &[(u8, Hash)],
    key: &Hash,
) -> (Hash, bool) {
    let mut total: usize = 0;
    for (skip, _) in branch {
        total += 1 + *skip as usize;
    }
    if total >= 256 {
        return ([0u8; 32], true);
    }

    let mut hash = fast_merkle_hash(&calc_remainder(key, total), value);
    for (skip, sibling) in branch {
        total -= 1;
        let begin = total - *skip as usize;
        let end = total;
        if key_bit(key, end) {
            hash = fast_merkle_hash(sibling, &hash);
        } else {
            hash = fast_merkle_hash(&hash, sibling);
        }
        hash = fast_merkle_hash(&calc_bits(key, begin, end), &hash);
    }
    (hash, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(n: u8) -> Hash {
        let mut h = [0u8; 32];
        h[0] = n;
        h[31] = n.wrapping_mul(7);
        h
    }

    fn leaves(n: u8) -> Vec<Hash> {
        (0..n).map(leaf).collect()
    }

    #[test]
    fn test_empty_and_single_roots() {
        assert_eq!(compute_merkle_root(&[]), ([0u8; 32], false));
        assert_eq!(compute_fast_merkle_root(&[]), double_sha256(&[]));
        // A single leaf is its own root in every construction.
        let l = leaf(1);
        assert_eq!(compute_merkle_root(&[l]), (l, false));
        assert_eq!(compute_fast_merkle_root(&[l]), l);
    }

    #[test]
    fn test_midstate_combinator_pinned_vector() {
        // fast_merkle_hash(dSHA256("left"), dSHA256("right")), computed with
        // an independent SHA-256 compression implementation.
        let expected: Hash = [
            0xfd, 0xc7, 0x7f, 0x74, 0x1f, 0x02, 0x21, 0x41,
            0x18, 0xa9, 0xe7, 0xab, 0x34, 0x34, 0xa4, 0x45,
            0x0e, 0x9b, 0x34, 0xdf, 0x04, 0x7c, 0xfb, 0x6b,
            0xe8, 0xa2, 0xf8, 0xda, 0x70, 0x55, 0x04, 0xf3,
        ];
        assert_eq!(
            fast_merkle_hash(&double_sha256(b"left"), &double_sha256(b"right")),
            expected
        );
    }

    #[test]
    fn test_two_leaf_roots() {
        let (a, b) = (leaf(1), leaf(2));
        assert_eq!(compute_merkle_root(&[a, b]).0, combine_hash256(&a, &b));
        assert_eq!(compute_fast_merkle_root(&[a, b]), fast_merkle_hash(&a, &b));
    }

    #[test]
    fn test_odd_level_handling_differs() {
        let (a, b, c) = (leaf(1), leaf(2), leaf(3));
        // Legacy: the lone third leaf is paired with itself.
        let expected = combine_hash256(&combine_hash256(&a, &b), &combine_hash256(&c, &c));
        assert_eq!(compute_merkle_root(&[a, b, c]).0, expected);
        // Fast: the lone third leaf is promoted unchanged.
        let expected = fast_merkle_hash(&fast_merkle_hash(&a, &b), &c);
        assert_eq!(compute_fast_merkle_root(&[a, b, c]), expected);
    }

    #[test]
    fn test_five_leaf_fast_root() {
        let v = leaves(5);
        let left = fast_merkle_hash(
            &fast_merkle_hash(&v[0], &v[1]),
            &fast_merkle_hash(&v[2], &v[3]),
        );
        assert_eq!(compute_fast_merkle_root(&v), fast_merkle_hash(&left, &v[4]));
    }

    #[test]
    fn test_mutation_detected() {
        let (a, b) = (leaf(1), leaf(2));
        assert!(!compute_merkle_root(&[a, b]).1);
        assert!(compute_merkle_root(&[a, a]).1);
        // A repeated pair collapses to equal inner nodes one level up, which
        // the computation flags just like duplicated leaves.
        assert!(compute_merkle_root(&[a, b, a, b]).1);

        // Duplicating the trailing pair of a six-leaf list coincides with the
        // odd-level padding, so the root is unchanged but the flag is raised.
        let v = leaves(6);
        let (root, mutated) = compute_merkle_root(&v);
        assert!(!mutated);
        let mut dup = v.clone();
        dup.extend_from_slice(&v[4..6]);
        let (dup_root, dup_mutated) = compute_merkle_root(&dup);
        assert_eq!(dup_root, root);
        assert!(dup_mutated);
    }

    #[test]
    fn test_legacy_branch_round_trip() {
        for n in 1..=11u8 {
            let v = leaves(n);
            let root = compute_merkle_root(&v).0;
            for pos in 0..n as u32 {
                let branch = compute_merkle_branch(&v, pos);
                let got = compute_merkle_root_from_branch(&v[pos as usize], &branch, pos);
                assert_eq!(got, root, "{} leaves, position {}", n, pos);
            }
        }
    }

    #[test]
    fn test_fast_branch_round_trip() {
        for n in 1..=11u8 {
            let v = leaves(n);
            let root = compute_fast_merkle_root(&v);
            for pos in 0..n as u32 {
                let (branch, path) = compute_fast_merkle_branch(&v, pos);
                let (got, invalid) =
                    compute_fast_merkle_root_from_branch(&v[pos as usize], &branch, path);
                assert!(!invalid);
                assert_eq!(got, root, "{} leaves, position {}", n, pos);
            }
        }
    }

    #[test]
    fn test_fast_branch_unbalanced_shape() {
        // Seven leaves: the last leaf sits at depth 3 on the left view but
        // its subtree on the right is thinner; position bits above the
        // branch length must be squeezed out of the path.
        let v = leaves(7);
        let (branch, path) = compute_fast_merkle_branch(&v, 6);
        assert_eq!(branch.len(), 2);
        assert_eq!(path, 3);
        // Five leaves, last position: lone leaf promoted twice.
        let v = leaves(5);
        let (branch, path) = compute_fast_merkle_branch(&v, 4);
        assert_eq!(branch.len(), 1);
        assert_eq!(path, 1);
    }

    #[test]
    fn test_fast_root_from_branch_leftover_path_invalid() {
        let l = leaf(1);
        let (_, invalid) = compute_fast_merkle_root_from_branch(&l, &[leaf(2)], 0b10);
        assert!(invalid);
    }

    #[test]
    fn test_stable_branch_round_trip() {
        for n in 1..=11u8 {
            let v = leaves(n);
            let root = compute_merkle_root(&v).0;
            for pos in 0..n as u32 {
                let (branch, path, mask) = compute_stable_merkle_branch(&v, pos);
                let (got, mutated) = compute_stable_merkle_root_from_branch(
                    &v[pos as usize],
                    &branch,
                    path,
                    mask,
                );
                assert!(!mutated);
                assert_eq!(got, root, "{} leaves, position {}", n, pos);
            }
        }
    }

    #[test]
    fn test_stable_branch_has_no_duplicates() {
        // Position 2 of a 3-leaf tree: the legacy branch duplicates the leaf
        // hash (self-pairing); the stable branch encodes it in the mask.
        let v = leaves(3);
        let legacy = compute_merkle_branch(&v, 2);
        assert_eq!(legacy.len(), 2);
        assert_eq!(legacy[0], v[2]);
        let (branch, path, mask) = compute_stable_merkle_branch(&v, 2);
        assert_eq!(branch.len(), 1);
        assert_eq!(path, 1);
        assert_eq!(mask, 1);
    }

    #[test]
    fn test_path_and_mask_balanced() {
        assert_eq!(compute_merkle_path_and_mask(3, 5), (5, 0));
        assert_eq!(compute_merkle_path_and_mask(2, 3), (3, 0));
    }

    #[test]
    fn test_merkle_map_empty_branch() {
        let value = leaf(9);
        let key = leaf(5);
        let (root, invalid) = compute_merkle_map_root_from_branch(&value, &[], &key);
        assert!(!invalid);
        assert_eq!(root, fast_merkle_hash(&key, &value));
    }

    #[test]
    fn test_merkle_map_overlong_branch_invalid() {
        let branch = vec![(255u8, leaf(1)), (255u8, leaf(2))];
        let (_, invalid) = compute_merkle_map_root_from_branch(&leaf(0), &branch, &leaf(3));
        assert!(invalid);
    }
}
