//! Pruned Merkle tree proofs
//!
//! A proof describes the shape of a partially pruned fast Merkle tree as a
//! left-to-right, depth-first list of internal nodes. Each node records the
//! state of its two links:
//!
//! - DESCEND: the link connects to another internal node that follows in the
//!   list; its hash is recomputed.
//! - VERIFY: the hash is supplied at validation time. Recomputing the root
//!   batch-confirms every VERIFY hash at once.
//! - SKIP: the hash is carried in the proof, covering a pruned subtree or an
//!   uninteresting leaf.
//!
//! The {SKIP, SKIP} combination is deliberately unrepresentable: such a node
//! would itself be prunable to a single SKIP hash in its parent, so excluding
//! it leaves exactly one encoding for any pruned view of a tree, and makes
//! the per-node state fit in 3 bits. The code assignment also preserves
//! lexicographic ordering of proofs extracted from the same tree.

use crate::error::ConsensusError;
use crate::merkle::{double_sha256, fast_merkle_hash};
use crate::types::Hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MerkleLink {
    Descend,
    Verify,
    Skip,
}

const LEFT_FROM_CODE: [MerkleLink; 8] = [
    MerkleLink::Verify,
    MerkleLink::Verify,
    MerkleLink::Verify,
    MerkleLink::Descend,
    MerkleLink::Descend,
    MerkleLink::Descend,
    MerkleLink::Skip,
    MerkleLink::Skip,
];

const RIGHT_FROM_CODE: [MerkleLink; 8] = [
    MerkleLink::Skip,
    MerkleLink::Verify,
    MerkleLink::Descend,
    MerkleLink::Skip,
    MerkleLink::Verify,
    MerkleLink::Descend,
    MerkleLink::Verify,
    MerkleLink::Descend,
];

/// One internal node of a proof, stored as its 3-bit code. Code 0 is a
/// {VERIFY, SKIP} node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct MerkleNode(u8);

impl MerkleNode {
    pub fn new(left: MerkleLink, right: MerkleLink) -> Self {
        MerkleNode(Self::encode(left, right))
    }

    pub fn from_code(code: u8) -> Self {
        MerkleNode(code & 7)
    }

    pub fn code(self) -> u8 {
        self.0
    }

    fn encode(left: MerkleLink, right: MerkleLink) -> u8 {
        let base = match left {
            MerkleLink::Descend => 5,
            MerkleLink::Verify => 2,
            MerkleLink::Skip => 7,
        };
        base - match right {
            MerkleLink::Skip => 2,
            MerkleLink::Verify => 1,
            MerkleLink::Descend => 0,
        }
    }

    pub fn left(self) -> MerkleLink {
        LEFT_FROM_CODE[self.0 as usize]
    }

    pub fn right(self) -> MerkleLink {
        RIGHT_FROM_CODE[self.0 as usize]
    }

    pub fn set_left(&mut self, left: MerkleLink) {
        self.0 = Self::encode(left, self.right());
    }

    pub fn set_right(&mut self, right: MerkleLink) {
        self.0 = Self::encode(self.left(), right);
    }
}

/// A vector of nodes in tightly packed 3-bit encoding, eight nodes per three
/// bytes:
///
/// ```text
///    -- Node index
///   /
///   00011122 23334445 55666777
///    byte 0   byte 1   byte 2
///   76543210 76543210 76543210
///                            /
///                Bit index --
/// ```
///
/// The byte length is `(3 * count + 7) / 8`, which cannot be inverted to
/// recover the node count, so the count is stored explicitly and serialized
/// ahead of the packed bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MerkleNodeVector {
    data: Vec<u8>,
    count: usize,
}

fn packed_size(count: usize) -> usize {
    (3 * count + 7) / 8
}

impl MerkleNodeVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.count = 0;
    }

    pub fn get(&self, pos: usize) -> MerkleNode {
        let base = 3 * (pos / 8);
        let b = &self.data[base..];
        let code = match pos % 8 {
            0 => b[0] >> 5,
            1 => b[0] >> 2,
            2 => (b[0] << 1) | ((b[1] >> 7) & 1),
            3 => b[1] >> 4,
            4 => b[1] >> 1,
            5 => (b[1] << 2) | ((b[2] >> 6) & 3),
            6 => b[2] >> 3,
            _ => b[2],
        };
        MerkleNode::from_code(code)
    }

    pub fn set(&mut self, pos: usize, node: MerkleNode) {
        let base = 3 * (pos / 8);
        let code = node.code();
        let b = &mut self.data[base..];
        match pos % 8 {
            0 => b[0] = (b[0] & 0x1f) | (code << 5),
            1 => b[0] = (b[0] & 0xe3) | (code << 2),
            2 => {
                b[0] = (b[0] & 0xfc) | (code >> 1);
                b[1] = (b[1] & 0x7f) | ((code & 1) << 7);
            }
            3 => b[1] = (b[1] & 0x8f) | (code << 4),
            4 => b[1] = (b[1] & 0xf1) | (code << 1),
            5 => {
                b[1] = (b[1] & 0xfe) | (code >> 2);
                b[2] = (b[2] & 0x3f) | ((code & 3) << 6);
            }
            6 => b[2] = (b[2] & 0xc7) | (code << 3),
            _ => b[2] = (b[2] & 0xf8) | code,
        }
    }

    pub fn push(&mut self, node: MerkleNode) {
        if self.data.len() < packed_size(self.count + 1) {
            self.data.push(0);
        }
        let pos = self.count;
        self.count += 1;
        self.set(pos, node);
    }

    pub fn iter(&self) -> impl Iterator<Item = MerkleNode> + '_ {
        (0..self.count).map(move |i| self.get(i))
    }

    /// The unused low bits of the final byte. A canonical encoding keeps
    /// them zero; nonzero bits mean the serialization was not unique and the
    /// proof must be rejected.
    pub fn dirty(&self) -> u8 {
        let last = match self.data.last() {
            Some(b) => *b,
            None => return 0,
        };
        match self.count % 8 {
            0 => 0,
            1 => last & 0x1f,
            2 => last & 0x03,
            3 => last & 0x7f,
            4 => last & 0x0f,
            5 => last & 0x01,
            6 => last & 0x3f,
            _ => last & 0x07,
        }
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        write_varint(out, self.count as u64);
        out.extend_from_slice(&self.data);
    }

    pub fn deserialize(data: &[u8], cursor: &mut usize) -> Result<Self, ConsensusError> {
        let count = read_varint(data, cursor)?;
        let needed = (3 * count + 7) / 8;
        let remaining = (data.len() - *cursor) as u64;
        if needed > remaining {
            return Err(ConsensusError::Serialization(
                "node vector truncated".into(),
            ));
        }
        let needed = needed as usize;
        let bytes = data[*cursor..*cursor + needed].to_vec();
        *cursor += needed;
        Ok(MerkleNodeVector {
            data: bytes,
            count: count as usize,
        })
    }
}

/// Append `n` in the prefix-free variable-length format: groups of 7 bits,
/// most significant first, with the high bit of each byte flagging a
/// continuation and continued groups biased by one. Every integer has
/// exactly one encoding.
pub fn write_varint(out: &mut Vec<u8>, n: u64) {
    let mut tmp = [0u8; 10];
    let mut len = 0;
    let mut n = n;
    loop {
        tmp[len] = (n & 0x7f) as u8 | if len > 0 { 0x80 } else { 0 };
        if n <= 0x7f {
            break;
        }
        n = (n >> 7) - 1;
        len += 1;
    }
    loop {
        out.push(tmp[len]);
        if len == 0 {
            break;
        }
        len -= 1;
    }
}

pub fn read_varint(data: &[u8], cursor: &mut usize) -> Result<u64, ConsensusError> {
    let mut n: u64 = 0;
    loop {
        if *cursor >= data.len() {
            return Err(ConsensusError::Serialization(
                "unexpected end of data in varint".into(),
            ));
        }
        let byte = data[*cursor];
        *cursor += 1;
        if n > u64::MAX >> 7 {
            return Err(ConsensusError::Serialization("varint overflow".into()));
        }
        n = (n << 7) | (byte & 0x7f) as u64;
        if byte & 0x80 != 0 {
            if n == u64::MAX {
                return Err(ConsensusError::Serialization("varint overflow".into()));
            }
            n += 1;
        } else {
            return Ok(n);
        }
    }
}

/// Depth-first traversal of a node list, driven by a visitor.
///
/// Starting with the node at index 0, the left link is passed to the visitor
/// and, if DESCEND, its subtree is processed recursively; then likewise the
/// right link. The visitor receives the link's depth (root links are at
/// depth 1), its value, and whether it is the right link; returning true
/// stops the walk.
///
/// Returns the index where traversal stopped and a flag: `(i, side)` when
/// the visitor stopped at node `i`, `(next, false)` when the subtree rooted
/// at node 0 completed with `next` being the first unvisited index, or
/// `(len, true)` when the list ran out with the subtree unfinished.
pub fn depth_first_traverse<F>(nodes: &MerkleNodeVector, mut visit: F) -> (usize, bool)
where
    F: FnMut(usize, MerkleLink, bool) -> bool,
{
    // The stack holds the path from the root to the current node, with a
    // flag for whether the right branch was the one taken.
    let mut stack: Vec<(usize, bool)> = Vec::new();

    let mut pos = 0;
    while pos < nodes.len() {
        let node = nodes.get(pos);
        if visit(stack.len() + 1, node.left(), false) {
            return (pos, false);
        }
        if node.left() == MerkleLink::Descend {
            stack.push((pos, false));
            pos += 1;
            continue;
        }

        if visit(stack.len() + 1, node.right(), true) {
            return (pos, true);
        }
        if node.right() == MerkleLink::Descend {
            stack.push((pos, true));
            pos += 1;
            continue;
        }

        // A node with no DESCEND links closes its subtree; climb the path,
        // taking the right branch of each node entered via its left.
        let mut done = false;
        while !stack.is_empty() && !done {
            let (ancestor, took_right) = stack[stack.len() - 1];
            if took_right {
                stack.pop();
            } else {
                let right = nodes.get(ancestor).right();
                if visit(stack.len(), right, true) {
                    return (ancestor, true);
                }
                let top = stack.len() - 1;
                stack[top].1 = true;
                if right == MerkleLink::Descend {
                    done = true;
                }
            }
        }
        if stack.is_empty() {
            return (pos + 1, false);
        }
        pos += 1;
    }
    (nodes.len(), true)
}

/// Proof of a single hash's position in a fast Merkle tree, in the form
/// consumed by `compute_fast_merkle_root_from_branch`: sibling hashes from
/// the leaf level upwards, plus one side bit per level.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MerkleBranch {
    pub branch: Vec<Hash>,
    pub vpath: Vec<bool>,
}

impl MerkleBranch {
    pub fn new(branch: Vec<Hash>, vpath: Vec<bool>) -> Self {
        MerkleBranch { branch, vpath }
    }

    pub fn clear(&mut self) {
        self.branch.clear();
        self.vpath.clear();
    }

    /// The side bits packed into an integer, low bit first. Bits beyond 32
    /// are tolerated only if zero.
    pub fn get_path(&self) -> Result<u32, ConsensusError> {
        let mut ret: u32 = 0;
        for (pos, bit) in self.vpath.iter().enumerate() {
            if pos < 32 {
                ret |= (*bit as u32) << pos;
            } else if *bit {
                return Err(ConsensusError::MerkleProof(
                    "path does not fit within a 32-bit integer".into(),
                ));
            }
        }
        Ok(ret)
    }

    /// Compact byte encoding: the packed side bits with trailing zero bytes
    /// stripped, followed by the branch hashes. The format is not
    /// self-synchronizing; the overall length determines the split.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut ret = vec![0u8; (self.vpath.len() + 7) / 8];
        for (pos, bit) in self.vpath.iter().enumerate() {
            ret[pos / 8] |= (*bit as u8) << (pos % 8);
        }
        while ret.last() == Some(&0) {
            ret.pop();
        }
        for hash in &self.branch {
            ret.extend_from_slice(hash);
        }
        ret
    }

    /// Inverse of `to_bytes`. The branch is the trailing whole 32-byte
    /// chunks; whatever remains in front is the packed path, which must be
    /// minimally encoded with no bits beyond the branch length.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ConsensusError> {
        if data.len() > 1028 {
            // 1028 = 32*32 + 32/8
            return Err(ConsensusError::MerkleProof(
                "byte vector too large for a branch of 32 hashes or less".into(),
            ));
        }
        let bytes_in_path = data.len() % 32;
        let max_bytes_in_path = (data.len() / 32 + 7) / 8;
        if bytes_in_path > max_bytes_in_path {
            return Err(ConsensusError::MerkleProof(
                "residual path bytes exceed 4 (more than 32 bits)".into(),
            ));
        }
        if bytes_in_path > 0 && data[bytes_in_path - 1] == 0 {
            return Err(ConsensusError::MerkleProof(
                "path is not minimally encoded".into(),
            ));
        }
        let mut vpath = vec![false; data.len() / 32];
        for i in 0..bytes_in_path {
            for j in 0..8 {
                let bit = data[i] & (1 << j) != 0;
                if i * 8 + j < vpath.len() {
                    vpath[i * 8 + j] = bit;
                } else if bit {
                    return Err(ConsensusError::MerkleProof(
                        "dirty bit set in path".into(),
                    ));
                }
            }
        }
        let mut branch = Vec::with_capacity(data.len() / 32);
        for chunk in data[bytes_in_path..].chunks_exact(32) {
            let mut hash = [0u8; 32];
            hash.copy_from_slice(chunk);
            branch.push(hash);
        }
        Ok(MerkleBranch { branch, vpath })
    }
}

/// The unprunable structure of a partially pruned tree: its node list and
/// the SKIP hashes, in traversal order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MerkleProof {
    pub path: MerkleNodeVector,
    pub skip: Vec<Hash>,
}

impl MerkleProof {
    pub fn clear(&mut self) {
        self.path.clear();
        self.skip.clear();
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        self.path.serialize(out);
        write_varint(out, self.skip.len() as u64);
        for hash in &self.skip {
            out.extend_from_slice(hash);
        }
    }

    pub fn deserialize(data: &[u8], cursor: &mut usize) -> Result<Self, ConsensusError> {
        let path = MerkleNodeVector::deserialize(data, cursor)?;
        let skip_size = read_varint(data, cursor)?;
        let remaining = (data.len() - *cursor) as u64 / 32;
        if skip_size > remaining {
            return Err(ConsensusError::Serialization("skip hashes truncated".into()));
        }
        let mut skip = Vec::with_capacity(skip_size as usize);
        for _ in 0..skip_size {
            let mut hash = [0u8; 32];
            hash.copy_from_slice(&data[*cursor..*cursor + 32]);
            *cursor += 32;
            skip.push(hash);
        }
        Ok(MerkleProof { path, skip })
    }
}

/// A proof together with its VERIFY hashes; enough to recompute the root.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MerkleTree {
    pub proof: MerkleProof,
    pub verify: Vec<Hash>,
}

impl MerkleTree {
    /// A tree of a single hash, which has no internal nodes.
    pub fn from_hash(hash: &Hash, verify: bool) -> Self {
        let mut tree = MerkleTree::default();
        if verify {
            tree.verify.push(*hash);
        } else {
            tree.proof.skip.push(*hash);
        }
        tree
    }

    /// A tree of a single VERIFY leaf positioned by a branch proof. The
    /// branch hashes are all SKIP hashes of the result.
    pub fn from_branch(leaf: &Hash, branch: &MerkleBranch) -> Self {
        debug_assert_eq!(branch.vpath.len(), branch.branch.len());
        let mut tree = MerkleTree {
            proof: MerkleProof::default(),
            verify: vec![*leaf],
        };
        if branch.vpath.is_empty() {
            return tree;
        }

        // The branch lists hashes from the leaf upwards, but the proof
        // stores them in left-to-right traversal order: all left-side SKIP
        // hashes (in increasing depth) before all right-side ones (in
        // decreasing depth). Two scans in opposite directions reorder them
        // while the node list is built top-down.
        for (side, hash) in branch.vpath.iter().rev().zip(branch.branch.iter().rev()) {
            if *side {
                tree.proof
                    .path
                    .push(MerkleNode::new(MerkleLink::Skip, MerkleLink::Descend));
                tree.proof.skip.push(*hash);
            } else {
                tree.proof
                    .path
                    .push(MerkleNode::new(MerkleLink::Descend, MerkleLink::Skip));
            }
        }
        for (side, hash) in branch.vpath.iter().zip(branch.branch.iter()) {
            if !*side {
                tree.proof.skip.push(*hash);
            }
        }

        // The DESCEND link of the bottom node is the leaf itself.
        let last = tree.proof.path.len() - 1;
        let mut node = tree.proof.path.get(last);
        if branch.vpath[0] {
            node.set_right(MerkleLink::Verify);
        } else {
            node.set_left(MerkleLink::Verify);
        }
        tree.proof.path.set(last, node);
        tree
    }

    /// A tree with the given left and right subtrees. Joining with an empty
    /// tree is the identity; joining two fully pruned trees prunes the
    /// result to a single SKIP hash.
    pub fn join(left: &MerkleTree, right: &MerkleTree) -> Self {
        if *left == MerkleTree::default() {
            return right.clone();
        }
        if *right == MerkleTree::default() {
            return left.clone();
        }

        if left.proof.path.is_empty()
            && left.proof.skip.len() == 1
            && left.verify.is_empty()
            && right.proof.path.is_empty()
            && right.proof.skip.len() == 1
            && right.verify.is_empty()
        {
            let mut tree = MerkleTree::default();
            tree.proof
                .skip
                .push(fast_merkle_hash(&left.proof.skip[0], &right.proof.skip[0]));
            return tree;
        }

        // Both inputs are assumed well formed: a subtree with no internal
        // nodes carries exactly one hash, in either its skip or verify set.
        let mut tree = MerkleTree::default();
        tree.proof
            .path
            .push(MerkleNode::new(MerkleLink::Descend, MerkleLink::Descend));

        let mut root = tree.proof.path.get(0);
        if left.proof.path.is_empty() {
            root.set_left(if left.proof.skip.is_empty() {
                MerkleLink::Verify
            } else {
                MerkleLink::Skip
            });
        }
        if right.proof.path.is_empty() {
            root.set_right(if right.proof.skip.is_empty() {
                MerkleLink::Verify
            } else {
                MerkleLink::Skip
            });
        }
        tree.proof.path.set(0, root);

        for node in left.proof.path.iter() {
            tree.proof.path.push(node);
        }
        tree.proof.skip.extend_from_slice(&left.proof.skip);
        tree.verify.extend_from_slice(&left.verify);

        for node in right.proof.path.iter() {
            tree.proof.path.push(node);
        }
        tree.proof.skip.extend_from_slice(&right.proof.skip);
        tree.verify.extend_from_slice(&right.verify);
        tree
    }

    pub fn clear(&mut self) {
        self.proof.clear();
        self.verify.clear();
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        self.proof.serialize(out);
        write_varint(out, self.verify.len() as u64);
        for hash in &self.verify {
            out.extend_from_slice(hash);
        }
    }

    pub fn deserialize(data: &[u8], cursor: &mut usize) -> Result<Self, ConsensusError> {
        let proof = MerkleProof::deserialize(data, cursor)?;
        let verify_size = read_varint(data, cursor)?;
        let remaining = (data.len() - *cursor) as u64 / 32;
        if verify_size > remaining {
            return Err(ConsensusError::Serialization(
                "verify hashes truncated".into(),
            ));
        }
        let mut verify = Vec::with_capacity(verify_size as usize);
        for _ in 0..verify_size {
            let mut hash = [0u8; 32];
            hash.copy_from_slice(&data[*cursor..*cursor + 32]);
            *cursor += 32;
            verify.push(hash);
        }
        Ok(MerkleTree { proof, verify })
    }

    /// Recompute the root in a single depth-first pass, and optionally
    /// extract a verification branch for each VERIFY hash while doing so.
    /// Returns `None` when the proof is malformed: node and hash counts out
    /// of balance, trailing nodes past the end of the tree, or too few nodes
    /// to finish it.
    pub fn get_hash(&self, branches: Option<&mut Vec<MerkleBranch>>) -> Option<Hash> {
        // An entirely empty tree hashes to the unsalted hash of the empty
        // string. Supporting this gives degenerate proofs a continuous
        // meaning rather than a special failure case.
        if self.proof.path.is_empty() && self.verify.is_empty() && self.proof.skip.is_empty() {
            if let Some(b) = branches {
                b.clear();
            }
            return Some(double_sha256(&[]));
        }

        // Any nonempty binary tree has one more leaf than internal nodes.
        if self.verify.len() + self.proof.skip.len() != self.proof.path.len() + 1 {
            return None;
        }

        // No internal nodes: a single hash, in one set or the other.
        if self.proof.path.is_empty() {
            if let Some(b) = branches {
                b.clear();
                if !self.verify.is_empty() {
                    b.push(MerkleBranch::default());
                }
            }
            return Some(if self.verify.is_empty() {
                self.proof.skip[0]
            } else {
                self.verify[0]
            });
        }

        // Each stack entry is a (filled, hash) pair: a placeholder pushed
        // when descending, filled in when its subtree's hash is known.
        let mut stack: Vec<(bool, Hash)> = vec![(false, [0u8; 32]); 2];
        let mut verify_pos = 0usize;
        let mut skip_pos = 0usize;

        let mut proofs: Vec<MerkleBranch> = vec![MerkleBranch::default(); self.verify.len()];
        let mut extra_depths: Vec<usize> = vec![0; self.verify.len()];
        let mut vpath: Vec<bool> = Vec::new();

        let verify = &self.verify;
        let skip = &self.proof.skip;

        let (end_pos, unfinished) =
            depth_first_traverse(&self.proof.path, |depth, value, side| {
                let mut new_hash: Hash;
                match value {
                    MerkleLink::Descend => {
                        for d in extra_depths.iter_mut().take(verify_pos) {
                            *d += 1;
                        }
                        vpath.push(side);
                        stack.push((false, [0u8; 32]));
                        return false;
                    }
                    MerkleLink::Verify => {
                        if verify_pos == verify.len() {
                            return true;
                        }
                        // Record this leaf's path: its own side bit, then
                        // the root-to-here path reversed into leaf-to-root
                        // order.
                        proofs[verify_pos].vpath.push(side);
                        for bit in vpath.iter().rev() {
                            proofs[verify_pos].vpath.push(*bit);
                        }
                        new_hash = verify[verify_pos];
                        verify_pos += 1;
                    }
                    MerkleLink::Skip => {
                        if skip_pos == skip.len() {
                            return true;
                        }
                        new_hash = skip[skip_pos];
                        skip_pos += 1;
                    }
                }

                // A completed right-hand hash combines with every filled
                // entry above it on the stack. Each combination is a level
                // of some already-recorded verify leaf's branch: the leaf's
                // own side bit says which of the two children is the
                // sibling it needs.
                let mut depth = depth;
                while stack[stack.len() - 1].0 {
                    let top = stack[stack.len() - 1].1;
                    for pos in 0..verify_pos {
                        if extra_depths[pos] > 0 {
                            extra_depths[pos] -= 1;
                        } else {
                            // Root links are at depth 1 while the recorded
                            // path is zero based, so the subtraction is
                            // implicitly off by one.
                            let idx = proofs[pos].vpath.len() - depth;
                            let sibling = if proofs[pos].vpath[idx] { top } else { new_hash };
                            proofs[pos].branch.push(sibling);
                        }
                    }
                    vpath.pop();
                    new_hash = fast_merkle_hash(&top, &new_hash);
                    stack.pop();
                    depth -= 1;
                }

                let last = stack.len() - 1;
                stack[last] = (true, new_hash);
                false
            });

        if end_pos != self.proof.path.len() // trailing nodes past the end of the tree
            || unfinished                   // too few nodes to finish the tree
            || stack.len() != 1
            || !stack[0].0
        {
            return None;
        }
        if verify_pos != verify.len() || skip_pos != skip.len() {
            return None;
        }

        if let Some(b) = branches {
            *b = proofs;
        }
        Some(stack[0].1)
    }
}
