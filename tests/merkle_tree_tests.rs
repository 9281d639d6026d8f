//! Cross-module Merkle tree tests: roots, branches, proof structures, and
//! serialization working together across tree shapes.

use freicoin_consensus::merkle::{
    compute_fast_merkle_branch, compute_fast_merkle_root, compute_fast_merkle_root_from_branch,
    compute_merkle_branch, compute_merkle_root, compute_merkle_root_from_branch,
    compute_stable_merkle_branch, compute_stable_merkle_root_from_branch, double_sha256,
    fast_merkle_hash,
};
use freicoin_consensus::merkleproof::{MerkleBranch, MerkleTree};
use freicoin_consensus::types::Hash;

fn leaves(n: usize) -> Vec<Hash> {
    (0..n).map(|i| double_sha256(&[i as u8])).collect()
}

#[test]
fn test_legacy_branches_reconstruct_root() {
    for n in 1..=9usize {
        let leaves = leaves(n);
        let (root, mutated) = compute_merkle_root(&leaves);
        assert!(!mutated);
        for pos in 0..n as u32 {
            let branch = compute_merkle_branch(&leaves, pos);
            assert_eq!(
                compute_merkle_root_from_branch(&leaves[pos as usize], &branch, pos),
                root,
                "leaf {} of {}",
                pos,
                n
            );
        }
    }
}

#[test]
fn test_legacy_duplicate_leaves_flagged() {
    let mut leaves = leaves(3);
    // Duplicating the final leaf reproduces the CVE-2012-2459 ambiguity:
    // the 4-leaf root equals the padded 3-leaf root.
    leaves.push(leaves[2]);
    let (dup_root, mutated) = compute_merkle_root(&leaves);
    assert!(mutated);
    let (root, mutated3) = compute_merkle_root(&leaves[..3]);
    assert!(!mutated3);
    assert_eq!(dup_root, root);
}

#[test]
fn test_fast_branches_reconstruct_root() {
    for n in 1..=9usize {
        let leaves = leaves(n);
        let root = compute_fast_merkle_root(&leaves);
        for pos in 0..n as u32 {
            let (branch, path) = compute_fast_merkle_branch(&leaves, pos);
            let (recomputed, invalid) =
                compute_fast_merkle_root_from_branch(&leaves[pos as usize], &branch, path);
            assert!(!invalid);
            assert_eq!(recomputed, root, "leaf {} of {}", pos, n);
        }
    }
}

#[test]
fn test_fast_tree_has_no_duplication_ambiguity() {
    // Unbalanced subtrees are lifted, not padded, so appending a copy of the
    // last leaf always changes the root.
    for n in 1..=8usize {
        let mut leaves = leaves(n);
        let root = compute_fast_merkle_root(&leaves);
        leaves.push(leaves[n - 1]);
        assert_ne!(compute_fast_merkle_root(&leaves), root);
    }
}

#[test]
fn test_fast_root_from_branch_rejects_leftover_path() {
    let leaves = leaves(4);
    let (branch, path) = compute_fast_merkle_branch(&leaves, 2);
    // Extra high path bits describe a deeper tree than the branch proves.
    let (_, invalid) =
        compute_fast_merkle_root_from_branch(&leaves[2], &branch, path | 1 << branch.len());
    assert!(invalid);
}

#[test]
fn test_stable_branches_reconstruct_root() {
    // The stable tree combines lone subtrees with themselves, so every leaf
    // has a full-depth branch with mask bits marking self-combined levels.
    for n in 1..=9usize {
        let leaves = leaves(n);
        let mut expected = None;
        for pos in 0..n as u32 {
            let (branch, path, mask) = compute_stable_merkle_branch(&leaves, pos);
            let (root, invalid) = compute_stable_merkle_root_from_branch(
                &leaves[pos as usize],
                &branch,
                path,
                mask,
            );
            assert!(!invalid);
            match expected {
                None => expected = Some(root),
                Some(e) => assert_eq!(root, e, "leaf {} of {}", pos, n),
            }
        }
    }
}

#[test]
fn test_single_leaf_trees_agree() {
    let leaf = double_sha256(b"only");
    assert_eq!(compute_fast_merkle_root(&[leaf]), leaf);
    let (branch, path) = compute_fast_merkle_branch(&[leaf], 0);
    assert!(branch.is_empty());
    assert_eq!(path, 0);
    let (root, mutated) = compute_merkle_root(&[leaf]);
    assert_eq!(root, leaf);
    assert!(!mutated);
}

#[test]
fn test_empty_fast_tree_root_is_empty_string_hash() {
    assert_eq!(compute_fast_merkle_root(&[]), double_sha256(&[]));
    let empty = MerkleTree::default();
    assert_eq!(empty.get_hash(None), Some(double_sha256(&[])));
}

#[test]
fn test_proof_tree_matches_direct_computation() {
    for n in 1..=8usize {
        let leaves = leaves(n);
        let root = compute_fast_merkle_root(&leaves);
        for pos in 0..n as u32 {
            let (branch, path) = compute_fast_merkle_branch(&leaves, pos);
            let vpath: Vec<bool> = (0..branch.len()).map(|i| path >> i & 1 == 1).collect();
            let tree = MerkleTree::from_branch(
                &leaves[pos as usize],
                &MerkleBranch::new(branch, vpath),
            );
            assert_eq!(tree.get_hash(None), Some(root), "leaf {} of {}", pos, n);
        }
    }
}

#[test]
fn test_tree_join_combines_subtrees() {
    let left_leaf = double_sha256(b"left");
    let right_leaf = double_sha256(b"right");
    let joined = MerkleTree::join(
        &MerkleTree::from_hash(&left_leaf, true),
        &MerkleTree::from_hash(&right_leaf, false),
    );
    assert_eq!(
        joined.get_hash(None),
        Some(fast_merkle_hash(&left_leaf, &right_leaf))
    );
    assert_eq!(joined.verify, vec![left_leaf]);
    assert_eq!(joined.proof.skip, vec![right_leaf]);

    // Joining two pruned subtrees collapses to a single skip hash.
    let pruned = MerkleTree::join(
        &MerkleTree::from_hash(&left_leaf, false),
        &MerkleTree::from_hash(&right_leaf, false),
    );
    assert!(pruned.proof.path.is_empty());
    assert_eq!(
        pruned.proof.skip,
        vec![fast_merkle_hash(&left_leaf, &right_leaf)]
    );
}

#[test]
fn test_tree_serialization_round_trip() {
    let leaves = leaves(7);
    let root = compute_fast_merkle_root(&leaves);
    for pos in 0..7u32 {
        let (branch, path) = compute_fast_merkle_branch(&leaves, pos);
        let vpath: Vec<bool> = (0..branch.len()).map(|i| path >> i & 1 == 1).collect();
        let tree = MerkleTree::from_branch(
            &leaves[pos as usize],
            &MerkleBranch::new(branch, vpath),
        );

        let mut bytes = Vec::new();
        tree.serialize(&mut bytes);
        let mut cursor = 0;
        let decoded = MerkleTree::deserialize(&bytes, &mut cursor).unwrap();
        assert_eq!(cursor, bytes.len());
        assert_eq!(decoded, tree);
        assert_eq!(decoded.get_hash(None), Some(root));
    }
}

#[test]
fn test_get_hash_extracts_usable_branches() {
    // Branches pulled out of a proof tree must verify against the direct
    // branch computation.
    let leaves = leaves(5);
    let root = compute_fast_merkle_root(&leaves);
    for pos in 0..5u32 {
        let (branch, path) = compute_fast_merkle_branch(&leaves, pos);
        let vpath: Vec<bool> = (0..branch.len()).map(|i| path >> i & 1 == 1).collect();
        let tree = MerkleTree::from_branch(
            &leaves[pos as usize],
            &MerkleBranch::new(branch.clone(), vpath),
        );

        let mut extracted = Vec::new();
        assert_eq!(tree.get_hash(Some(&mut extracted)), Some(root));
        assert_eq!(extracted.len(), 1);
        let extracted_path = extracted[0].get_path().unwrap();
        let (recomputed, invalid) = compute_fast_merkle_root_from_branch(
            &leaves[pos as usize],
            &extracted[0].branch,
            extracted_path,
        );
        assert!(!invalid);
        assert_eq!(recomputed, root);
    }
}

#[test]
fn test_malformed_proofs_rejected() {
    // A tree whose hash counts disagree with its node count has no root.
    let mut tree = MerkleTree::from_hash(&double_sha256(b"x"), true);
    tree.verify.push(double_sha256(b"y"));
    assert_eq!(tree.get_hash(None), None);

    // Truncated serialization fails to decode.
    let leaves = leaves(4);
    let (branch, path) = compute_fast_merkle_branch(&leaves, 1);
    let vpath: Vec<bool> = (0..branch.len()).map(|i| path >> i & 1 == 1).collect();
    let tree = MerkleTree::from_branch(&leaves[1], &MerkleBranch::new(branch, vpath));
    let mut bytes = Vec::new();
    tree.serialize(&mut bytes);
    bytes.truncate(bytes.len() - 1);
    let mut cursor = 0;
    assert!(MerkleTree::deserialize(&bytes, &mut cursor).is_err());
}
