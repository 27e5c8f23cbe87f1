use crate::consensus::Proposal;
use std::collections::HashMap;

/// Quorum commit over committee proposals.
///
/// Hashes are tallied in proposal order. As soon as one hash reaches `quorum`
/// votes, the index of the *first* proposal carrying that hash is returned.
/// `None` means no hash ever reached quorum.
pub fn bft_commit(proposals: &[Proposal], quorum: usize) -> Option<usize> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut first_seen: HashMap<&str, usize> = HashMap::new();
    for (i, p) in proposals.iter().enumerate() {
        let h = p.block.hash.as_str();
        first_seen.entry(h).or_insert(i);
        let count = counts.entry(h).or_insert(0);
        *count += 1;
        if *count >= quorum {
            return first_seen.get(h).copied();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;

    fn with_hash(h: &str) -> Proposal {
        let mut b = Block::new(1, "genesis", 0.0, "p", 1.0, 1.0, vec![]);
        b.hash = h.to_string();
        Proposal::new(b, "p")
    }

    #[test]
    fn commits_first_occurrence() {
        let ps = vec![with_hash("A"), with_hash("B"), with_hash("A")];
        assert_eq!(bft_commit(&ps, 2), Some(0));
        assert_eq!(bft_commit(&ps, 3), None);
    }

    #[test]
    fn stops_at_first_hash_reaching_quorum() {
        let ps = vec![
            with_hash("B"),
            with_hash("A"),
            with_hash("A"),
            with_hash("B"),
        ];
        assert_eq!(bft_commit(&ps, 2), Some(1));
    }

    #[test]
    fn distinct_hashes_never_commit_above_one() {
        let ps = vec![with_hash("A"), with_hash("B"), with_hash("C")];
        assert_eq!(bft_commit(&ps, 2), None);
        assert_eq!(bft_commit(&ps, 1), Some(0));
        assert_eq!(bft_commit(&[], 1), None);
    }
}
