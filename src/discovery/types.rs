use std::cmp::Ordering;
use std::collections::HashMap;
use std::net::Ipv4Addr;

use crate::models::{Candidate, CandidateSource};

fn source_rank(source: CandidateSource) -> u8 {
    match source {
        CandidateSource::Multicast => 0,
        CandidateSource::Scan => 1,
        CandidateSource::Manual => 2,
    }
}

/// Total preference order between two candidates for the same (address, port):
/// shorter path, then lexicographically smaller path, then source, then XAddr.
fn preference(a: &Candidate, b: &Candidate) -> Ordering {
    a.path
        .len()
        .cmp(&b.path.len())
        .then_with(|| a.path.cmp(&b.path))
        .then_with(|| source_rank(a.source).cmp(&source_rank(b.source)))
        .then_with(|| a.xaddr.cmp(&b.xaddr))
}

/// Candidates deduplicated by (address, port).
///
/// Insertion is commutative and idempotent: any arrival order of the same
/// candidates yields the same set.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    by_key: HashMap<(String, u16), Candidate>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the candidate was stored
    pub fn insert(&mut self, candidate: Candidate) -> bool {
        match self.by_key.get_mut(&candidate.key()) {
            Some(existing) => {
                if preference(&candidate, existing) == Ordering::Less {
                    *existing = candidate;
                    true
                } else {
                    false
                }
            }
            None => {
                self.by_key.insert(candidate.key(), candidate);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Sorted by numeric IPv4 address (hostnames after), then port
    pub fn into_sorted_vec(self) -> Vec<Candidate> {
        let mut out: Vec<Candidate> = self.by_key.into_values().collect();
        out.sort_by(|a, b| {
            let ip_a = a.address.parse::<Ipv4Addr>().ok();
            let ip_b = b.address.parse::<Ipv4Addr>().ok();
            match (ip_a, ip_b) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => a.address.cmp(&b.address),
            }
            .then(a.port.cmp(&b.port))
        });
        out
    }
}

impl Extend<Candidate> for CandidateSet {
    fn extend<I: IntoIterator<Item = Candidate>>(&mut self, iter: I) {
        for candidate in iter {
            self.insert(candidate);
        }
    }
}

impl FromIterator<Candidate> for CandidateSet {
    fn from_iter<I: IntoIterator<Item = Candidate>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}
