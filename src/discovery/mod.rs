//! Device discovery
//!
//! Two strategies produce [`Candidate`]s:
//!
//! - `multicast`: WS-Discovery Probe/ProbeMatch on 239.255.255.250:3702
//! - `scanner`: bounded-concurrency probe of IP range x ports x service paths
//!
//! [`discover`] runs any mix of both and merges the results through one
//! [`CandidateSet`], so each (address, port) appears once with its shortest path.

pub mod multicast;
pub mod range;
pub mod scanner;
mod types;

pub use range::IpRange;
pub use scanner::RangeScanner;
pub use types::CandidateSet;

use crate::config::DiscoveryConfig;
use crate::error::Result;
use crate::models::Candidate;

/// What a discovery pass should cover
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryPlan {
    pub multicast: bool,
    pub ranges: Vec<IpRange>,
}

impl DiscoveryPlan {
    pub fn multicast() -> Self {
        Self {
            multicast: true,
            ranges: Vec::new(),
        }
    }

    pub fn ranges(ranges: Vec<IpRange>) -> Self {
        Self {
            multicast: false,
            ranges,
        }
    }
}

/// Run the plan: multicast first, then each range in order
pub async fn discover(config: &DiscoveryConfig, plan: &DiscoveryPlan) -> Result<Vec<Candidate>> {
    let mut set = CandidateSet::new();

    if plan.multicast {
        let found = multicast::probe(&config.multicast).await?;
        tracing::info!(devices = found.len(), "Multicast discovery complete");
        set.extend(found);
    }

    if !plan.ranges.is_empty() {
        let scanner = RangeScanner::new(config.scan.clone(), &config.client)?;
        for range in &plan.ranges {
            set.extend(scanner.scan_range(*range).await);
        }
    }

    tracing::info!(devices = set.len(), "Discovery complete");
    Ok(set.into_sorted_vec())
}
