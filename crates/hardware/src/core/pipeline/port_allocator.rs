//! Issue port allocation.
//!
//! The dispatch unit offers every supported port whose reservation station can
//! accept a micro-op this cycle; the allocator picks one. Each port carries a
//! weight, the number of micro-ops allocated to it that have not issued yet.

use std::cmp::Reverse;

use crate::config::PortAllocatorKind;

/// A port the dispatch unit could place a micro-op on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortCandidate {
    /// Port index.
    pub port: usize,
    /// Free entries in the station feeding the port.
    pub free_entries: usize,
    /// Issue-blocking cycles of the micro-ops waiting in that station.
    pub blocked_cycles: u64,
}

/// Port selection policy.
pub trait PortAllocator {
    /// Chooses a port among `candidates`.
    ///
    /// # Returns
    ///
    /// The chosen port, or `None` if `candidates` is empty.
    fn allocate(&mut self, candidates: &[PortCandidate]) -> Option<usize>;

    /// A micro-op allocated to `port` issued.
    fn issued(&mut self, port: usize);

    /// A micro-op allocated to `port` was flushed before issuing.
    fn deallocate(&mut self, port: usize);
}

#[derive(Clone, Debug)]
struct Weights(Vec<u64>);

impl Weights {
    fn get(&self, port: usize) -> u64 {
        self.0.get(port).copied().unwrap_or(0)
    }

    fn increment(&mut self, port: usize) {
        if let Some(weight) = self.0.get_mut(port) {
            *weight += 1;
        }
    }

    fn decrement(&mut self, port: usize) {
        if let Some(weight) = self.0.get_mut(port) {
            *weight = weight.saturating_sub(1);
        }
    }
}

/// Picks the least-loaded port; ties go to the lowest index.
#[derive(Clone, Debug)]
pub struct BalancedPortAllocator {
    weights: Weights,
}

impl BalancedPortAllocator {
    /// Creates an allocator for `ports` ports.
    pub fn new(ports: usize) -> Self {
        Self {
            weights: Weights(vec![0; ports]),
        }
    }
}

impl PortAllocator for BalancedPortAllocator {
    fn allocate(&mut self, candidates: &[PortCandidate]) -> Option<usize> {
        let port = candidates
            .iter()
            .min_by_key(|c| (self.weights.get(c.port), c.port))?
            .port;
        self.weights.increment(port);
        Some(port)
    }

    fn issued(&mut self, port: usize) {
        self.weights.decrement(port);
    }

    fn deallocate(&mut self, port: usize) {
        self.weights.decrement(port);
    }
}

/// Picks the station that drains soonest: fewest blocked cycles, then most free
/// entries, then the least-loaded port.
#[derive(Clone, Debug)]
pub struct CapacityAwarePortAllocator {
    weights: Weights,
}

impl CapacityAwarePortAllocator {
    /// Creates an allocator for `ports` ports.
    pub fn new(ports: usize) -> Self {
        Self {
            weights: Weights(vec![0; ports]),
        }
    }
}

impl PortAllocator for CapacityAwarePortAllocator {
    fn allocate(&mut self, candidates: &[PortCandidate]) -> Option<usize> {
        let port = candidates
            .iter()
            .min_by_key(|c| {
                (
                    c.blocked_cycles,
                    Reverse(c.free_entries),
                    self.weights.get(c.port),
                    c.port,
                )
            })?
            .port;
        self.weights.increment(port);
        Some(port)
    }

    fn issued(&mut self, port: usize) {
        self.weights.decrement(port);
    }

    fn deallocate(&mut self, port: usize) {
        self.weights.decrement(port);
    }
}

/// Enum wrapper for static dispatch of port allocators.
#[derive(Clone, Debug)]
pub enum PortAllocatorWrapper {
    /// Least-loaded port.
    Balanced(BalancedPortAllocator),
    /// Station-capacity aware.
    CapacityAware(CapacityAwarePortAllocator),
}

impl PortAllocatorWrapper {
    /// Creates the allocator selected by `kind` for `ports` ports.
    pub fn new(kind: PortAllocatorKind, ports: usize) -> Self {
        match kind {
            PortAllocatorKind::Balanced => Self::Balanced(BalancedPortAllocator::new(ports)),
            PortAllocatorKind::CapacityAware => {
                Self::CapacityAware(CapacityAwarePortAllocator::new(ports))
            }
        }
    }
}

impl PortAllocator for PortAllocatorWrapper {
    #[inline(always)]
    fn allocate(&mut self, candidates: &[PortCandidate]) -> Option<usize> {
        match self {
            Self::Balanced(a) => a.allocate(candidates),
            Self::CapacityAware(a) => a.allocate(candidates),
        }
    }

    #[inline(always)]
    fn issued(&mut self, port: usize) {
        match self {
            Self::Balanced(a) => a.issued(port),
            Self::CapacityAware(a) => a.issued(port),
        }
    }

    #[inline(always)]
    fn deallocate(&mut self, port: usize) {
        match self {
            Self::Balanced(a) => a.deallocate(port),
            Self::CapacityAware(a) => a.deallocate(port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn candidate(port: usize, free_entries: usize, blocked_cycles: u64) -> PortCandidate {
        PortCandidate {
            port,
            free_entries,
            blocked_cycles,
        }
    }

    #[test]
    fn balanced_spreads_across_ports() {
        let mut allocator = BalancedPortAllocator::new(3);
        let all = [candidate(0, 8, 0), candidate(1, 8, 0), candidate(2, 8, 0)];
        assert_eq!(allocator.allocate(&all), Some(0));
        assert_eq!(allocator.allocate(&all), Some(1));
        assert_eq!(allocator.allocate(&all[..2]), Some(0));

        allocator.issued(1);
        assert_eq!(allocator.allocate(&all[..2]), Some(1));
        assert_eq!(allocator.allocate(&[]), None);
    }

    #[test]
    fn capacity_aware_prefers_unblocked_then_emptier_stations() {
        let mut allocator = CapacityAwarePortAllocator::new(3);
        let ports = [candidate(0, 8, 12), candidate(1, 2, 0), candidate(2, 6, 0)];
        assert_eq!(allocator.allocate(&ports), Some(2));

        let even = [candidate(0, 4, 0), candidate(1, 4, 0)];
        assert_eq!(allocator.allocate(&even), Some(0));
        assert_eq!(allocator.allocate(&even), Some(1));
        allocator.deallocate(0);
        assert_eq!(allocator.allocate(&even), Some(0));
    }

    #[test]
    fn wrapper_follows_configured_kind() {
        let mut balanced = PortAllocatorWrapper::new(PortAllocatorKind::Balanced, 2);
        let mut aware = PortAllocatorWrapper::new(PortAllocatorKind::CapacityAware, 2);
        let ports = [candidate(0, 1, 0), candidate(1, 5, 0)];
        assert_eq!(balanced.allocate(&ports), Some(0));
        assert_eq!(aware.allocate(&ports), Some(1));
    }
}
