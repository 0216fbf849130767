//! Combination enumeration over independent key groups.

use crate::Selector;
use crate::selector::domain_product;

/// Default ceiling on the number of combinations visited by exhaustive analysis.
pub const DEFAULT_EXHAUSTIVE_LIMIT: u64 = 1 << 16;

/// Every selector of a mixed-radix domain, in ascending order.
///
/// Cloning yields an independent cursor, so the sequence can be restarted
/// at any time.
#[derive(Clone, Debug)]
pub struct AllSelectors {
    next: Selector,
    end: Selector,
}

impl AllSelectors {
    /// Total number of selectors in the domain (independent of progress).
    #[inline]
    pub fn domain_len(&self) -> Selector {
        self.end
    }
}

impl Iterator for AllSelectors {
    type Item = Selector;

    #[inline]
    fn next(&mut self) -> Option<Selector> {
        if self.next >= self.end {
            return None;
        }
        let selector = self.next;
        self.next += 1;
        Some(selector)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.end - self.next).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for AllSelectors {}

/// Enumerate every selector of `domain_sizes`.
///
/// A domain whose size product overflows the selector width yields nothing;
/// callers gate enumeration with [`is_exhaustive_feasible`] first.
pub fn all_selectors(domain_sizes: &[u32]) -> AllSelectors {
    AllSelectors {
        next: 0,
        end: domain_product(domain_sizes).unwrap_or(0),
    }
}

/// Whether enumerating the Cartesian product of all groups stays within `limit`.
///
/// Returns `false` if the product exceeds `limit` or overflows.
pub fn is_exhaustive_feasible<G: AsRef<[u32]>>(domain_sizes_per_group: &[G], limit: u64) -> bool {
    domain_sizes_per_group
        .iter()
        .try_fold(1u64, |acc, group| {
            domain_product(group.as_ref()).and_then(|n| acc.checked_mul(n))
        })
        .is_some_and(|total| total <= limit)
}
