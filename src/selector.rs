//! Selector codec: mixed-radix packing of ordered key values.
//!
//! A selector is the packed identity of one combination of key values.
//! Each position holds a *domain index* (not a raw key value) and is
//! weighted by the product of the domain sizes before it:
//!
//! ```text
//! selector = v[0] + d[0] * (v[1] + d[1] * (v[2] + d[2] * (...)))
//! ```
//!
//! The first position varies fastest. The same scheme is applied one level
//! up by [`combine`], with each group's selector domain size being the
//! product of that group's key domain sizes.
//!
//! ## Full selector group order
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬──────────┐
//! │ System   │ Scene    │ Material │ SubView  │
//! │ fastest  │          │          │ slowest  │
//! └──────────┴──────────┴──────────┴──────────┘
//! ```

use crate::Selector;

/// Number of key groups that make up a full selector.
pub const GROUP_COUNT: usize = 4;

/// Pack ordered domain indices into a selector.
///
/// Out-of-domain values are the caller's responsibility; packing never fails
/// and wraps on overflow.
#[inline]
pub fn pack(values: &[u32], domain_sizes: &[u32]) -> Selector {
    debug_assert_eq!(
        values.len(),
        domain_sizes.len(),
        "one value per domain is required"
    );
    let mut selector: Selector = 0;
    let mut weight: Selector = 1;
    for (&value, &size) in values.iter().zip(domain_sizes) {
        selector = selector.wrapping_add(weight.wrapping_mul(value as Selector));
        weight = weight.wrapping_mul(size as Selector);
    }
    selector
}

/// Inverse of [`pack`] over the declared domain sizes.
///
/// Zero-sized domains yield `0` for their position.
pub fn unpack(mut selector: Selector, domain_sizes: &[u32]) -> Vec<u32> {
    domain_sizes
        .iter()
        .map(|&size| {
            if size == 0 {
                return 0;
            }
            let size = size as Selector;
            let value = selector % size;
            selector /= size;
            value as u32
        })
        .collect()
}

/// Combine per-group selectors into one full selector.
///
/// `selector_domain_sizes[i]` is the number of distinct selectors group `i`
/// can produce (see [`domain_product`]).
#[inline]
pub fn combine(selectors: &[Selector], selector_domain_sizes: &[Selector]) -> Selector {
    debug_assert_eq!(selectors.len(), selector_domain_sizes.len());
    let mut selector: Selector = 0;
    let mut weight: Selector = 1;
    for (&group, &size) in selectors.iter().zip(selector_domain_sizes) {
        selector = selector.wrapping_add(weight.wrapping_mul(group));
        weight = weight.wrapping_mul(size);
    }
    selector
}

/// Product of domain sizes, or `None` on overflow.
///
/// An empty slice has exactly one combination (the empty one).
#[inline]
pub fn domain_product(domain_sizes: &[u32]) -> Option<Selector> {
    domain_sizes
        .iter()
        .try_fold(1 as Selector, |acc, &size| acc.checked_mul(size as Selector))
}
