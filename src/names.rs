//! Vector/swizzle-aware display names for lane ranges.
//!
//! Lanes are grouped four to a vector. A range inside one vector renders as
//! `prefix[v].swizzle`; a range spanning vectors renders every touched vector:
//!
//! ```text
//! range_name("P", 4, 4)  → ("P[1]", true)
//! range_name("P", 1, 2)  → ("P[0].yz", true)
//! range_name("P", 2, 8)  → ("P[0].zw, [1], [2].xy", false)
//! ```

use std::fmt::Write as _;

const COMPONENTS: &[u8; 4] = b"xyzw";

/// Swizzle suffix for components `first..=last` of one vector.
///
/// The full vector has no suffix.
fn swizzle(first: u32, last: u32) -> String {
    if first == 0 && last == 3 {
        return String::new();
    }
    let mut out = String::with_capacity(5);
    out.push('.');
    for &c in &COMPONENTS[first as usize..=last as usize] {
        out.push(c as char);
    }
    out
}

/// Name a range of `element_count` lanes starting at lane `element_offset`.
///
/// Returns `(None, false)` for empty or negative ranges. The flag is `true`
/// when the range lies inside a single vector, in which case edits must be
/// component-wise.
pub fn range_name(prefix: &str, element_offset: i32, element_count: i32) -> (Option<String>, bool) {
    if element_count <= 0 || element_offset < 0 {
        return (None, false);
    }
    let last = element_offset as i64 + element_count as i64 - 1;
    let first_vector = (element_offset >> 2) as i64;
    let last_vector = last >> 2;
    let first_component = (element_offset & 3) as u32;
    let last_component = (last & 3) as u32;

    if first_vector == last_vector {
        let name = format!(
            "{prefix}[{first_vector}]{}",
            swizzle(first_component, last_component)
        );
        return (Some(name), true);
    }

    let mut name = format!("{prefix}[{first_vector}]{}", swizzle(first_component, 3));
    for vector in first_vector + 1..last_vector {
        let _ = write!(name, ", [{vector}]");
    }
    let _ = write!(name, ", [{last_vector}]{}", swizzle(0, last_component));
    (Some(name), false)
}
