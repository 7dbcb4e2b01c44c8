use std::fmt::Display;
use std::hash::Hash;

/// Trait for types that can be used to identify batches.
///
/// `Ord` gives every evaluation the same batch order, `Display` is used for
/// diagnostics and logging.
pub trait BatchIdentifier: Clone + Eq + Hash + Ord + Display {}

// Implement BatchIdentifier for common types
impl BatchIdentifier for String {}
impl BatchIdentifier for &str {}
impl BatchIdentifier for i32 {}
impl BatchIdentifier for u32 {}
impl BatchIdentifier for usize {}

/// Values below this are treated as zero variance.
pub(crate) const VARIANCE_FLOOR: f64 = 1e-12;
