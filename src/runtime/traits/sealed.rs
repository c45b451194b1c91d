// ABOUTME: Sealed marker for the runtime capability traits.
// ABOUTME: Only runtimes defined in this crate may implement them.

/// Implemented by the in-crate runtimes only.
pub trait Sealed {}
