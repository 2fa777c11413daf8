//! Proxy selection
//!
//! The pool selects uniformly at random; the random source is owned by the
//! selector so tests can seed it.

mod random;

pub use random::RandomSelector;
