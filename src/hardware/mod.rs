//! Hardware implementations of the flyable capabilities.
//!
//! Only simulated devices live here; real drivers implement the traits in
//! [`crate::capabilities`] in their own crates.

pub mod mock;
