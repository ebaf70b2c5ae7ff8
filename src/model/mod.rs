//! Core data model types for mptrie

mod hash;
mod nibbles;

pub use hash::Hash;
pub use nibbles::{common_prefix_len, pack_nibbles, NibblePath};
