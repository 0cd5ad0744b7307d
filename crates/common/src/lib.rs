//! Cross-crate helpers shared by the store and its binary.

pub mod utils;
