//! Secret provider implementations.

pub mod env;
pub mod file;
pub mod vault;
