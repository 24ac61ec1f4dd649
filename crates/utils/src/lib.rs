//! Shared utility types for the Umbra obfuscator: the error taxonomy used
//! across every pipeline stage, and deterministic seed plumbing.

pub mod errors;
pub mod seed;
