//! Cross-crate integration tests for the Umbra pipeline.
//!
//! Unit tests live next to the code they cover; this crate holds the suites
//! that cut across crate boundaries, chiefly the behavior-equivalence checks
//! that run corpus programs before and after obfuscation through the
//! evaluator in [`interp`] and compare what they do.
#![cfg(test)]

mod interp;
