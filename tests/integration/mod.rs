//! Integration test suite for ideagen.
//!
//! These tests drive the public API end to end: catalog, table, plan,
//! engine, transcript sinks and the multi-instance launcher.
//!
//! # Test Categories
//!
//! - `pipeline_e2e`: Full runs through `Pipeline` with a scripted model
//! - `graph_properties`: Plan ordering, determinism and validation errors
//! - `failure_propagation`: What a failed run leaves behind
//! - `launcher`: Multi-process relay and summary
//!
//! # CI Compatibility
//!
//! No test makes a network call: agents are answered by a scripted
//! `LanguageModel` and random values come from the local generator.

mod fixtures;

mod failure_propagation;
mod graph_properties;
mod launcher;
mod pipeline_e2e;
