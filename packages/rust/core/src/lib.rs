//! Core pipeline orchestration and domain logic for outlinekb.
//!
//! This crate ties together outline reading, knowledge-base materialization,
//! and hook answering into end-to-end workflows (e.g., `build_kb`, `fill_hooks`).

pub mod hooks;
pub mod materializer;
pub mod pipeline;
pub mod source;
