//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod fixtures;
pub mod recording_sink;
