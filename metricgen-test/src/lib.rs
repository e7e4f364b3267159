//! Test utilities for the metric generators.
//!
//! This crate provides utilities to facilitate testing the generators against a real HTTP
//! endpoint. See the modules for all available utilities.

pub mod server;
pub mod tracing;
