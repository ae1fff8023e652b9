//! # FlexConveyor application library
//!
//! Everything the `flexconveyor` binary is made of, exposed as a library so
//! integration tests can drive the API router and configuration directly.

pub mod api;
pub mod cli;
pub mod config;
pub mod store;
