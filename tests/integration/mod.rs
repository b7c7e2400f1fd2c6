//! Integration test suite for binswap
//!
//! End-to-end checks of the update engine against a local HTTP stub server,
//! plus CLI tests of the `binswap` binary.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **probing**: remote sources, fallbacks and the max-across-sources rule
//! - **download**: streaming downloads, truncation and cleanup
//! - **update_flow**: full update checks with real prober and downloader
//! - **cli**: the command-line tool

mod cli;
mod download;
mod probing;
mod update_flow;
