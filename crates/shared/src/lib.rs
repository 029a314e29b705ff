//! Shared utilities for the Guardian monitoring agent.
//!
//! This crate provides common functionality used across the other crates:
//! - Cryptographic utilities (HMAC payload signing)

pub mod crypto;
