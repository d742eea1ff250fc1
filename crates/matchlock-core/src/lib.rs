//! Shared primitives for the Matchlock host-side sandbox supervisor.
//!
//! This crate has no opinions about async runtimes or I/O; it holds the
//! pure, synchronous building blocks (host-glob matching, host/port
//! parsing, private-address detection, and the wire/filesystem contract
//! constants) that every other `matchlock-*` crate depends on.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Wire/filesystem contract constants shared with the guest and launcher.
pub mod contract;
/// Host-glob matching for policy allow-lists.
pub mod glob;
/// Host/port parsing and private-address detection.
pub mod host;
/// Synthesized inode numbers for providers with no physical inode.
pub mod inode;
