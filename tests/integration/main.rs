//! Integration test binary: all integration tests consolidated into a single
//! binary.
//!
//! See the matklad pattern: <https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html>

// Allow unwrap/expect in test code
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod helpers;

mod apply_lifecycle;
mod cli_apply;
mod download_retry;
mod end_to_end;
mod release_feed;
mod version_properties;
