//! Shared helpers for lpd-ws integration tests.

pub mod mock_feed;
