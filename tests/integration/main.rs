//! Integration tests for Sumi-Harvest
//!
//! These tests use wiremock to create mock HTTP servers and run tasks
//! end-to-end through the real HTTP transport and SQLite storage.

mod harvest_tests;
