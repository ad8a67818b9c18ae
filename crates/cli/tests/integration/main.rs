//! CLI integration tests.

mod build_tests;
mod clean_tests;
mod common;
mod status_tests;
mod visual_tests;
