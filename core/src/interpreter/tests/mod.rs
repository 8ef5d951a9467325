//! Engine tests
//!
//! Organized by statement family

mod builder_tests;
mod for_tests;
mod helpers;
