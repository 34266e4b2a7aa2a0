//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises one service through the
//! public facade against a scripted co-processor.  All tests run on the
//! host with no real hardware required.

mod assoc_tests;
mod file_tests;
mod mock_dev;
mod regdomain_tests;
