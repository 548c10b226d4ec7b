//! Test utilities. The mock remote VM is available to this crate's own tests, and to other
//! crates with the `mock_test` feature.

pub mod fixtures;
pub mod mock_vm;
