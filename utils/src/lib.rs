#![cfg_attr(feature = "strict", deny(warnings))]

mod output_bytes;
pub use output_bytes::output_bytes;

mod guards;
pub use guards::EnvVarGuard;

pub mod configuration_utils;

// Macros configurable_constants! and test_set_constants! are exported at crate root by
// #[macro_export]
