//! Helpers for integration tests: throwaway databases and scripted provider adapters.
pub mod prepare_env;
pub mod scripted;
