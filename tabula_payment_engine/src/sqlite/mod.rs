//! SQLite ledger backend for the Tabula payment engine.

mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteLedger;
