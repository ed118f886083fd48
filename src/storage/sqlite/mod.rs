//! `SQLite` implementation of the document store.
//!
//! - [`connection`]: lock acquisition, pragmas and the transaction wrapper
//! - [`metrics`]: storage operation metrics
//! - [`document_store`]: [`SqliteDocumentStore`]

mod connection;
mod document_store;
mod metrics;

pub use connection::{
    acquire_lock, configure_connection, in_transaction, is_unique_violation, sql_error,
};
pub use document_store::SqliteDocumentStore;
pub use metrics::{record_operation_metrics, timed};
