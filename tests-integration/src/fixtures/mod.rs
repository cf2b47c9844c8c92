//! Test fixtures for integration testing
//!
//! Reusable contexts wiring a SQL record store, a SQL hold registry and a
//! bundle object store together the way the service does.

mod export_context;
mod storage_context;

pub use export_context::ExportTestContext;
pub use storage_context::StorageTestContext;
