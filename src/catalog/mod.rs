//! Catalog module
//!
//! Schema metadata, the type system and the system catalog.

mod catalog;
pub mod schema;
pub mod types;

pub use catalog::{canonical, Catalog, IndexDescriptor, TableDescriptor, TableState};
pub use schema::{Column, ForeignKey, IndexDef, TableSchema};
pub use types::DataType;
