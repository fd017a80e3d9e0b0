//! Storage engine module
//!
//! Runtime values, the ordered B-tree index and the durable row store.

pub mod btree;
pub mod store;
pub mod value;

pub use btree::BTreeIndex;
pub use store::{StoredRow, TableStore};
pub use value::{Row, Value};
