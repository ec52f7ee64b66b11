pub mod loader;
pub mod schema_gen;
pub mod sqlite;

pub use loader::{load_rowset, write_intermediate, LoadOutcome, LoadPath};
pub use schema_gen::{generate_create_table, generate_insert, quote_ident, synthesize, to_wide};
pub use sqlite::{BulkLoadOptions, Warehouse, STORE_TARGET};
