// Database module
// SQLite holds the archive subjects and the embedding corpus that points at them

pub mod sqlite;

pub use sqlite::*;
