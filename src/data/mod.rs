pub mod source;
pub mod sqlite;
pub mod ticker;
pub mod types;
