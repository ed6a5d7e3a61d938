pub mod blobs;
pub mod catalog;
pub mod db;
pub mod error;
pub mod fs;
pub mod schema;
