pub mod catalog;
pub mod hash;
pub mod metadata;
