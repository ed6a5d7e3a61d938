pub mod cli;
pub mod config;
pub mod domain;
pub mod ingest;
pub mod storage;
pub mod tags;
pub mod worker;

#[cfg(test)]
pub mod testing;
