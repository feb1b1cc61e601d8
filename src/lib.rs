pub mod cli;
pub mod diag;
pub mod error;
pub mod ingest;
pub mod policy;
pub mod profile;
pub mod rule;
