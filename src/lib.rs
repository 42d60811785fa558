pub mod catalog;
pub mod cli;
pub mod collect;
pub mod config;
pub mod dedup;
pub mod discover;
pub mod error;
pub mod extract;
pub mod filter;
pub mod harvest;
pub mod label;
pub mod ledger;
pub mod matcher;
pub mod model;
pub mod mutation;
pub mod orchestrator;
pub mod parsers;
pub mod runner;
pub mod scan;
