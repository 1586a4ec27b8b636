pub mod config;
pub mod coordinator;
pub mod departures;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod infra;
pub mod notify;
pub mod output;
pub mod parser;
pub mod ranker;
pub mod sensors;
pub mod services;
pub mod status;
pub mod time;
