pub mod app;
pub mod chart;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod ncbi;
pub mod output;
pub mod report;
