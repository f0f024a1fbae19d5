pub mod aggregate;
pub mod author;
pub mod cache;
pub mod cli;
pub mod config;
pub mod dedupe;
pub mod error;
pub mod estimate;
pub mod export;
pub mod git;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod prompt;
pub mod report;
pub mod util;
