pub mod error;
pub mod license;
pub mod metadata;
pub mod parser;
pub mod report;
pub mod runner;
pub mod scanner;
pub mod sink;
pub mod webhook;
