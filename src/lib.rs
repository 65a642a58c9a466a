pub mod aggregate;
pub mod audit;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod firmware;
pub mod gates;
pub mod logging;
pub mod orchestrator;
pub mod remote;
pub mod report;
pub mod retry;
pub mod session;
pub mod ui;
