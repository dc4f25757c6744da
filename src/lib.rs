pub mod batch;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod provisioner;
pub mod resolver;
pub mod retry;
pub mod spotify;
pub mod writer;
