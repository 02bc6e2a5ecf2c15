pub mod adapter;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod enrich;
pub mod indicators;
pub mod metrics;
pub mod model;
pub mod session;
pub mod store;
pub mod universe;

pub mod error;
pub mod logger;
pub mod time;
