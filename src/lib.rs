pub mod config;
pub mod dispatch;
pub mod engine;
pub mod model;
pub mod observability;
pub mod slot;
pub mod sweeper;
pub mod wal;
