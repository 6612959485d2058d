pub mod auth;
pub mod clock;
pub mod config;
pub mod directory;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod sweeper;
pub mod wal;
