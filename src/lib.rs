// Library for tests to access modules

pub mod config;
pub mod error;
pub mod history_repo;
pub mod log_repo;
pub mod models;
pub mod persist;
pub mod retention;
pub mod sampler;
pub mod snapshot;
pub mod source;
pub mod stats;
pub mod version;
pub mod worker;
