pub mod bootstrap;
pub mod config;
pub mod daemon;
pub mod logging;
pub mod pool;
pub mod runner;
