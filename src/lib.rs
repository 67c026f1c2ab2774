pub mod cli;
pub mod config;
pub mod flock;
pub mod graph;
pub mod logs;
pub mod model;
pub mod oracle;
pub mod packages;
pub mod process;
pub mod registry;
pub mod resolver;
pub mod setup;
pub mod state;
pub mod tempest;

mod api;

pub use api::{RegressStack, RegressStackBuilder};
