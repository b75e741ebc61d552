#![deny(rust_2018_idioms, unused_import_braces, unused_lifetimes, unused_qualifications)]
#![forbid(unsafe_code)]

use {
    std::sync::Arc,
    serenity::{
        gateway::ShardManager,
        prelude::*,
    },
};

pub mod clash;
pub mod commands;
pub mod config;
pub mod counting;
pub mod parse;
pub mod status_roles;

/// `typemap` key for the serenity shard manager, used by the `quit` command.
pub struct ShardManagerContainer;

impl TypeMapKey for ShardManagerContainer {
    type Value = Arc<ShardManager>;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)] Clash(#[from] clash::Error),
    #[error(transparent)] Counting(#[from] counting::Error),
    #[error(transparent)] Io(#[from] std::io::Error),
    #[error(transparent)] Json(#[from] serde_json::Error),
    #[error(transparent)] Serenity(#[from] serenity::Error),
    #[error(transparent)] StatusRoles(#[from] status_roles::Error),
    /// Returned if the config is not present in Serenity context.
    #[error("config missing in Serenity context")]
    MissingConfig,
    /// Returned if one of the per-guild stores is not present in Serenity context.
    #[error("store missing in Serenity context")]
    MissingStore,
}
