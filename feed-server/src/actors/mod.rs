// feed-server/src/actors/mod.rs

pub mod hub_registry;
pub mod hub_session;
pub mod replay_sweeper;
