//! Game simulation modules

pub mod bots;
pub mod intent;
pub mod map;
pub mod motion;
pub mod physics;
pub mod rapier;
pub mod registry;
pub mod simulation;
pub mod snapshot;
pub mod world;

pub use intent::PlayerIntent;
pub use world::{GameWorld, WorldError, WorldHandle};
