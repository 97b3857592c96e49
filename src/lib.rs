#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

//! Coordination core for a fleet of heterogeneous field robots.
//!
//! Three engines share one world model:
//! - [`ConsensusEngine`] keeps a single swarm leader elected and replicates
//!   state to a majority over a partial-connectivity mesh.
//! - [`FormationController`] maintains spatial coherence with flocking
//!   dynamics and virtual structures on geodetic coordinates.
//! - [`TaskAllocator`] matches pending work to robots with a market-based
//!   auction and a greedy min-cost assignment pass.
//!
//! The world model is exclusively borrowed by whichever engine is running;
//! every operation runs to completion and returns plain data.

pub mod allocator;
pub mod consensus;
pub mod error;
pub mod formation;
pub mod geo;
pub mod graph;
pub mod rng;
pub mod time;
pub mod world;

pub mod test_utils;

pub use allocator::TaskAllocator;
pub use consensus::ConsensusEngine;
pub use error::{Error, Result};
pub use formation::FormationController;
pub use rng::SwarmRng;
pub use world::WorldModel;
