//! Wheeled and tracked vehicle dynamics.
//!
//! A [`vehicle::Vehicle`] owns immutable params and a plain-data state, and is
//! advanced by a [`schedule::ComponentSequence`] of components (command
//! response, road queries, suspension, tires, drivetrain, rigid body) whose
//! inner group runs several substeps per outer update. [`physics::PhysicsWorld`]
//! hosts vehicles in a rapier scene.

pub mod command;
pub mod config;
pub mod connector;
pub mod context;
pub mod drivetrain;
pub mod error;
pub mod fixed;
pub mod physics;
pub mod presets;
pub mod rigid_body;
pub mod road;
pub mod schedule;
pub mod suspension;
pub mod telemetry;
pub mod tire;
pub mod types;
pub mod vehicle;
pub mod wheel;
