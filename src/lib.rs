//! Firework particle simulation: rockets climb, burst into layered streak
//! trails and pooled embers, and fade. The core draws through the
//! [`surface::Canvas`] contract; [`terminal`] supplies a crossterm display.

pub mod color;
pub mod config;
pub mod error;
pub mod math;
pub mod particle;
pub mod pool;
pub mod surface;
pub mod system;
pub mod terminal;
pub mod trail;

pub use config::{BurstWeights, FireworkConfig, LaunchJitter};
pub use error::{ConfigError, EntityFault, InitError, RenderError};
pub use math::Vector3;
pub use system::{BurstStyle, FireworkSystem, FpsMonitor, FuseLaunch, PerformanceMode};
