use thiserror::Error;

/// The display could not be brought up; the simulation does not start.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("no drawable surface: {0}")]
    NoSurface(String),
    #[error("surface reported unusable metrics {width}x{height} @ {pixel_ratio}x")]
    InvalidMetrics {
        width: f32,
        height: f32,
        pixel_ratio: f32,
    },
    #[error("surface handshake failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A frame could not be presented and recovery did not bring the surface back.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render surface lost: {0}")]
    SurfaceLost(String),
    #[error("render surface not initialized")]
    NotInitialized,
    #[error("failed to write frame: {0}")]
    Io(#[from] std::io::Error),
}

/// Numeric fault inside a single entity step. Never escapes `update`: the
/// entity is retired on the spot.
#[derive(Debug, Error, PartialEq)]
pub enum EntityFault {
    #[error("{entity} {quantity} became non-finite")]
    NonFinite {
        entity: &'static str,
        quantity: &'static str,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("pool size must be at least 1")]
    EmptyPool,
    #[error("apex range {min}..{max} must satisfy 0 < min <= max < 1")]
    ApexRange { min: f32, max: f32 },
    #[error("launch jitter `{field}` must be finite and non-negative, got {value}")]
    Jitter { field: &'static str, value: f32 },
    #[error("burst weights must be non-negative and not both zero")]
    BurstWeights,
    #[error("turbulence strength must be finite and non-negative, got {0}")]
    Turbulence(f32),
}
