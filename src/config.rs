use crate::error::ConfigError;

/// Random spread applied to each launch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LaunchJitter {
    /// Horizontal launch speed spread, px/s.
    pub horizontal: f32,
    /// Vertical launch speed spread, px/s.
    pub vertical: f32,
    /// Launch point spread along x, px.
    pub position: f32,
}

impl LaunchJitter {
    pub const fn none() -> Self {
        Self {
            horizontal: 0.0,
            vertical: 0.0,
            position: 0.0,
        }
    }
}

impl Default for LaunchJitter {
    fn default() -> Self {
        Self {
            horizontal: 24.0,
            vertical: 30.0,
            position: 20.0,
        }
    }
}

/// Relative odds of the two standard burst styles.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BurstWeights {
    pub radial: f32,
    pub dual: f32,
}

impl Default for BurstWeights {
    fn default() -> Self {
        Self {
            radial: 0.5,
            dual: 0.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FireworkConfig {
    /// Initial pool size; 1000/750/500 select the High/Medium/Low tiers.
    pub pool_size: usize,
    pub camera_follow: bool,
    pub burst_weights: BurstWeights,
    pub jitter: LaunchJitter,
    /// Fractions of display height a plain launch climbs before bursting.
    pub apex_range: (f32, f32),
    /// Trail roughening strength; 0 disables it.
    pub turbulence: f32,
    pub seed: Option<u64>,
}

impl Default for FireworkConfig {
    fn default() -> Self {
        Self {
            pool_size: 1000,
            camera_follow: true,
            burst_weights: BurstWeights::default(),
            jitter: LaunchJitter::default(),
            apex_range: (0.6, 0.85),
            turbulence: 0.4,
            seed: None,
        }
    }
}

impl FireworkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::EmptyPool);
        }

        let (min, max) = self.apex_range;
        if !(min > 0.0 && min <= max && max < 1.0) {
            return Err(ConfigError::ApexRange { min, max });
        }

        for (field, value) in [
            ("horizontal", self.jitter.horizontal),
            ("vertical", self.jitter.vertical),
            ("position", self.jitter.position),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Jitter { field, value });
            }
        }

        let BurstWeights { radial, dual } = self.burst_weights;
        if !(radial >= 0.0 && dual >= 0.0 && radial + dual > 0.0) {
            return Err(ConfigError::BurstWeights);
        }

        if !self.turbulence.is_finite() || self.turbulence < 0.0 {
            return Err(ConfigError::Turbulence(self.turbulence));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = FireworkConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.pool_size, 1000);
        assert!(config.camera_follow);
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = FireworkConfig::default();
        config.pool_size = 0;
        assert_eq!(config.validate(), Err(ConfigError::EmptyPool));

        let mut config = FireworkConfig::default();
        config.apex_range = (0.9, 0.6);
        assert!(matches!(config.validate(), Err(ConfigError::ApexRange { .. })));

        let mut config = FireworkConfig::default();
        config.jitter.vertical = -1.0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::Jitter {
                field: "vertical",
                value: -1.0
            })
        );

        let mut config = FireworkConfig::default();
        config.burst_weights = BurstWeights { radial: 0.0, dual: 0.0 };
        assert_eq!(config.validate(), Err(ConfigError::BurstWeights));

        let mut config = FireworkConfig::default();
        config.turbulence = f32::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::Turbulence(_))));
    }

    #[test]
    fn zero_jitter_is_allowed() {
        let config = FireworkConfig {
            jitter: LaunchJitter::none(),
            ..FireworkConfig::default()
        };
        assert_eq!(config.validate(), Ok(()));
    }
}
