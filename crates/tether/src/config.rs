//! Configuration loading and validation.
//!
//! All knobs live in one flat TOML table so a game can ship a
//! `tether.toml` next to its other data files. Every field has a
//! default; an empty string parses to the default configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tether_physics::PhysicsConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML text failed to parse.
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field parsed but holds a nonsensical value.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Host configuration for the whole layer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TetherConfig {
    /// Fixed physics step in seconds.
    pub fixed_dt: f32,
    /// World gravity vector.
    pub gravity: [f32; 3],
    /// Maximum fixed steps per tick before debt is forfeited.
    pub max_steps_per_tick: u32,
    /// Let the worker tick itself on wall-clock time. Disable for
    /// deterministic, host-driven stepping.
    pub free_run: bool,
}

impl Default for TetherConfig {
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            gravity: [0.0, -9.81, 0.0],
            max_steps_per_tick: 5,
            free_run: true,
        }
    }
}

impl TetherConfig {
    /// Parses a TOML document and validates it.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the physics loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.fixed_dt.is_finite() || self.fixed_dt <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "fixed_dt must be a positive number, got {}",
                self.fixed_dt
            )));
        }
        if self.max_steps_per_tick == 0 {
            return Err(ConfigError::Invalid(
                "max_steps_per_tick must be at least 1".into(),
            ));
        }
        if self.gravity.iter().any(|g| !g.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "gravity must be finite, got {:?}",
                self.gravity
            )));
        }
        Ok(())
    }

    /// The worker-side view of this configuration.
    #[must_use]
    pub fn to_physics(&self) -> PhysicsConfig {
        PhysicsConfig {
            fixed_dt: self.fixed_dt,
            gravity: self.gravity,
            max_steps_per_tick: self.max_steps_per_tick,
            free_run: self.free_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_the_default_config() {
        let config = TetherConfig::from_toml_str("").unwrap();
        assert_eq!(config.fixed_dt, 1.0 / 60.0);
        assert_eq!(config.gravity, [0.0, -9.81, 0.0]);
        assert!(config.free_run);
    }

    #[test]
    fn fields_override_defaults() {
        let config = TetherConfig::from_toml_str(
            r#"
            fixed_dt = 0.008333
            gravity = [0.0, -3.71, 0.0]
            max_steps_per_tick = 8
            free_run = false
            "#,
        )
        .unwrap();
        assert_eq!(config.max_steps_per_tick, 8);
        assert_eq!(config.gravity[1], -3.71);
        assert!(!config.free_run);
    }

    #[test]
    fn zero_dt_is_rejected() {
        assert!(matches!(
            TetherConfig::from_toml_str("fixed_dt = 0.0"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(matches!(
            TetherConfig::from_toml_str("gravity_scale = 2.0"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn zero_step_cap_is_rejected() {
        assert!(TetherConfig::from_toml_str("max_steps_per_tick = 0").is_err());
    }
}
