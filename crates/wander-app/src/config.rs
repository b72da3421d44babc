//! Host settings loaded from an optional JSON file plus environment overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wander_core::WheelConfig;
use wander_core::wheel::MAX_EXTRA_TURNS;
use wander_core::rewards::DEFAULT_LEVEL_SIZE;

const CONFIG_PATH_ENV: &str = "WANDER_CONFIG";
const USER_ENV: &str = "WANDER_USER";
const SEED_ENV: &str = "WANDER_SEED";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("WANDER_USER must not be empty")]
    EmptyUser,

    #[error("WANDER_SEED is not a number: {0:?}")]
    InvalidSeed(String),

    #[error("frame_rate must be positive")]
    InvalidFrameRate,

    #[error("wheel.extra_turns must be at most {max}, got {0}", max = MAX_EXTRA_TURNS)]
    TooManyTurns(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub wheel: WheelConfig,
    /// Frames per second of the spin driver.
    pub frame_rate: u32,
    pub level_size: u64,
    pub user_id: String,
    /// Fixed RNG seed; random when absent.
    pub seed: Option<u64>,
    pub canvas_width: f32,
    pub canvas_height: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            wheel: WheelConfig::default(),
            frame_rate: 60,
            level_size: DEFAULT_LEVEL_SIZE,
            user_id: "demo-user".to_string(),
            seed: None,
            canvas_width: 1080.0,
            canvas_height: 1080.0,
        }
    }
}

impl AppConfig {
    /// Reads `WANDER_CONFIG` (if set) and applies `WANDER_USER`/`WANDER_SEED`.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(
            std::env::var(USER_ENV).ok().as_deref(),
            std::env::var(SEED_ENV).ok().as_deref(),
        )?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_overrides(&mut self, user: Option<&str>, seed: Option<&str>) -> Result<(), ConfigError> {
        if let Some(user) = user {
            let user = user.trim();
            if user.is_empty() {
                return Err(ConfigError::EmptyUser);
            }
            self.user_id = user.to_string();
        }
        if let Some(seed) = seed {
            let parsed = seed
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidSeed(seed.to_string()))?;
            self.seed = Some(parsed);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_rate == 0 {
            return Err(ConfigError::InvalidFrameRate);
        }
        if self.wheel.extra_turns > MAX_EXTRA_TURNS {
            return Err(ConfigError::TooManyTurns(self.wheel.extra_turns));
        }
        Ok(())
    }

    /// Seconds per frame.
    #[allow(clippy::cast_precision_loss)]
    pub fn frame_interval(&self) -> f32 {
        1.0 / self.frame_rate.max(1) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = std::env::temp_dir().join(format!("wander-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, r#"{ "frame_rate": 30, "wheel": { "extra_turns": 3 } }"#).unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.frame_rate, 30);
        assert_eq!(config.wheel.extra_turns, 3);
        assert!((config.wheel.spin_duration - 4.0).abs() < f32::EPSILON);
        assert_eq!(config.user_id, "demo-user");

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(AppConfig::from_file(&path), Err(ConfigError::Parse { .. })));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            AppConfig::from_file(Path::new("/definitely/not/here.json")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let mut config = AppConfig::default();
        config.apply_overrides(Some(" ada "), Some("42")).unwrap();
        assert_eq!(config.user_id, "ada");
        assert_eq!(config.seed, Some(42));

        assert!(matches!(
            config.apply_overrides(None, Some("forty")),
            Err(ConfigError::InvalidSeed(_))
        ));
        assert!(matches!(
            config.apply_overrides(Some(""), None),
            Err(ConfigError::EmptyUser)
        ));
    }

    #[test]
    fn test_frame_interval() {
        let config = AppConfig {
            frame_rate: 50,
            ..AppConfig::default()
        };
        assert!((config.frame_interval() - 0.02).abs() < 1e-6);
        assert!(config.validate().is_ok());

        let broken = AppConfig {
            frame_rate: 0,
            ..AppConfig::default()
        };
        assert!(matches!(broken.validate(), Err(ConfigError::InvalidFrameRate)));
    }

    #[test]
    fn test_rejects_excessive_extra_turns() {
        let mut config = AppConfig::default();
        config.wheel.extra_turns = 4_000_000;
        assert!(matches!(config.validate(), Err(ConfigError::TooManyTurns(4_000_000))));

        config.wheel.extra_turns = MAX_EXTRA_TURNS;
        assert!(config.validate().is_ok());
    }
}
