// src/config.rs

use crate::types::Config;
use anyhow::{bail, Context, Result};
use std::fs;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("failed to read config {path}"))?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.capture.fps <= 0.0 {
            bail!("capture.fps must be > 0, got {}", self.capture.fps);
        }
        if self.capture.px_per_mm <= 0.0 {
            bail!(
                "capture.px_per_mm must be > 0, got {}",
                self.capture.px_per_mm
            );
        }
        for (name, t) in [
            ("classes.counting", &self.classes.counting),
            ("classes.tracking", &self.classes.tracking),
        ] {
            if !(t[0] < t[1] && t[1] < t[2]) {
                bail!("{name} thresholds must be strictly increasing, got {t:?}");
            }
        }
        Ok(())
    }
}
