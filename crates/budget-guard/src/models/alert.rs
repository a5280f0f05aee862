//! Alert data models

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Alert severity for a day's spend
///
/// Ordered so that `Ok < Soft < Hard`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Spend is at or below the soft threshold
    #[default]
    Ok,
    /// Spend is above the soft threshold, at or below the hard threshold
    Soft,
    /// Spend is above the hard threshold
    Hard,
}

impl Severity {
    /// Lowercase label used in logs and reports
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Soft => "soft",
            Self::Hard => "hard",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Daily spend ceilings, in dollars
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Crossing this only alerts
    pub soft_dollars: f64,
    /// Crossing this alerts and triggers the kill switch
    pub hard_dollars: f64,
}

impl ThresholdConfig {
    /// Build a validated threshold pair
    pub fn new(soft_dollars: f64, hard_dollars: f64) -> Result<Self> {
        let thresholds = Self {
            soft_dollars,
            hard_dollars,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Check `0 <= soft <= hard` with finite values
    pub fn validate(&self) -> Result<()> {
        if !self.soft_dollars.is_finite() || !self.hard_dollars.is_finite() {
            return Err(Error::validation(format!(
                "thresholds must be finite numbers (soft={}, hard={})",
                self.soft_dollars, self.hard_dollars
            )));
        }
        if self.soft_dollars < 0.0 {
            return Err(Error::validation(format!(
                "soft threshold must not be negative (soft={})",
                self.soft_dollars
            )));
        }
        if self.soft_dollars > self.hard_dollars {
            return Err(Error::validation(format!(
                "soft threshold {} is above hard threshold {}",
                self.soft_dollars, self.hard_dollars
            )));
        }
        Ok(())
    }
}
