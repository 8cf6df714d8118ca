//! Construction-time settings for the GSN-EDF-M plugin.

use crate::core::UnitId;
use crate::error::{SchedError, SchedResult};

/// Scheduler configuration.
///
/// Optional capabilities (affinity resolver, budget arbiter, clock, job
/// lifecycle) are not part of this struct; they are injected through
/// [`crate::scheduler::GsnEdfMBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedConfig {
    /// Size of the unit table. Default: 4.
    pub num_units: usize,
    /// Unit that never runs real-time jobs (it only handles releases).
    /// Default: none.
    pub release_master: Option<UnitId>,
    /// Before the global preemption loop, link a ready job directly to the
    /// invoking unit when that unit is idle. Default: true.
    pub prefer_local_linking: bool,
    /// Emit a `trace!` event for every link and scheduling decision.
    /// Default: true.
    pub trace_all_events: bool,
    /// Keep a drainable in-memory log of [`crate::core::SchedEvent`]s.
    /// Default: true.
    pub record_events: bool,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            num_units: 4,
            release_master: None,
            prefer_local_linking: true,
            trace_all_events: true,
            record_events: true,
        }
    }
}

impl SchedConfig {
    /// Config for `num_units` units with every other setting at its default.
    #[must_use]
    pub fn with_units(num_units: usize) -> Self {
        Self {
            num_units,
            ..Self::default()
        }
    }

    /// Check the settings for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`SchedError::InvalidConfig`] when there are no units, or the
    /// release master lies outside the unit table.
    pub fn validate(&self) -> SchedResult<()> {
        if self.num_units == 0 {
            return Err(SchedError::InvalidConfig(
                "num_units must be at least 1".to_owned(),
            ));
        }
        if let Some(rm) = self.release_master {
            if rm >= self.num_units {
                return Err(SchedError::InvalidConfig(format!(
                    "release master {rm} is outside the {} configured units",
                    self.num_units
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SchedConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_units_rejected() {
        let err = SchedConfig::with_units(0).validate().unwrap_err();
        assert!(matches!(err, SchedError::InvalidConfig(_)));
    }

    #[test]
    fn release_master_must_be_in_range() {
        let config = SchedConfig {
            release_master: Some(4),
            ..SchedConfig::with_units(4)
        };
        assert!(config.validate().is_err());

        let config = SchedConfig {
            release_master: Some(3),
            ..SchedConfig::with_units(4)
        };
        assert!(config.validate().is_ok());
    }
}
