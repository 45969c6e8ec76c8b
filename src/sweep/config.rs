//! Sweep configuration.

use crate::algs::communicator::CollectiveTags;
use crate::sweep_error::SweepError;

/// How directions are grouped into angle sets.
///
/// Every rule is refined so directions in one set induce the same
/// face-orientation pattern on every rank.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AngleGrouping {
    /// One set per octant of the direction sphere.
    #[default]
    Octant,
    /// One set per distinct global face-orientation pattern.
    FacePattern,
    /// One set per direction.
    Single,
}

/// Fixed-point iteration controls for mirror-coupled boundaries.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ReflectingConfig {
    /// Relative change in scalar flux and reflected face flux below which the
    /// iteration stops.
    pub tolerance: f64,
    /// Maximum number of sweeps, including the first.
    pub max_iterations: usize,
}

impl Default for ReflectingConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 100,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub grouping: AngleGrouping,
    pub max_directions_per_set: Option<usize>,
    /// Angle-set executions interleaved at once on a rank.
    pub max_in_flight: usize,
    /// Completed remote faces that trigger a partial outgoing message.
    pub chunk_faces: usize,
    /// Cells processed by one execution before the scheduler moves on to the
    /// next in-flight angle set.
    pub cells_per_step: usize,
    /// Angle set `k` exchanges flux on tag `base_tag + k`.
    pub base_tag: u16,
    /// Tag base for grouping and convergence collectives.
    pub collective_tag: u16,
    pub max_idle_polls: Option<u64>,
    pub record_tasks: bool,
    pub reflecting: ReflectingConfig,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            grouping: AngleGrouping::Octant,
            max_directions_per_set: None,
            max_in_flight: 4,
            chunk_faces: 1,
            cells_per_step: 32,
            base_tag: 0x5300,
            collective_tag: 0x7E00,
            max_idle_polls: None,
            record_tasks: false,
            reflecting: ReflectingConfig::default(),
        }
    }
}

impl SweepConfig {
    pub fn validate(&self) -> Result<(), SweepError> {
        let bad = |m: &str| Err(SweepError::InvalidConfig(m.to_string()));
        if self.max_in_flight == 0 {
            return bad("max_in_flight must be at least 1");
        }
        if self.chunk_faces == 0 {
            return bad("chunk_faces must be at least 1");
        }
        if self.cells_per_step == 0 {
            return bad("cells_per_step must be at least 1");
        }
        if self.max_directions_per_set == Some(0) {
            return bad("max_directions_per_set must be at least 1");
        }
        if self.reflecting.max_iterations == 0 {
            return bad("reflecting.max_iterations must be at least 1");
        }
        if !(self.reflecting.tolerance > 0.0) {
            return bad("reflecting.tolerance must be positive");
        }
        self.validate_tags(1)
    }

    /// Check that the flux tags of `num_sets` angle sets fit in a `u16` and
    /// stay clear of the collective tags.
    pub fn validate_tags(&self, num_sets: usize) -> Result<(), SweepError> {
        let limit = usize::from(u16::MAX) + 1;
        let flux = usize::from(self.base_tag)..usize::from(self.base_tag) + num_sets;
        let collective = usize::from(self.collective_tag)
            ..usize::from(self.collective_tag) + usize::from(CollectiveTags::SPAN);
        if flux.end > limit || collective.end > limit {
            return Err(SweepError::InvalidConfig(format!(
                "tags {flux:?} for {num_sets} angle sets or collective tags {collective:?} exceed u16"
            )));
        }
        if flux.start < collective.end && collective.start < flux.end {
            return Err(SweepError::InvalidConfig(format!(
                "flux tags {flux:?} for {num_sets} angle sets overlap collective tags {collective:?}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(SweepConfig::default().validate().is_ok());
    }

    #[test]
    fn flux_tags_must_clear_collective_tags() {
        let cfg = SweepConfig::default();
        let room = usize::from(cfg.collective_tag - cfg.base_tag);
        assert!(cfg.validate_tags(room).is_ok());
        assert!(matches!(
            cfg.validate_tags(room + 1),
            Err(SweepError::InvalidConfig(_))
        ));

        let clash = SweepConfig {
            base_tag: 0x7E01,
            ..Default::default()
        };
        assert!(clash.validate().is_err());

        let top = SweepConfig {
            base_tag: u16::MAX - 3,
            collective_tag: 0x100,
            ..Default::default()
        };
        assert!(top.validate_tags(4).is_ok());
        assert!(top.validate_tags(5).is_err());
    }

    #[test]
    fn zero_window_is_rejected() {
        let cfg = SweepConfig {
            max_in_flight: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
