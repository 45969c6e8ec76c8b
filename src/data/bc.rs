//! Boundary conditions as a tagged variant.

use crate::sweep_error::SweepError;

/// Incoming-flux rule for a boundary id.
///
/// `Reflecting` and `Robin` with `b != 0` read the outgoing flux of the
/// mirrored direction on the same face, which couples angle sets and is
/// resolved by the reflecting-boundary iteration.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum BoundaryCondition {
    /// No incoming flux.
    Vacuum,
    /// Fixed isotropic incoming angular flux, the same in every group.
    Dirichlet(f64),
    /// Incoming flux equals the outgoing flux of the mirrored direction.
    Reflecting,
    /// `a ψ_in + b ψ_out(mirror) = f`.
    Robin { a: f64, b: f64, f: f64 },
}

impl BoundaryCondition {
    /// Albedo boundary: a fraction `alpha` of the mirrored flux returns.
    pub fn albedo(alpha: f64) -> Self {
        BoundaryCondition::Robin {
            a: 1.0,
            b: -alpha,
            f: 0.0,
        }
    }

    pub fn is_mirror_coupled(&self) -> bool {
        match self {
            BoundaryCondition::Reflecting => true,
            BoundaryCondition::Robin { b, .. } => *b != 0.0,
            BoundaryCondition::Vacuum | BoundaryCondition::Dirichlet(_) => false,
        }
    }

    /// Incoming angular flux given the mirrored outgoing value (ignored when
    /// the condition is not mirror coupled).
    #[inline]
    pub fn incoming(&self, mirrored: f64) -> f64 {
        match *self {
            BoundaryCondition::Vacuum => 0.0,
            BoundaryCondition::Dirichlet(v) => v,
            BoundaryCondition::Reflecting => mirrored,
            BoundaryCondition::Robin { a, b, f } => (f - b * mirrored) / a,
        }
    }

    pub fn validate(&self, boundary_id: u64) -> Result<(), SweepError> {
        let ok = match *self {
            BoundaryCondition::Vacuum | BoundaryCondition::Reflecting => true,
            BoundaryCondition::Dirichlet(v) => v.is_finite(),
            BoundaryCondition::Robin { a, b, f } => {
                a != 0.0 && a.is_finite() && b.is_finite() && f.is_finite()
            }
        };
        if ok {
            Ok(())
        } else {
            Err(SweepError::InvalidConfig(format!(
                "boundary {boundary_id}: invalid condition {self:?}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn robin_reduces_to_known_cases() {
        let refl = BoundaryCondition::Robin {
            a: 1.0,
            b: -1.0,
            f: 0.0,
        };
        assert_eq!(refl.incoming(0.3), BoundaryCondition::Reflecting.incoming(0.3));
        let fixed = BoundaryCondition::Robin {
            a: 2.0,
            b: 0.0,
            f: 1.0,
        };
        assert!(!fixed.is_mirror_coupled());
        assert_eq!(fixed.incoming(99.0), 0.5);
        assert_eq!(BoundaryCondition::albedo(0.5).incoming(2.0), 1.0);
    }

    #[test]
    fn zero_robin_a_is_invalid() {
        let bc = BoundaryCondition::Robin {
            a: 0.0,
            b: 1.0,
            f: 0.0,
        };
        assert!(bc.validate(4).is_err());
        assert!(BoundaryCondition::Vacuum.validate(4).is_ok());
    }
}
