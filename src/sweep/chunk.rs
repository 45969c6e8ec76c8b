//! Per-cell kernel contract.
//!
//! The scheduler gathers everything one cell needs for one direction into a
//! [`CellInput`]; the kernel returns the cell-average angular flux and the
//! value on every outgoing face. Moment accumulation stays in the scheduler,
//! so a kernel has no side effects outside its output slices.

use crate::sweep_error::SweepError;
use crate::topology::cell::{CellId, Vec3};

/// Inputs of one cell for one direction, all groups.
///
/// Face lists hold only incoming (respectively outgoing) faces, in the
/// cell's face order; faces parallel to the direction are omitted.
#[derive(Clone, Debug)]
pub struct CellInput<'a> {
    pub cell: CellId,
    pub volume: f64,
    pub omega: Vec3,
    pub num_groups: usize,
    /// Total cross section per group.
    pub sigma_t: &'a [f64],
    /// Angular source per group.
    pub source: &'a [f64],
    /// `|ω·n| A` per incoming face.
    pub incoming_coeff: &'a [f64],
    /// Upwind angular flux, `incoming_coeff.len() × num_groups`, face-major.
    pub incoming_psi: &'a [f64],
    /// `|ω·n| A` per outgoing face.
    pub outgoing_coeff: &'a [f64],
}

pub trait SweepChunk: Send + Sync {
    /// Fill `psi` (`num_groups`) and `outgoing`
    /// (`outgoing_coeff.len() × num_groups`, face-major).
    fn compute_cell(
        &self,
        input: &CellInput<'_>,
        psi: &mut [f64],
        outgoing: &mut [f64],
    ) -> Result<(), SweepError>;
}

/// Step (upwind) finite-volume balance:
/// `ψ = (q V + Σ_in c ψ_in) / (σ V + Σ_out c)`, and every outgoing face
/// carries the cell value.
#[derive(Copy, Clone, Debug, Default)]
pub struct StepKernel;

impl SweepChunk for StepKernel {
    fn compute_cell(
        &self,
        input: &CellInput<'_>,
        psi: &mut [f64],
        outgoing: &mut [f64],
    ) -> Result<(), SweepError> {
        let g_n = input.num_groups;
        let leak: f64 = input.outgoing_coeff.iter().sum();
        for g in 0..g_n {
            let inflow: f64 = input
                .incoming_coeff
                .iter()
                .enumerate()
                .map(|(f, c)| c * input.incoming_psi[f * g_n + g])
                .sum();
            let denom = input.sigma_t[g] * input.volume + leak;
            if !(denom > 0.0) {
                return Err(SweepError::Kernel {
                    cell: input.cell,
                    message: format!("non-positive balance denominator {denom} in group {g}"),
                });
            }
            psi[g] = (input.source[g] * input.volume + inflow) / denom;
        }
        for face in outgoing.chunks_exact_mut(g_n) {
            face.copy_from_slice(&psi[..g_n]);
        }
        Ok(())
    }
}
