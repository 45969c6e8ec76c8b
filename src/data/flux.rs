//! Dense `[cell][moment][group]` fields for flux and source moments.

use crate::sweep_error::SweepError;

/// Dense moment field over the local cells of one partition.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MomentField {
    num_cells: usize,
    num_moments: usize,
    num_groups: usize,
    values: Vec<f64>,
}

/// Scalar-flux moments produced by a sweep.
pub type ScalarFluxField = MomentField;
/// Isotropic and anisotropic source moments consumed by a sweep.
pub type SourceMoments = MomentField;

impl MomentField {
    pub fn zeros(num_cells: usize, num_moments: usize, num_groups: usize) -> Self {
        Self {
            num_cells,
            num_moments,
            num_groups,
            values: vec![0.0; num_cells * num_moments * num_groups],
        }
    }

    /// Same isotropic value in every cell and group, zero higher moments.
    pub fn isotropic(num_cells: usize, num_moments: usize, num_groups: usize, value: f64) -> Self {
        let mut f = Self::zeros(num_cells, num_moments, num_groups);
        for c in 0..num_cells {
            for g in 0..num_groups {
                f.set(c, 0, g, value);
            }
        }
        f
    }

    pub fn num_cells(&self) -> usize {
        self.num_cells
    }
    pub fn num_moments(&self) -> usize {
        self.num_moments
    }
    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    #[inline]
    fn idx(&self, cell: usize, moment: usize, group: usize) -> usize {
        (cell * self.num_moments + moment) * self.num_groups + group
    }

    #[inline]
    pub fn get(&self, cell: usize, moment: usize, group: usize) -> f64 {
        self.values[self.idx(cell, moment, group)]
    }

    #[inline]
    pub fn set(&mut self, cell: usize, moment: usize, group: usize, v: f64) {
        let i = self.idx(cell, moment, group);
        self.values[i] = v;
    }

    #[inline]
    pub fn add(&mut self, cell: usize, moment: usize, group: usize, v: f64) {
        let i = self.idx(cell, moment, group);
        self.values[i] += v;
    }

    /// All moments and groups of one cell.
    pub fn cell(&self, cell: usize) -> &[f64] {
        let n = self.num_moments * self.num_groups;
        &self.values[cell * n..(cell + 1) * n]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn fill(&mut self, v: f64) {
        self.values.fill(v);
    }

    fn check_shape(&self, other: &Self) -> Result<(), SweepError> {
        if (self.num_cells, self.num_moments, self.num_groups)
            != (other.num_cells, other.num_moments, other.num_groups)
        {
            return Err(SweepError::InvalidConfig(format!(
                "moment field shape {}x{}x{} does not match {}x{}x{}",
                self.num_cells,
                self.num_moments,
                self.num_groups,
                other.num_cells,
                other.num_moments,
                other.num_groups
            )));
        }
        Ok(())
    }

    /// Element-wise `self += other`.
    pub fn accumulate(&mut self, other: &Self) -> Result<(), SweepError> {
        self.check_shape(other)?;
        for (a, b) in self.values.iter_mut().zip(&other.values) {
            *a += *b;
        }
        Ok(())
    }

    /// `max |self - prev| / max |self|` over the scalar (moment 0) entries.
    pub fn max_relative_change(&self, prev: &Self) -> Result<f64, SweepError> {
        self.check_shape(prev)?;
        let mut diff = 0.0f64;
        let mut scale = 0.0f64;
        for c in 0..self.num_cells {
            for g in 0..self.num_groups {
                let (a, b) = (self.get(c, 0, g), prev.get(c, 0, g));
                diff = diff.max((a - b).abs());
                scale = scale.max(a.abs());
            }
        }
        Ok(if scale > 0.0 { diff / scale } else { diff })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_cell_moment_group() {
        let mut f = MomentField::zeros(2, 4, 3);
        f.set(1, 2, 0, 7.0);
        assert_eq!(f.cell(1)[2 * 3], 7.0);
        assert_eq!(f.as_slice().len(), 24);
    }

    #[test]
    fn relative_change_uses_scalar_moment() {
        let a = MomentField::isotropic(2, 1, 1, 2.0);
        let mut b = a.clone();
        b.set(0, 0, 0, 1.0);
        assert!((a.max_relative_change(&b).unwrap() - 0.5).abs() < 1e-15);
        assert!(a.max_relative_change(&MomentField::zeros(3, 1, 1)).is_err());
    }
}
