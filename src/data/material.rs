//! Cross sections, sources and boundary assignments for one sweep problem.

use crate::data::bc::BoundaryCondition;
use crate::data::flux::SourceMoments;
use crate::data::quadrature::Quadrature;
use crate::sweep_error::SweepError;
use crate::topology::cell::FaceNeighbor;
use crate::topology::mesh::PartitionedMesh;
use std::collections::BTreeMap;

/// Per-group total cross sections of one material.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Material {
    pub sigma_t: Vec<f64>,
}

impl Material {
    pub fn new(sigma_t: impl Into<Vec<f64>>) -> Self {
        Self {
            sigma_t: sigma_t.into(),
        }
    }
}

/// Everything the sweep needs besides mesh and quadrature.
#[derive(Clone, Debug)]
pub struct TransportProblem {
    pub num_groups: usize,
    /// 1 (scalar flux only) or 4 (scalar flux plus current).
    pub num_moments: usize,
    pub materials: BTreeMap<u32, Material>,
    /// Source moments over the local cells.
    pub source: SourceMoments,
    pub boundaries: BTreeMap<u64, BoundaryCondition>,
}

impl TransportProblem {
    /// One material (id 0) with uniform cross section and isotropic source.
    pub fn uniform(
        mesh: &PartitionedMesh,
        num_groups: usize,
        sigma_t: f64,
        source: f64,
        boundaries: impl IntoIterator<Item = (u64, BoundaryCondition)>,
    ) -> Self {
        Self {
            num_groups,
            num_moments: 1,
            materials: BTreeMap::from([(0, Material::new(vec![sigma_t; num_groups]))]),
            source: SourceMoments::isotropic(mesh.num_cells(), 1, num_groups, source),
            boundaries: boundaries.into_iter().collect(),
        }
    }

    pub fn material(&self, id: u32) -> Option<&Material> {
        self.materials.get(&id)
    }

    pub fn boundary(&self, id: u64) -> Option<&BoundaryCondition> {
        self.boundaries.get(&id)
    }

    /// Configuration checks that must pass before any sweep executes.
    ///
    /// Mirror lookup for reflecting faces happens per angle set during graph
    /// construction.
    pub fn validate(&self, mesh: &PartitionedMesh, quadrature: &Quadrature) -> Result<(), SweepError> {
        if self.num_groups == 0 {
            return Err(SweepError::InvalidConfig("zero energy groups".into()));
        }
        if self.num_moments != 1 && self.num_moments != 4 {
            return Err(SweepError::InvalidConfig(format!(
                "unsupported moment count {}",
                self.num_moments
            )));
        }
        if quadrature.is_empty() {
            return Err(SweepError::InvalidDirection("empty quadrature".into()));
        }
        for (id, m) in &self.materials {
            if m.sigma_t.len() != self.num_groups {
                return Err(SweepError::GroupCountMismatch {
                    what: format!("material {id} sigma_t"),
                    expected: self.num_groups,
                    got: m.sigma_t.len(),
                });
            }
            if m.sigma_t.iter().any(|s| !(*s >= 0.0) || !s.is_finite()) {
                return Err(SweepError::InvalidConfig(format!(
                    "material {id} has a negative or non-finite cross section"
                )));
            }
        }
        if self.source.num_cells() != mesh.num_cells()
            || self.source.num_moments() != self.num_moments
            || self.source.num_groups() != self.num_groups
        {
            return Err(SweepError::InvalidConfig(format!(
                "source shape {}x{}x{} does not match {} cells, {} moments, {} groups",
                self.source.num_cells(),
                self.source.num_moments(),
                self.source.num_groups(),
                mesh.num_cells(),
                self.num_moments,
                self.num_groups
            )));
        }
        for (id, bc) in &self.boundaries {
            bc.validate(*id)?;
        }
        for cell in mesh.cells() {
            if !self.materials.contains_key(&cell.material) {
                return Err(SweepError::UnknownMaterial {
                    cell: cell.id,
                    material: cell.material,
                });
            }
            for (f, face) in cell.faces.iter().enumerate() {
                if let FaceNeighbor::Boundary(b) = face.neighbor {
                    if !self.boundaries.contains_key(&b) {
                        return Err(SweepError::UnassignedBoundary {
                            cell: cell.id,
                            face: f,
                            boundary_id: b,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::meshgen::{boundary, uniform_slab};

    #[test]
    fn missing_boundary_is_a_configuration_error() {
        let mesh = uniform_slab(2, 1.0, 1).unwrap().remove(0);
        let q = Quadrature::gauss_legendre_slab(2).unwrap();
        let p = TransportProblem::uniform(&mesh, 1, 1.0, 1.0, [(boundary::XMIN, BoundaryCondition::Vacuum)]);
        assert!(matches!(
            p.validate(&mesh, &q),
            Err(SweepError::UnassignedBoundary { boundary_id: 1, .. })
        ));
    }

    #[test]
    fn group_mismatch_is_reported() {
        let mesh = uniform_slab(2, 1.0, 1).unwrap().remove(0);
        let q = Quadrature::gauss_legendre_slab(2).unwrap();
        let mut p = TransportProblem::uniform(
            &mesh,
            2,
            1.0,
            1.0,
            [
                (boundary::XMIN, BoundaryCondition::Vacuum),
                (boundary::XMAX, BoundaryCondition::Vacuum),
            ],
        );
        assert!(p.validate(&mesh, &q).is_ok());
        p.materials.insert(0, Material::new(vec![1.0]));
        assert!(matches!(
            p.validate(&mesh, &q),
            Err(SweepError::GroupCountMismatch { .. })
        ));
    }
}
