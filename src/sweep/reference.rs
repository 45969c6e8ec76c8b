//! Sequential reference sweep for single-partition meshes.
//!
//! One direction at a time, cells are visited in a first-in first-out Kahn
//! order and face values live in a plain map. No angle sets, FLUDS or
//! messages are involved, which makes it an independent oracle for the
//! pipelined scheduler.

use crate::data::flux::ScalarFluxField;
use crate::data::material::TransportProblem;
use crate::data::quadrature::Quadrature;
use crate::sweep::chunk::{CellInput, SweepChunk};
use crate::sweep::graph::{Orientation, orientation};
use crate::sweep_error::SweepError;
use crate::topology::cell::{FaceNeighbor, dot};
use crate::topology::mesh::PartitionedMesh;
use hashbrown::HashMap;
use std::collections::VecDeque;

/// Scalar-flux moments of one full sweep of every direction.
///
/// Mirror-coupled boundaries and remote neighbours are rejected.
pub fn reference_sweep<K: SweepChunk>(
    mesh: &PartitionedMesh,
    quadrature: &Quadrature,
    problem: &TransportProblem,
    kernel: &K,
) -> Result<ScalarFluxField, SweepError> {
    problem.validate(mesh, quadrature)?;
    if let Some((id, _)) = problem.boundaries.iter().find(|(_, bc)| bc.is_mirror_coupled()) {
        return Err(SweepError::InvalidConfig(format!(
            "reference sweep cannot resolve mirror-coupled boundary {id}"
        )));
    }
    let g_n = problem.num_groups;
    let cells = mesh.cells();
    let mut phi = ScalarFluxField::zeros(cells.len(), problem.num_moments, g_n);

    for (d, dir) in quadrature.directions().iter().enumerate() {
        let mut indegree = vec![0usize; cells.len()];
        let mut downwind: Vec<Vec<usize>> = vec![Vec::new(); cells.len()];
        for (i, cell) in cells.iter().enumerate() {
            for face in &cell.faces {
                if let FaceNeighbor::Cell(nb) = face.neighbor {
                    let j = mesh.local_index(nb).ok_or_else(|| {
                        SweepError::InvalidMesh(format!("cell {nb} is not local"))
                    })?;
                    if orientation(dir.omega, face.normal) == Orientation::Outgoing {
                        downwind[i].push(j);
                        indegree[j] += 1;
                    }
                }
            }
        }

        // face values keyed by (upwind cell, downwind cell, occurrence)
        let mut values: HashMap<(usize, usize, usize), Vec<f64>> = HashMap::new();
        let mut queue: VecDeque<usize> = (0..cells.len()).filter(|&i| indegree[i] == 0).collect();
        let mut visited = 0;
        while let Some(i) = queue.pop_front() {
            visited += 1;
            let cell = &cells[i];
            let sigma_t = &problem
                .material(cell.material)
                .ok_or(SweepError::UnknownMaterial {
                    cell: cell.id,
                    material: cell.material,
                })?
                .sigma_t;
            let source: Vec<f64> = (0..g_n)
                .map(|g| {
                    (0..problem.num_moments)
                        .map(|m| quadrature.m2d(d, m) * problem.source.get(i, m, g))
                        .sum()
                })
                .collect();
            let (mut in_c, mut in_psi, mut out_c) = (Vec::new(), Vec::new(), Vec::new());
            let mut out_keys = Vec::new();
            let mut seen_in: HashMap<usize, usize> = HashMap::new();
            let mut seen_out: HashMap<usize, usize> = HashMap::new();
            for face in &cell.faces {
                let c = dot(dir.omega, face.normal).abs() * face.area;
                let o = orientation(dir.omega, face.normal);
                match (o, face.neighbor) {
                    (Orientation::Parallel, _) => {}
                    (Orientation::Incoming, FaceNeighbor::Boundary(b)) => {
                        in_c.push(c);
                        let v = problem.boundary(b).map_or(0.0, |bc| bc.incoming(0.0));
                        in_psi.extend(std::iter::repeat_n(v, g_n));
                    }
                    (Orientation::Incoming, FaceNeighbor::Cell(nb)) => {
                        let j = mesh.local_index(nb).unwrap_or(usize::MAX);
                        let k = seen_in.entry(j).or_insert(0);
                        let v = values.remove(&(j, i, *k)).ok_or_else(|| {
                            SweepError::InvalidMesh(format!("no upwind value from cell {nb}"))
                        })?;
                        *k += 1;
                        in_c.push(c);
                        in_psi.extend(v);
                    }
                    (Orientation::Outgoing, nb) => {
                        out_c.push(c);
                        out_keys.push(match nb {
                            FaceNeighbor::Cell(id) => {
                                let j = mesh.local_index(id).unwrap_or(usize::MAX);
                                let k = seen_out.entry(j).or_insert(0);
                                *k += 1;
                                Some((i, j, *k - 1))
                            }
                            FaceNeighbor::Boundary(_) => None,
                        });
                    }
                }
            }
            let mut psi = vec![0.0; g_n];
            let mut out = vec![0.0; out_c.len() * g_n];
            let input = CellInput {
                cell: cell.id,
                volume: cell.volume,
                omega: dir.omega,
                num_groups: g_n,
                sigma_t,
                source: &source,
                incoming_coeff: &in_c,
                incoming_psi: &in_psi,
                outgoing_coeff: &out_c,
            };
            kernel.compute_cell(&input, &mut psi, &mut out)?;
            for (o, key) in out_keys.into_iter().enumerate() {
                if let Some(key) = key {
                    values.insert(key, out[o * g_n..(o + 1) * g_n].to_vec());
                }
            }
            for m in 0..problem.num_moments {
                let w = quadrature.d2m(d, m);
                for (g, p) in psi.iter().enumerate() {
                    phi.add(i, m, g, w * p);
                }
            }
            for &j in &downwind[i] {
                indegree[j] -= 1;
                if indegree[j] == 0 {
                    queue.push_back(j);
                }
            }
        }
        if visited != cells.len() {
            return Err(SweepError::LocalCycle {
                angle_set: d,
                unresolved: cells.len() - visited,
            });
        }
    }
    Ok(phi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::bc::BoundaryCondition;
    use crate::sweep::chunk::StepKernel;
    use crate::topology::meshgen::{boundary, uniform_slab};

    #[test]
    fn thick_slab_interior_approaches_q_over_sigma() {
        let mesh = uniform_slab(6, 60.0, 1).unwrap().remove(0);
        let q = Quadrature::gauss_legendre_slab(4).unwrap();
        let p = TransportProblem::uniform(
            &mesh,
            1,
            2.0,
            4.0,
            [
                (boundary::XMIN, BoundaryCondition::Vacuum),
                (boundary::XMAX, BoundaryCondition::Vacuum),
            ],
        );
        let phi = reference_sweep(&mesh, &q, &p, &StepKernel).unwrap();
        assert!((phi.get(3, 0, 0) - 2.0).abs() < 1e-3);
    }

    #[test]
    fn mirror_coupled_boundary_is_rejected() {
        let mesh = uniform_slab(2, 1.0, 1).unwrap().remove(0);
        let q = Quadrature::gauss_legendre_slab(2).unwrap();
        let p = TransportProblem::uniform(
            &mesh,
            1,
            1.0,
            1.0,
            [
                (boundary::XMIN, BoundaryCondition::Vacuum),
                (boundary::XMAX, BoundaryCondition::Reflecting),
            ],
        );
        assert!(reference_sweep(&mesh, &q, &p, &StepKernel).is_err());
    }
}
