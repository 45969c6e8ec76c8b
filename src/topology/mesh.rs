//! The locally owned portion of a pre-partitioned mesh.

use crate::sweep_error::SweepError;
use crate::topology::cell::{Cell, CellId, FaceNeighbor, dot, norm};
use hashbrown::HashMap;
use itertools::Itertools;
use std::collections::BTreeSet;

const NORMAL_TOL: f64 = 1e-9;

/// Cells owned by one rank, plus the owner of every off-rank neighbour.
///
/// Local cells are stored in ascending [`CellId`] order, so a local index
/// comparison is also a cell-id comparison.
#[derive(Clone, Debug)]
pub struct PartitionedMesh {
    rank: usize,
    num_ranks: usize,
    cells: Vec<Cell>,
    local_index: HashMap<CellId, usize>,
    ghost_owner: HashMap<CellId, usize>,
}

impl PartitionedMesh {
    /// Build and validate the local partition.
    ///
    /// `ghost_owner` must name the owning rank of every neighbour cell that
    /// is not in `cells`.
    pub fn new(
        rank: usize,
        num_ranks: usize,
        mut cells: Vec<Cell>,
        ghost_owner: impl IntoIterator<Item = (CellId, usize)>,
    ) -> Result<Self, SweepError> {
        if rank >= num_ranks {
            return Err(SweepError::InvalidMesh(format!(
                "rank {rank} out of range for {num_ranks} ranks"
            )));
        }
        cells.sort_by_key(|c| c.id);
        let mut local_index = HashMap::with_capacity(cells.len());
        for (i, c) in cells.iter().enumerate() {
            if c.rank != rank {
                return Err(SweepError::InvalidMesh(format!(
                    "cell {} is owned by rank {}, not {rank}",
                    c.id, c.rank
                )));
            }
            if local_index.insert(c.id, i).is_some() {
                return Err(SweepError::InvalidMesh(format!("duplicate cell {}", c.id)));
            }
        }
        let ghost_owner: HashMap<CellId, usize> = ghost_owner.into_iter().collect();

        for c in &cells {
            if !(c.volume > 0.0) {
                return Err(SweepError::InvalidMesh(format!(
                    "cell {} has non-positive volume {}",
                    c.id, c.volume
                )));
            }
            for (f, face) in c.faces.iter().enumerate() {
                if !(face.area > 0.0) || (norm(face.normal) - 1.0).abs() > NORMAL_TOL {
                    return Err(SweepError::InvalidMesh(format!(
                        "cell {} face {f}: area {} normal {:?}",
                        c.id, face.area, face.normal
                    )));
                }
                if let FaceNeighbor::Cell(n) = face.neighbor {
                    if n == c.id {
                        return Err(SweepError::InvalidMesh(format!(
                            "cell {} face {f} neighbours itself",
                            c.id
                        )));
                    }
                    if !local_index.contains_key(&n) {
                        match ghost_owner.get(&n) {
                            Some(&owner) if owner != rank && owner < num_ranks => {}
                            Some(&owner) => {
                                return Err(SweepError::InvalidMesh(format!(
                                    "ghost cell {n} has invalid owner {owner}"
                                )));
                            }
                            None => {
                                return Err(SweepError::InvalidMesh(format!(
                                    "cell {} face {f}: neighbour {n} has no known owner",
                                    c.id
                                )));
                            }
                        }
                    }
                }
            }
        }

        Ok(Self {
            rank,
            num_ranks,
            cells,
            local_index,
            ghost_owner,
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn num_ranks(&self) -> usize {
        self.num_ranks
    }

    /// Local cells in ascending id order.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn local_index(&self, id: CellId) -> Option<usize> {
        self.local_index.get(&id).copied()
    }

    /// Owning rank of any cell this partition knows about.
    pub fn owner(&self, id: CellId) -> Option<usize> {
        if self.local_index.contains_key(&id) {
            Some(self.rank)
        } else {
            self.ghost_owner.get(&id).copied()
        }
    }

    /// Ranks sharing at least one face with this partition, ascending.
    pub fn neighbor_ranks(&self) -> Vec<usize> {
        self.cells
            .iter()
            .flat_map(|c| c.faces.iter())
            .filter_map(|f| f.neighbor_cell())
            .filter_map(|n| self.ghost_owner.get(&n).copied())
            .sorted_unstable()
            .dedup()
            .collect()
    }

    /// Boundary ids referenced by local faces.
    pub fn boundary_ids(&self) -> BTreeSet<u64> {
        self.cells
            .iter()
            .flat_map(|c| c.faces.iter())
            .filter_map(|f| match f.neighbor {
                FaceNeighbor::Boundary(b) => Some(b),
                FaceNeighbor::Cell(_) => None,
            })
            .collect()
    }

    /// Face of local cell `neighbor` that points back at local cell `cell`
    /// through the face `face` of `cell`.
    ///
    /// When two cells share several faces, the one whose normal is most
    /// nearly opposite is chosen.
    pub fn reverse_face(&self, cell: usize, face: usize) -> Option<(usize, usize)> {
        let c = &self.cells[cell];
        let f = &c.faces[face];
        let n = self.local_index(f.neighbor_cell()?)?;
        let nc = &self.cells[n];
        nc.faces
            .iter()
            .enumerate()
            .filter(|(_, g)| g.neighbor == FaceNeighbor::Cell(c.id))
            .map(|(j, g)| (j, dot(g.normal, f.normal)))
            .filter(|&(_, d)| d < 0.0)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(j, _)| (n, j))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::cell::Face;

    fn cell(id: u64, rank: usize, faces: Vec<Face>) -> Cell {
        Cell {
            id: CellId::new(id),
            centroid: [0.0; 3],
            volume: 1.0,
            material: 0,
            faces,
            rank,
        }
    }

    #[test]
    fn cells_are_sorted_and_indexed() {
        let c1 = cell(5, 0, vec![Face::interior([1.0, 0.0, 0.0], 1.0, CellId::new(2))]);
        let c0 = cell(2, 0, vec![Face::interior([-1.0, 0.0, 0.0], 1.0, CellId::new(5))]);
        let m = PartitionedMesh::new(0, 1, vec![c1, c0], []).unwrap();
        assert_eq!(m.cells()[0].id, CellId::new(2));
        assert_eq!(m.local_index(CellId::new(5)), Some(1));
        assert_eq!(m.reverse_face(0, 0), Some((1, 0)));
        assert!(m.neighbor_ranks().is_empty());
    }

    #[test]
    fn unknown_neighbour_is_rejected() {
        let c = cell(1, 0, vec![Face::interior([1.0, 0.0, 0.0], 1.0, CellId::new(9))]);
        assert!(matches!(
            PartitionedMesh::new(0, 2, vec![c.clone()], []),
            Err(SweepError::InvalidMesh(_))
        ));
        let m = PartitionedMesh::new(0, 2, vec![c], [(CellId::new(9), 1)]).unwrap();
        assert_eq!(m.neighbor_ranks(), vec![1]);
        assert_eq!(m.owner(CellId::new(9)), Some(1));
    }

    #[test]
    fn non_unit_normal_is_rejected() {
        let c = cell(1, 0, vec![Face::boundary([2.0, 0.0, 0.0], 1.0, 0)]);
        assert!(PartitionedMesh::new(0, 1, vec![c], []).is_err());
    }
}
