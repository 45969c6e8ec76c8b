//! Basic generators for partitioned slabs and orthogonal grids.
//!
//! Both build the global cell list, then split it by owner into one
//! [`PartitionedMesh`] per rank.

use crate::sweep_error::SweepError;
use crate::topology::cell::{Cell, CellId, Face};
use crate::topology::mesh::PartitionedMesh;
use hashbrown::HashMap;

/// Boundary ids assigned by the generators.
pub mod boundary {
    pub const XMIN: u64 = 0;
    pub const XMAX: u64 = 1;
    pub const YMIN: u64 = 2;
    pub const YMAX: u64 = 3;
}

fn invalid(message: impl Into<String>) -> SweepError {
    SweepError::InvalidMesh(message.into())
}

/// Split a global cell list into per-rank partitions.
pub fn split_by_owner(cells: Vec<Cell>, num_ranks: usize) -> Result<Vec<PartitionedMesh>, SweepError> {
    let owner: HashMap<CellId, usize> = cells.iter().map(|c| (c.id, c.rank)).collect();
    let mut per_rank: Vec<Vec<Cell>> = vec![Vec::new(); num_ranks];
    for c in cells {
        let r = c.rank;
        per_rank
            .get_mut(r)
            .ok_or_else(|| invalid(format!("cell {} owned by rank {r} of {num_ranks}", c.id)))?
            .push(c);
    }
    per_rank
        .into_iter()
        .enumerate()
        .map(|(rank, local)| {
            let ghosts: Vec<(CellId, usize)> = local
                .iter()
                .flat_map(|c| c.faces.iter())
                .filter_map(|f| f.neighbor_cell())
                .filter_map(|n| owner.get(&n).map(|&o| (n, o)))
                .filter(|&(_, o)| o != rank)
                .collect();
            PartitionedMesh::new(rank, num_ranks, local, ghosts)
        })
        .collect()
}

/// 1D slab along x with cell boundaries at `edges`.
///
/// Cell `i` gets id `i`, material `materials[i]` and owner `owners[i]`. The
/// left face carries boundary id [`boundary::XMIN`], the right one
/// [`boundary::XMAX`]. Faces have unit area, so a cell's volume is its width.
pub fn slab(
    edges: &[f64],
    materials: &[u32],
    owners: &[usize],
    num_ranks: usize,
) -> Result<Vec<PartitionedMesh>, SweepError> {
    if edges.len() < 2 {
        return Err(invalid("a slab needs at least two edges"));
    }
    let n = edges.len() - 1;
    if materials.len() != n || owners.len() != n {
        return Err(invalid(format!(
            "slab of {n} cells got {} materials and {} owners",
            materials.len(),
            owners.len()
        )));
    }
    let mut cells = Vec::with_capacity(n);
    for i in 0..n {
        let width = edges[i + 1] - edges[i];
        if !(width > 0.0) {
            return Err(invalid(format!("slab cell {i} has width {width}")));
        }
        let left = if i == 0 {
            Face::boundary([-1.0, 0.0, 0.0], 1.0, boundary::XMIN)
        } else {
            Face::interior([-1.0, 0.0, 0.0], 1.0, CellId::new(i as u64 - 1))
        };
        let right = if i + 1 == n {
            Face::boundary([1.0, 0.0, 0.0], 1.0, boundary::XMAX)
        } else {
            Face::interior([1.0, 0.0, 0.0], 1.0, CellId::new(i as u64 + 1))
        };
        cells.push(Cell {
            id: CellId::new(i as u64),
            centroid: [0.5 * (edges[i] + edges[i + 1]), 0.0, 0.0],
            volume: width,
            material: materials[i],
            faces: vec![left, right],
            rank: owners[i],
        });
    }
    split_by_owner(cells, num_ranks)
}

/// Uniform slab of `n` cells over `[0, length]`, material 0, split into
/// `num_ranks` contiguous blocks.
pub fn uniform_slab(n: usize, length: f64, num_ranks: usize) -> Result<Vec<PartitionedMesh>, SweepError> {
    if n == 0 || num_ranks == 0 {
        return Err(invalid("uniform slab needs cells and ranks"));
    }
    let edges: Vec<f64> = (0..=n).map(|i| length * i as f64 / n as f64).collect();
    let owners: Vec<usize> = (0..n).map(|i| i * num_ranks / n).collect();
    slab(&edges, &vec![0; n], &owners, num_ranks)
}

/// `nx × ny` grid of `dx × dy` quadrilaterals in the xy-plane.
///
/// Cell `(i, j)` gets id `j * nx + i`; faces are ordered -x, +x, -y, +y and
/// have unit depth in z. `owner(i, j)` picks the rank of each cell.
pub fn orthogonal_grid(
    nx: usize,
    ny: usize,
    dx: f64,
    dy: f64,
    num_ranks: usize,
    owner: impl Fn(usize, usize) -> usize,
) -> Result<Vec<PartitionedMesh>, SweepError> {
    if nx == 0 || ny == 0 || !(dx > 0.0) || !(dy > 0.0) {
        return Err(invalid(format!("bad grid {nx}x{ny} with spacing {dx}x{dy}")));
    }
    let id = |i: usize, j: usize| CellId::new((j * nx + i) as u64);
    let mut cells = Vec::with_capacity(nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            let xm = if i == 0 {
                Face::boundary([-1.0, 0.0, 0.0], dy, boundary::XMIN)
            } else {
                Face::interior([-1.0, 0.0, 0.0], dy, id(i - 1, j))
            };
            let xp = if i + 1 == nx {
                Face::boundary([1.0, 0.0, 0.0], dy, boundary::XMAX)
            } else {
                Face::interior([1.0, 0.0, 0.0], dy, id(i + 1, j))
            };
            let ym = if j == 0 {
                Face::boundary([0.0, -1.0, 0.0], dx, boundary::YMIN)
            } else {
                Face::interior([0.0, -1.0, 0.0], dx, id(i, j - 1))
            };
            let yp = if j + 1 == ny {
                Face::boundary([0.0, 1.0, 0.0], dx, boundary::YMAX)
            } else {
                Face::interior([0.0, 1.0, 0.0], dx, id(i, j + 1))
            };
            cells.push(Cell {
                id: id(i, j),
                centroid: [(i as f64 + 0.5) * dx, (j as f64 + 0.5) * dy, 0.0],
                volume: dx * dy,
                material: 0,
                faces: vec![xm, xp, ym, yp],
                rank: owner(i, j),
            });
        }
    }
    split_by_owner(cells, num_ranks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_slab_splits_into_blocks() {
        let parts = uniform_slab(6, 3.0, 2).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].num_cells(), 3);
        assert_eq!(parts[1].cells()[0].id, CellId::new(3));
        assert_eq!(parts[0].neighbor_ranks(), vec![1]);
        assert!((parts[1].cells()[0].volume - 0.5).abs() < 1e-14);
    }

    #[test]
    fn grid_has_four_faces_per_cell() {
        let parts = orthogonal_grid(3, 2, 1.0, 2.0, 1, |_, _| 0).unwrap();
        let m = &parts[0];
        assert_eq!(m.num_cells(), 6);
        assert!(m.cells().iter().all(|c| c.faces.len() == 4));
        assert_eq!(m.boundary_ids().len(), 4);
        // cell (1,0) -> its +y neighbour is (1,1) = id 4
        assert_eq!(m.cells()[1].faces[3].neighbor_cell(), Some(CellId::new(4)));
    }

    #[test]
    fn slab_rejects_mismatched_lengths() {
        assert!(slab(&[0.0, 1.0, 2.0], &[0], &[0, 0], 1).is_err());
    }
}
