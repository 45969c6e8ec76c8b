//! Grouping of directions into angle sets.
//!
//! Two directions may share a set only when they induce the same
//! face-orientation pattern on every rank. Each rank computes a local class
//! per direction (first direction with the same local pattern); the class
//! vectors are all-gathered so every rank forms identical sets with
//! identical ids, which the flux messages rely on.

use crate::algs::communicator::{CollectiveTags, CommTag, Communicator};
use crate::algs::exchange::all_gather_u32;
use crate::data::quadrature::Quadrature;
use crate::sweep::config::{AngleGrouping, SweepConfig};
use crate::sweep::graph::{Orientation, orientation};
use crate::sweep_error::SweepError;
use crate::topology::mesh::PartitionedMesh;
use hashbrown::HashMap;

/// Directions (quadrature indices, ascending) forming one angle set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AngleSetSpec {
    pub id: usize,
    pub directions: Vec<usize>,
}

/// Per-face orientation pattern of `d` over the local faces.
pub fn face_pattern(mesh: &PartitionedMesh, quadrature: &Quadrature, d: usize) -> Vec<Orientation> {
    let omega = quadrature.direction(d).omega;
    mesh.cells()
        .iter()
        .flat_map(|c| c.faces.iter())
        .map(|f| orientation(omega, f.normal))
        .collect()
}

/// Local equivalence class of every direction.
fn local_classes(mesh: &PartitionedMesh, quadrature: &Quadrature) -> Vec<u32> {
    let mut seen: HashMap<Vec<Orientation>, u32> = HashMap::new();
    (0..quadrature.len())
        .map(|d| {
            let next = d as u32;
            *seen.entry(face_pattern(mesh, quadrature, d)).or_insert(next)
        })
        .collect()
}

/// Partition the quadrature into angle sets, identically on every rank.
pub fn group_directions<C: Communicator>(
    mesh: &PartitionedMesh,
    quadrature: &Quadrature,
    config: &SweepConfig,
    comm: &C,
) -> Result<Vec<AngleSetSpec>, SweepError> {
    let local = local_classes(mesh, quadrature);
    let tags = CollectiveTags::from_base(CommTag::new(config.collective_tag));
    let global = all_gather_u32(comm, tags.gather, &local)?;

    let mut keys: HashMap<(u8, Vec<u32>), usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for d in 0..quadrature.len() {
        let pattern: Vec<u32> = global.iter().map(|classes| classes[d]).collect();
        let key = match config.grouping {
            AngleGrouping::Octant => (quadrature.direction(d).octant(), pattern),
            AngleGrouping::FacePattern => (0, pattern),
            AngleGrouping::Single => {
                groups.push(vec![d]);
                continue;
            }
        };
        let next = groups.len();
        let g = *keys.entry(key).or_insert(next);
        if g == next {
            groups.push(Vec::new());
        }
        groups[g].push(d);
    }

    let limit = config.max_directions_per_set.unwrap_or(usize::MAX).max(1);
    let specs: Vec<AngleSetSpec> = groups
        .into_iter()
        .flat_map(|g| {
            g.chunks(limit)
                .map(<[usize]>::to_vec)
                .collect::<Vec<_>>()
        })
        .enumerate()
        .map(|(id, directions)| AngleSetSpec { id, directions })
        .collect();
    log::debug!(
        "rank {}: {} directions grouped into {} angle sets ({:?})",
        mesh.rank(),
        quadrature.len(),
        specs.len(),
        config.grouping
    );
    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::topology::meshgen::{orthogonal_grid, uniform_slab};

    #[test]
    fn slab_face_pattern_merges_by_mu_sign() {
        let mesh = uniform_slab(3, 1.0, 1).unwrap().remove(0);
        let q = Quadrature::gauss_legendre_slab(4).unwrap();
        let cfg = SweepConfig {
            grouping: AngleGrouping::FacePattern,
            ..Default::default()
        };
        let sets = group_directions(&mesh, &q, &cfg, &NoComm).unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].directions, vec![0, 1]);
        assert_eq!(sets[1].directions, vec![2, 3]);
    }

    #[test]
    fn octant_grouping_on_grid_gives_eight_sets() {
        let mesh = orthogonal_grid(2, 2, 1.0, 1.0, 1, |_, _| 0).unwrap().remove(0);
        let q = Quadrature::product(8, 2).unwrap();
        let sets = group_directions(&mesh, &q, &SweepConfig::default(), &NoComm).unwrap();
        assert_eq!(sets.len(), 8);
        assert!(sets.iter().all(|s| s.directions.len() == 2));
        // In-plane pattern ignores the z sign, so face-pattern grouping halves the count.
        let cfg = SweepConfig {
            grouping: AngleGrouping::FacePattern,
            ..Default::default()
        };
        assert_eq!(group_directions(&mesh, &q, &cfg, &NoComm).unwrap().len(), 4);
    }

    #[test]
    fn size_limit_splits_sets() {
        let mesh = uniform_slab(2, 1.0, 1).unwrap().remove(0);
        let q = Quadrature::gauss_legendre_slab(6).unwrap();
        let cfg = SweepConfig {
            grouping: AngleGrouping::FacePattern,
            max_directions_per_set: Some(2),
            ..Default::default()
        };
        let sets = group_directions(&mesh, &q, &cfg, &NoComm).unwrap();
        assert_eq!(sets.len(), 4);
        assert_eq!(sets.iter().map(|s| s.id).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }
}
