//! Detection of dependency cycles that cross partition boundaries.
//!
//! Each rank condenses its part of an angle set's graph onto the cells that
//! touch a partition boundary: one edge per outgoing remote face, plus one
//! edge from every cell with remote inflow to every cell with remote outflow
//! that it reaches locally. The condensed edges of all ranks are gathered and
//! every rank runs the same Kahn pass over them. Local cycles are caught while
//! the graph is built, so any cycle left here spans at least two ranks.

use crate::algs::communicator::{CollectiveTags, CommTag, Communicator};
use crate::algs::exchange::all_gather_u64;
use crate::sweep::graph::{Consumer, Dependency, DependencyGraph};
use crate::sweep_error::SweepError;
use crate::topology::mesh::PartitionedMesh;
use hashbrown::HashMap;
use itertools::Itertools;
use std::collections::VecDeque;

/// Condensed `(upwind id, downwind id)` edges of one rank's graph.
pub fn interface_edges(graph: &DependencyGraph, mesh: &PartitionedMesh) -> Vec<(u64, u64)> {
    let id = |i: usize| mesh.cells()[i].id.get();
    let mut edges = Vec::new();
    for (i, c) in graph.cells.iter().enumerate() {
        for d in &c.downwind {
            if let Consumer::Remote { cell, .. } = d {
                edges.push((id(i), cell.get()));
            }
        }
    }

    let exits: Vec<bool> = graph
        .cells
        .iter()
        .map(|c| c.downwind.iter().any(|d| matches!(d, Consumer::Remote { .. })))
        .collect();
    let mut seen = vec![usize::MAX; graph.num_cells()];
    let mut queue = VecDeque::new();
    for (entry, c) in graph.cells.iter().enumerate() {
        if !c.upwind.iter().any(|d| matches!(d, Dependency::Remote { .. })) {
            continue;
        }
        seen[entry] = entry;
        queue.push_back(entry);
        while let Some(i) = queue.pop_front() {
            if exits[i] && i != entry {
                edges.push((id(entry), id(i)));
            }
            for d in &graph.cells[i].downwind {
                if let Consumer::Local(j) = *d {
                    if seen[j] != entry {
                        seen[j] = entry;
                        queue.push_back(j);
                    }
                }
            }
        }
    }
    edges.into_iter().sorted_unstable().dedup().collect()
}

/// Number of nodes left unresolved by Kahn's algorithm over `edges`.
pub fn unresolved_nodes(edges: &[(u64, u64)]) -> usize {
    let mut index: HashMap<u64, usize> = HashMap::new();
    let mut node = |id: u64| {
        let next = index.len();
        *index.entry(id).or_insert(next)
    };
    let edges: Vec<(usize, usize)> = edges.iter().map(|&(u, v)| (node(u), node(v))).collect();
    let n = index.len();
    let mut indegree = vec![0usize; n];
    let mut out: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(u, v) in &edges {
        out[u].push(v);
        indegree[v] += 1;
    }
    let mut queue: VecDeque<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut resolved = 0;
    while let Some(u) = queue.pop_front() {
        resolved += 1;
        for &v in &out[u] {
            indegree[v] -= 1;
            if indegree[v] == 0 {
                queue.push_back(v);
            }
        }
    }
    n - resolved
}

/// Fail with [`SweepError::PartitionCycle`] if any angle set's dependencies
/// form a cycle across ranks. Collective: every rank must call it with the
/// same sets.
pub fn check_partition_cycles<C: Communicator>(
    graphs: &[DependencyGraph],
    mesh: &PartitionedMesh,
    collective_tag: u16,
    comm: &C,
) -> Result<(), SweepError> {
    if comm.size() <= 1 {
        return Ok(());
    }
    // [set, edge count, u0, v0, u1, v1, ...] for every set
    let mut payload = Vec::new();
    for g in graphs {
        let edges = interface_edges(g, mesh);
        payload.push(g.angle_set as u64);
        payload.push(edges.len() as u64);
        payload.extend(edges.into_iter().flat_map(|(u, v)| [u, v]));
    }
    let tags = CollectiveTags::from_base(CommTag::new(collective_tag));
    let gathered = all_gather_u64(comm, tags.gather_edges, &payload)?;

    let mut per_set: Vec<Vec<(u64, u64)>> = vec![Vec::new(); graphs.len()];
    for (rank, words) in gathered.iter().enumerate() {
        let malformed = || SweepError::CommError {
            neighbor: rank,
            source: format!("malformed interface edge list of {} words", words.len()).into(),
        };
        let mut pos = 0;
        while pos < words.len() {
            let header = words.get(pos..pos + 2).ok_or_else(malformed)?;
            let (set, count) = (header[0] as usize, header[1] as usize);
            let end = count
                .checked_mul(2)
                .and_then(|n| n.checked_add(pos + 2))
                .ok_or_else(malformed)?;
            let body = words.get(pos + 2..end).ok_or_else(malformed)?;
            per_set
                .get_mut(set)
                .ok_or_else(malformed)?
                .extend(body.chunks_exact(2).map(|e| (e[0], e[1])));
            pos = end;
        }
    }

    for (set, edges) in per_set.iter().enumerate() {
        let unresolved = unresolved_nodes(edges);
        if unresolved > 0 {
            return Err(SweepError::PartitionCycle {
                angle_set: set,
                unresolved,
            });
        }
    }
    log::debug!(
        "rank {}: no cross-partition cycles in {} angle sets",
        comm.rank(),
        graphs.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::bc::BoundaryCondition;
    use crate::data::material::TransportProblem;
    use crate::data::quadrature::Quadrature;
    use crate::topology::meshgen::{boundary, slab};

    #[test]
    fn kahn_counts_nodes_on_a_ring() {
        assert_eq!(unresolved_nodes(&[(1, 2), (2, 3)]), 0);
        assert_eq!(unresolved_nodes(&[(1, 2), (2, 3), (3, 1), (0, 1)]), 3);
        assert_eq!(unresolved_nodes(&[]), 0);
    }

    #[test]
    fn interface_edges_condense_local_paths() {
        // cells 0 | 1 2 3 | 4 with the middle block on rank 1
        let parts = slab(
            &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
            &[0; 5],
            &[0, 1, 1, 1, 0],
            2,
        )
        .unwrap();
        let mesh = &parts[1];
        let q = Quadrature::gauss_legendre_slab(2).unwrap();
        let p = TransportProblem::uniform(
            mesh,
            1,
            1.0,
            1.0,
            [
                (boundary::XMIN, BoundaryCondition::Vacuum),
                (boundary::XMAX, BoundaryCondition::Vacuum),
            ],
        );
        // direction 1 has mu > 0
        let g = DependencyGraph::build(0, &[1], mesh, &q, &p).unwrap();
        assert_eq!(interface_edges(&g, mesh), vec![(1, 3), (3, 4)]);
    }
}
