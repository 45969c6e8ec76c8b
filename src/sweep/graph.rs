//! Per-angle-set dependency graph.
//!
//! Every face of every local cell is classified once per angle set: its
//! orientation relative to the set's directions (incoming, outgoing or
//! parallel) and what lies across it (local cell, remote cell, plain
//! boundary, mirror-coupled boundary). From that the builder derives each
//! cell's upwind dependencies, its downwind consumers, and the order in
//! which remote face values are exchanged with every neighbour rank.

use crate::data::material::TransportProblem;
use crate::debug_invariants::DebugInvariants;
use crate::data::quadrature::Quadrature;
use crate::sweep_error::SweepError;
use crate::topology::cell::{CellId, FaceNeighbor, Vec3, dot};
use crate::topology::mesh::PartitionedMesh;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

/// `|ω·n|` below which a face is treated as parallel to the flow.
pub const PARALLEL_TOL: f64 = 1e-12;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Orientation {
    Incoming,
    Outgoing,
    Parallel,
}

impl Orientation {
    pub fn opposite(self) -> Self {
        match self {
            Orientation::Incoming => Orientation::Outgoing,
            Orientation::Outgoing => Orientation::Incoming,
            Orientation::Parallel => Orientation::Parallel,
        }
    }
}

#[inline]
pub fn orientation(omega: Vec3, normal: Vec3) -> Orientation {
    let mu = dot(omega, normal);
    if mu > PARALLEL_TOL {
        Orientation::Outgoing
    } else if mu < -PARALLEL_TOL {
        Orientation::Incoming
    } else {
        Orientation::Parallel
    }
}

/// What lies across a face.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FaceLink {
    /// Local neighbour `cell`, whose face `face` is the same geometric face.
    Local { cell: usize, face: usize },
    Remote { rank: usize, cell: CellId },
    Boundary { id: u64 },
    /// Boundary whose incoming flux reads the mirrored outgoing flux.
    Reflecting { id: u64 },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FaceInfo {
    pub orientation: Orientation,
    pub link: FaceLink,
}

/// Tagged upwind dependency of a cell.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Dependency {
    Local(usize),
    Remote { rank: usize, cell: CellId },
    Boundary(u64),
    Reflecting(u64),
}

impl Dependency {
    /// Whether the dependency must be satisfied during the sweep. Boundary
    /// values are known up front; reflected values come from the previous
    /// iterate.
    pub fn is_pending(&self) -> bool {
        matches!(self, Dependency::Local(_) | Dependency::Remote { .. })
    }
}

/// Downwind consumer of a cell's outgoing flux.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Consumer {
    Local(usize),
    Remote { rank: usize, cell: CellId },
    Boundary(u64),
    Reflecting(u64),
}

#[derive(Clone, Debug, Default)]
pub struct CellDeps {
    pub faces: Vec<FaceInfo>,
    pub upwind: Vec<Dependency>,
    pub downwind: Vec<Consumer>,
    /// Upwind faces whose flux is not available at the start of a sweep.
    pub pending: usize,
}

/// One face crossing a partition boundary, seen from the local side.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RemoteFace {
    pub cell: usize,
    pub face: usize,
    pub remote_cell: CellId,
}

/// Incoming face on a mirror-coupled boundary, with the mirrored direction of
/// every direction in the set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReflectedInflow {
    pub cell: usize,
    pub face: usize,
    pub boundary: u64,
    pub mirrors: Vec<usize>,
}

/// Face counts per classification, the sizes FLUDS storage is built from.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FaceCounters {
    pub incoming_local: usize,
    /// Incoming faces fed by a remote rank.
    pub prelocated: usize,
    pub outgoing_local: usize,
    /// Outgoing faces that must be sent to a remote rank.
    pub delocated: usize,
    pub incoming_boundary: usize,
    pub outgoing_boundary: usize,
    pub reflected_in: usize,
    pub reflected_out: usize,
    pub parallel: usize,
}

#[derive(Clone, Debug)]
pub struct DependencyGraph {
    pub angle_set: usize,
    pub cells: Vec<CellDeps>,
    /// Outgoing remote faces per destination rank, in exchange order.
    pub send_order: BTreeMap<usize, Vec<RemoteFace>>,
    /// Incoming remote faces per source rank, in exchange order.
    pub recv_order: BTreeMap<usize, Vec<RemoteFace>>,
    pub reflected_in: Vec<ReflectedInflow>,
    pub counters: FaceCounters,
    /// Local topological order ignoring remote dependencies, ascending-id
    /// tie-break.
    pub local_order: Vec<usize>,
}

impl DependencyGraph {
    /// Classify every local face for the directions of one angle set.
    pub fn build(
        angle_set: usize,
        directions: &[usize],
        mesh: &PartitionedMesh,
        quadrature: &Quadrature,
        problem: &TransportProblem,
    ) -> Result<Self, SweepError> {
        let Some(&lead) = directions.first() else {
            return Err(SweepError::InvalidConfig(format!("angle set {angle_set} is empty")));
        };
        let omega = quadrature.direction(lead).omega;
        let n = mesh.num_cells();
        let mut cells: Vec<CellDeps> = vec![CellDeps::default(); n];
        let mut counters = FaceCounters::default();
        let mut send: BTreeMap<usize, Vec<(u64, u64, usize, RemoteFace)>> = BTreeMap::new();
        let mut recv: BTreeMap<usize, Vec<(u64, u64, usize, RemoteFace)>> = BTreeMap::new();
        let mut reflected_in = Vec::new();

        for (i, cell) in mesh.cells().iter().enumerate() {
            // Occurrence of each (neighbour, orientation) pair, so cells
            // sharing several faces still agree on an exchange order.
            let mut occurrences: BTreeMap<(CellId, bool), usize> = BTreeMap::new();
            for (f, face) in cell.faces.iter().enumerate() {
                let orient = orientation(omega, face.normal);
                for &d in &directions[1..] {
                    if orientation(quadrature.direction(d).omega, face.normal) != orient {
                        return Err(SweepError::InvalidConfig(format!(
                            "angle set {angle_set}: directions {lead} and {d} disagree on cell {} face {f}",
                            cell.id
                        )));
                    }
                }
                let link = match face.neighbor {
                    FaceNeighbor::Cell(nb) => match mesh.local_index(nb) {
                        Some(_) => {
                            let (j, fj) = mesh.reverse_face(i, f).ok_or_else(|| {
                                SweepError::InvalidMesh(format!(
                                    "cell {nb} has no face back to cell {} (face {f})",
                                    cell.id
                                ))
                            })?;
                            let back = orientation(omega, mesh.cells()[j].faces[fj].normal);
                            if back != orient.opposite() {
                                return Err(SweepError::InvalidMesh(format!(
                                    "cells {} and {nb} disagree on the orientation of their shared face",
                                    cell.id
                                )));
                            }
                            FaceLink::Local { cell: j, face: fj }
                        }
                        None => {
                            let rank = mesh.owner(nb).ok_or_else(|| {
                                SweepError::InvalidMesh(format!("no owner for cell {nb}"))
                            })?;
                            FaceLink::Remote { rank, cell: nb }
                        }
                    },
                    FaceNeighbor::Boundary(b) => {
                        let bc = problem.boundary(b).ok_or(SweepError::UnassignedBoundary {
                            cell: cell.id,
                            face: f,
                            boundary_id: b,
                        })?;
                        if bc.is_mirror_coupled() {
                            FaceLink::Reflecting { id: b }
                        } else {
                            FaceLink::Boundary { id: b }
                        }
                    }
                };
                cells[i].faces.push(FaceInfo {
                    orientation: orient,
                    link,
                });

                let deps = &mut cells[i];
                match (orient, link) {
                    (Orientation::Parallel, _) => counters.parallel += 1,
                    (Orientation::Incoming, FaceLink::Local { cell: j, .. }) => {
                        deps.upwind.push(Dependency::Local(j));
                        deps.pending += 1;
                        counters.incoming_local += 1;
                    }
                    (Orientation::Incoming, FaceLink::Remote { rank, cell: nb }) => {
                        deps.upwind.push(Dependency::Remote { rank, cell: nb });
                        deps.pending += 1;
                        counters.prelocated += 1;
                        let k = occurrences.entry((nb, false)).or_insert(0);
                        recv.entry(rank).or_default().push((
                            nb.get(),
                            cell.id.get(),
                            *k,
                            RemoteFace {
                                cell: i,
                                face: f,
                                remote_cell: nb,
                            },
                        ));
                        *k += 1;
                    }
                    (Orientation::Incoming, FaceLink::Boundary { id }) => {
                        deps.upwind.push(Dependency::Boundary(id));
                        counters.incoming_boundary += 1;
                    }
                    (Orientation::Incoming, FaceLink::Reflecting { id }) => {
                        deps.upwind.push(Dependency::Reflecting(id));
                        counters.reflected_in += 1;
                        let mirrors = directions
                            .iter()
                            .map(|&d| {
                                quadrature.mirror(d, face.normal).ok_or(SweepError::MissingMirror {
                                    cell: cell.id,
                                    face: f,
                                    direction: d,
                                })
                            })
                            .collect::<Result<Vec<_>, _>>()?;
                        reflected_in.push(ReflectedInflow {
                            cell: i,
                            face: f,
                            boundary: id,
                            mirrors,
                        });
                    }
                    (Orientation::Outgoing, FaceLink::Local { cell: j, .. }) => {
                        deps.downwind.push(Consumer::Local(j));
                        counters.outgoing_local += 1;
                    }
                    (Orientation::Outgoing, FaceLink::Remote { rank, cell: nb }) => {
                        deps.downwind.push(Consumer::Remote { rank, cell: nb });
                        counters.delocated += 1;
                        let k = occurrences.entry((nb, true)).or_insert(0);
                        send.entry(rank).or_default().push((
                            cell.id.get(),
                            nb.get(),
                            *k,
                            RemoteFace {
                                cell: i,
                                face: f,
                                remote_cell: nb,
                            },
                        ));
                        *k += 1;
                    }
                    (Orientation::Outgoing, FaceLink::Boundary { id }) => {
                        deps.downwind.push(Consumer::Boundary(id));
                        counters.outgoing_boundary += 1;
                    }
                    (Orientation::Outgoing, FaceLink::Reflecting { id }) => {
                        deps.downwind.push(Consumer::Reflecting(id));
                        counters.reflected_out += 1;
                    }
                }
            }
        }

        // Both sides sort by (upwind cell, downwind cell, occurrence).
        let finish = |m: BTreeMap<usize, Vec<(u64, u64, usize, RemoteFace)>>| {
            m.into_iter()
                .map(|(rank, mut v)| {
                    v.sort_unstable_by_key(|&(a, b, k, _)| (a, b, k));
                    (rank, v.into_iter().map(|(_, _, _, rf)| rf).collect())
                })
                .collect::<BTreeMap<usize, Vec<RemoteFace>>>()
        };
        let send_order = finish(send);
        let recv_order = finish(recv);

        let local_order = local_topological_order(&cells).map_err(|unresolved| {
            SweepError::LocalCycle {
                angle_set,
                unresolved,
            }
        })?;

        log::debug!(
            "angle set {angle_set} on rank {}: {} cells, {:?}",
            mesh.rank(),
            n,
            counters
        );
        if counters.parallel > 0 {
            log::warn!(
                "angle set {angle_set}: {} faces parallel to the flow",
                counters.parallel
            );
        }

        Ok(Self {
            angle_set,
            cells,
            send_order,
            recv_order,
            reflected_in,
            counters,
            local_order,
        })
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn has_reflected_inflow(&self) -> bool {
        !self.reflected_in.is_empty()
    }

    /// Whether any face crosses a partition boundary.
    pub fn is_purely_local(&self) -> bool {
        self.send_order.is_empty() && self.recv_order.is_empty()
    }

    /// Local edges `(upwind, downwind)`, one per shared face.
    pub fn local_edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.cells.iter().enumerate().flat_map(|(i, c)| {
            c.downwind.iter().filter_map(move |d| match d {
                Consumer::Local(j) => Some((i, *j)),
                _ => None,
            })
        })
    }
}

impl DebugInvariants for DependencyGraph {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "DependencyGraph");
    }

    fn validate_invariants(&self) -> Result<(), SweepError> {
        let bad = |m: String| Err(SweepError::InvalidMesh(format!("angle set {}: {m}", self.angle_set)));
        for (i, c) in self.cells.iter().enumerate() {
            let pending = c.upwind.iter().filter(|d| d.is_pending()).count();
            if pending != c.pending {
                return bad(format!("cell {i} counts {} pending of {pending}", c.pending));
            }
        }
        let local_in = self
            .cells
            .iter()
            .flat_map(|c| &c.upwind)
            .filter(|d| matches!(d, Dependency::Local(_)))
            .count();
        let local_out = self.local_edges().count();
        if local_in != local_out || local_out != self.counters.outgoing_local {
            return bad(format!("{local_in} local inflows but {local_out} local outflows"));
        }
        let sent: usize = self.send_order.values().map(Vec::len).sum();
        let recvd: usize = self.recv_order.values().map(Vec::len).sum();
        if sent != self.counters.delocated || recvd != self.counters.prelocated {
            return bad(format!("exchange order lists {sent}/{recvd} remote faces"));
        }
        let mut seen = vec![false; self.cells.len()];
        for &i in &self.local_order {
            if std::mem::replace(&mut seen[i], true) {
                return bad(format!("cell {i} appears twice in the local order"));
            }
        }
        if self.local_order.len() != self.cells.len() {
            return bad("local order does not cover every cell".into());
        }
        Ok(())
    }
}

/// Kahn's algorithm over local edges with an ascending-index ready queue.
/// Returns the number of unresolved cells when a local cycle exists.
fn local_topological_order(cells: &[CellDeps]) -> Result<Vec<usize>, usize> {
    let mut count: Vec<usize> = cells
        .iter()
        .map(|c| c.upwind.iter().filter(|d| matches!(d, Dependency::Local(_))).count())
        .collect();
    let mut ready: BinaryHeap<Reverse<usize>> = count
        .iter()
        .enumerate()
        .filter(|&(_, &c)| c == 0)
        .map(|(i, _)| Reverse(i))
        .collect();
    let mut order = Vec::with_capacity(cells.len());
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for d in &cells[i].downwind {
            if let Consumer::Local(j) = *d {
                count[j] -= 1;
                if count[j] == 0 {
                    ready.push(Reverse(j));
                }
            }
        }
    }
    if order.len() == cells.len() {
        Ok(order)
    } else {
        Err(cells.len() - order.len())
    }
}
