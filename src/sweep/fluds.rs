//! FLUDS: face-flux storage and indexing for one angle set.
//!
//! Every face value holds `directions × groups` angular fluxes, laid out
//! direction-major. A `(cell, face)` pair maps in O(1) to its [`Slot`]:
//!
//! * local faces share one slot between the writer (upwind cell) and the
//!   reader (downwind cell);
//! * remote faces live in per-neighbour buffers ordered as agreed by the
//!   dependency graph, so only flat value arrays cross the wire;
//! * boundary faces have no storage here; mirror-coupled outgoing values go
//!   to the [`ReflectedFluxStore`] shared by all angle sets.
//!
//! Buffers are sized once from the graph's counters and reused by every
//! execution of the angle set.

use crate::debug_invariants::DebugInvariants;
use crate::sweep::graph::{DependencyGraph, FaceCounters, FaceLink, Orientation, RemoteFace};
use crate::sweep_error::SweepError;
use crate::topology::cell::CellId;
use hashbrown::HashMap;
use std::collections::BTreeMap;
use std::ops::Range;

/// Storage location of one face value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Slot {
    /// Outgoing face written into local slot `k`.
    LocalOut(usize),
    /// Incoming face reading local slot `k`.
    LocalIn(usize),
    /// Outgoing face at face position `pos` of send buffer `buffer`.
    RemoteOut { buffer: usize, pos: usize },
    /// Incoming face at face position `pos` of receive buffer `buffer`.
    RemoteIn { buffer: usize, pos: usize },
    BoundaryIn(u64),
    BoundaryOut(u64),
    /// Incoming face on a mirror-coupled boundary; index into the graph's
    /// `reflected_in` list.
    ReflectedIn(usize),
    ReflectedOut(u64),
    Parallel,
}

/// Flat flux buffer exchanged with one neighbour rank.
#[derive(Clone, Debug)]
pub struct NeighborBuffer {
    pub rank: usize,
    /// Local cell owning each face position.
    pub cells: Vec<usize>,
    pub values: Vec<f64>,
}

impl NeighborBuffer {
    pub fn num_faces(&self) -> usize {
        self.cells.len()
    }
}

#[derive(Clone, Debug)]
pub struct Fluds {
    stride: usize,
    num_groups: usize,
    face_offsets: Vec<usize>,
    slots: Vec<Slot>,
    local: Vec<f64>,
    send: Vec<NeighborBuffer>,
    recv: Vec<NeighborBuffer>,
    counters: FaceCounters,
}

impl Fluds {
    pub fn new(graph: &DependencyGraph, num_directions: usize, num_groups: usize) -> Self {
        let stride = num_directions * num_groups;
        let n = graph.num_cells();

        let mut face_offsets = Vec::with_capacity(n + 1);
        face_offsets.push(0);
        for c in &graph.cells {
            face_offsets.push(face_offsets.last().copied().unwrap_or(0) + c.faces.len());
        }
        let mut slots = vec![Slot::Parallel; face_offsets[n]];

        // Local writers first, so readers can point at the same slot.
        let mut local_slot: HashMap<(usize, usize), usize> = HashMap::new();
        for (i, c) in graph.cells.iter().enumerate() {
            for (f, info) in c.faces.iter().enumerate() {
                if let (Orientation::Outgoing, FaceLink::Local { .. }) = (info.orientation, info.link) {
                    let k = local_slot.len();
                    local_slot.insert((i, f), k);
                    slots[face_offsets[i] + f] = Slot::LocalOut(k);
                }
            }
        }

        let build = |order: &BTreeMap<usize, Vec<RemoteFace>>| {
            order
                .iter()
                .map(|(&rank, faces)| NeighborBuffer {
                    rank,
                    cells: faces.iter().map(|rf| rf.cell).collect(),
                    values: vec![0.0; faces.len() * stride],
                })
                .collect::<Vec<_>>()
        };
        let send = build(&graph.send_order);
        let recv = build(&graph.recv_order);
        for (b, faces) in graph.send_order.values().enumerate() {
            for (pos, rf) in faces.iter().enumerate() {
                slots[face_offsets[rf.cell] + rf.face] = Slot::RemoteOut { buffer: b, pos };
            }
        }
        for (b, faces) in graph.recv_order.values().enumerate() {
            for (pos, rf) in faces.iter().enumerate() {
                slots[face_offsets[rf.cell] + rf.face] = Slot::RemoteIn { buffer: b, pos };
            }
        }
        for (r, inflow) in graph.reflected_in.iter().enumerate() {
            slots[face_offsets[inflow.cell] + inflow.face] = Slot::ReflectedIn(r);
        }

        for (i, c) in graph.cells.iter().enumerate() {
            for (f, info) in c.faces.iter().enumerate() {
                let s = &mut slots[face_offsets[i] + f];
                *s = match (info.orientation, info.link) {
                    (Orientation::Incoming, FaceLink::Local { cell, face }) => {
                        // The writer is the neighbour's outgoing face.
                        match local_slot.get(&(cell, face)) {
                            Some(&k) => Slot::LocalIn(k),
                            None => Slot::Parallel,
                        }
                    }
                    (Orientation::Incoming, FaceLink::Boundary { id }) => Slot::BoundaryIn(id),
                    (Orientation::Outgoing, FaceLink::Boundary { id }) => Slot::BoundaryOut(id),
                    (Orientation::Outgoing, FaceLink::Reflecting { id }) => Slot::ReflectedOut(id),
                    _ => *s,
                };
            }
        }

        Self {
            stride,
            num_groups,
            face_offsets,
            slots,
            local: vec![0.0; local_slot.len() * stride],
            send,
            recv,
            counters: graph.counters,
        }
    }

    /// Values per face: directions × groups.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn counters(&self) -> &FaceCounters {
        &self.counters
    }

    #[inline]
    pub fn slot(&self, cell: usize, face: usize) -> Slot {
        self.slots[self.face_offsets[cell] + face]
    }

    /// Upwind values of direction `k` (index within the set) on an incoming
    /// local or remote face.
    pub fn upwind(&self, cell: usize, face: usize, k: usize) -> Option<&[f64]> {
        let g = self.num_groups;
        let r = k * g..(k + 1) * g;
        match self.slot(cell, face) {
            Slot::LocalIn(s) => Some(&self.local[s * self.stride..][r]),
            Slot::RemoteIn { buffer, pos } => Some(&self.recv[buffer].values[pos * self.stride..][r]),
            _ => None,
        }
    }

    /// Destination for direction `k` on an outgoing local or remote face.
    pub fn downwind_mut(&mut self, cell: usize, face: usize, k: usize) -> Option<&mut [f64]> {
        let g = self.num_groups;
        let r = k * g..(k + 1) * g;
        match self.slot(cell, face) {
            Slot::LocalOut(s) => Some(&mut self.local[s * self.stride..][r]),
            Slot::RemoteOut { buffer, pos } => {
                Some(&mut self.send[buffer].values[pos * self.stride..][r])
            }
            _ => None,
        }
    }

    pub fn send_buffers(&self) -> &[NeighborBuffer] {
        &self.send
    }

    pub fn recv_buffers(&self) -> &[NeighborBuffer] {
        &self.recv
    }

    /// Values of faces `[first, first + count)` of send buffer `b`.
    pub fn send_values(&self, b: usize, first: usize, count: usize) -> &[f64] {
        &self.send[b].values[first * self.stride..(first + count) * self.stride]
    }

    /// Copy received values into receive buffer `b` at value offset `offset`.
    ///
    /// Returns the face positions covered. Chunks must be face-aligned and
    /// inside the buffer agreed with the sender.
    pub fn store_received(
        &mut self,
        b: usize,
        angle_set: usize,
        offset: usize,
        values: &[f64],
    ) -> Result<Range<usize>, SweepError> {
        let buf = &mut self.recv[b];
        let expected = buf.values.len();
        if offset + values.len() > expected {
            return Err(SweepError::BufferLengthMismatch {
                neighbor: buf.rank,
                angle_set,
                expected,
                got: offset + values.len(),
            });
        }
        if offset % self.stride != 0 || values.len() % self.stride != 0 {
            return Err(SweepError::BufferLengthMismatch {
                neighbor: buf.rank,
                angle_set,
                expected: self.stride,
                got: values.len(),
            });
        }
        buf.values[offset..offset + values.len()].copy_from_slice(values);
        let first = offset / self.stride;
        Ok(first..first + values.len() / self.stride)
    }
}

impl DebugInvariants for Fluds {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "Fluds");
    }

    fn validate_invariants(&self) -> Result<(), SweepError> {
        let c = &self.counters;
        let sent: usize = self.send.iter().map(NeighborBuffer::num_faces).sum();
        let recvd: usize = self.recv.iter().map(NeighborBuffer::num_faces).sum();
        let local = self.local.len() / self.stride.max(1);
        if sent != c.delocated || recvd != c.prelocated || local != c.outgoing_local {
            return Err(SweepError::InvalidConfig(format!(
                "FLUDS sized {local}/{sent}/{recvd} but graph counts {}/{}/{}",
                c.outgoing_local, c.delocated, c.prelocated
            )));
        }
        let readers = self.slots.iter().filter(|s| matches!(s, Slot::LocalIn(_))).count();
        if readers != c.incoming_local {
            return Err(SweepError::InvalidConfig(format!(
                "{readers} local readers for {} incoming local faces",
                c.incoming_local
            )));
        }
        for b in self.send.iter().chain(&self.recv) {
            if b.values.len() != b.num_faces() * self.stride {
                return Err(SweepError::InvalidConfig(format!(
                    "buffer for rank {} holds {} values for {} faces",
                    b.rank,
                    b.values.len(),
                    b.num_faces()
                )));
            }
        }
        Ok(())
    }
}

/// Outgoing angular flux on mirror-coupled faces, shared by all angle sets.
///
/// Sweeps read the previous iterate and write the current one, so angle sets
/// may run in any interleaving without seeing each other's partial output.
#[derive(Clone, Debug, Default)]
pub struct ReflectedFluxStore {
    prev: HashMap<(CellId, usize, usize), Vec<f64>>,
    next: HashMap<(CellId, usize, usize), Vec<f64>>,
}

impl ReflectedFluxStore {
    /// Previous-iterate outgoing flux on `(cell, face)` for direction `d`;
    /// `None` means the seed (zero) applies.
    pub fn previous(&self, cell: CellId, face: usize, d: usize) -> Option<&[f64]> {
        self.prev.get(&(cell, face, d)).map(Vec::as_slice)
    }

    pub fn record(&mut self, cell: CellId, face: usize, d: usize, values: &[f64]) {
        let e = self.next.entry((cell, face, d)).or_default();
        e.clear();
        e.extend_from_slice(values);
    }

    /// Publish the current iterate and return the maximum relative change.
    pub fn advance(&mut self) -> f64 {
        let mut diff = 0.0f64;
        let mut scale = 0.0f64;
        for (k, v) in &self.next {
            let old = self.prev.get(k);
            for (g, x) in v.iter().enumerate() {
                let o = old.and_then(|o| o.get(g)).copied().unwrap_or(0.0);
                diff = diff.max((x - o).abs());
                scale = scale.max(x.abs());
            }
        }
        self.prev.clone_from(&self.next);
        if scale > 0.0 { diff / scale } else { diff }
    }

    /// Back to the zero seed.
    pub fn reset(&mut self) {
        self.prev.clear();
        self.next.clear();
    }

    pub fn len(&self) -> usize {
        self.prev.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prev.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::bc::BoundaryCondition;
    use crate::data::material::TransportProblem;
    use crate::data::quadrature::Quadrature;
    use crate::topology::meshgen::{boundary, orthogonal_grid, uniform_slab};

    fn graph_for(mesh: &crate::topology::mesh::PartitionedMesh, q: &Quadrature, dirs: &[usize]) -> DependencyGraph {
        let p = TransportProblem::uniform(
            mesh,
            2,
            1.0,
            1.0,
            (0..4).map(|b| (b, BoundaryCondition::Vacuum)),
        );
        DependencyGraph::build(0, dirs, mesh, q, &p).unwrap()
    }

    #[test]
    fn local_reader_sees_writer_value() {
        let mesh = uniform_slab(3, 3.0, 1).unwrap().remove(0);
        let q = Quadrature::gauss_legendre_slab(4).unwrap();
        let g = graph_for(&mesh, &q, &[2, 3]);
        let mut fl = Fluds::new(&g, 2, 2);
        fl.validate_invariants().unwrap();
        assert_eq!(fl.stride(), 4);
        // cell 0 right face feeds cell 1 left face
        fl.downwind_mut(0, 1, 1).unwrap().copy_from_slice(&[3.0, 4.0]);
        assert_eq!(fl.upwind(1, 0, 1).unwrap(), &[3.0, 4.0]);
        assert_eq!(fl.slot(0, 0), Slot::BoundaryIn(boundary::XMIN));
        assert_eq!(fl.slot(2, 1), Slot::BoundaryOut(boundary::XMAX));
    }

    #[test]
    fn remote_buffers_match_counters() {
        let parts = orthogonal_grid(4, 2, 1.0, 1.0, 2, |i, _| i / 2).unwrap();
        let q = Quadrature::product(4, 2).unwrap();
        // direction 4: upper hemisphere, first quadrant
        let g = graph_for(&parts[0], &q, &[4]);
        let fl = Fluds::new(&g, 1, 2);
        fl.validate_invariants().unwrap();
        assert_eq!(fl.send_buffers().len(), 1);
        assert_eq!(fl.send_buffers()[0].num_faces(), 2);
        assert!(fl.recv_buffers().is_empty());
    }

    #[test]
    fn misaligned_chunk_is_a_protocol_violation() {
        let parts = uniform_slab(2, 2.0, 2).unwrap();
        let q = Quadrature::gauss_legendre_slab(2).unwrap();
        let g = graph_for(&parts[1], &q, &[1]);
        let mut fl = Fluds::new(&g, 1, 2);
        assert!(fl.store_received(0, 0, 0, &[1.0, 2.0, 3.0]).is_err());
        assert!(fl.store_received(0, 0, 2, &[1.0, 2.0]).is_err());
        assert_eq!(fl.store_received(0, 0, 0, &[1.0, 2.0]).unwrap(), 0..1);
        assert_eq!(fl.upwind(0, 0, 0).unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn reflected_store_publishes_on_advance() {
        let mut s = ReflectedFluxStore::default();
        let c = CellId::new(3);
        s.record(c, 1, 0, &[2.0]);
        assert!(s.previous(c, 1, 0).is_none());
        assert_eq!(s.advance(), 1.0);
        assert_eq!(s.previous(c, 1, 0), Some(&[2.0][..]));
        s.record(c, 1, 0, &[2.0]);
        assert_eq!(s.advance(), 0.0);
    }
}
