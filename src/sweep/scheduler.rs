//! Pipelined sweep execution.
//!
//! Each angle-set execution owns an [`Execution`] context: dependency
//! counts, the ready queue (smallest local index first, which is ascending
//! cell id since local cells are sorted), per-neighbour send/receive progress
//! and a partial scalar-flux accumulator. The scheduler advances a window of
//! executions in round-robin, computing a bounded number of cells per step
//! and polling for flux chunks between cells, so one rank never blocks while
//! any of its executions can make progress.
//!
//! Outgoing remote faces are sent as soon as `chunk_faces` of them are
//! complete, as any contiguous runs of the agreed buffer order, and every
//! unsent face is flushed before an execution goes idle.

use crate::algs::communicator::{Communicator, Poll, Wait};
use crate::algs::wire::{decode_flux_chunk, encode_flux_chunk};
use crate::data::flux::{ScalarFluxField, SourceMoments};
use crate::data::material::TransportProblem;
use crate::data::quadrature::Quadrature;
use crate::debug_invariants::DebugInvariants;
use crate::sweep::angle_set::{AngleSetSpec, group_directions};
use crate::sweep::chunk::{CellInput, SweepChunk};
use crate::sweep::config::SweepConfig;
use crate::sweep::cycles::check_partition_cycles;
use crate::sweep::fluds::{Fluds, ReflectedFluxStore, Slot};
use crate::sweep::graph::{DependencyGraph, FaceLink, Orientation};
use crate::sweep_error::SweepError;
use crate::topology::cell::{CellId, dot};
use crate::topology::mesh::PartitionedMesh;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

/// Directions sharing one dependency graph and one FLUDS.
#[derive(Clone, Debug)]
pub struct AngleSet {
    spec: AngleSetSpec,
    graph: DependencyGraph,
    fluds: Fluds,
}

impl AngleSet {
    pub fn id(&self) -> usize {
        self.spec.id
    }

    pub fn directions(&self) -> &[usize] {
        &self.spec.directions
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn fluds(&self) -> &Fluds {
        &self.fluds
    }
}

/// One unit of work performed by an execution.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SweepTask {
    Compute(CellId),
    /// Flux chunk of `count` faces starting at face position `offset` of the
    /// buffer shared with `rank`.
    Send { rank: usize, offset: usize, count: usize },
    Receive { rank: usize, offset: usize, count: usize },
}

/// Summary of one angle-set execution on this rank.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SweepReport {
    pub angle_set: usize,
    /// Cells in the order they were computed.
    pub order: Vec<CellId>,
    /// Full task trace, when `record_tasks` is set.
    pub tasks: Vec<SweepTask>,
    pub messages_sent: usize,
    pub messages_received: usize,
    pub values_sent: usize,
    pub values_received: usize,
    pub idle_polls: u64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum CellState {
    Waiting,
    Ready,
    /// Computed, with remote faces not yet sent.
    Sending,
    Done,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Progress {
    Working,
    Waiting,
    Finished,
}

struct Outbox {
    rank: usize,
    filled: Vec<bool>,
    sent: Vec<bool>,
    unsent: usize,
}

struct Inbox<H> {
    rank: usize,
    received: Vec<bool>,
    count: usize,
    handle: Option<H>,
}

/// Mutable state of one angle-set execution.
struct Execution<C: Communicator> {
    set: usize,
    tag: u16,
    remaining: Vec<usize>,
    state: Vec<CellState>,
    /// Remote outgoing faces of each cell still to be sent.
    unsent: Vec<usize>,
    ready: BinaryHeap<Reverse<usize>>,
    done: usize,
    outbox: Vec<Outbox>,
    inbox: Vec<Inbox<C::RecvHandle>>,
    sends: Vec<C::SendHandle>,
    partial: ScalarFluxField,
    report: SweepReport,
    idle: u64,
}

/// Reusable per-cell scratch buffers.
#[derive(Default)]
struct Scratch {
    source: Vec<f64>,
    in_coeff: Vec<f64>,
    in_psi: Vec<f64>,
    out_coeff: Vec<f64>,
    out_faces: Vec<usize>,
    psi: Vec<f64>,
    outgoing: Vec<f64>,
}

pub struct SweepScheduler<'m, K> {
    mesh: &'m PartitionedMesh,
    quadrature: &'m Quadrature,
    problem: TransportProblem,
    kernel: K,
    config: SweepConfig,
    sets: Vec<AngleSet>,
    partials: Vec<ScalarFluxField>,
    reflected: ReflectedFluxStore,
}

impl<'m, K: SweepChunk> SweepScheduler<'m, K> {
    /// Validate the problem, group directions and build every angle set's
    /// graph and FLUDS. Collective: every rank must call it.
    pub fn new<C: Communicator>(
        mesh: &'m PartitionedMesh,
        quadrature: &'m Quadrature,
        problem: TransportProblem,
        kernel: K,
        config: SweepConfig,
        comm: &C,
    ) -> Result<Self, SweepError> {
        config.validate()?;
        if mesh.num_ranks() != comm.size() || mesh.rank() != comm.rank() {
            return Err(SweepError::InvalidConfig(format!(
                "mesh partition {}/{} does not match communicator rank {}/{}",
                mesh.rank(),
                mesh.num_ranks(),
                comm.rank(),
                comm.size()
            )));
        }
        problem.validate(mesh, quadrature)?;
        let specs = group_directions(mesh, quadrature, &config, comm)?;
        config.validate_tags(specs.len())?;

        let build = |spec: &AngleSetSpec| {
            DependencyGraph::build(spec.id, &spec.directions, mesh, quadrature, &problem)
        };
        #[cfg(feature = "rayon")]
        let graphs: Vec<DependencyGraph> = {
            use rayon::prelude::*;
            specs.par_iter().map(build).collect::<Result<_, _>>()?
        };
        #[cfg(not(feature = "rayon"))]
        let graphs: Vec<DependencyGraph> = specs.iter().map(build).collect::<Result<_, _>>()?;
        check_partition_cycles(&graphs, mesh, config.collective_tag, comm)?;

        let sets: Vec<AngleSet> = specs
            .into_iter()
            .zip(graphs)
            .map(|(spec, graph)| {
                graph.debug_assert_invariants();
                let fluds = Fluds::new(&graph, spec.directions.len(), problem.num_groups);
                fluds.debug_assert_invariants();
                AngleSet { spec, graph, fluds }
            })
            .collect();
        let partials = vec![
            ScalarFluxField::zeros(mesh.num_cells(), problem.num_moments, problem.num_groups);
            sets.len()
        ];
        log::debug!(
            "rank {}: sweep scheduler ready with {} angle sets over {} cells, neighbours {:?}",
            mesh.rank(),
            sets.len(),
            mesh.num_cells(),
            mesh.neighbor_ranks()
        );
        Ok(Self {
            mesh,
            quadrature,
            problem,
            kernel,
            config,
            sets,
            partials,
            reflected: ReflectedFluxStore::default(),
        })
    }

    pub fn angle_sets(&self) -> &[AngleSet] {
        &self.sets
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    pub fn mesh(&self) -> &PartitionedMesh {
        self.mesh
    }

    pub fn problem(&self) -> &TransportProblem {
        &self.problem
    }

    /// Replace the source moments, e.g. between outer source iterations.
    pub fn set_source(&mut self, source: SourceMoments) -> Result<(), SweepError> {
        let old = std::mem::replace(&mut self.problem.source, source);
        if let Err(e) = self.problem.validate(self.mesh, self.quadrature) {
            self.problem.source = old;
            return Err(e);
        }
        Ok(())
    }

    pub fn reflected(&self) -> &ReflectedFluxStore {
        &self.reflected
    }

    /// Make this sweep's reflected outgoing flux the next sweep's incoming
    /// flux; returns the maximum relative change.
    pub fn publish_reflected(&mut self) -> f64 {
        self.reflected.advance()
    }

    pub fn reset_reflected(&mut self) {
        self.reflected.reset();
    }

    /// Scalar-flux moments of the latest execution of every angle set,
    /// summed in ascending angle-set order.
    pub fn scalar_flux(&self) -> Result<ScalarFluxField, SweepError> {
        let mut phi = ScalarFluxField::zeros(
            self.mesh.num_cells(),
            self.problem.num_moments,
            self.problem.num_groups,
        );
        for p in &self.partials {
            phi.accumulate(p)?;
        }
        Ok(phi)
    }

    pub fn sweep_angle_set<C: Communicator>(
        &mut self,
        id: usize,
        comm: &C,
    ) -> Result<SweepReport, SweepError> {
        let mut reports = self.sweep_sets(&[id], comm)?;
        reports.pop().ok_or_else(|| {
            SweepError::InvalidConfig(format!("angle set {id} produced no report"))
        })
    }

    /// Execute every angle set once; reflected inflow reads the last
    /// published iterate.
    pub fn sweep_all<C: Communicator>(&mut self, comm: &C) -> Result<Vec<SweepReport>, SweepError> {
        let ids: Vec<usize> = (0..self.sets.len()).collect();
        self.sweep_sets(&ids, comm)
    }

    /// Execute the given angle sets, interleaving up to `max_in_flight` of
    /// them. Every rank must pass the same ids in the same order.
    pub fn sweep_sets<C: Communicator>(
        &mut self,
        ids: &[usize],
        comm: &C,
    ) -> Result<Vec<SweepReport>, SweepError> {
        let mut seen = vec![false; self.sets.len()];
        for &id in ids {
            match seen.get_mut(id) {
                None => {
                    return Err(SweepError::InvalidConfig(format!(
                        "angle set {id} does not exist ({} sets)",
                        self.sets.len()
                    )));
                }
                Some(s) if *s => {
                    return Err(SweepError::InvalidConfig(format!(
                        "angle set {id} requested twice in one sweep"
                    )));
                }
                Some(s) => *s = true,
            }
        }
        let mut pending: VecDeque<usize> = ids.iter().copied().collect();
        let mut window: Vec<Execution<C>> = Vec::with_capacity(self.config.max_in_flight);
        let mut reports: Vec<SweepReport> = Vec::with_capacity(ids.len());
        let mut scratch = Scratch::default();

        loop {
            while window.len() < self.config.max_in_flight {
                let Some(id) = pending.pop_front() else { break };
                window.push(self.start(id, comm));
            }
            if window.is_empty() {
                break;
            }
            let mut any_progress = false;
            let mut k = 0;
            while k < window.len() {
                let progress = match self.advance(&mut window[k], comm, &mut scratch) {
                    Ok(p) => p,
                    Err(e) => {
                        abandon(window, comm);
                        return Err(e);
                    }
                };
                match progress {
                    Progress::Finished => {
                        let exec = window.remove(k);
                        reports.push(self.finish(exec));
                        any_progress = true;
                    }
                    Progress::Working => {
                        any_progress = true;
                        k += 1;
                    }
                    Progress::Waiting => k += 1,
                }
            }
            if !any_progress {
                std::thread::yield_now();
            }
        }
        reports.sort_by_key(|r| r.angle_set);
        Ok(reports)
    }

    fn start<C: Communicator>(&self, id: usize, comm: &C) -> Execution<C> {
        let set = &self.sets[id];
        let graph = &set.graph;
        let n = graph.num_cells();
        let remaining: Vec<usize> = graph.cells.iter().map(|c| c.pending).collect();
        let mut state = vec![CellState::Waiting; n];
        let mut ready = BinaryHeap::new();
        for (i, &r) in remaining.iter().enumerate() {
            if r == 0 {
                state[i] = CellState::Ready;
                ready.push(Reverse(i));
            }
        }
        let mut unsent = vec![0usize; n];
        let outbox = set
            .fluds
            .send_buffers()
            .iter()
            .map(|b| {
                for &c in &b.cells {
                    unsent[c] += 1;
                }
                Outbox {
                    rank: b.rank,
                    filled: vec![false; b.num_faces()],
                    sent: vec![false; b.num_faces()],
                    unsent: 0,
                }
            })
            .collect();
        // range checked by `SweepConfig::validate_tags`
        let tag = self.config.base_tag + id as u16;
        let inbox = set
            .fluds
            .recv_buffers()
            .iter()
            .map(|b| Inbox {
                rank: b.rank,
                received: vec![false; b.num_faces()],
                count: 0,
                handle: (b.num_faces() > 0).then(|| comm.irecv(b.rank, tag)),
            })
            .collect();
        log::trace!("rank {}: start angle set {id} ({} ready)", comm.rank(), ready.len());
        Execution {
            set: id,
            tag,
            remaining,
            state,
            unsent,
            ready,
            done: 0,
            outbox,
            inbox,
            sends: Vec::new(),
            partial: ScalarFluxField::zeros(n, self.problem.num_moments, self.problem.num_groups),
            report: SweepReport {
                angle_set: id,
                order: Vec::with_capacity(n),
                ..Default::default()
            },
            idle: 0,
        }
    }

    fn advance<C: Communicator>(
        &mut self,
        exec: &mut Execution<C>,
        comm: &C,
        scratch: &mut Scratch,
    ) -> Result<Progress, SweepError> {
        let mut progressed = self.poll_inbox(exec, comm)?;
        let mut steps = 0;
        while steps < self.config.cells_per_step {
            let Some(Reverse(i)) = exec.ready.pop() else { break };
            self.compute(exec, i, scratch)?;
            steps += 1;
            progressed = true;
            for b in 0..exec.outbox.len() {
                if exec.outbox[b].unsent >= self.config.chunk_faces {
                    self.flush(exec, b, comm);
                }
            }
            // Arrivals may unlock a lower-id cell.
            if self.poll_inbox(exec, comm)? {
                progressed = true;
            }
        }
        if exec.ready.is_empty() {
            for b in 0..exec.outbox.len() {
                if exec.outbox[b].unsent > 0 {
                    self.flush(exec, b, comm);
                }
            }
        }

        if exec.done == exec.state.len() {
            return Ok(Progress::Finished);
        }
        if progressed {
            exec.idle = 0;
            return Ok(Progress::Working);
        }
        exec.idle += 1;
        exec.report.idle_polls += 1;
        if let Some(limit) = self.config.max_idle_polls {
            if exec.idle > limit {
                return Err(SweepError::Stalled {
                    angle_set: exec.set,
                    rank: comm.rank(),
                    polls: exec.idle,
                });
            }
        }
        Ok(Progress::Waiting)
    }

    /// Drain every arrived flux chunk. Returns whether anything arrived.
    fn poll_inbox<C: Communicator>(
        &mut self,
        exec: &mut Execution<C>,
        comm: &C,
    ) -> Result<bool, SweepError> {
        let (set_id, tag) = (exec.set, exec.tag);
        let mut arrived = false;
        for b in 0..exec.inbox.len() {
            loop {
                let inbox = &mut exec.inbox[b];
                let Some(handle) = inbox.handle.as_mut() else { break };
                let Some(bytes) = handle.test() else { break };
                let rank = inbox.rank;
                let (hdr, values) = decode_flux_chunk(&bytes).map_err(|e| SweepError::CommError {
                    neighbor: rank,
                    source: e.into(),
                })?;
                if hdr.angle_set() != set_id {
                    return Err(SweepError::CommError {
                        neighbor: rank,
                        source: format!(
                            "flux chunk for angle set {} on the tag of angle set {set_id}",
                            hdr.angle_set()
                        )
                        .into(),
                    });
                }
                let fluds = &mut self.sets[set_id].fluds;
                let stride = fluds.stride();
                let faces = fluds.store_received(b, set_id, hdr.offset(), &values)?;
                let cells = &fluds.recv_buffers()[b].cells;
                if let Some(dup) = faces.clone().find(|&p| inbox.received[p]) {
                    let expected = inbox.received.iter().position(|r| !r).unwrap_or(inbox.received.len());
                    return Err(SweepError::ChunkOutOfOrder {
                        neighbor: rank,
                        angle_set: set_id,
                        offset: dup * stride,
                        expected_offset: expected * stride,
                    });
                }
                for p in faces.clone() {
                    inbox.received[p] = true;
                    let c = cells[p];
                    exec.remaining[c] -= 1;
                    if exec.remaining[c] == 0 && exec.state[c] == CellState::Waiting {
                        exec.state[c] = CellState::Ready;
                        exec.ready.push(Reverse(c));
                    }
                }
                inbox.count += faces.len();
                // Later chunks from the same rank queue behind this one.
                inbox.handle = (inbox.count < inbox.received.len()).then(|| comm.irecv(rank, tag));
                exec.report.messages_received += 1;
                exec.report.values_received += values.len();
                if self.config.record_tasks {
                    exec.report.tasks.push(SweepTask::Receive {
                        rank,
                        offset: faces.start,
                        count: faces.len(),
                    });
                }
                log::trace!(
                    "angle set {set_id}: {} faces from rank {rank} at {}",
                    faces.len(),
                    faces.start
                );
                arrived = true;
            }
        }
        Ok(arrived)
    }

    /// Send every contiguous run of filled, unsent faces of outbox `b`.
    fn flush<C: Communicator>(&self, exec: &mut Execution<C>, b: usize, comm: &C) {
        let fluds = &self.sets[exec.set].fluds;
        let cells = &fluds.send_buffers()[b].cells;
        let stride = fluds.stride();
        let ob = &mut exec.outbox[b];
        let n = ob.filled.len();
        let mut p = 0;
        while p < n {
            if !ob.filled[p] || ob.sent[p] {
                p += 1;
                continue;
            }
            let start = p;
            while p < n && ob.filled[p] && !ob.sent[p] {
                ob.sent[p] = true;
                let c = cells[p];
                exec.unsent[c] -= 1;
                if exec.unsent[c] == 0 && exec.state[c] == CellState::Sending {
                    exec.state[c] = CellState::Done;
                    exec.done += 1;
                }
                p += 1;
            }
            let count = p - start;
            let msg = encode_flux_chunk(exec.set, start * stride, fluds.send_values(b, start, count));
            exec.sends.push(comm.isend(ob.rank, exec.tag, &msg));
            ob.unsent -= count;
            exec.report.messages_sent += 1;
            exec.report.values_sent += count * stride;
            if self.config.record_tasks {
                exec.report.tasks.push(SweepTask::Send {
                    rank: ob.rank,
                    offset: start,
                    count,
                });
            }
            log::trace!("angle set {}: {count} faces to rank {} at {start}", exec.set, ob.rank);
        }
    }

    /// Run the kernel on local cell `i` for every direction of the set.
    fn compute<C: Communicator>(
        &mut self,
        exec: &mut Execution<C>,
        i: usize,
        s: &mut Scratch,
    ) -> Result<(), SweepError> {
        let set = &mut self.sets[exec.set];
        let cell = &self.mesh.cells()[i];
        let deps = &set.graph.cells[i];
        let g_n = self.problem.num_groups;
        let sigma_t = &self
            .problem
            .material(cell.material)
            .ok_or(SweepError::UnknownMaterial {
                cell: cell.id,
                material: cell.material,
            })?
            .sigma_t;

        for (k, &d) in set.spec.directions.iter().enumerate() {
            let dir = self.quadrature.direction(d);
            s.source.clear();
            s.source.extend((0..g_n).map(|g| {
                (0..self.problem.num_moments)
                    .map(|m| self.quadrature.m2d(d, m) * self.problem.source.get(i, m, g))
                    .sum::<f64>()
            }));
            s.in_coeff.clear();
            s.in_psi.clear();
            s.out_coeff.clear();
            s.out_faces.clear();
            for (f, face) in cell.faces.iter().enumerate() {
                let c = dot(dir.omega, face.normal).abs() * face.area;
                match deps.faces[f].orientation {
                    Orientation::Parallel => {}
                    Orientation::Outgoing => {
                        s.out_coeff.push(c);
                        s.out_faces.push(f);
                    }
                    Orientation::Incoming => {
                        s.in_coeff.push(c);
                        match set.fluds.slot(i, f) {
                            Slot::BoundaryIn(id) => {
                                let bc = self.problem.boundary(id).ok_or(SweepError::UnassignedBoundary {
                                    cell: cell.id,
                                    face: f,
                                    boundary_id: id,
                                })?;
                                s.in_psi.extend((0..g_n).map(|_| bc.incoming(0.0)));
                            }
                            Slot::ReflectedIn(r) => {
                                let inflow = &set.graph.reflected_in[r];
                                let bc = self.problem.boundary(inflow.boundary).ok_or(
                                    SweepError::UnassignedBoundary {
                                        cell: cell.id,
                                        face: f,
                                        boundary_id: inflow.boundary,
                                    },
                                )?;
                                let prev = self.reflected.previous(cell.id, f, inflow.mirrors[k]);
                                s.in_psi.extend((0..g_n).map(|g| {
                                    bc.incoming(prev.and_then(|v| v.get(g)).copied().unwrap_or(0.0))
                                }));
                            }
                            _ => {
                                let up = set.fluds.upwind(i, f, k).ok_or_else(|| {
                                    SweepError::InvalidMesh(format!(
                                        "cell {} face {f}: no upwind storage",
                                        cell.id
                                    ))
                                })?;
                                s.in_psi.extend_from_slice(up);
                            }
                        }
                    }
                }
            }

            s.psi.clear();
            s.psi.resize(g_n, 0.0);
            s.outgoing.clear();
            s.outgoing.resize(s.out_faces.len() * g_n, 0.0);
            let input = CellInput {
                cell: cell.id,
                volume: cell.volume,
                omega: dir.omega,
                num_groups: g_n,
                sigma_t,
                source: &s.source,
                incoming_coeff: &s.in_coeff,
                incoming_psi: &s.in_psi,
                outgoing_coeff: &s.out_coeff,
            };
            self.kernel.compute_cell(&input, &mut s.psi, &mut s.outgoing)?;

            for (o, &f) in s.out_faces.iter().enumerate() {
                let values = &s.outgoing[o * g_n..(o + 1) * g_n];
                match set.fluds.slot(i, f) {
                    Slot::ReflectedOut(_) => self.reflected.record(cell.id, f, d, values),
                    Slot::LocalOut(_) | Slot::RemoteOut { .. } => {
                        if let Some(dst) = set.fluds.downwind_mut(i, f, k) {
                            dst.copy_from_slice(values);
                        }
                    }
                    _ => {}
                }
            }
            for m in 0..self.problem.num_moments {
                let w = self.quadrature.d2m(d, m);
                for g in 0..g_n {
                    exec.partial.add(i, m, g, w * s.psi[g]);
                }
            }
        }

        // Publish to downwind consumers.
        for (f, info) in deps.faces.iter().enumerate() {
            if info.orientation != Orientation::Outgoing {
                continue;
            }
            match set.fluds.slot(i, f) {
                Slot::LocalOut(_) => {
                    if let FaceLink::Local { cell: j, .. } = info.link {
                        exec.remaining[j] -= 1;
                        if exec.remaining[j] == 0 && exec.state[j] == CellState::Waiting {
                            exec.state[j] = CellState::Ready;
                            exec.ready.push(Reverse(j));
                        }
                    }
                }
                Slot::RemoteOut { buffer, pos } => {
                    let ob = &mut exec.outbox[buffer];
                    ob.filled[pos] = true;
                    ob.unsent += 1;
                }
                _ => {}
            }
        }

        exec.state[i] = if exec.unsent[i] == 0 {
            exec.done += 1;
            CellState::Done
        } else {
            CellState::Sending
        };
        exec.report.order.push(cell.id);
        if self.config.record_tasks {
            exec.report.tasks.push(SweepTask::Compute(cell.id));
        }
        Ok(())
    }

    fn finish<C: Communicator>(&mut self, mut exec: Execution<C>) -> SweepReport {
        for h in exec.sends.drain(..) {
            let _ = h.wait();
        }
        debug_assert!(exec.inbox.iter().all(|b| b.handle.is_none()));
        std::mem::swap(&mut self.partials[exec.set], &mut exec.partial);
        log::debug!(
            "angle set {} done: {} cells, {} messages out, {} in, {} idle polls",
            exec.set,
            exec.report.order.len(),
            exec.report.messages_sent,
            exec.report.messages_received,
            exec.report.idle_polls
        );
        exec.report
    }
}

/// Complete every posted send of executions cut short by an error, so no
/// transport request is dropped while still in flight.
fn abandon<C: Communicator>(window: Vec<Execution<C>>, comm: &C) {
    for mut exec in window {
        let pending = exec.sends.len();
        for h in exec.sends.drain(..) {
            let _ = h.wait();
        }
        log::debug!(
            "rank {}: abandoned angle set {} after {} cells, {pending} sends drained",
            comm.rank(),
            exec.set,
            exec.done
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::data::bc::BoundaryCondition;
    use crate::sweep::chunk::StepKernel;
    use crate::topology::meshgen::{boundary, uniform_slab};

    fn slab_problem(mesh: &PartitionedMesh, right: BoundaryCondition) -> TransportProblem {
        TransportProblem::uniform(
            mesh,
            1,
            1.0,
            1.0,
            [(boundary::XMIN, BoundaryCondition::Vacuum), (boundary::XMAX, right)],
        )
    }

    #[test]
    fn serial_slab_sweeps_in_id_order() {
        let mesh = uniform_slab(5, 5.0, 1).unwrap().remove(0);
        let q = Quadrature::gauss_legendre_slab(2).unwrap();
        let p = slab_problem(&mesh, BoundaryCondition::Vacuum);
        let mut s = SweepScheduler::new(&mesh, &q, p, StepKernel, SweepConfig::default(), &NoComm).unwrap();
        let reports = s.sweep_all(&NoComm).unwrap();
        assert_eq!(reports.len(), 2);
        let ids = |r: &SweepReport| r.order.iter().map(|c| c.get()).collect::<Vec<_>>();
        assert_eq!(ids(&reports[0]), vec![4, 3, 2, 1, 0]);
        assert_eq!(ids(&reports[1]), vec![0, 1, 2, 3, 4]);
        assert!(reports.iter().all(|r| r.messages_sent == 0 && r.messages_received == 0));
        let phi = s.scalar_flux().unwrap();
        // symmetric problem
        assert!((phi.get(0, 0, 0) - phi.get(4, 0, 0)).abs() < 1e-12);
        assert!(phi.get(2, 0, 0) > phi.get(0, 0, 0));
    }

    #[test]
    fn task_trace_is_recorded_on_request() {
        let mesh = uniform_slab(3, 3.0, 1).unwrap().remove(0);
        let q = Quadrature::gauss_legendre_slab(2).unwrap();
        let p = slab_problem(&mesh, BoundaryCondition::Vacuum);
        let cfg = SweepConfig {
            record_tasks: true,
            max_in_flight: 1,
            ..Default::default()
        };
        let mut s = SweepScheduler::new(&mesh, &q, p, StepKernel, cfg, &NoComm).unwrap();
        let r = s.sweep_angle_set(1, &NoComm).unwrap();
        assert_eq!(
            r.tasks,
            (0..3).map(|c| SweepTask::Compute(CellId::new(c))).collect::<Vec<_>>()
        );
    }

    #[test]
    fn unknown_angle_set_is_rejected() {
        let mesh = uniform_slab(2, 1.0, 1).unwrap().remove(0);
        let q = Quadrature::gauss_legendre_slab(2).unwrap();
        let p = slab_problem(&mesh, BoundaryCondition::Vacuum);
        let mut s = SweepScheduler::new(&mesh, &q, p, StepKernel, SweepConfig::default(), &NoComm).unwrap();
        assert!(s.sweep_angle_set(7, &NoComm).is_err());
    }

    #[test]
    fn repeated_angle_set_in_one_sweep_is_rejected() {
        let mesh = uniform_slab(3, 1.0, 1).unwrap().remove(0);
        let q = Quadrature::gauss_legendre_slab(2).unwrap();
        let p = slab_problem(&mesh, BoundaryCondition::Vacuum);
        let mut s = SweepScheduler::new(&mesh, &q, p, StepKernel, SweepConfig::default(), &NoComm).unwrap();
        let err = s.sweep_sets(&[0, 0], &NoComm).unwrap_err();
        assert!(matches!(err, SweepError::InvalidConfig(_)));
        assert!(s.sweep_sets(&[1, 0, 1], &NoComm).is_err());
        assert_eq!(s.sweep_sets(&[1, 0], &NoComm).unwrap().len(), 2);
    }

    #[test]
    fn reflected_outflow_is_recorded_but_not_published() {
        let mesh = uniform_slab(2, 1.0, 1).unwrap().remove(0);
        let q = Quadrature::gauss_legendre_slab(2).unwrap();
        let p = slab_problem(&mesh, BoundaryCondition::Reflecting);
        let mut s = SweepScheduler::new(&mesh, &q, p, StepKernel, SweepConfig::default(), &NoComm).unwrap();
        s.sweep_all(&NoComm).unwrap();
        assert!(s.reflected().is_empty());
        assert!(s.publish_reflected() > 0.0);
        assert_eq!(s.reflected().len(), 1);
    }

    #[test]
    fn source_shape_is_checked() {
        let mesh = uniform_slab(2, 1.0, 1).unwrap().remove(0);
        let q = Quadrature::gauss_legendre_slab(2).unwrap();
        let p = slab_problem(&mesh, BoundaryCondition::Vacuum);
        let mut s = SweepScheduler::new(&mesh, &q, p, StepKernel, SweepConfig::default(), &NoComm).unwrap();
        assert!(s.set_source(SourceMoments::zeros(3, 1, 1)).is_err());
        assert!(s.set_source(SourceMoments::isotropic(2, 1, 1, 2.0)).is_ok());
    }
}
