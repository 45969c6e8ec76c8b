//! Small collectives built on point-to-point messages.
//!
//! Both helpers exchange one message with every other rank. They post all
//! receives, then all sends, and always drain every handle before returning,
//! even if an error occurs.

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{KIND_GATHER_U32, KIND_GATHER_U64, KIND_REDUCE_F64, decode_scalars, encode_scalars};
use crate::sweep_error::SweepError;

fn exchange_with_all<C>(comm: &C, tag: CommTag, payload: &[u8]) -> Result<Vec<(usize, Vec<u8>)>, SweepError>
where
    C: Communicator,
{
    let me = comm.rank();
    let peers: Vec<usize> = (0..comm.size()).filter(|&r| r != me).collect();

    // 1) post all receives
    let recvs: Vec<_> = peers
        .iter()
        .map(|&p| (p, comm.irecv(p, tag.as_u16())))
        .collect();

    // 2) post all sends
    let sends: Vec<_> = peers
        .iter()
        .map(|&p| comm.isend(p, tag.as_u16(), payload))
        .collect();

    // 3) wait for all recvs (but do not early-return)
    let mut out = Vec::with_capacity(peers.len());
    let mut maybe_err = None;
    for (peer, h) in recvs {
        match h.wait() {
            Some(data) => out.push((peer, data)),
            None if maybe_err.is_none() => {
                maybe_err = Some(SweepError::CommError {
                    neighbor: peer,
                    source: format!("no collective message from rank {peer}").into(),
                });
            }
            None => {}
        }
    }

    // 4) always drain sends
    for s in sends {
        let _ = s.wait();
    }

    match maybe_err {
        Some(e) => Err(e),
        None => Ok(out),
    }
}

/// Global maximum of `value` over all ranks.
pub fn all_reduce_max<C: Communicator>(comm: &C, tag: CommTag, value: f64) -> Result<f64, SweepError> {
    if comm.size() <= 1 {
        return Ok(value);
    }
    let payload = encode_scalars(KIND_REDUCE_F64, &[value], |v: f64| v.to_bits().to_le_bytes());
    let mut acc = value;
    for (peer, data) in exchange_with_all(comm, tag, &payload)? {
        let words = decode_scalars(KIND_REDUCE_F64, &data).map_err(|e| SweepError::CommError {
            neighbor: peer,
            source: e.into(),
        })?;
        if words.len() != 1 {
            return Err(SweepError::BufferLengthMismatch {
                neighbor: peer,
                angle_set: usize::MAX,
                expected: 1,
                got: words.len(),
            });
        }
        acc = acc.max(f64::from_bits(u64::from_le_bytes(words[0])));
    }
    Ok(acc)
}

/// Gather one `u32` vector from every rank, indexed by rank.
///
/// All ranks must contribute vectors of the same length.
pub fn all_gather_u32<C: Communicator>(
    comm: &C,
    tag: CommTag,
    values: &[u32],
) -> Result<Vec<Vec<u32>>, SweepError> {
    let mut out = vec![Vec::new(); comm.size().max(1)];
    out[comm.rank()] = values.to_vec();
    if comm.size() <= 1 {
        return Ok(out);
    }
    let payload = encode_scalars(KIND_GATHER_U32, values, |v: u32| (v as u64).to_le_bytes());
    for (peer, data) in exchange_with_all(comm, tag, &payload)? {
        let words = decode_scalars(KIND_GATHER_U32, &data).map_err(|e| SweepError::CommError {
            neighbor: peer,
            source: e.into(),
        })?;
        if words.len() != values.len() {
            return Err(SweepError::BufferLengthMismatch {
                neighbor: peer,
                angle_set: usize::MAX,
                expected: values.len(),
                got: words.len(),
            });
        }
        out[peer] = words
            .into_iter()
            .map(|w| u64::from_le_bytes(w) as u32)
            .collect();
    }
    Ok(out)
}

/// Gather one `u64` vector from every rank, indexed by rank. Lengths may
/// differ between ranks.
pub fn all_gather_u64<C: Communicator>(
    comm: &C,
    tag: CommTag,
    values: &[u64],
) -> Result<Vec<Vec<u64>>, SweepError> {
    let mut out = vec![Vec::new(); comm.size().max(1)];
    out[comm.rank()] = values.to_vec();
    if comm.size() <= 1 {
        return Ok(out);
    }
    let payload = encode_scalars(KIND_GATHER_U64, values, u64::to_le_bytes);
    for (peer, data) in exchange_with_all(comm, tag, &payload)? {
        let words = decode_scalars(KIND_GATHER_U64, &data).map_err(|e| SweepError::CommError {
            neighbor: peer,
            source: e.into(),
        })?;
        out[peer] = words.into_iter().map(u64::from_le_bytes).collect();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, RayonComm};

    #[test]
    fn serial_collectives_are_identity() {
        assert_eq!(all_reduce_max(&NoComm, CommTag::new(1), 2.5).unwrap(), 2.5);
        let g = all_gather_u32(&NoComm, CommTag::new(2), &[4, 5]).unwrap();
        assert_eq!(g, vec![vec![4, 5]]);
    }

    #[test]
    fn three_rank_reduce_and_gather() {
        let world = RayonComm::world(3);
        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = world
                .iter()
                .map(|comm| {
                    s.spawn(move || {
                        let r = comm.rank();
                        let max = all_reduce_max(comm, CommTag::new(10), r as f64 * 1.5).unwrap();
                        let g = all_gather_u32(comm, CommTag::new(11), &[r as u32, 7]).unwrap();
                        let ragged: Vec<u64> = (0..r as u64).collect();
                        let v = all_gather_u64(comm, CommTag::new(12), &ragged).unwrap();
                        (max, g, v)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for (max, g, v) in results {
            assert_eq!(max, 3.0);
            assert_eq!(g, vec![vec![0, 7], vec![1, 7], vec![2, 7]]);
            assert_eq!(v, vec![vec![], vec![0], vec![0, 1]]);
        }
    }
}
