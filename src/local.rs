//! In-process transport: a process group whose members are threads.
//!
//! [`LocalCluster::create`] builds one [`LocalTransport`] per member, all
//! attached to a shared hub. Each member is meant to be driven by its own
//! thread, exactly as each rank of a launched job is driven by its own
//! process. [`LocalCluster::run`] does the thread plumbing for you.
//!
//! # Semantics
//!
//! - Point-to-point messages are buffered: `isend` copies the payload into the
//!   hub and completes immediately. Receives are matched per
//!   `(source, dest, tag)` channel in issue order, so delivery is FIFO.
//! - Collectives rendezvous in rounds. Each member numbers the collectives it
//!   issues; round `n` collects one contribution per member and completes on a
//!   member once all contributions are present.
//! - Dropping a member's transport marks its rank as departed. A peer waiting
//!   on a message or contribution that can no longer arrive fails with
//!   [`Error::TransportFailure`].
//!
//! # Example
//!
//! ```
//! use ferrodist::{LocalCluster, ReduceOp};
//! use ndarray::Array1;
//!
//! let sums = LocalCluster::run(3, |world| {
//!     let send = Array1::from_elem(4, 1i64);
//!     let mut recv = Array1::zeros(4);
//!     world.allreduce(send.view(), recv.view_mut(), ReduceOp::Sum).unwrap();
//!     recv[0]
//! }).unwrap();
//! assert_eq!(sums, vec![3, 3, 3]);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::trace;

use crate::comm::Communicator;
use crate::datatype::{fill_identity, reduce_bytes, DatatypeTag};
use crate::error::{Error, Result};
use crate::transport::{Completed, InFlight, Pending, Transport};
use crate::ReduceOp;

/// Factory for in-process process groups.
pub struct LocalCluster;

impl LocalCluster {
    /// Create the transports of a `size`-member group, in rank order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRank`] if `size` is zero or does not fit in an
    /// `i32`.
    pub fn create(size: usize) -> Result<Vec<LocalTransport>> {
        let ranks = i32::try_from(size).map_err(|_| Error::InvalidRank(i32::MAX))?;
        if ranks == 0 {
            return Err(Error::InvalidRank(0));
        }
        let hub = Arc::new(Hub {
            size,
            state: Mutex::new(HubState {
                departed: vec![false; size],
                ..HubState::default()
            }),
            changed: Condvar::new(),
        });
        Ok((0..size)
            .map(|rank| LocalTransport {
                rank,
                hub: Arc::clone(&hub),
                sequence: AtomicU64::new(0),
            })
            .collect())
    }

    /// Run `f` on every member of a fresh `size`-member group, one thread per
    /// member, and return the results in rank order.
    ///
    /// A panic on any member is re-raised on the calling thread.
    ///
    /// # Errors
    ///
    /// Fails as [`create`](Self::create) does, before any thread is spawned.
    pub fn run<F, R>(size: usize, f: F) -> Result<Vec<R>>
    where
        F: Fn(Communicator) -> R + Sync,
        R: Send,
    {
        let members = Self::create(size)?;
        Ok(std::thread::scope(|scope| {
            let f = &f;
            let handles: Vec<_> = members
                .into_iter()
                .map(|member| scope.spawn(move || f(Communicator::new(Arc::new(member)))))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        }))
    }
}

/// One member's handle on an in-process group.
pub struct LocalTransport {
    rank: usize,
    hub: Arc<Hub>,
    /// Number of collectives this member has issued.
    sequence: AtomicU64,
}

struct Hub {
    size: usize,
    state: Mutex<HubState>,
    changed: Condvar,
}

#[derive(Default)]
struct HubState {
    /// Messages in flight, keyed by channel and per-channel send number.
    mailbox: HashMap<(Channel, u64), Vec<u8>>,
    /// Next send number per channel.
    sent: HashMap<Channel, u64>,
    /// Next receive number per channel.
    posted: HashMap<Channel, u64>,
    rounds: HashMap<u64, Round>,
    departed: Vec<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Channel {
    source: usize,
    dest: usize,
    tag: i32,
}

struct Round {
    kind: &'static str,
    contributions: Vec<Option<Vec<u8>>>,
    /// Run lengths of a scatter, supplied by its root.
    runs: Option<Vec<usize>>,
    /// Members that have completed this round.
    finished: usize,
}

impl Round {
    fn is_full(&self) -> bool {
        self.contributions.iter().all(Option::is_some)
    }

    /// First member that departed without contributing.
    fn missing_departed(&self, departed: &[bool]) -> Option<usize> {
        self.contributions
            .iter()
            .zip(departed)
            .position(|(contribution, &gone)| contribution.is_none() && gone)
    }
}

/// How a member turns a full round into its own result.
#[derive(Debug, Clone, Copy)]
enum Finish {
    Broadcast { root: usize },
    Reduce { root: Option<usize>, dtype: DatatypeTag, op: ReduceOp },
    Scan { inclusive: bool, dtype: DatatypeTag, op: ReduceOp },
    Gather { root: Option<usize> },
    Scatter { root: usize },
    Barrier,
}

impl Finish {
    fn apply(self, rank: usize, round: &Round, landing: &mut [u8]) -> Result<()> {
        let parts: Vec<&[u8]> = round.contributions.iter().flatten().map(Vec::as_slice).collect();
        let parts = parts.as_slice();
        match self {
            Finish::Broadcast { root } => copy_exact(landing, parts[root]),
            Finish::Reduce { root, dtype, op } => {
                if root.is_some_and(|root| root != rank) {
                    return Ok(());
                }
                combine_into(landing, parts, dtype, op)
            }
            Finish::Scan { inclusive, dtype, op } => {
                let upto = if inclusive { rank + 1 } else { rank };
                if upto == 0 {
                    expect_len(landing, parts[rank].len())?;
                    fill_identity(dtype, op, landing);
                    return Ok(());
                }
                expect_len(landing, parts[rank].len())?;
                combine_into(landing, &parts[..upto], dtype, op)
            }
            Finish::Gather { root } => {
                if root.is_some_and(|root| root != rank) {
                    return Ok(());
                }
                let total: usize = parts.iter().map(|p| p.len()).sum();
                if landing.len() != total {
                    return Err(Error::ShapeMismatch(format!(
                        "members contributed {total} bytes to a {}-byte gather destination",
                        landing.len()
                    )));
                }
                let mut cursor = 0;
                for part in parts {
                    landing[cursor..cursor + part.len()].copy_from_slice(part);
                    cursor += part.len();
                }
                Ok(())
            }
            Finish::Scatter { root } => {
                let runs = round
                    .runs
                    .as_deref()
                    .ok_or_else(|| Error::Internal(format!("scatter root {root} sent no run lengths")))?;
                let start: usize = runs[..rank].iter().sum();
                let run = runs[rank];
                if landing.len() != run {
                    return Err(Error::ShapeMismatch(format!(
                        "rank {rank} is sent {run} bytes, destination holds {}",
                        landing.len()
                    )));
                }
                landing.copy_from_slice(&parts[root][start..start + run]);
                Ok(())
            }
            Finish::Barrier => Ok(()),
        }
    }
}

fn expect_len(landing: &[u8], expected: usize) -> Result<()> {
    if landing.len() != expected {
        return Err(Error::transport(format!(
            "landing buffer holds {} bytes, operation delivers {expected}",
            landing.len()
        )));
    }
    Ok(())
}

fn copy_exact(landing: &mut [u8], payload: &[u8]) -> Result<()> {
    expect_len(landing, payload.len())?;
    landing.copy_from_slice(payload);
    Ok(())
}

fn combine_into(landing: &mut [u8], parts: &[&[u8]], dtype: DatatypeTag, op: ReduceOp) -> Result<()> {
    let Some((first, rest)) = parts.split_first() else {
        return Ok(());
    };
    copy_exact(landing, first)?;
    for part in rest {
        if part.len() != first.len() {
            return Err(Error::transport(format!(
                "members contributed {} and {} bytes to one reduction",
                first.len(),
                part.len()
            )));
        }
        reduce_bytes(dtype, op, landing, part);
    }
    Ok(())
}

impl Hub {
    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock()
    }
}

impl LocalTransport {
    fn peer(&self, rank: i32) -> Result<usize> {
        usize::try_from(rank)
            .ok()
            .filter(|&r| r < self.hub.size)
            .ok_or(Error::InvalidRank(rank))
    }

    fn contribute(&self, kind: &'static str, payload: Vec<u8>, finish: Finish) -> Result<Pending> {
        self.contribute_runs(kind, payload, None, finish)
    }

    fn contribute_runs(
        &self,
        kind: &'static str,
        payload: Vec<u8>,
        runs: Option<Vec<usize>>,
        finish: Finish,
    ) -> Result<Pending> {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let size = self.hub.size;
        {
            let mut state = self.hub.lock();
            let round = state.rounds.entry(seq).or_insert_with(|| Round {
                kind,
                contributions: vec![None; size],
                runs: None,
                finished: 0,
            });
            if round.kind != kind {
                return Err(Error::transport(format!(
                    "rank {} issued {kind} as collective #{seq} while another member issued {}",
                    self.rank, round.kind
                )));
            }
            trace!(rank = self.rank, seq, kind, bytes = payload.len(), "contributed");
            round.contributions[self.rank] = Some(payload);
            if runs.is_some() {
                round.runs = runs;
            }
        }
        self.hub.changed.notify_all();
        Ok(Box::new(RoundInFlight {
            hub: Arc::clone(&self.hub),
            rank: self.rank,
            seq,
            finish,
        }))
    }
}

impl Transport for LocalTransport {
    fn rank(&self) -> i32 {
        self.rank as i32
    }

    fn size(&self) -> i32 {
        self.hub.size as i32
    }

    fn isend(&self, data: &[u8], dest: i32, tag: i32) -> Result<Pending> {
        let dest = self.peer(dest)?;
        let channel = Channel {
            source: self.rank,
            dest,
            tag,
        };
        {
            let mut state = self.hub.lock();
            if state.departed[dest] {
                return Err(Error::transport(format!("rank {dest} has left the group")));
            }
            let number = state.sent.entry(channel).or_insert(0);
            let key = (channel, *number);
            *number += 1;
            trace!(rank = self.rank, dest, tag, bytes = data.len(), "buffered message");
            state.mailbox.insert(key, data.to_vec());
        }
        self.hub.changed.notify_all();
        Ok(Box::new(Completed))
    }

    fn irecv(&self, source: i32, tag: i32) -> Result<Pending> {
        let source = self.peer(source)?;
        let channel = Channel {
            source,
            dest: self.rank,
            tag,
        };
        let ticket = {
            let mut state = self.hub.lock();
            let number = state.posted.entry(channel).or_insert(0);
            let ticket = *number;
            *number += 1;
            ticket
        };
        Ok(Box::new(RecvInFlight {
            hub: Arc::clone(&self.hub),
            channel,
            ticket,
        }))
    }

    fn ibroadcast(&self, data: &[u8], root: i32) -> Result<Pending> {
        let root = self.peer(root)?;
        let payload = if root == self.rank { data.to_vec() } else { Vec::new() };
        self.contribute("broadcast", payload, Finish::Broadcast { root })
    }

    fn ireduce(&self, data: &[u8], dtype: DatatypeTag, op: ReduceOp, root: i32) -> Result<Pending> {
        let root = self.peer(root)?;
        let finish = Finish::Reduce {
            root: Some(root),
            dtype,
            op,
        };
        self.contribute("reduce", data.to_vec(), finish)
    }

    fn iallreduce(&self, data: &[u8], dtype: DatatypeTag, op: ReduceOp) -> Result<Pending> {
        let finish = Finish::Reduce {
            root: None,
            dtype,
            op,
        };
        self.contribute("allreduce", data.to_vec(), finish)
    }

    fn iscan(&self, data: &[u8], dtype: DatatypeTag, op: ReduceOp) -> Result<Pending> {
        let finish = Finish::Scan {
            inclusive: true,
            dtype,
            op,
        };
        self.contribute("scan", data.to_vec(), finish)
    }

    fn iexscan(&self, data: &[u8], dtype: DatatypeTag, op: ReduceOp) -> Result<Pending> {
        let finish = Finish::Scan {
            inclusive: false,
            dtype,
            op,
        };
        self.contribute("exscan", data.to_vec(), finish)
    }

    fn igather(&self, data: &[u8], root: i32) -> Result<Pending> {
        let root = self.peer(root)?;
        self.contribute("gather", data.to_vec(), Finish::Gather { root: Some(root) })
    }

    fn iallgather(&self, data: &[u8]) -> Result<Pending> {
        self.contribute("allgather", data.to_vec(), Finish::Gather { root: None })
    }

    fn iscatter(&self, data: &[u8], counts: &[usize], root: i32) -> Result<Pending> {
        let root = self.peer(root)?;
        if root != self.rank {
            return self.contribute("scatter", Vec::new(), Finish::Scatter { root });
        }
        if counts.len() != self.hub.size || counts.iter().sum::<usize>() != data.len() {
            return Err(Error::transport(format!(
                "scatter runs {counts:?} do not split {} bytes over {} members",
                data.len(),
                self.hub.size
            )));
        }
        self.contribute_runs(
            "scatter",
            data.to_vec(),
            Some(counts.to_vec()),
            Finish::Scatter { root },
        )
    }

    fn ibarrier(&self) -> Result<Pending> {
        self.contribute("barrier", Vec::new(), Finish::Barrier)
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        self.hub.lock().departed[self.rank] = true;
        self.hub.changed.notify_all();
        trace!(rank = self.rank, "left the group");
    }
}

struct RecvInFlight {
    hub: Arc<Hub>,
    channel: Channel,
    ticket: u64,
}

impl RecvInFlight {
    fn key(&self) -> (Channel, u64) {
        (self.channel, self.ticket)
    }

    /// Fails once the sender is gone and can no longer supply this ticket.
    fn check_source(&self, state: &HubState) -> Result<()> {
        let sent = state.sent.get(&self.channel).copied().unwrap_or(0);
        if state.departed[self.channel.source] && sent <= self.ticket {
            return Err(Error::transport(format!(
                "rank {} left the group before sending tag {}",
                self.channel.source, self.channel.tag
            )));
        }
        Ok(())
    }
}

impl InFlight for RecvInFlight {
    fn test(&mut self) -> Result<bool> {
        let state = self.hub.lock();
        if state.mailbox.contains_key(&self.key()) {
            return Ok(true);
        }
        self.check_source(&state)?;
        Ok(false)
    }

    fn complete(self: Box<Self>, landing: &mut [u8]) -> Result<()> {
        let mut state = self.hub.lock();
        loop {
            let delivered = state.mailbox.remove(&self.key());
            if let Some(payload) = delivered {
                drop(state);
                if payload.len() != landing.len() {
                    return Err(Error::transport(format!(
                        "message of {} bytes from rank {} does not fit a {}-byte receive",
                        payload.len(),
                        self.channel.source,
                        landing.len()
                    )));
                }
                landing.copy_from_slice(&payload);
                return Ok(());
            }
            self.check_source(&state)?;
            self.hub.changed.wait(&mut state);
        }
    }
}

struct RoundInFlight {
    hub: Arc<Hub>,
    rank: usize,
    seq: u64,
    finish: Finish,
}

impl RoundInFlight {
    fn ready(&self, state: &HubState) -> Result<bool> {
        let round = state
            .rounds
            .get(&self.seq)
            .ok_or_else(|| Error::Internal(format!("collective #{} vanished", self.seq)))?;
        if round.is_full() {
            return Ok(true);
        }
        if let Some(missing) = round.missing_departed(&state.departed) {
            return Err(Error::transport(format!(
                "rank {missing} left the group before joining {} #{}",
                round.kind, self.seq
            )));
        }
        Ok(false)
    }
}

impl InFlight for RoundInFlight {
    fn test(&mut self) -> Result<bool> {
        let state = self.hub.lock();
        self.ready(&state)
    }

    fn complete(self: Box<Self>, landing: &mut [u8]) -> Result<()> {
        let mut state = self.hub.lock();
        while !self.ready(&state)? {
            self.hub.changed.wait(&mut state);
        }
        let size = self.hub.size;
        let outcome = {
            let round = state
                .rounds
                .get(&self.seq)
                .ok_or_else(|| Error::Internal(format!("collective #{} vanished", self.seq)))?;
            self.finish.apply(self.rank, round, landing)
        };
        if let Some(round) = state.rounds.get_mut(&self.seq) {
            round.finished += 1;
            if round.finished == size {
                state.rounds.remove(&self.seq);
            }
        }
        trace!(rank = self.rank, seq = self.seq, "completed collective");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(values: &[i32]) -> Vec<u8> {
        bytemuck::cast_slice(values).to_vec()
    }

    fn ints(raw: &[u8]) -> Vec<i32> {
        raw.chunks_exact(4).map(bytemuck::pod_read_unaligned).collect()
    }

    fn on_members<R: Send>(size: usize, f: impl Fn(LocalTransport) -> R + Sync) -> Vec<R> {
        let members = LocalCluster::create(size).unwrap();
        std::thread::scope(|scope| {
            let f = &f;
            let handles: Vec<_> = members.into_iter().map(|m| scope.spawn(move || f(m))).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    #[test]
    fn create_assigns_ranks_in_order() {
        let members = LocalCluster::create(3).unwrap();
        for (i, m) in members.iter().enumerate() {
            assert_eq!(m.rank(), i as i32);
            assert_eq!(m.size(), 3);
        }
    }

    #[test]
    fn empty_group_is_rejected() {
        assert!(matches!(LocalCluster::create(0), Err(Error::InvalidRank(0))));
        assert!(matches!(
            LocalCluster::run(0, |world| world.rank()),
            Err(Error::InvalidRank(0))
        ));
    }

    #[test]
    fn self_send_is_buffered() {
        let member = LocalCluster::create(1).unwrap().pop().unwrap();
        member.send(&bytes(&[1, 2, 3]), 0, 7).unwrap();
        let mut landing = vec![0u8; 12];
        member.recv(&mut landing, 0, 7).unwrap();
        assert_eq!(ints(&landing), vec![1, 2, 3]);
    }

    #[test]
    fn messages_on_one_channel_arrive_in_order() {
        let member = LocalCluster::create(1).unwrap().pop().unwrap();
        let first = member.irecv(0, 1).unwrap();
        let mut second = member.irecv(0, 1).unwrap();
        assert!(!second.test().unwrap());

        member.send(&bytes(&[10]), 0, 1).unwrap();
        member.send(&bytes(&[20]), 0, 1).unwrap();

        let mut b = vec![0u8; 4];
        second.complete(&mut b).unwrap();
        let mut a = vec![0u8; 4];
        first.complete(&mut a).unwrap();
        assert_eq!((ints(&a), ints(&b)), (vec![10], vec![20]));
    }

    #[test]
    fn tags_separate_channels() {
        let member = LocalCluster::create(1).unwrap().pop().unwrap();
        member.send(&bytes(&[1]), 0, 1).unwrap();
        member.send(&bytes(&[2]), 0, 2).unwrap();
        let mut landing = vec![0u8; 4];
        member.recv(&mut landing, 0, 2).unwrap();
        assert_eq!(ints(&landing), vec![2]);
    }

    #[test]
    fn oversized_message_is_a_transport_failure() {
        let member = LocalCluster::create(1).unwrap().pop().unwrap();
        member.send(&bytes(&[1, 2]), 0, 0).unwrap();
        let mut landing = vec![0u8; 4];
        assert!(matches!(
            member.recv(&mut landing, 0, 0),
            Err(Error::TransportFailure(_))
        ));
    }

    #[test]
    fn allreduce_combines_every_member() {
        let results = on_members(4, |m| {
            let mut landing = vec![0u8; 8];
            m.allreduce(&bytes(&[m.rank() + 1, 1]), &mut landing, DatatypeTag::I32, ReduceOp::Sum)
                .unwrap();
            ints(&landing)
        });
        for got in results {
            assert_eq!(got, vec![10, 4]);
        }
    }

    #[test]
    fn exscan_starts_from_identity() {
        let results = on_members(3, |m| {
            let mut landing = vec![0u8; 4];
            m.exscan(&bytes(&[2]), &mut landing, DatatypeTag::I32, ReduceOp::Prod)
                .unwrap();
            ints(&landing)[0]
        });
        assert_eq!(results, vec![1, 2, 4]);
    }

    #[test]
    fn gather_concatenates_at_root_only() {
        let results = on_members(3, |m| {
            let root = 1;
            let mut landing = if m.rank() == root { vec![0u8; 12] } else { Vec::new() };
            m.gather(&bytes(&[m.rank() * 10]), &mut landing, root).unwrap();
            ints(&landing)
        });
        assert_eq!(results[1], vec![0, 10, 20]);
        assert!(results[0].is_empty() && results[2].is_empty());
    }

    #[test]
    fn scatter_hands_out_uneven_runs() {
        let results = on_members(3, |m| {
            let (payload, counts) = if m.rank() == 0 {
                (bytes(&[5, 6, 7, 8, 9]), vec![8, 8, 4])
            } else {
                (Vec::new(), Vec::new())
            };
            let mut landing = vec![0u8; if m.rank() == 2 { 4 } else { 8 }];
            m.scatter(&payload, &counts, &mut landing, 0).unwrap();
            ints(&landing)
        });
        assert_eq!(results, vec![vec![5, 6], vec![7, 8], vec![9]]);
    }

    #[test]
    fn gather_of_uneven_parts_checks_the_total() {
        let results = on_members(2, |m| {
            let part = bytes(&vec![m.rank(); m.rank() as usize + 1]);
            let mut landing = vec![0u8; 12];
            let fits = m.allgather(&part, &mut landing).map(|()| ints(&landing));
            let mut short = vec![0u8; 8];
            let too_small = m.allgather(&part, &mut short);
            (fits, too_small)
        });
        for (fits, too_small) in results {
            assert_eq!(fits.unwrap(), vec![0, 1, 1]);
            assert!(matches!(too_small, Err(Error::ShapeMismatch(_))));
        }
    }

    #[test]
    fn broadcast_overwrites_non_roots() {
        let results = on_members(3, |m| {
            let mut data = bytes(&[m.rank(); 2]);
            m.broadcast(&mut data, 2).unwrap();
            ints(&data)
        });
        assert!(results.iter().all(|r| r == &vec![2, 2]));
    }

    #[test]
    fn mismatched_collectives_are_detected() {
        let results = on_members(2, |m| {
            if m.rank() == 0 {
                m.ibarrier().map(|_| ())
            } else {
                m.iallgather(&[]).map(|_| ())
            }
        });
        assert_eq!(
            results.iter().filter(|r| matches!(r, Err(Error::TransportFailure(_)))).count(),
            1
        );
    }

    #[test]
    fn departed_sender_fails_pending_receive() {
        let mut members = LocalCluster::create(2).unwrap();
        let leaver = members.pop().unwrap();
        let stayer = members.pop().unwrap();
        let pending = stayer.irecv(1, 0).unwrap();
        drop(leaver);
        let mut landing = vec![0u8; 4];
        assert!(matches!(
            pending.complete(&mut landing),
            Err(Error::TransportFailure(_))
        ));
    }

    #[test]
    fn departed_member_fails_pending_collective() {
        let mut members = LocalCluster::create(2).unwrap();
        let leaver = members.pop().unwrap();
        let stayer = members.pop().unwrap();
        let mut pending = stayer.ibarrier().unwrap();
        assert!(!pending.test().unwrap());
        drop(leaver);
        assert!(matches!(pending.test(), Err(Error::TransportFailure(_))));
    }

    #[test]
    fn message_sent_before_leaving_is_still_delivered() {
        let mut members = LocalCluster::create(2).unwrap();
        let leaver = members.pop().unwrap();
        let stayer = members.pop().unwrap();
        leaver.send(&bytes(&[42]), 0, 3).unwrap();
        drop(leaver);
        let mut landing = vec![0u8; 4];
        stayer.recv(&mut landing, 1, 3).unwrap();
        assert_eq!(ints(&landing), vec![42]);
    }

    #[test]
    fn finished_rounds_are_released() {
        let hubs = on_members(2, |m| {
            m.barrier().unwrap();
            m.barrier().unwrap();
            Arc::clone(&m.hub)
        });
        assert!(hubs[0].lock().rounds.is_empty());
    }
}
