//! The transport seam: flat-buffer collectives driven by the façade.
//!
//! A [`Transport`] moves raw element bytes between the members of one process
//! group. It never sees array shapes or strides; the
//! [`Communicator`](crate::Communicator) hands it contiguous byte runs produced
//! by the staging adapter, plus the [`DatatypeTag`] and [`ReduceOp`] needed to
//! combine them.
//!
//! # Contract
//!
//! - Every operation is issued non-blocking and returns an [`InFlight`]
//!   handle. Send-side bytes are only read while the issuing call runs; the
//!   handle owns everything else it needs.
//! - [`InFlight::complete`] blocks until the operation is done on this member
//!   and writes the result into the landing buffer supplied by the caller.
//!   Members that receive nothing (send, non-root reduce/gather, barrier) pass
//!   an empty landing buffer. A landing buffer whose length disagrees with
//!   the gathered or scattered data fails with [`Error::ShapeMismatch`].
//! - Collectives must be issued in the same order on every member.
//! - Errors are fatal: a failed collective is never retried.

use crate::datatype::DatatypeTag;
use crate::error::Result;
#[cfg(doc)]
use crate::error::Error;
use crate::ReduceOp;

/// A transport operation that has been issued but not yet completed.
pub trait InFlight: Send {
    /// Check for completion without blocking.
    ///
    /// Returns `true` once [`complete`](Self::complete) would return without
    /// waiting. Safe to call any number of times.
    fn test(&mut self) -> Result<bool>;

    /// Block until the operation finishes and write its result into `landing`.
    fn complete(self: Box<Self>, landing: &mut [u8]) -> Result<()>;
}

/// Boxed in-flight handle returned by every transport operation.
pub type Pending = Box<dyn InFlight>;

/// An operation that finished while it was being issued.
#[derive(Debug, Default, Clone, Copy)]
pub struct Completed;

impl InFlight for Completed {
    fn test(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn complete(self: Box<Self>, _landing: &mut [u8]) -> Result<()> {
        Ok(())
    }
}

/// Flat-buffer transport for one member of a process group.
///
/// Ranks are `0..size()`. The `i`-prefixed methods issue an operation and
/// return immediately; the unprefixed methods are their blocking forms.
pub trait Transport: Send + Sync {
    /// Rank of the calling member.
    fn rank(&self) -> i32;

    /// Number of members in the group.
    fn size(&self) -> i32;

    /// Send `data` to `dest`. Messages to one destination with one tag are
    /// delivered in issue order.
    fn isend(&self, data: &[u8], dest: i32, tag: i32) -> Result<Pending>;

    /// Receive the next message from `source` with `tag`.
    fn irecv(&self, source: i32, tag: i32) -> Result<Pending>;

    /// Broadcast `data` from `root`; non-root members pass their own buffer
    /// contents, which are ignored.
    fn ibroadcast(&self, data: &[u8], root: i32) -> Result<Pending>;

    /// Combine every member's `data` at `root`.
    fn ireduce(&self, data: &[u8], dtype: DatatypeTag, op: ReduceOp, root: i32)
        -> Result<Pending>;

    /// Combine every member's `data` at every member.
    fn iallreduce(&self, data: &[u8], dtype: DatatypeTag, op: ReduceOp) -> Result<Pending>;

    /// Inclusive prefix combination in rank order.
    fn iscan(&self, data: &[u8], dtype: DatatypeTag, op: ReduceOp) -> Result<Pending>;

    /// Exclusive prefix combination in rank order; rank 0 receives the identity.
    fn iexscan(&self, data: &[u8], dtype: DatatypeTag, op: ReduceOp) -> Result<Pending>;

    /// Concatenate every member's `data` in rank order at `root`.
    fn igather(&self, data: &[u8], root: i32) -> Result<Pending>;

    /// Concatenate every member's `data` in rank order at every member.
    fn iallgather(&self, data: &[u8]) -> Result<Pending>;

    /// Split root's `data` into consecutive runs of `counts[r]` bytes; member
    /// `r` receives run `r`. Only root's `data` and `counts` are read; other
    /// members pass empty slices.
    fn iscatter(&self, data: &[u8], counts: &[usize], root: i32) -> Result<Pending>;

    /// Complete once every member has issued the barrier.
    fn ibarrier(&self) -> Result<Pending>;

    /// Blocking [`isend`](Self::isend).
    fn send(&self, data: &[u8], dest: i32, tag: i32) -> Result<()> {
        self.isend(data, dest, tag)?.complete(&mut [])
    }

    /// Blocking [`irecv`](Self::irecv).
    fn recv(&self, landing: &mut [u8], source: i32, tag: i32) -> Result<()> {
        self.irecv(source, tag)?.complete(landing)
    }

    /// Blocking in-place [`ibroadcast`](Self::ibroadcast).
    fn broadcast(&self, data: &mut [u8], root: i32) -> Result<()> {
        let pending = self.ibroadcast(data, root)?;
        pending.complete(data)
    }

    /// Blocking [`ireduce`](Self::ireduce).
    fn reduce(
        &self,
        data: &[u8],
        landing: &mut [u8],
        dtype: DatatypeTag,
        op: ReduceOp,
        root: i32,
    ) -> Result<()> {
        self.ireduce(data, dtype, op, root)?.complete(landing)
    }

    /// Blocking [`iallreduce`](Self::iallreduce).
    fn allreduce(
        &self,
        data: &[u8],
        landing: &mut [u8],
        dtype: DatatypeTag,
        op: ReduceOp,
    ) -> Result<()> {
        self.iallreduce(data, dtype, op)?.complete(landing)
    }

    /// Blocking [`iscan`](Self::iscan).
    fn scan(&self, data: &[u8], landing: &mut [u8], dtype: DatatypeTag, op: ReduceOp) -> Result<()> {
        self.iscan(data, dtype, op)?.complete(landing)
    }

    /// Blocking [`iexscan`](Self::iexscan).
    fn exscan(
        &self,
        data: &[u8],
        landing: &mut [u8],
        dtype: DatatypeTag,
        op: ReduceOp,
    ) -> Result<()> {
        self.iexscan(data, dtype, op)?.complete(landing)
    }

    /// Blocking [`igather`](Self::igather).
    fn gather(&self, data: &[u8], landing: &mut [u8], root: i32) -> Result<()> {
        self.igather(data, root)?.complete(landing)
    }

    /// Blocking [`iallgather`](Self::iallgather).
    fn allgather(&self, data: &[u8], landing: &mut [u8]) -> Result<()> {
        self.iallgather(data)?.complete(landing)
    }

    /// Blocking [`iscatter`](Self::iscatter).
    fn scatter(&self, data: &[u8], counts: &[usize], landing: &mut [u8], root: i32) -> Result<()> {
        self.iscatter(data, counts, root)?.complete(landing)
    }

    /// Blocking [`ibarrier`](Self::ibarrier).
    fn barrier(&self) -> Result<()> {
        self.ibarrier()?.complete(&mut [])
    }
}
