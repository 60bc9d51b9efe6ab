//! The collective façade: shape-aware communication over array views.

use std::fmt;
use std::sync::Arc;

use ndarray::{ArrayView, ArrayViewMut, Dimension};
use tracing::debug;

use crate::datatype::Element;
use crate::error::{Error, Result};
use crate::partition::{self, normalize_axis, Partition};
use crate::request::Request;
use crate::staging::{prepare_destination, prepare_source, DestinationBuffer, Landing};
use crate::status::Status;
use crate::transport::Transport;
use crate::ReduceOp;

/// A process group and the operations its members perform together.
///
/// A `Communicator` wraps one member's [`Transport`] and exposes collectives
/// over [`ndarray`] views. Views in standard layout are handed to the
/// transport directly; any other view (transposed, strided, axis-permuted)
/// is staged through a contiguous copy transparently.
///
/// Every blocking method has a nonblocking `i`-prefixed twin returning a
/// [`Request`] that borrows the destination until it is waited on.
///
/// # Example
///
/// ```
/// use ferrodist::LocalCluster;
///
/// LocalCluster::run(2, |world| {
///     println!("I am rank {} of {}", world.rank(), world.size());
/// }).unwrap();
/// ```
#[derive(Clone)]
pub struct Communicator {
    transport: Arc<dyn Transport>,
    rank: i32,
    size: i32,
}

impl fmt::Debug for Communicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Communicator")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl Communicator {
    /// Create a communicator over one member's transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let rank = transport.rank();
        let size = transport.size();
        Communicator {
            transport,
            rank,
            size,
        }
    }

    /// Get the rank of this process in the communicator.
    pub fn rank(&self) -> i32 {
        self.rank
    }

    /// Get the number of processes in the communicator.
    pub fn size(&self) -> i32 {
        self.size
    }

    /// The transport this communicator drives.
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub(crate) fn shared_transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// This rank's share of `global_shape` split along `split`.
    ///
    /// See [`partition::chunk`].
    pub fn chunk(&self, global_shape: &[usize], split: Option<isize>) -> Result<Partition> {
        partition::chunk(global_shape, split, self.rank as usize, self.size as usize)
    }

    /// Every rank's `(count, displacement)` along `split`.
    pub fn counts_displs(&self, global_shape: &[usize], split: isize) -> Result<Vec<(usize, usize)>> {
        partition::counts_displs(global_shape, split, self.size as usize)
    }

    // ========================================================================
    // Synchronization
    // ========================================================================

    /// Barrier synchronization.
    ///
    /// No member returns until every member has entered the barrier.
    pub fn barrier(&self) -> Result<()> {
        self.ibarrier()?.wait()
    }

    /// Nonblocking barrier.
    pub fn ibarrier(&self) -> Result<Request<'static>> {
        self.log_issue("barrier", 0, false);
        let pending = self.transport.ibarrier()?;
        Ok(Request::new(pending, None))
    }

    // ========================================================================
    // Point-to-Point Communication
    // ========================================================================

    /// Send the contents of `buf` to `dest`.
    ///
    /// Sends are buffered: this returns once the transport holds a copy.
    pub fn send<T: Element, D: Dimension>(
        &self,
        buf: ArrayView<'_, T, D>,
        dest: i32,
        tag: i32,
    ) -> Result<()> {
        self.isend(buf, dest, tag)?.wait()
    }

    /// Nonblocking send.
    pub fn isend<T: Element, D: Dimension>(
        &self,
        buf: ArrayView<'_, T, D>,
        dest: i32,
        tag: i32,
    ) -> Result<Request<'static>> {
        self.check_rank(dest)?;
        let source = prepare_source(buf.into_dyn());
        self.log_issue("send", source.as_slice().len(), source.is_staged());
        let pending = self.transport.isend(source.as_bytes(), dest, tag)?;
        Ok(Request::new(pending, None))
    }

    /// Receive the next message from `source` with `tag` into `buf`.
    ///
    /// The message must hold exactly as many elements as `buf`, otherwise
    /// the receive fails with [`Error::TransportFailure`].
    pub fn recv<T: Element, D: Dimension>(
        &self,
        buf: ArrayViewMut<'_, T, D>,
        source: i32,
        tag: i32,
    ) -> Result<Status> {
        let count = buf.len() as i64;
        self.irecv(buf, source, tag)?.wait()?;
        Ok(Status { source, tag, count })
    }

    /// Nonblocking receive.
    pub fn irecv<'a, T: Element, D: Dimension>(
        &self,
        buf: ArrayViewMut<'a, T, D>,
        source: i32,
        tag: i32,
    ) -> Result<Request<'a>> {
        self.check_rank(source)?;
        let landing = prepare_destination(buf.into_dyn())?;
        self.log_issue("recv", landing.as_slice().len(), landing.is_staged());
        let pending = self.transport.irecv(source, tag)?;
        Ok(Request::new(pending, land(landing)))
    }

    // ========================================================================
    // Broadcast and Reductions
    // ========================================================================

    /// Broadcast the contents of `buf` at `root` to every member's `buf`.
    pub fn broadcast<T: Element, D: Dimension>(
        &self,
        buf: ArrayViewMut<'_, T, D>,
        root: i32,
    ) -> Result<()> {
        self.ibroadcast(buf, root)?.wait()
    }

    /// Nonblocking broadcast.
    pub fn ibroadcast<'a, T: Element, D: Dimension>(
        &self,
        buf: ArrayViewMut<'a, T, D>,
        root: i32,
    ) -> Result<Request<'a>> {
        self.check_root(root)?;
        let landing = prepare_destination(buf.into_dyn())?;
        self.log_issue("broadcast", landing.as_slice().len(), landing.is_staged());
        let pending = self.transport.ibroadcast(landing.as_bytes(), root)?;
        Ok(Request::new(pending, land(landing)))
    }

    /// Combine every member's `send` element-wise into `recv` at `root`.
    ///
    /// `recv` must have the shape of `send` on every member, but only root's
    /// is written; on other members it is left untouched.
    pub fn reduce<T: Element, D: Dimension>(
        &self,
        send: ArrayView<'_, T, D>,
        recv: ArrayViewMut<'_, T, D>,
        op: ReduceOp,
        root: i32,
    ) -> Result<()> {
        self.ireduce(send, recv, op, root)?.wait()
    }

    /// Nonblocking reduce.
    pub fn ireduce<'a, T: Element, D: Dimension>(
        &self,
        send: ArrayView<'_, T, D>,
        recv: ArrayViewMut<'a, T, D>,
        op: ReduceOp,
        root: i32,
    ) -> Result<Request<'a>> {
        self.check_root(root)?;
        same_shape(send.shape(), recv.shape())?;
        let source = prepare_source(send.into_dyn());
        let landing = if root == self.rank {
            Some(prepare_destination(recv.into_dyn())?)
        } else {
            None
        };
        let staged = source.is_staged() || landing.as_ref().is_some_and(DestinationBuffer::is_staged);
        self.log_issue("reduce", source.as_slice().len(), staged);
        let pending = self.transport.ireduce(source.as_bytes(), T::TAG, op, root)?;
        Ok(Request::new(pending, landing.and_then(land)))
    }

    /// Combine every member's `send` element-wise into every member's `recv`.
    pub fn allreduce<T: Element, D: Dimension>(
        &self,
        send: ArrayView<'_, T, D>,
        recv: ArrayViewMut<'_, T, D>,
        op: ReduceOp,
    ) -> Result<()> {
        self.iallreduce(send, recv, op)?.wait()
    }

    /// Nonblocking all-reduce.
    pub fn iallreduce<'a, T: Element, D: Dimension>(
        &self,
        send: ArrayView<'_, T, D>,
        recv: ArrayViewMut<'a, T, D>,
        op: ReduceOp,
    ) -> Result<Request<'a>> {
        same_shape(send.shape(), recv.shape())?;
        let source = prepare_source(send.into_dyn());
        let landing = prepare_destination(recv.into_dyn())?;
        self.log_issue(
            "allreduce",
            source.as_slice().len(),
            source.is_staged() || landing.is_staged(),
        );
        let pending = self.transport.iallreduce(source.as_bytes(), T::TAG, op)?;
        Ok(Request::new(pending, land(landing)))
    }

    /// All-reduce `buf` in place.
    pub fn allreduce_inplace<T: Element, D: Dimension>(
        &self,
        buf: ArrayViewMut<'_, T, D>,
        op: ReduceOp,
    ) -> Result<()> {
        let landing = prepare_destination(buf.into_dyn())?;
        self.log_issue("allreduce_inplace", landing.as_slice().len(), landing.is_staged());
        let pending = self.transport.iallreduce(landing.as_bytes(), T::TAG, op)?;
        Request::new(pending, land(landing)).wait()
    }

    /// All-reduce a single value.
    pub fn allreduce_scalar<T: Element>(&self, value: T, op: ReduceOp) -> Result<T> {
        let send = [value];
        let mut recv = [value];
        self.log_issue("allreduce_scalar", 1, false);
        self.transport.allreduce(
            bytemuck::cast_slice(&send),
            bytemuck::cast_slice_mut(&mut recv),
            T::TAG,
            op,
        )?;
        Ok(recv[0])
    }

    /// Inclusive prefix reduction: member `r` receives the combination of
    /// members `0..=r`.
    pub fn scan<T: Element, D: Dimension>(
        &self,
        send: ArrayView<'_, T, D>,
        recv: ArrayViewMut<'_, T, D>,
        op: ReduceOp,
    ) -> Result<()> {
        self.iscan(send, recv, op)?.wait()
    }

    /// Nonblocking inclusive scan.
    pub fn iscan<'a, T: Element, D: Dimension>(
        &self,
        send: ArrayView<'_, T, D>,
        recv: ArrayViewMut<'a, T, D>,
        op: ReduceOp,
    ) -> Result<Request<'a>> {
        same_shape(send.shape(), recv.shape())?;
        let source = prepare_source(send.into_dyn());
        let landing = prepare_destination(recv.into_dyn())?;
        self.log_issue(
            "scan",
            source.as_slice().len(),
            source.is_staged() || landing.is_staged(),
        );
        let pending = self.transport.iscan(source.as_bytes(), T::TAG, op)?;
        Ok(Request::new(pending, land(landing)))
    }

    /// Exclusive prefix reduction: member `r` receives the combination of
    /// members `0..r`, and member 0 receives the identity of `op`.
    pub fn exscan<T: Element, D: Dimension>(
        &self,
        send: ArrayView<'_, T, D>,
        recv: ArrayViewMut<'_, T, D>,
        op: ReduceOp,
    ) -> Result<()> {
        self.iexscan(send, recv, op)?.wait()
    }

    /// Nonblocking exclusive scan.
    pub fn iexscan<'a, T: Element, D: Dimension>(
        &self,
        send: ArrayView<'_, T, D>,
        recv: ArrayViewMut<'a, T, D>,
        op: ReduceOp,
    ) -> Result<Request<'a>> {
        same_shape(send.shape(), recv.shape())?;
        let source = prepare_source(send.into_dyn());
        let landing = prepare_destination(recv.into_dyn())?;
        self.log_issue(
            "exscan",
            source.as_slice().len(),
            source.is_staged() || landing.is_staged(),
        );
        let pending = self.transport.iexscan(source.as_bytes(), T::TAG, op)?;
        Ok(Request::new(pending, land(landing)))
    }

    // ========================================================================
    // Gather and Scatter
    // ========================================================================

    /// Concatenate every member's `send` along `axis`, in rank order, into
    /// `recv` at `root`.
    ///
    /// Shares may differ in length along `axis`. At root, `recv` must match
    /// `send` on every other axis, and its extent along `axis` must equal the
    /// sum of every member's share; a wrong sum surfaces as
    /// [`Error::ShapeMismatch`] when the request completes. `recv` is ignored
    /// on other members. Negative axes count from the end.
    pub fn gather<T: Element, D: Dimension>(
        &self,
        send: ArrayView<'_, T, D>,
        recv: ArrayViewMut<'_, T, D>,
        root: i32,
        axis: isize,
    ) -> Result<()> {
        self.igather(send, recv, root, axis)?.wait()
    }

    /// Nonblocking gather.
    pub fn igather<'a, T: Element, D: Dimension>(
        &self,
        send: ArrayView<'_, T, D>,
        recv: ArrayViewMut<'a, T, D>,
        root: i32,
        axis: isize,
    ) -> Result<Request<'a>> {
        self.check_root(root)?;
        let axis = normalize_axis(axis, send.ndim())?;
        let order = axis_first(axis, send.ndim());
        let landing = if root == self.rank {
            check_blocks(send.shape(), recv.shape(), axis)?;
            Some(prepare_destination(recv.into_dyn().permuted_axes(order.clone()))?)
        } else {
            None
        };
        let source = prepare_source(send.into_dyn().permuted_axes(order));
        let staged = source.is_staged() || landing.as_ref().is_some_and(DestinationBuffer::is_staged);
        self.log_issue("gather", source.as_slice().len(), staged);
        let pending = self.transport.igather(source.as_bytes(), root)?;
        Ok(Request::new(pending, landing.and_then(land)))
    }

    /// Concatenate every member's `send` along `axis`, in rank order, into
    /// every member's `recv`.
    ///
    /// The shape rules of [`gather`](Self::gather) apply on every member.
    pub fn allgather<T: Element, D: Dimension>(
        &self,
        send: ArrayView<'_, T, D>,
        recv: ArrayViewMut<'_, T, D>,
        axis: isize,
    ) -> Result<()> {
        self.iallgather(send, recv, axis)?.wait()
    }

    /// Nonblocking all-gather.
    pub fn iallgather<'a, T: Element, D: Dimension>(
        &self,
        send: ArrayView<'_, T, D>,
        recv: ArrayViewMut<'a, T, D>,
        axis: isize,
    ) -> Result<Request<'a>> {
        let axis = normalize_axis(axis, send.ndim())?;
        check_blocks(send.shape(), recv.shape(), axis)?;
        let order = axis_first(axis, send.ndim());
        let source = prepare_source(send.into_dyn().permuted_axes(order.clone()));
        let landing = prepare_destination(recv.into_dyn().permuted_axes(order))?;
        self.log_issue(
            "allgather",
            source.as_slice().len(),
            source.is_staged() || landing.is_staged(),
        );
        let pending = self.transport.iallgather(source.as_bytes())?;
        Ok(Request::new(pending, land(landing)))
    }

    /// Split root's `send` along `axis` the way [`chunk`](Self::chunk) splits
    /// it; member `r` receives share `r` in `recv`.
    ///
    /// The first `n % size` members receive one extra slice, so scattering
    /// undoes a [`gather`](Self::gather) of planned shares. At root, `recv`
    /// must match `send` on every other axis and hold root's own share along
    /// `axis`. `send` is ignored on other members.
    pub fn scatter<T: Element, D: Dimension>(
        &self,
        send: ArrayView<'_, T, D>,
        recv: ArrayViewMut<'_, T, D>,
        root: i32,
        axis: isize,
    ) -> Result<()> {
        self.iscatter(send, recv, root, axis)?.wait()
    }

    /// Nonblocking scatter.
    pub fn iscatter<'a, T: Element, D: Dimension>(
        &self,
        send: ArrayView<'_, T, D>,
        recv: ArrayViewMut<'a, T, D>,
        root: i32,
        axis: isize,
    ) -> Result<Request<'a>> {
        self.check_root(root)?;
        let axis = normalize_axis(axis, recv.ndim())?;
        let order = axis_first(axis, recv.ndim());
        let (source, counts) = if root == self.rank {
            let counts = self.scatter_counts::<T>(send.shape(), recv.shape(), axis)?;
            let source = prepare_source(send.into_dyn().permuted_axes(order.clone()));
            (Some(source), counts)
        } else {
            (None, Vec::new())
        };
        let landing = prepare_destination(recv.into_dyn().permuted_axes(order))?;
        let staged = landing.is_staged() || source.as_ref().is_some_and(|s| s.is_staged());
        self.log_issue("scatter", landing.as_slice().len(), staged);
        let payload = source.as_ref().map_or(&[][..], |s| s.as_bytes());
        let pending = self.transport.iscatter(payload, &counts, root)?;
        Ok(Request::new(pending, land(landing)))
    }

    // ========================================================================
    // Validation
    // ========================================================================

    fn check_root(&self, root: i32) -> Result<()> {
        if !(0..self.size).contains(&root) {
            return Err(Error::InvalidRoot {
                root,
                size: self.size,
            });
        }
        Ok(())
    }

    fn check_rank(&self, rank: i32) -> Result<()> {
        if !(0..self.size).contains(&rank) {
            return Err(Error::InvalidRank(rank));
        }
        Ok(())
    }

    /// Byte length of every member's share of root's `whole` along `axis`.
    fn scatter_counts<T: Element>(
        &self,
        part: &[usize],
        whole: &[usize],
        axis: usize,
    ) -> Result<Vec<usize>> {
        check_blocks(part, whole, axis)?;
        let shares = partition::counts_displs(whole, axis as isize, self.size as usize)?;
        let own = shares[self.rank as usize].0;
        if part[axis] != own {
            return Err(Error::ShapeMismatch(format!(
                "rank {} receives {own} slices along axis {axis} of {whole:?}, destination holds {}",
                self.rank, part[axis]
            )));
        }
        let slice_bytes = whole
            .iter()
            .enumerate()
            .filter(|&(dim, _)| dim != axis)
            .map(|(_, &n)| n)
            .product::<usize>()
            * std::mem::size_of::<T>();
        Ok(shares.iter().map(|&(count, _)| count * slice_bytes).collect())
    }

    fn log_issue(&self, op: &'static str, elements: usize, staged: bool) {
        debug!(op, rank = self.rank, size = self.size, elements, staged, "issuing");
    }
}

fn land<'a, T: Element>(buffer: DestinationBuffer<'a, T>) -> Option<Box<dyn Landing + 'a>> {
    Some(Box::new(buffer))
}

fn same_shape(source: &[usize], destination: &[usize]) -> Result<()> {
    if source != destination {
        return Err(Error::BufferMismatch {
            source_shape: source.to_vec(),
            destination_shape: destination.to_vec(),
        });
    }
    Ok(())
}

/// Axis order that moves `axis` to the front and keeps the rest in order.
fn axis_first(axis: usize, ndim: usize) -> Vec<usize> {
    std::iter::once(axis)
        .chain((0..ndim).filter(|&a| a != axis))
        .collect()
}

/// Check that `part` can be one block of `whole` concatenated along `axis`.
fn check_blocks(part: &[usize], whole: &[usize], axis: usize) -> Result<()> {
    if part.len() != whole.len() {
        return Err(Error::ShapeMismatch(format!(
            "per-rank block has {} dimensions, concatenated array has {}",
            part.len(),
            whole.len()
        )));
    }
    for (dim, (&p, &w)) in part.iter().zip(whole).enumerate() {
        if dim != axis && p != w {
            return Err(Error::ShapeMismatch(format!(
                "axis {dim} of the concatenated array has extent {w}, \
                 blocks of shape {part:?} along axis {axis} need {p}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalCluster;
    use ndarray::{Array1, Array2};

    fn solo() -> Communicator {
        let member = LocalCluster::create(1).unwrap().remove(0);
        Communicator::new(Arc::new(member))
    }

    #[test]
    fn axis_first_moves_one_axis() {
        assert_eq!(axis_first(0, 3), vec![0, 1, 2]);
        assert_eq!(axis_first(2, 3), vec![2, 0, 1]);
        assert_eq!(axis_first(1, 2), vec![1, 0]);
    }

    #[test]
    fn blocks_agree_off_the_concatenation_axis() {
        assert!(check_blocks(&[5, 2], &[5, 8], 1).is_ok());
        assert!(check_blocks(&[4, 2], &[10, 2], 0).is_ok());
        assert!(matches!(
            check_blocks(&[5, 2], &[4, 8], 1),
            Err(Error::ShapeMismatch(_))
        ));
        assert!(matches!(
            check_blocks(&[5, 2], &[40], 0),
            Err(Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn scatter_counts_follow_the_planner() {
        let member = LocalCluster::create(3).unwrap().remove(1);
        let comm = Communicator::new(Arc::new(member));
        let counts = comm.scatter_counts::<f64>(&[3, 2], &[10, 2], 0).unwrap();
        assert_eq!(counts, vec![4 * 16, 3 * 16, 3 * 16]);
        assert!(matches!(
            comm.scatter_counts::<f64>(&[4, 2], &[10, 2], 0),
            Err(Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn debug_shows_rank_and_size() {
        let text = format!("{:?}", solo());
        assert!(text.contains("rank: 0"));
        assert!(text.contains("size: 1"));
    }

    #[test]
    fn invalid_root_and_rank_are_rejected() {
        let comm = solo();
        let mut buf = Array1::<f64>::zeros(3);
        assert_eq!(
            comm.broadcast(buf.view_mut(), 1),
            Err(Error::InvalidRoot { root: 1, size: 1 })
        );
        assert_eq!(
            comm.send(buf.view(), -1, 0),
            Err(Error::InvalidRank(-1))
        );
        assert!(matches!(
            comm.recv(buf.view_mut(), 4, 0),
            Err(Error::InvalidRank(4))
        ));
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let comm = solo();
        let send = Array2::<i32>::ones((2, 3));
        let mut recv = Array2::<i32>::zeros((3, 2));
        assert_eq!(
            comm.allreduce(send.view(), recv.view_mut(), ReduceOp::Sum),
            Err(Error::BufferMismatch {
                source_shape: vec![2, 3],
                destination_shape: vec![3, 2],
            })
        );
        assert!(matches!(
            comm.gather(send.view(), recv.view_mut(), 0, 2),
            Err(Error::InvalidDimension { axis: 2, ndim: 2 })
        ));
        assert!(recv.iter().all(|&x| x == 0));
    }

    #[test]
    fn solo_collectives_are_identities() {
        let comm = solo();
        let send = Array2::from_shape_fn((2, 3), |(i, j)| (i * 3 + j) as u32);
        let mut recv = Array2::<u32>::zeros((3, 2));
        comm.allgather(send.view(), recv.view_mut().reversed_axes(), -1)
            .unwrap();
        assert_eq!(recv.t(), send);
        assert_eq!(comm.allreduce_scalar(7u32, ReduceOp::Prod).unwrap(), 7);
    }

    #[test]
    fn chunk_uses_own_rank_and_size() {
        let comm = solo();
        let p = comm.chunk(&[4, 6], Some(1)).unwrap();
        assert_eq!(p.local_shape, vec![4, 6]);
        assert_eq!(comm.counts_displs(&[4, 6], 1).unwrap(), vec![(6, 0)]);
    }
}
