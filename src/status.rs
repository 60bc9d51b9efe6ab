//! Message status information.

/// Information about a received message.
///
/// Returned by [`Communicator::recv`](crate::Communicator::recv).
///
/// # Example
///
/// ```
/// use ferrodist::LocalCluster;
/// use ndarray::Array1;
///
/// LocalCluster::run(1, |world| {
///     let msg = Array1::from(vec![1.0f64, 2.0, 3.0]);
///     world.send(msg.view(), 0, 7).unwrap();
///
///     let mut buf = Array1::<f64>::zeros(3);
///     let status = world.recv(buf.view_mut(), 0, 7).unwrap();
///     assert_eq!((status.source, status.tag, status.count), (0, 7, 3));
/// }).unwrap();
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// Source rank of the message.
    pub source: i32,
    /// Tag of the message.
    pub tag: i32,
    /// Number of elements in the message.
    pub count: i64,
}
