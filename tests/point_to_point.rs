//! Point-to-point messaging and group membership.

use std::sync::Arc;

use ferrodist::{Communicator, Error, LocalCluster, ReduceOp};
use ndarray::{s, Array1, Array2, Array3, ShapeBuilder};

#[test]
fn self_round_trip_for_any_layout() {
    LocalCluster::run(1, |world| {
        let source = Array3::from_shape_fn((3, 4, 2), |(i, j, k)| (i * 8 + j * 2 + k) as f64);
        let mut fortran = Array3::<f64>::zeros((3, 4, 2).f());
        fortran.assign(&source);
        let wide = Array3::from_shape_fn((3, 8, 2), |(i, j, k)| {
            if j % 2 == 0 {
                (i * 8 + j + k) as f64
            } else {
                -1.0
            }
        });
        let sources = [source.view(), fortran.view(), wide.slice(s![.., ..;2, ..])];
        for send in sources {
            // contiguous destination
            let mut direct = Array3::<f64>::zeros((3, 4, 2));
            world.send(send, 0, 0).unwrap();
            world.recv(direct.view_mut(), 0, 0).unwrap();
            assert_eq!(direct, source);

            // destination whose logical (3, 4, 2) view is strided
            let mut backing = Array3::<f64>::zeros((2, 4, 3));
            world.send(send, 0, 1).unwrap();
            let status = world
                .recv(backing.view_mut().permuted_axes([2, 1, 0]), 0, 1)
                .unwrap();
            assert_eq!(status.count, 24);
            assert_eq!(backing.view().permuted_axes([2, 1, 0]), source);
        }

        // transposed source into a strided destination
        let t = source.view().reversed_axes();
        let mut backing = Array3::<f64>::zeros((2, 4, 3));
        world.send(t, 0, 2).unwrap();
        world.recv(backing.view_mut(), 0, 2).unwrap();
        assert_eq!(backing, t);
    })
    .unwrap();
}

#[test]
fn ring_exchange() {
    let results = LocalCluster::run(5, |world| {
        let rank = world.rank();
        let size = world.size();
        let next = (rank + 1) % size;
        let prev = (rank + size - 1) % size;

        let send = Array1::from_elem(3, rank);
        let mut recv = Array1::<i32>::zeros(3);
        world.send(send.view(), next, 0).unwrap();
        let status = world.recv(recv.view_mut(), prev, 0).unwrap();
        assert_eq!(status.source, prev);
        (prev, recv)
    })
    .unwrap();
    for (prev, recv) in results {
        assert!(recv.iter().all(|&x| x == prev));
    }
}

#[test]
fn messages_on_one_channel_arrive_in_order() {
    let results = LocalCluster::run(2, |world| {
        if world.rank() == 0 {
            for i in 0..10u64 {
                world.send(Array1::from_elem(2, i).view(), 1, 3).unwrap();
            }
            world.send(Array1::from_elem(2, 99u64).view(), 1, 4).unwrap();
            Vec::new()
        } else {
            let mut seen = Vec::new();
            let mut buf = Array1::<u64>::zeros(2);
            // the tag 4 message does not block tag 3 traffic
            world.recv(buf.view_mut(), 0, 4).unwrap();
            seen.push(buf[0]);
            for _ in 0..10 {
                world.recv(buf.view_mut(), 0, 3).unwrap();
                seen.push(buf[0]);
            }
            seen
        }
    })
    .unwrap();
    assert_eq!(results[1], vec![99, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
}

#[test]
fn size_mismatch_fails_the_receive() {
    LocalCluster::run(1, |world| {
        world.send(Array1::<f32>::ones(4).view(), 0, 0).unwrap();
        let mut small = Array1::<f32>::zeros(3);
        let err = world.recv(small.view_mut(), 0, 0).unwrap_err();
        assert!(matches!(err, Error::TransportFailure(_)));
        assert!(small.iter().all(|&x| x == 0.0));
    })
    .unwrap();
}

fn pair() -> (Communicator, Communicator) {
    let mut members = LocalCluster::create(2).unwrap();
    let b = members.pop().unwrap();
    let a = members.pop().unwrap();
    (Communicator::new(Arc::new(a)), Communicator::new(Arc::new(b)))
}

#[test]
fn departed_sender_fails_pending_receive() {
    let (a, b) = pair();
    b.send(Array1::from_elem(2, 7i64).view(), 0, 0).unwrap();
    drop(b);

    // already buffered before the sender left
    let mut buf = Array1::<i64>::zeros(2);
    a.recv(buf.view_mut(), 1, 0).unwrap();
    assert_eq!(buf.to_vec(), vec![7, 7]);

    let err = a.recv(buf.view_mut(), 1, 0).unwrap_err();
    assert!(matches!(err, Error::TransportFailure(_)));
}

#[test]
fn departed_member_fails_collective() {
    let (a, b) = pair();
    drop(b);
    let send = Array2::<f64>::ones((2, 2));
    let mut recv = Array2::<f64>::zeros((2, 2));
    let err = a
        .allreduce(send.view(), recv.view_mut(), ReduceOp::Sum)
        .unwrap_err();
    assert!(matches!(err, Error::TransportFailure(_)));
}

#[test]
fn sending_to_departed_member_fails() {
    let (a, b) = pair();
    drop(b);
    let err = a.send(Array1::<u8>::ones(1).view(), 1, 0).unwrap_err();
    assert!(matches!(err, Error::TransportFailure(_)));
}
