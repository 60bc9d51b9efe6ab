//! Nonblocking operations example.
//!
//! Demonstrates overlap of communication and computation using
//! nonblocking collectives.
//!
//! Run with: cargo run --example nonblocking -- 4

use std::time::Instant;

use ferrodist::{LocalCluster, ReduceOp, Request, Result};
use ndarray::{Array1, Array2};

fn main() -> Result<()> {
    let size = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(4);

    let outcomes = LocalCluster::run(size, |world| -> Result<()> {
        let rank = world.rank();
        let size = world.size();

        println!("Rank {}: Starting nonblocking tests", rank);

        // ============================================================
        // Test 1: Nonblocking broadcast
        // ============================================================
        {
            let mut data = if rank == 0 {
                Array1::from(vec![1.0, 2.0, 3.0, 4.0, 5.0])
            } else {
                Array1::zeros(5)
            };

            // Start nonblocking broadcast
            let start_time = Instant::now();
            let mut request = world.ibroadcast(data.view_mut(), 0)?;

            // Simulate some computation while communication proceeds
            let mut compute_result = 0.0;
            for i in 0..1000 {
                compute_result += f64::from(i).sin();
            }

            // Wait for broadcast to complete
            request.wait()?;
            drop(request);
            let elapsed = start_time.elapsed();

            assert_eq!(
                data,
                Array1::from(vec![1.0, 2.0, 3.0, 4.0, 5.0]),
                "Nonblocking broadcast failed on rank {}",
                rank
            );

            if rank == 0 {
                println!("✓ Nonblocking broadcast test passed (elapsed: {:?})", elapsed);
                println!("  (computed {} during communication)", compute_result);
            }
        }

        world.barrier()?;

        // ============================================================
        // Test 2: Nonblocking all-reduce, polled with test()
        // ============================================================
        {
            let send = Array2::from_elem((10, 10), rank as f64 + 1.0);
            let mut recv = Array2::<f64>::zeros((10, 10));

            let mut request = world.iallreduce(send.view(), recv.view_mut().reversed_axes(), ReduceOp::Sum)?;

            let mut polls = 0u64;
            while !request.test()? {
                polls += 1;
                std::thread::yield_now();
            }
            drop(request);

            let expected = f64::from(size * (size + 1) / 2);
            assert!(recv.iter().all(|&x| x == expected), "Nonblocking allreduce failed");

            if rank == 0 {
                println!("✓ Nonblocking allreduce test passed ({} polls)", polls);
            }
        }

        // ============================================================
        // Test 3: Multiple outstanding requests
        // ============================================================
        {
            let send = Array1::from_elem(4, rank);
            let mut sum = Array1::zeros(4);
            let mut max = Array1::zeros(4);
            let mut min = Array1::zeros(4);

            let requests = vec![
                world.iallreduce(send.view(), sum.view_mut(), ReduceOp::Sum)?,
                world.iallreduce(send.view(), max.view_mut(), ReduceOp::Max)?,
                world.iallreduce(send.view(), min.view_mut(), ReduceOp::Min)?,
            ];
            Request::wait_all(requests)?;

            assert!(sum.iter().all(|&x| x == size * (size - 1) / 2));
            assert!(max.iter().all(|&x| x == size - 1));
            assert!(min.iter().all(|&x| x == 0));

            if rank == 0 {
                println!("✓ Multiple outstanding requests test passed");
            }
        }

        world.barrier()?;

        if rank == 0 {
            println!("\nAll nonblocking tests passed!");
        }
        Ok(())
    })?;

    outcomes.into_iter().collect()
}
