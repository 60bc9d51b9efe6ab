//! All-reduce example - collective reduction operations.
//!
//! Exercises broadcast, reduce and all-reduce, including a destination that
//! is a transposed (non-contiguous) view.
//!
//! Run with: cargo run --example allreduce -- 4

use ferrodist::{LocalCluster, ReduceOp, Result};
use ndarray::{Array1, Array2};

fn main() -> Result<()> {
    let size = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(4);

    let outcomes = LocalCluster::run(size, |world| -> Result<()> {
        let rank = world.rank();
        let size = world.size();

        println!("Rank {}/{}: Starting collective tests", rank, size);

        // ============================================================
        // Test 1: Broadcast
        // ============================================================
        {
            let mut data = if rank == 0 {
                Array1::from(vec![1.0, 2.0, 3.0, 4.0, 5.0])
            } else {
                Array1::zeros(5)
            };

            world.broadcast(data.view_mut(), 0)?;

            let expected = Array1::from(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
            assert_eq!(data, expected, "Broadcast failed on rank {}", rank);

            if rank == 0 {
                println!("✓ Broadcast test passed");
            }
        }

        // ============================================================
        // Test 2: Reduce (sum)
        // ============================================================
        {
            let send = Array1::from_elem(3, rank as f64 + 1.0);
            let mut recv = Array1::zeros(3);

            world.reduce(send.view(), recv.view_mut(), ReduceOp::Sum, 0)?;

            if rank == 0 {
                // Sum of 1 + 2 + ... + size
                let expected_sum: f64 = (1..=size).map(f64::from).sum();
                assert_eq!(recv, Array1::from_elem(3, expected_sum), "Reduce Sum failed");
                println!("✓ Reduce Sum test passed (sum = {})", expected_sum);
            }
        }

        // ============================================================
        // Test 3: All-reduce into a transposed view
        // ============================================================
        {
            let send = Array2::<f64>::ones((4, 2));
            let mut recv = Array2::<f64>::zeros((2, 4));

            world.allreduce(send.view(), recv.view_mut().reversed_axes(), ReduceOp::Sum)?;

            assert!(
                recv.iter().all(|&x| x == f64::from(size)),
                "Allreduce Sum failed on rank {}",
                rank
            );

            if rank == 0 {
                println!("✓ Allreduce Sum test passed (transposed destination)");
            }
        }

        // ============================================================
        // Test 4: All-reduce scalar convenience method
        // ============================================================
        {
            let my_value = rank as f64 + 1.0;
            let sum = world.allreduce_scalar(my_value, ReduceOp::Sum)?;

            let expected: f64 = (1..=size).map(f64::from).sum();
            assert!((sum - expected).abs() < 1e-10, "Allreduce scalar failed");

            if rank == 0 {
                println!("✓ Allreduce scalar test passed (sum = {})", sum);
            }
        }

        // ============================================================
        // Test 5: All-reduce in-place
        // ============================================================
        {
            let mut data = Array1::from_elem(3, rank);

            world.allreduce_inplace(data.view_mut(), ReduceOp::Max)?;

            assert_eq!(
                data,
                Array1::from_elem(3, size - 1),
                "Allreduce in-place failed on rank {}",
                rank
            );

            if rank == 0 {
                println!("✓ Allreduce in-place test passed");
            }
        }

        world.barrier()?;

        if rank == 0 {
            println!("\n========================================");
            println!("All collective tests passed!");
            println!("========================================");
        }
        Ok(())
    })?;

    outcomes.into_iter().collect()
}
