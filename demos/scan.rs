//! Prefix sum (scan) example: inclusive and exclusive scan operations.
//!
//! Computes prefix sums of rank values across all ranks, then uses an
//! exclusive scan to find where each rank's variable-length block starts.
//!
//! Run with: cargo run --example scan -- 4

use ferrodist::{LocalCluster, ReduceOp, Result};
use ndarray::{arr0, Array1};

fn main() -> Result<()> {
    let size = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(4);

    let outcomes = LocalCluster::run(size, |world| -> Result<()> {
        let rank = world.rank();
        let size = world.size();

        println!("Rank {}/{}: Starting scan examples", rank, size);

        // ============================================================
        // Test 1: Inclusive scan
        // ============================================================
        //
        // After inclusive scan, rank i receives the element-wise sum of
        // contributions from ranks 0..=i.
        {
            let send = Array1::from_elem(3, rank as f64 + 1.0);
            let mut recv = Array1::<f64>::zeros(3);

            world.scan(send.view(), recv.view_mut(), ReduceOp::Sum)?;

            // Expected: sum of (r+1) for r in 0..=rank  =  (rank+1)*(rank+2)/2
            let expected = f64::from((rank + 1) * (rank + 2) / 2);
            for (j, &val) in recv.iter().enumerate() {
                assert!(
                    (val - expected).abs() < f64::EPSILON,
                    "Rank {}: inclusive scan mismatch at index {}: got {}, expected {}",
                    rank,
                    j,
                    val,
                    expected,
                );
            }

            if rank == 0 {
                println!("  Inclusive scan passed");
            }
        }

        // ============================================================
        // Test 2: Exclusive scan for block offsets
        // ============================================================
        //
        // Rank r owns r + 1 items; its block starts at the sum of the
        // counts of all lower ranks. Rank 0 receives the identity (0).
        {
            let count = arr0(rank as u64 + 1);
            let mut offset = arr0(u64::MAX);

            world.exscan(count.view(), offset.view_mut(), ReduceOp::Sum)?;

            let r = rank as u64;
            assert_eq!(offset[()], r * (r + 1) / 2, "Rank {}: exclusive scan mismatch", rank);

            println!("  Rank {}: block of {} starts at {}", rank, count[()], offset[()]);
        }

        world.barrier()?;

        if rank == 0 {
            println!("\nAll scan tests passed!");
        }
        Ok(())
    })?;

    outcomes.into_iter().collect()
}
