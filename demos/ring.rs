//! Ring communication example - point-to-point communication.
//!
//! Each rank sends a row of a matrix to the next rank in a ring. The row is
//! a strided view, so it is staged on the way out.
//!
//! Run with: cargo run --example ring -- 4

use ferrodist::{LocalCluster, Result};
use ndarray::{Array1, Array2};

fn main() -> Result<()> {
    let size = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(4);

    let outcomes = LocalCluster::run(size, |world| -> Result<()> {
        let rank = world.rank();
        let size = world.size();

        if size < 2 {
            eprintln!("This example requires at least 2 ranks");
            return Ok(());
        }

        // Calculate neighbors in the ring
        let next = (rank + 1) % size;
        let prev = (rank + size - 1) % size;

        // Column 0 of a 2x3 matrix: non-contiguous
        let matrix = Array2::from_shape_fn((2, 3), |(i, j)| rank as f64 * 100.0 + (i * 3 + j) as f64);
        let column = matrix.column(0);
        let mut recv_data = Array1::<f64>::zeros(2);

        println!("Rank {}: sending {} to rank {}", rank, column, next);

        // Sends are buffered, so every rank can send first
        world.send(column, next, 0)?;
        let status = world.recv(recv_data.view_mut(), prev, 0)?;
        println!(
            "Rank {}: received {} from rank {} (tag={}, count={})",
            rank, recv_data, status.source, status.tag, status.count
        );

        // Verify we got the right data
        let expected = Array1::from(vec![prev as f64 * 100.0, prev as f64 * 100.0 + 3.0]);
        assert_eq!(recv_data, expected, "Data mismatch!");

        world.barrier()?;

        if rank == 0 {
            println!("\nRing communication test passed!");
        }
        Ok(())
    })?;

    outcomes.into_iter().collect()
}
