//! Gather and scatter along an axis.
//!
//! A 2-D field is split by columns with the partition planner, each rank
//! scales its share, and the pieces are gathered back along axis 1.
//!
//! Run with: cargo run --example gather_axis -- 4

use ferrodist::{LocalCluster, Result};
use ndarray::Array2;

const ROWS: usize = 5;
const COLS_PER_RANK: usize = 2;

fn main() -> Result<()> {
    let size = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(4);

    let outcomes = LocalCluster::run(size, |world| -> Result<()> {
        let rank = world.rank();
        let size = world.size() as usize;
        let cols = COLS_PER_RANK * size;

        let global = Array2::from_shape_fn((ROWS, cols), |(i, j)| (i * cols + j) as f64);

        // ============================================================
        // Scatter columns from root
        // ============================================================
        let part = world.chunk(&[ROWS, cols], Some(1))?;
        let mut local = Array2::<f64>::zeros((ROWS, part.local_shape[1]));
        world.scatter(global.view(), local.view_mut(), 0, 1)?;
        assert_eq!(local, part.apply(global.view())?);

        println!(
            "Rank {}: owns columns {:?} ({} elements)",
            rank,
            part.local_slice[1],
            part.len()
        );

        // ============================================================
        // Work on the local share, then gather it back
        // ============================================================
        local.mapv_inplace(|x| x * 2.0);

        // Gather into a column-major destination: staged transparently
        let mut gathered = Array2::<f64>::zeros((cols, ROWS));
        world.gather(local.view(), gathered.view_mut().reversed_axes(), 0, -1)?;

        if rank == 0 {
            assert_eq!(gathered.t(), global.mapv(|x| x * 2.0));
            println!("\nGather along axis 1 passed: {:?}", gathered.t().dim());
        }
        Ok(())
    })?;

    outcomes.into_iter().collect()
}
