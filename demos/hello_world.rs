//! Hello World example - in-process group setup and a barrier.
//!
//! Run with: cargo run --example hello_world -- 4

use ferrodist::{LocalCluster, Result};

fn main() -> Result<()> {
    let size = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(4);

    // One thread per rank, each with its own communicator
    let outcomes = LocalCluster::run(size, |world| -> Result<()> {
        let rank = world.rank();
        let size = world.size();

        println!("Hello from rank {} of {}", rank, size);

        // Synchronize before exiting
        world.barrier()?;

        if rank == 0 {
            println!("\nAll ranks reported in. Test passed!");
        }
        Ok(())
    })?;

    outcomes.into_iter().collect()
}
