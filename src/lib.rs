//! # ferrodist
//!
//! Shape-aware collective communication for distributed n-dimensional arrays.
//!
//! This crate sits between [`ndarray`] views and a flat-buffer message-passing
//! transport, providing:
//! - Partition planning: which contiguous share of a global array each rank owns
//! - Transparent staging of non-contiguous views (transposes, strided slices)
//! - Blocking and nonblocking collectives with request handles
//! - Gather, scatter and all-gather along an arbitrary axis
//! - An in-process transport ([`LocalCluster`]) with one thread per rank
//!
//! ## Supported Types
//!
//! All communication operations are generic over [`Element`]:
//! `f32`, `f64`, `i8`, `i32`, `i64`, `u8`, `u32`, `u64`
//!
//! ## Quick Start
//!
//! ```
//! use ferrodist::{LocalCluster, ReduceOp};
//! use ndarray::Array2;
//!
//! LocalCluster::run(4, |world| {
//!     let rank = world.rank();
//!
//!     // This rank's rows of a 10x3 global array
//!     let part = world.chunk(&[10, 3], Some(0)).unwrap();
//!     let local = Array2::<f64>::from_elem((part.local_shape[0], 3), rank as f64);
//!
//!     // Reassemble the global array on every rank
//!     let mut global = Array2::<f64>::zeros((10, 3));
//!     let counts = world.counts_displs(&[10, 3], 0).unwrap();
//!     let (count, displ) = counts[rank as usize];
//!     global
//!         .slice_mut(ndarray::s![displ..displ + count, ..])
//!         .assign(&local);
//!     world.allreduce_inplace(global.view_mut(), ReduceOp::Max).unwrap();
//!
//!     assert_eq!(global[[9, 0]], 3.0);
//! }).unwrap();
//! ```
//!
//! ## Capabilities
//!
//! - **Generic API**: all operations work with any [`Element`] and any [`ndarray::Dimension`]
//! - **Collectives**: barrier, broadcast, reduce, allreduce, scan, exscan, gather, scatter, allgather
//! - **Nonblocking collectives**: `i`-prefixed twins returning [`Request`] handles
//! - **Pluggable transport**: implement [`Transport`] to run over any message-passing layer

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

mod comm;
mod config;
mod datatype;
mod error;
mod local;
pub mod partition;
mod request;
pub mod staging;
mod status;
mod transport;

pub use comm::Communicator;
pub use config::{device_direct, Config};
pub use datatype::{DatatypeTag, Element};
pub use error::{Error, Result};
pub use local::{LocalCluster, LocalTransport};
pub use partition::{chunk, Partition};
pub use request::Request;
pub use status::Status;
pub use transport::{Completed, InFlight, Pending, Transport};

use std::sync::{Arc, OnceLock};

use tracing::warn;

/// The process-wide environment, once installed.
static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();

/// Reduction operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ReduceOp {
    /// Sum of values
    Sum = 0,
    /// Maximum value
    Max = 1,
    /// Minimum value
    Min = 2,
    /// Product of values
    Prod = 3,
}

/// Process-wide communication environment.
///
/// Holds the two well-known communicators (every member of the job, and this
/// process alone) together with the [`Config`] read at construction. It is
/// never mutated afterwards, so it can be passed around by reference or
/// installed once for the whole process with [`install`](Self::install).
///
/// # Example
///
/// ```
/// use ferrodist::Environment;
///
/// let env = Environment::local().unwrap();
/// assert_eq!(env.world().size(), 1);
/// assert_eq!(env.self_comm().rank(), 0);
/// ```
#[derive(Debug)]
pub struct Environment {
    world: Communicator,
    self_comm: Communicator,
    config: Config,
}

impl Environment {
    /// Build an environment whose world communicator runs over `world`.
    ///
    /// Logs a warning if the rank or size reported by the job launcher
    /// disagrees with the transport.
    pub fn new(world: Arc<dyn Transport>) -> Result<Self> {
        Self::with_config(world, Config::from_env())
    }

    /// Build an environment with an explicit configuration.
    pub fn with_config(world: Arc<dyn Transport>, config: Config) -> Result<Self> {
        let world = Communicator::new(world);
        if config.launcher_rank.is_some_and(|rank| rank != world.rank()) {
            warn!(
                launcher_rank = config.launcher_rank,
                transport_rank = world.rank(),
                "launcher and transport disagree on this process's rank"
            );
        }
        if config.launcher_size.is_some_and(|size| size != world.size()) {
            warn!(
                launcher_size = config.launcher_size,
                transport_size = world.size(),
                "launcher and transport disagree on the job size"
            );
        }
        Ok(Environment {
            world,
            self_comm: Self::solo()?,
            config,
        })
    }

    /// A single-process environment: the world is this process alone.
    pub fn local() -> Result<Self> {
        Self::new(Self::solo()?.shared_transport())
    }

    /// Install `self` as the process-wide environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyInitialized`] if an environment is already installed.
    pub fn install(self) -> Result<&'static Environment> {
        ENVIRONMENT
            .set(self)
            .map_err(|_| Error::AlreadyInitialized)?;
        Self::global()
    }

    /// The process-wide environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] if no environment has been installed.
    pub fn global() -> Result<&'static Environment> {
        ENVIRONMENT.get().ok_or(Error::NotInitialized)
    }

    /// Communicator spanning every member of the job.
    pub fn world(&self) -> &Communicator {
        &self.world
    }

    /// Communicator containing only this process.
    pub fn self_comm(&self) -> &Communicator {
        &self.self_comm
    }

    /// The configuration read at construction.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether the transport can read device memory directly.
    pub fn device_direct(&self) -> bool {
        self.config.device_direct
    }

    fn solo() -> Result<Communicator> {
        let member = LocalCluster::create(1)?
            .pop()
            .ok_or_else(|| Error::Internal("one-member cluster has no member".into()))?;
        Ok(Communicator::new(Arc::new(member)))
    }
}
