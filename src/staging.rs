//! Contiguity adapter: presenting strided array views as flat transport buffers.
//!
//! A [`Transport`](crate::Transport) only accepts one flat byte run per
//! buffer. Views in standard (row-major) layout already are one, and are lent
//! to the transport directly. Any other view (a transpose, a strided slice, an
//! axis permutation) is copied into a staging buffer in logical row-major
//! order; destinations additionally copy the staged result back into the
//! original view once the transport has written it.
//!
//! Staging never changes the strides of a caller's view.
//!
//! ```
//! use ferrodist::staging::{prepare_destination, prepare_source};
//! use ndarray::Array2;
//!
//! let src = Array2::from_shape_fn((3, 2), |(i, j)| (i * 2 + j) as f32);
//! let staged = prepare_source(src.t().into_dyn());
//! assert!(staged.is_staged());
//! assert_eq!(staged.as_slice(), &[0.0, 2.0, 4.0, 1.0, 3.0, 5.0]);
//!
//! let mut dst = Array2::<f32>::zeros((3, 2));
//! let mut landing = prepare_destination(dst.view_mut().into_dyn()).unwrap();
//! assert!(!landing.is_staged());
//! landing.as_bytes_mut().fill(0);
//! landing.reconcile();
//! ```

use ndarray::{ArrayViewD, ArrayViewMutD};

use crate::datatype::Element;
use crate::error::{Error, Result};

/// Transport-ready view of a source buffer.
#[derive(Debug)]
pub enum SourceBuffer<'a, T> {
    /// The caller's own storage, already contiguous.
    Direct(&'a [T]),
    /// Row-major copy of a non-contiguous view.
    Staged(Vec<T>),
}

impl<T: Element> SourceBuffer<'_, T> {
    /// Elements in logical row-major order.
    pub fn as_slice(&self) -> &[T] {
        match self {
            SourceBuffer::Direct(slice) => slice,
            SourceBuffer::Staged(staging) => staging,
        }
    }

    /// Raw element bytes handed to the transport.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.as_slice())
    }

    /// Whether a staging copy was made.
    pub fn is_staged(&self) -> bool {
        matches!(self, SourceBuffer::Staged(_))
    }
}

/// Transport-ready view of a destination buffer.
///
/// For [`Staged`](DestinationBuffer::Staged) destinations the transport writes
/// into the staging buffer and [`reconcile`](DestinationBuffer::reconcile)
/// copies it back into `target`.
#[derive(Debug)]
pub enum DestinationBuffer<'a, T> {
    /// The caller's own storage, written in place.
    Direct(&'a mut [T]),
    /// Contiguous stand-in for a non-contiguous view.
    Staged {
        /// Row-major staging buffer, seeded with the view's current contents.
        staging: Vec<T>,
        /// The caller's view, written back on reconciliation.
        target: ArrayViewMutD<'a, T>,
    },
}

impl<T: Element> DestinationBuffer<'_, T> {
    /// Elements in logical row-major order.
    pub fn as_slice(&self) -> &[T] {
        match self {
            DestinationBuffer::Direct(slice) => slice,
            DestinationBuffer::Staged { staging, .. } => staging,
        }
    }

    /// Raw element bytes, e.g. the payload of an in-place collective.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.as_slice())
    }

    /// Raw element bytes the transport writes into.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        match self {
            DestinationBuffer::Direct(slice) => bytemuck::cast_slice_mut(&mut **slice),
            DestinationBuffer::Staged { staging, .. } => {
                bytemuck::cast_slice_mut(staging.as_mut_slice())
            }
        }
    }

    /// Whether a staging copy was made.
    pub fn is_staged(&self) -> bool {
        matches!(self, DestinationBuffer::Staged { .. })
    }

    /// Copy staged contents back into the original view in row-major order.
    ///
    /// A no-op for direct destinations, whose storage already holds the result.
    pub fn reconcile(self) {
        if let DestinationBuffer::Staged {
            staging,
            mut target,
        } = self
        {
            for (dst, src) in target.iter_mut().zip(staging) {
                *dst = src;
            }
        }
    }
}

/// Lend `view` to the transport as a source, staging it if it is not contiguous.
pub fn prepare_source<T: Element>(view: ArrayViewD<'_, T>) -> SourceBuffer<'_, T> {
    match view.to_slice() {
        Some(slice) => SourceBuffer::Direct(slice),
        None => SourceBuffer::Staged(view.iter().copied().collect()),
    }
}

/// Lend `view` to the transport as a destination, staging it if it is not
/// contiguous.
pub fn prepare_destination<T: Element>(view: ArrayViewMutD<'_, T>) -> Result<DestinationBuffer<'_, T>> {
    if !view.is_standard_layout() {
        let staging = view.iter().copied().collect();
        return Ok(DestinationBuffer::Staged {
            staging,
            target: view,
        });
    }
    view.into_slice()
        .map(DestinationBuffer::Direct)
        .ok_or_else(|| Error::Internal("standard-layout view has no contiguous slice".into()))
}

/// Type-erased destination held by a pending request until completion.
pub(crate) trait Landing {
    fn bytes_mut(&mut self) -> &mut [u8];

    fn reconcile(self: Box<Self>);
}

impl<T: Element> Landing for DestinationBuffer<'_, T> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.as_bytes_mut()
    }

    fn reconcile(self: Box<Self>) {
        DestinationBuffer::reconcile(*self);
    }
}
