//! Element trait and datatype tag mapping.
//!
//! This module provides the [`Element`] trait, a sealed trait that maps Rust
//! primitive types to the [`DatatypeTag`]s a [`Transport`](crate::Transport)
//! receives alongside every flat byte buffer, together with the per-type
//! combine rules of each [`ReduceOp`].
//!
//! # Supported Types
//!
//! | Rust Type | Tag Value | Sum identity | Prod identity | Min identity | Max identity |
//! |-----------|-----------|--------------|---------------|--------------|--------------|
//! | `f32`     | 0         | `0.0`        | `1.0`         | `+inf`       | `-inf`       |
//! | `f64`     | 1         | `0.0`        | `1.0`         | `+inf`       | `-inf`       |
//! | `i32`     | 2         | `0`          | `1`           | `i32::MAX`   | `i32::MIN`   |
//! | `i64`     | 3         | `0`          | `1`           | `i64::MAX`   | `i64::MIN`   |
//! | `u8`      | 4         | `0`          | `1`           | `u8::MAX`    | `0`          |
//! | `u32`     | 5         | `0`          | `1`           | `u32::MAX`   | `0`          |
//! | `u64`     | 6         | `0`          | `1`           | `u64::MAX`   | `0`          |
//! | `i8`      | 7         | `0`          | `1`           | `i8::MAX`    | `i8::MIN`    |
//!
//! Integer sums and products wrap on overflow.

use crate::ReduceOp;

/// Internal module to seal the trait — prevents external implementations.
mod sealed {
    pub trait Sealed {}
}

/// Tag describing the element type of a flat transport buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DatatypeTag {
    /// 32-bit floating point
    F32 = 0,
    /// 64-bit floating point
    F64 = 1,
    /// 32-bit signed integer
    I32 = 2,
    /// 64-bit signed integer
    I64 = 3,
    /// 8-bit unsigned integer
    U8 = 4,
    /// 32-bit unsigned integer
    U32 = 5,
    /// 64-bit unsigned integer
    U64 = 6,
    /// 8-bit signed integer
    I8 = 7,
}

impl DatatypeTag {
    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            DatatypeTag::U8 | DatatypeTag::I8 => 1,
            DatatypeTag::F32 | DatatypeTag::I32 | DatatypeTag::U32 => 4,
            DatatypeTag::F64 | DatatypeTag::I64 | DatatypeTag::U64 => 8,
        }
    }
}

/// Trait for array elements that can travel through a collective.
///
/// This is a **sealed trait** — it cannot be implemented outside this crate.
/// Supported types: [`f32`], [`f64`], [`i8`], [`i32`], [`i64`], [`u8`], [`u32`], [`u64`].
///
/// # Example
///
/// ```
/// use ferrodist::{DatatypeTag, Element, ReduceOp};
///
/// assert_eq!(f64::TAG, DatatypeTag::F64);
/// assert_eq!(i32::combine(ReduceOp::Max, 3, 9), 9);
/// assert_eq!(f32::identity(ReduceOp::Prod), 1.0);
/// ```
pub trait Element: sealed::Sealed + bytemuck::Pod + PartialOrd + Send + Sync + 'static {
    /// The datatype tag handed to the transport.
    const TAG: DatatypeTag;

    /// Combine two values with `op`.
    fn combine(op: ReduceOp, lhs: Self, rhs: Self) -> Self;

    /// The value `x` for which `combine(op, x, y) == y` for every `y`.
    fn identity(op: ReduceOp) -> Self;
}

macro_rules! impl_element {
    ($ty:ty, $tag:expr, int) => {
        impl sealed::Sealed for $ty {}
        impl Element for $ty {
            const TAG: DatatypeTag = $tag;

            fn combine(op: ReduceOp, lhs: Self, rhs: Self) -> Self {
                match op {
                    ReduceOp::Sum => lhs.wrapping_add(rhs),
                    ReduceOp::Prod => lhs.wrapping_mul(rhs),
                    ReduceOp::Max => lhs.max(rhs),
                    ReduceOp::Min => lhs.min(rhs),
                }
            }

            fn identity(op: ReduceOp) -> Self {
                match op {
                    ReduceOp::Sum => 0,
                    ReduceOp::Prod => 1,
                    ReduceOp::Max => <$ty>::MIN,
                    ReduceOp::Min => <$ty>::MAX,
                }
            }
        }
    };
    ($ty:ty, $tag:expr, float) => {
        impl sealed::Sealed for $ty {}
        impl Element for $ty {
            const TAG: DatatypeTag = $tag;

            fn combine(op: ReduceOp, lhs: Self, rhs: Self) -> Self {
                match op {
                    ReduceOp::Sum => lhs + rhs,
                    ReduceOp::Prod => lhs * rhs,
                    ReduceOp::Max => lhs.max(rhs),
                    ReduceOp::Min => lhs.min(rhs),
                }
            }

            fn identity(op: ReduceOp) -> Self {
                match op {
                    ReduceOp::Sum => 0.0,
                    ReduceOp::Prod => 1.0,
                    ReduceOp::Max => <$ty>::NEG_INFINITY,
                    ReduceOp::Min => <$ty>::INFINITY,
                }
            }
        }
    };
}

impl_element!(f32, DatatypeTag::F32, float);
impl_element!(f64, DatatypeTag::F64, float);
impl_element!(i32, DatatypeTag::I32, int);
impl_element!(i64, DatatypeTag::I64, int);
impl_element!(u8, DatatypeTag::U8, int);
impl_element!(u32, DatatypeTag::U32, int);
impl_element!(u64, DatatypeTag::U64, int);
impl_element!(i8, DatatypeTag::I8, int);

/// Dispatch a generic helper over the concrete type behind a tag.
macro_rules! dispatch {
    ($tag:expr, $helper:ident($($arg:expr),*)) => {
        match $tag {
            DatatypeTag::F32 => $helper::<f32>($($arg),*),
            DatatypeTag::F64 => $helper::<f64>($($arg),*),
            DatatypeTag::I32 => $helper::<i32>($($arg),*),
            DatatypeTag::I64 => $helper::<i64>($($arg),*),
            DatatypeTag::U8 => $helper::<u8>($($arg),*),
            DatatypeTag::U32 => $helper::<u32>($($arg),*),
            DatatypeTag::U64 => $helper::<u64>($($arg),*),
            DatatypeTag::I8 => $helper::<i8>($($arg),*),
        }
    };
}

/// Fold `other` into `acc` element-wise: `acc[i] = combine(op, acc[i], other[i])`.
///
/// Both buffers are raw element bytes of type `tag`; no alignment is assumed.
/// Trailing bytes that do not form a whole element are left untouched.
pub fn reduce_bytes(tag: DatatypeTag, op: ReduceOp, acc: &mut [u8], other: &[u8]) {
    dispatch!(tag, reduce_typed(op, acc, other))
}

/// Overwrite every element of `out` with the identity of `op`.
pub fn fill_identity(tag: DatatypeTag, op: ReduceOp, out: &mut [u8]) {
    dispatch!(tag, fill_identity_typed(op, out))
}

fn reduce_typed<T: Element>(op: ReduceOp, acc: &mut [u8], other: &[u8]) {
    let width = std::mem::size_of::<T>();
    for (lhs, rhs) in acc.chunks_exact_mut(width).zip(other.chunks_exact(width)) {
        let a: T = bytemuck::pod_read_unaligned(lhs);
        let b: T = bytemuck::pod_read_unaligned(rhs);
        lhs.copy_from_slice(bytemuck::bytes_of(&T::combine(op, a, b)));
    }
}

fn fill_identity_typed<T: Element>(op: ReduceOp, out: &mut [u8]) {
    let identity = T::identity(op);
    for slot in out.chunks_exact_mut(std::mem::size_of::<T>()) {
        slot.copy_from_slice(bytemuck::bytes_of(&identity));
    }
}
