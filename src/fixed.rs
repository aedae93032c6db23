// ==============================================================================
// fixed.rs — BOUNDED INLINE CONTAINERS
// ------------------------------------------------------------------------------
// Every per-wheel / per-axle / per-gear table in the pipeline has a compile-time
// capacity. Nothing here grows after construction, so stepping a vehicle never
// allocates.
//
// FixedVec<T, N>:
// - array + length, derefs to a slice
// - try_push() returns false when full and leaves the contents untouched
//
// LookupTable<V, N>:
// - ascending x -> value pairs (value is Real or Vec3)
// - linear interpolation, clamped to the end points outside the range
// ==============================================================================

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use serde::de::{Error as DeError, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::VehicleError;
use crate::types::{Real, Vec3};

#[derive(Clone, Copy)]
pub struct FixedVec<T: Copy + Default, const N: usize> {
    items: [T; N],
    len: usize,
}

impl<T: Copy + Default, const N: usize> FixedVec<T, N> {
    pub fn new() -> Self {
        Self { items: [T::default(); N], len: 0 }
    }

    /// Builds from a slice; `None` if the slice does not fit.
    pub fn from_slice(values: &[T]) -> Option<Self> {
        if values.len() > N {
            return None;
        }
        let mut out = Self::new();
        out.items[..values.len()].copy_from_slice(values);
        out.len = values.len();
        Some(out)
    }

    /// Appends `value`. Returns false (and changes nothing) when full.
    pub fn try_push(&mut self, value: T) -> bool {
        if self.len == N {
            return false;
        }
        self.items[self.len] = value;
        self.len += 1;
        true
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        Some(self.items[self.len])
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn is_full(&self) -> bool {
        self.len == N
    }
}

impl<T: Copy + Default, const N: usize> Default for FixedVec<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default, const N: usize> Deref for FixedVec<T, N> {
    type Target = [T];
    fn deref(&self) -> &[T] {
        &self.items[..self.len]
    }
}

impl<T: Copy + Default, const N: usize> DerefMut for FixedVec<T, N> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.items[..self.len]
    }
}

impl<T: Copy + Default + PartialEq, const N: usize> PartialEq for FixedVec<T, N> {
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

impl<T: Copy + Default + fmt::Debug, const N: usize> fmt::Debug for FixedVec<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: Copy + Default + Serialize, const N: usize> Serialize for FixedVec<T, N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len))?;
        for item in self.iter() {
            seq.serialize_element(item)?;
        }
        seq.end()
    }
}

struct FixedVecVisitor<T, const N: usize>(PhantomData<T>);

impl<'de, T, const N: usize> Visitor<'de> for FixedVecVisitor<T, N>
where
    T: Copy + Default + Deserialize<'de>,
{
    type Value = FixedVec<T, N>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a sequence of at most {N} elements")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut out = FixedVec::new();
        while let Some(item) = seq.next_element()? {
            if !out.try_push(item) {
                return Err(A::Error::invalid_length(N + 1, &self));
            }
        }
        Ok(out)
    }
}

impl<'de, T, const N: usize> Deserialize<'de> for FixedVec<T, N>
where
    T: Copy + Default + Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(FixedVecVisitor(PhantomData))
    }
}

// ============================================
// Lookup tables
// ============================================

/// Values a lookup table can interpolate.
pub trait Lerp: Copy + Default {
    fn lerp(a: Self, b: Self, t: Real) -> Self;
}

impl Lerp for Real {
    #[inline]
    fn lerp(a: Real, b: Real, t: Real) -> Real {
        a + (b - a) * t
    }
}

impl Lerp for Vec3 {
    #[inline]
    fn lerp(a: Vec3, b: Vec3, t: Real) -> Vec3 {
        a + (b - a) * t
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupTable<V: Lerp, const N: usize> {
    pub xs: FixedVec<Real, N>,
    pub ys: FixedVec<V, N>,
}

impl<V: Lerp, const N: usize> LookupTable<V, N> {
    pub fn new() -> Self {
        Self { xs: FixedVec::new(), ys: FixedVec::new() }
    }

    /// Appends a point. x must be strictly greater than the last x.
    pub fn add_pair(&mut self, x: Real, y: V) -> bool {
        if self.xs.is_full() || !x.is_finite() {
            return false;
        }
        if let Some(&last) = self.xs.last() {
            if x <= last {
                return false;
            }
        }
        self.xs.try_push(x) && self.ys.try_push(y)
    }

    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    /// Interpolated value at `x`, clamped to the end points. Empty tables yield `fallback`.
    pub fn interpolate_or(&self, x: Real, fallback: V) -> V {
        let n = self.xs.len();
        match n {
            0 => fallback,
            1 => self.ys[0],
            _ => {
                if x <= self.xs[0] {
                    return self.ys[0];
                }
                if x >= self.xs[n - 1] {
                    return self.ys[n - 1];
                }
                let hi = self.xs.iter().position(|&xi| xi >= x).unwrap_or(n - 1);
                let lo = hi - 1;
                let t = (x - self.xs[lo]) / (self.xs[hi] - self.xs[lo]);
                V::lerp(self.ys[lo], self.ys[hi], t)
            }
        }
    }

    pub fn interpolate(&self, x: Real) -> V {
        self.interpolate_or(x, V::default())
    }

    /// Checks what `add_pair` guarantees, for tables that arrived through serde.
    pub fn validate(&self, block: &'static str) -> Result<(), VehicleError> {
        if self.xs.len() != self.ys.len() {
            return Err(VehicleError::invalid(
                block,
                format!("lookup table has {} x values but {} y values", self.xs.len(), self.ys.len()),
            ));
        }
        if self.xs.iter().any(|x| !x.is_finite()) || self.xs.windows(2).any(|w| w[1] <= w[0]) {
            return Err(VehicleError::invalid(block, "lookup table x values must be finite and strictly ascending"));
        }
        Ok(())
    }

    pub fn map_values(&self, f: impl Fn(V) -> V) -> Self {
        let mut out = *self;
        for y in out.ys.iter_mut() {
            *y = f(*y);
        }
        out
    }
}
