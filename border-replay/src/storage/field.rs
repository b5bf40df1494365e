//! Contiguous, fixed-stride storage of a single field.
use crate::error::{check_index, ReplayBufferError, Result};
use std::{fmt, marker::PhantomData, ptr::NonNull};

/// Scalar type that can be kept in a [`FieldStore`].
pub trait Element: Copy + Default + Send + Sync + 'static {}

impl<T> Element for T where T: Copy + Default + Send + Sync + 'static {}

/// Who is responsible for the memory behind a [`FieldStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Allocated by the store and freed when it is dropped.
    Owned,

    /// Supplied by the caller, who keeps ownership. The store never frees it.
    Borrowed,
}

/// Storage of `capacity * dim` scalars, one item of `dim` scalars per slot.
///
/// The item of slot `i` lives at `[i * dim, (i + 1) * dim)`.
pub struct FieldStore<'a, T> {
    ptr: NonNull<T>,
    capacity: usize,
    dim: usize,
    ownership: Ownership,
    phantom: PhantomData<&'a mut [T]>,
}

// Writes through a shared reference are restricted to `write_unchecked`,
// whose callers guarantee that no two threads touch the same slots.
unsafe impl<'a, T: Send> Send for FieldStore<'a, T> {}
unsafe impl<'a, T: Send + Sync> Sync for FieldStore<'a, T> {}

impl<'a, T: Element> FieldStore<'a, T> {
    /// Allocates a zero-initialized (`T::default()`) field.
    pub fn owned(capacity: usize, dim: usize) -> Result<Self> {
        let len = Self::checked_len(capacity, dim)?;
        let buffer = vec![T::default(); len].into_boxed_slice();
        let ptr = NonNull::new(Box::into_raw(buffer) as *mut T).ok_or_else(|| {
            ReplayBufferError::Configuration("Failed to allocate a field".to_string())
        })?;

        Ok(Self {
            ptr,
            capacity,
            dim,
            ownership: Ownership::Owned,
            phantom: PhantomData,
        })
    }

    /// Wraps a buffer supplied by the caller.
    ///
    /// `buffer` must hold exactly `capacity * dim` scalars. Its current content
    /// is left as is.
    pub fn borrowed(buffer: &'a mut [T], capacity: usize, dim: usize) -> Result<Self> {
        let len = Self::checked_len(capacity, dim)?;
        if buffer.len() != len {
            return Err(ReplayBufferError::Configuration(format!(
                "External buffer has {} elements, {} (= {} x {}) expected",
                buffer.len(),
                len,
                capacity,
                dim
            )));
        }

        Ok(Self {
            ptr: NonNull::from(buffer).cast(),
            capacity,
            dim,
            ownership: Ownership::Borrowed,
            phantom: PhantomData,
        })
    }

    fn checked_len(capacity: usize, dim: usize) -> Result<usize> {
        if capacity == 0 || dim == 0 {
            return Err(ReplayBufferError::Configuration(format!(
                "Field shape must be positive, got capacity = {}, dim = {}",
                capacity, dim
            )));
        }
        capacity.checked_mul(dim).ok_or_else(|| {
            ReplayBufferError::Configuration(format!(
                "Field of {} x {} elements is too large",
                capacity, dim
            ))
        })
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of scalars per slot.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Ownership of the underlying memory.
    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Copies `src.len() / dim` consecutive items starting at `slot`.
    ///
    /// The run must fit below the capacity; wrapping is the caller's job.
    pub fn write(&mut self, slot: usize, src: &[T]) -> Result<()> {
        self.check_run(slot, src.len())?;
        // SAFETY: `&mut self` gives exclusive access and the run is in bounds.
        unsafe { self.write_unchecked(slot, src) };
        Ok(())
    }

    pub(crate) fn check_run(&self, slot: usize, len: usize) -> Result<()> {
        if len % self.dim != 0 {
            return Err(ReplayBufferError::ContractViolation(format!(
                "{} elements is not a multiple of the item dimension {}",
                len, self.dim
            )));
        }
        let n = len / self.dim;
        if slot > self.capacity || n > self.capacity - slot {
            return Err(ReplayBufferError::OutOfRange {
                index: slot.saturating_add(n),
                bound: self.capacity + 1,
            });
        }
        Ok(())
    }

    /// Copies a run of items without checks on aliasing.
    ///
    /// # Safety
    ///
    /// The run must be in bounds (see [`FieldStore::check_run`]) and no other
    /// thread may read or write the slots of the run during the call.
    pub(crate) unsafe fn write_unchecked(&self, slot: usize, src: &[T]) {
        debug_assert!(self.check_run(slot, src.len()).is_ok());
        std::ptr::copy_nonoverlapping(
            src.as_ptr(),
            self.ptr.as_ptr().add(slot * self.dim),
            src.len(),
        );
    }

    /// The `dim` scalars stored at `slot`.
    pub fn item(&self, slot: usize) -> Result<&[T]> {
        check_index(slot, self.capacity)?;
        // SAFETY: the item is in bounds. Writes through `&self` only happen
        // via a `SharedWriter`, which keeps the owning ring store borrowed.
        Ok(unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().add(slot * self.dim), self.dim) })
    }
}

impl<'a, T> Drop for FieldStore<'a, T> {
    fn drop(&mut self) {
        if self.ownership == Ownership::Owned {
            let len = self.capacity * self.dim;
            // SAFETY: the pointer came from `Box::into_raw` of a slice of `len`
            // elements in `FieldStore::owned` and is released only here.
            unsafe {
                drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                    self.ptr.as_ptr(),
                    len,
                )));
            }
        }
    }
}

impl<'a, T> fmt::Debug for FieldStore<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldStore")
            .field("capacity", &self.capacity)
            .field("dim", &self.dim)
            .field("ownership", &self.ownership)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owned_field() {
        let mut field = FieldStore::<f32>::owned(4, 2).unwrap();
        assert_eq!(field.ownership(), Ownership::Owned);
        assert_eq!(field.item(3).unwrap(), &[0.0, 0.0]);

        field.write(1, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(field.item(1).unwrap(), &[1.0, 2.0]);
        assert_eq!(field.item(2).unwrap(), &[3.0, 4.0]);
        assert!(field.item(4).is_err());
    }

    #[test]
    fn test_write_past_capacity_is_rejected() {
        let mut field = FieldStore::<i8>::owned(4, 1).unwrap();
        assert!(field.write(3, &[1, 1]).is_err());
        assert!(field.write(0, &[]).is_ok());
    }

    #[test]
    fn test_write_at_huge_slot_is_out_of_range() {
        let mut field = FieldStore::<f32>::owned(4, 1).unwrap();
        assert_eq!(
            field.write(usize::MAX, &[1.0]).unwrap_err(),
            ReplayBufferError::OutOfRange {
                index: usize::MAX,
                bound: 5
            }
        );
        assert!(matches!(
            field.write(usize::MAX - 1, &[1.0, 2.0]),
            Err(ReplayBufferError::OutOfRange { .. })
        ));
        assert_eq!(field.item(0).unwrap(), &[0.0]);
    }

    #[test]
    fn test_misaligned_write_is_rejected() {
        let mut field = FieldStore::<f32>::owned(4, 3).unwrap();
        assert!(matches!(
            field.write(0, &[1.0, 2.0]),
            Err(ReplayBufferError::ContractViolation(_))
        ));
    }

    #[test]
    fn test_borrowed_field_writes_through() {
        let mut external = vec![0u8; 6];
        {
            let mut field = FieldStore::borrowed(&mut external, 3, 2).unwrap();
            assert_eq!(field.ownership(), Ownership::Borrowed);
            field.write(2, &[7, 8]).unwrap();
        }
        assert_eq!(external, vec![0, 0, 0, 0, 7, 8]);
    }

    #[test]
    fn test_borrowed_field_length_mismatch() {
        let mut external = vec![0f32; 5];
        assert!(matches!(
            FieldStore::borrowed(&mut external, 3, 2),
            Err(ReplayBufferError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_shape_is_rejected() {
        assert!(FieldStore::<f32>::owned(0, 1).is_err());
        assert!(FieldStore::<f32>::owned(1, 0).is_err());
    }
}
