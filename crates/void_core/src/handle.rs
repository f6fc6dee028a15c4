//! Generation-counted handles
//!
//! A handle packs a slot index and a generation counter into one `u64`:
//!
//! ```text
//!  63                        22 21            0
//! +----------------------------+---------------+
//! |         slot index         |  generation   |
//! +----------------------------+---------------+
//! ```
//!
//! A handle is alive while the slot's current generation equals the
//! generation stored in the handle. Destroying a handle bumps the slot
//! generation, so every copy of the old value stays detectably dead forever.
//!
//! Freed slots go to the tail of a FIFO free list and are only handed out
//! again once the list holds more than a quarantine's worth of indices. A
//! slot therefore has to be recycled 2^22 times before a stale handle could
//! alias a live one, and with the quarantine that takes an enormous amount
//! of churn.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use std::collections::VecDeque;

use crate::error::HandleError;

/// A type-safe handle to a value of type T
#[repr(transparent)]
pub struct Handle<T> {
    bits: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Number of low bits holding the generation
    pub const GENERATION_BITS: u32 = 22;
    /// Mask selecting the generation
    pub const GENERATION_MASK: u64 = (1 << Self::GENERATION_BITS) - 1;
    /// Largest slot index a handle can carry
    pub const MAX_INDEX: u64 = (u64::MAX >> Self::GENERATION_BITS) - 1;
    /// The null handle, never issued by an allocator
    pub const NULL: Self = Self::from_bits(u64::MAX);

    /// Create a handle from a slot index and generation
    #[inline]
    pub const fn new(index: u64, generation: u32) -> Self {
        debug_assert!(index <= Self::MAX_INDEX);
        Self::from_bits((index << Self::GENERATION_BITS) | (generation as u64 & Self::GENERATION_MASK))
    }

    /// Check if this handle is null
    #[inline]
    pub const fn is_null(&self) -> bool {
        self.bits == u64::MAX
    }

    /// Get the slot index portion
    #[inline]
    pub const fn index(&self) -> u64 {
        self.bits >> Self::GENERATION_BITS
    }

    /// Get the generation portion
    #[inline]
    pub const fn generation(&self) -> u32 {
        (self.bits & Self::GENERATION_MASK) as u32
    }

    /// Convert to raw bits for storage or FFI
    #[inline]
    pub const fn to_bits(&self) -> u64 {
        self.bits
    }

    /// Create from raw bits
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            bits,
            _marker: PhantomData,
        }
    }
}

// Manual trait implementations to avoid T bounds
impl<T> Clone for Handle<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = core::any::type_name::<T>();
        let short = name.rsplit("::").next().unwrap_or(name);
        if self.is_null() {
            write!(f, "Handle<{}>(null)", short)
        } else {
            write!(f, "Handle<{}>({}v{})", short, self.index(), self.generation())
        }
    }
}

impl<T> fmt::Display for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{}v{}", self.index(), self.generation())
        }
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::NULL
    }
}

/// Allocates handles with generation tracking and quarantined slot reuse
pub struct HandleAllocator<T> {
    /// Current generation for each slot
    generations: Vec<u32>,
    /// Destroyed slot indices, oldest first
    free_list: VecDeque<u64>,
    /// Free list length that must be exceeded before a slot is reused
    quarantine: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> HandleAllocator<T> {
    /// Default number of freed slots held back before reuse
    pub const MIN_FREE_INDICES: usize = 1024;

    /// Create a new handle allocator
    pub fn new() -> Self {
        Self::with_quarantine(Self::MIN_FREE_INDICES)
    }

    /// Create an allocator that reuses slots once more than `quarantine`
    /// indices are waiting on the free list
    pub fn with_quarantine(quarantine: usize) -> Self {
        Self {
            generations: Vec::new(),
            free_list: VecDeque::new(),
            quarantine,
            _marker: PhantomData,
        }
    }

    /// Issue a new live handle
    pub fn create(&mut self) -> Handle<T> {
        if self.free_list.len() > self.quarantine {
            if let Some(index) = self.free_list.pop_front() {
                return Handle::new(index, self.generations[index as usize]);
            }
        }

        let index = self.generations.len() as u64;
        if index > Handle::<T>::MAX_INDEX {
            panic!("Handle allocator exhausted");
        }
        self.generations.push(0);
        Handle::new(index, 0)
    }

    /// Destroy a handle, returning false if it was not alive
    pub fn destroy(&mut self, handle: Handle<T>) -> bool {
        if !self.alive(handle) {
            return false;
        }

        let index = handle.index();
        let gen = &mut self.generations[index as usize];
        *gen = gen.wrapping_add(1) & Handle::<T>::GENERATION_MASK as u32;
        self.free_list.push_back(index);
        true
    }

    /// Check if a handle is still alive
    pub fn alive(&self, handle: Handle<T>) -> bool {
        if handle.is_null() {
            return false;
        }
        match self.generations.get(handle.index() as usize) {
            Some(gen) => *gen == handle.generation(),
            None => false,
        }
    }

    /// Like [`alive`](Self::alive) but explains why a handle is dead
    pub fn validate(&self, handle: Handle<T>) -> Result<(), HandleError> {
        if handle.is_null() {
            return Err(HandleError::Null);
        }
        match self.generations.get(handle.index() as usize) {
            None => Err(HandleError::OutOfBounds(handle.to_bits())),
            Some(gen) if *gen != handle.generation() => Err(HandleError::Stale(handle.to_bits())),
            Some(_) => Ok(()),
        }
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        self.generations.len() - self.free_list.len()
    }

    /// Check if no handles are alive
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots ever created (live and free)
    pub fn capacity(&self) -> usize {
        self.generations.len()
    }

    /// Number of freed slots waiting for reuse
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }
}

impl<T> Default for HandleAllocator<T> {
    fn default() -> Self {
        Self::new()
    }
}
