//! Event stream - packed header + payload byte buffer
//!
//! Every event is a fixed [`EventHeader`] immediately followed by `size`
//! payload bytes:
//!
//! ```text
//! +-----------+--------+-------+----------------+-----------+---
//! | type: u64 | size:  | pad:  | payload        | type: u64 | ...
//! |           | u32    | u32   | (size bytes)   |           |
//! +-----------+--------+-------+----------------+-----------+---
//! ```
//!
//! Readers must know the payload shape for a given type by convention. Typed
//! helpers go through `bytemuck` so only plain-old-data payloads can be
//! written or read, and reads are unaligned-safe.

use bytemuck::{Pod, Zeroable};

use crate::error::{EventError, Result};

/// Fixed header preceding each payload
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct EventHeader {
    /// Event type id
    pub event_type: u64,
    /// Payload size in bytes
    pub size: u32,
    _pad: u32,
}

impl EventHeader {
    /// Size of the header in the stream
    pub const SIZE: usize = core::mem::size_of::<EventHeader>();

    /// Create a header
    pub const fn new(event_type: u64, size: u32) -> Self {
        Self {
            event_type,
            size,
            _pad: 0,
        }
    }
}

/// A borrowed view of one event in a stream
#[derive(Clone, Copy, Debug)]
pub struct Event<'a> {
    header: EventHeader,
    payload: &'a [u8],
}

impl<'a> Event<'a> {
    /// Event type id
    #[inline]
    pub fn event_type(&self) -> u64 {
        self.header.event_type
    }

    /// The fixed header
    #[inline]
    pub fn header(&self) -> EventHeader {
        self.header
    }

    /// Raw payload bytes
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Read the payload as `T`; `None` if the size does not match
    pub fn read<T: Pod>(&self) -> Option<T> {
        bytemuck::try_pod_read_unaligned(self.payload).ok()
    }
}

/// Append-only buffer of events
#[derive(Clone, Default)]
pub struct EventStream {
    buffer: Vec<u8>,
    count: usize,
}

impl EventStream {
    /// Create an empty stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event with a raw payload
    pub fn push(&mut self, event_type: u64, payload: &[u8]) -> Result<()> {
        let size = u32::try_from(payload.len())
            .map_err(|_| EventError::PayloadTooLarge(payload.len()))?;

        self.buffer.try_reserve(EventHeader::SIZE + payload.len())?;
        self.buffer
            .extend_from_slice(bytemuck::bytes_of(&EventHeader::new(event_type, size)));
        self.buffer.extend_from_slice(payload);
        self.count += 1;
        Ok(())
    }

    /// Append an event with a plain-old-data payload
    pub fn push_pod<T: Pod>(&mut self, event_type: u64, payload: &T) -> Result<()> {
        self.push(event_type, bytemuck::bytes_of(payload))
    }

    /// Iterate over events in publication order
    pub fn iter(&self) -> EventIter<'_> {
        EventIter {
            buffer: &self.buffer,
            offset: 0,
        }
    }

    /// Number of events
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Size of the packed buffer in bytes
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop all events, keeping the allocation
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.count = 0;
    }
}

impl<'a> IntoIterator for &'a EventStream {
    type Item = Event<'a>;
    type IntoIter = EventIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the events of a stream
pub struct EventIter<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for EventIter<'a> {
    type Item = Event<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let header_end = self.offset.checked_add(EventHeader::SIZE)?;
        let header_bytes = self.buffer.get(self.offset..header_end)?;
        let header: EventHeader = bytemuck::pod_read_unaligned(header_bytes);

        let payload_end = header_end + header.size as usize;
        let payload = self.buffer.get(header_end..payload_end)?;
        self.offset = payload_end;

        Some(Event { header, payload })
    }
}
