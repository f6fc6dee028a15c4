//! # void_event - Event Buses
//!
//! Publish/subscribe between modules that know nothing about each other:
//! - Buses are identified by a 64-bit id (usually `id64("name")`)
//! - Events are a type id plus a plain byte payload, packed into a stream
//! - Subscribers run in priority order, lowest value first
//! - Dispatch is deferred and deterministic
//!
//! ```
//! use void_core::id64;
//! use void_event::EventHub;
//!
//! const INPUT: u64 = id64("input");
//! const KEY_DOWN: u64 = id64("key_down");
//!
//! let mut hub = EventHub::new();
//! hub.connect(INPUT, KEY_DOWN, 0, |_, event| {
//!     assert_eq!(event.read::<u32>(), Some(27));
//! })
//! .unwrap();
//!
//! hub.publish_pod(INPUT, KEY_DOWN, &27u32).unwrap();
//! assert_eq!(hub.dispatch(INPUT).unwrap(), 1);
//! ```

pub mod bus;
pub mod error;
pub mod stream;

pub use bus::{EventCallback, EventHub, Subscription, SubscriptionId};
pub use error::{EventError, Result};
pub use stream::{Event, EventHeader, EventIter, EventStream};

/// Prelude
pub mod prelude {
    pub use crate::bus::{EventHub, SubscriptionId};
    pub use crate::error::{EventError, Result};
    pub use crate::stream::Event;
}
