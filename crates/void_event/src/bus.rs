//! EventHub - named buses with ordered subscribers

use std::fmt;
use std::sync::Arc;

use bytemuck::Pod;
use void_core::{Handle, HandleAllocator};
use void_structures::id_map::{IdMap, EMPTY, TOMBSTONE};

use crate::error::{EventError, Result};
use crate::stream::{Event, EventIter, EventStream};

/// Subscriber callback; receives the hub so it can publish or read other buses
pub type EventCallback = Arc<dyn Fn(&mut EventHub, &Event<'_>) + Send + Sync>;

/// Identifies a subscription for [`EventHub::disconnect`]
pub type SubscriptionId = Handle<Subscription>;

/// A connected callback
pub struct Subscription {
    id: SubscriptionId,
    priority: i32,
    seq: u64,
    owner: Option<u64>,
    callback: EventCallback,
}

impl Subscription {
    /// Subscription id
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Dispatch priority, lower runs first
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Owner recorded at connect time
    pub fn owner(&self) -> Option<u64> {
        self.owner
    }
}

struct Bus {
    id: u64,
    stream: EventStream,
    /// event type -> index into `subscribers`
    types: IdMap,
    subscribers: Vec<(u64, Vec<Subscription>)>,
    dispatching: bool,
}

impl Bus {
    fn new(id: u64) -> Self {
        Self {
            id,
            stream: EventStream::new(),
            types: IdMap::new(),
            subscribers: Vec::new(),
            dispatching: false,
        }
    }

    fn subscribers(&self, event_type: u64) -> &[Subscription] {
        match self.types.get(event_type) {
            Some(idx) => &self.subscribers[idx as usize].1,
            None => &[],
        }
    }

    fn subscribers_mut(&mut self, event_type: u64) -> Option<&mut Vec<Subscription>> {
        let idx = self.types.get(event_type)?;
        Some(&mut self.subscribers[idx as usize].1)
    }
}

/// A set of event buses keyed by 64-bit bus id
///
/// Each bus owns one [`EventStream`]. Publishing appends to it; dispatching
/// drains it and calls every subscriber of each event's type, lowest priority
/// value first and in connect order among equal priorities.
pub struct EventHub {
    buses: Vec<Bus>,
    /// bus id -> index into `buses`
    index: IdMap,
    ids: HandleAllocator<Subscription>,
    next_seq: u64,
    owner: Option<u64>,
}

impl EventHub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self {
            buses: Vec::new(),
            index: IdMap::new(),
            ids: HandleAllocator::new(),
            next_seq: 0,
            owner: None,
        }
    }

    fn check_id(id: u64) -> Result<()> {
        if id == EMPTY || id == TOMBSTONE {
            return Err(EventError::ReservedId(id));
        }
        Ok(())
    }

    fn bus_index(&self, bus_id: u64) -> Result<usize> {
        self.index
            .get(bus_id)
            .map(|idx| idx as usize)
            .ok_or(EventError::BusNotFound(bus_id))
    }

    /// Create a bus; does nothing if it already exists
    pub fn create_bus(&mut self, bus_id: u64) -> Result<()> {
        Self::check_id(bus_id)?;
        if self.index.contains(bus_id) {
            return Ok(());
        }

        self.index.insert(bus_id, self.buses.len() as u64)?;
        self.buses.push(Bus::new(bus_id));
        log::debug!("Created event bus {:#018x}", bus_id);
        Ok(())
    }

    /// Check if a bus exists
    pub fn has_bus(&self, bus_id: u64) -> bool {
        self.index.contains(bus_id)
    }

    /// Ids of every bus in creation order
    pub fn bus_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.buses.iter().map(|bus| bus.id)
    }

    /// Set the owner recorded on subsequent connects
    pub fn set_owner(&mut self, owner: Option<u64>) -> Option<u64> {
        std::mem::replace(&mut self.owner, owner)
    }

    /// Current owner
    pub fn owner(&self) -> Option<u64> {
        self.owner
    }

    /// Subscribe `callback` to `event_type` on `bus_id`, creating the bus if
    /// needed
    ///
    /// Takes effect from the next dispatch of the bus.
    pub fn connect<F>(
        &mut self,
        bus_id: u64,
        event_type: u64,
        priority: i32,
        callback: F,
    ) -> Result<SubscriptionId>
    where
        F: Fn(&mut EventHub, &Event<'_>) + Send + Sync + 'static,
    {
        Self::check_id(event_type)?;
        self.create_bus(bus_id)?;
        let bus_idx = self.bus_index(bus_id)?;

        let seq = self.next_seq;
        let owner = self.owner;
        let bus = &mut self.buses[bus_idx];
        let type_idx = match bus.types.get(event_type) {
            Some(idx) => idx as usize,
            None => {
                let idx = bus.subscribers.len();
                bus.types.insert(event_type, idx as u64)?;
                bus.subscribers.push((event_type, Vec::new()));
                idx
            }
        };

        let id = self.ids.create();
        let list = &mut bus.subscribers[type_idx].1;
        let at = list.partition_point(|s| (s.priority, s.seq) <= (priority, seq));
        list.insert(
            at,
            Subscription {
                id,
                priority,
                seq,
                owner,
                callback: Arc::new(callback),
            },
        );
        self.next_seq += 1;
        Ok(id)
    }

    /// Remove a subscription; false if it was not connected there
    pub fn disconnect(&mut self, bus_id: u64, event_type: u64, id: SubscriptionId) -> bool {
        let Ok(bus_idx) = self.bus_index(bus_id) else {
            return false;
        };
        let Some(list) = self.buses[bus_idx].subscribers_mut(event_type) else {
            return false;
        };
        let Some(pos) = list.iter().position(|s| s.id == id) else {
            return false;
        };

        list.remove(pos);
        self.ids.destroy(id);
        true
    }

    /// Remove every subscription connected while `owner` was current
    pub fn disconnect_owner(&mut self, owner: u64) -> usize {
        let mut removed = Vec::new();
        for bus in &mut self.buses {
            for (_, list) in &mut bus.subscribers {
                list.retain(|s| {
                    if s.owner == Some(owner) {
                        removed.push(s.id);
                        false
                    } else {
                        true
                    }
                });
            }
        }

        for id in &removed {
            self.ids.destroy(*id);
        }
        if !removed.is_empty() {
            log::debug!("Disconnected {} subscriptions of owner {:#x}", removed.len(), owner);
        }
        removed.len()
    }

    /// Number of subscribers for `event_type` on `bus_id`
    pub fn subscriber_count(&self, bus_id: u64, event_type: u64) -> usize {
        match self.bus_index(bus_id) {
            Ok(idx) => self.buses[idx].subscribers(event_type).len(),
            Err(_) => 0,
        }
    }

    /// Append an event to a bus
    pub fn publish(&mut self, bus_id: u64, event_type: u64, payload: &[u8]) -> Result<()> {
        let idx = self.bus_index(bus_id)?;
        self.buses[idx].stream.push(event_type, payload)
    }

    /// Append an event with a plain-old-data payload
    pub fn publish_pod<T: Pod>(&mut self, bus_id: u64, event_type: u64, payload: &T) -> Result<()> {
        self.publish(bus_id, event_type, bytemuck::bytes_of(payload))
    }

    /// Events currently buffered on a bus, for polling readers
    pub fn events(&self, bus_id: u64) -> Option<EventIter<'_>> {
        let idx = self.bus_index(bus_id).ok()?;
        Some(self.buses[idx].stream.iter())
    }

    /// Number of buffered events on a bus
    pub fn pending(&self, bus_id: u64) -> usize {
        match self.bus_index(bus_id) {
            Ok(idx) => self.buses[idx].stream.len(),
            Err(_) => 0,
        }
    }

    /// Drop buffered events without delivering them
    pub fn clear(&mut self, bus_id: u64) {
        if let Ok(idx) = self.bus_index(bus_id) {
            self.buses[idx].stream.clear();
        }
    }

    /// Deliver every buffered event of a bus, returning the number of events
    ///
    /// The buffer and the subscriber lists are captured when dispatch starts:
    /// events published by callbacks wait for the next dispatch, and so do
    /// connects and disconnects.
    pub fn dispatch(&mut self, bus_id: u64) -> Result<usize> {
        let idx = self.bus_index(bus_id)?;
        if self.buses[idx].dispatching {
            return Err(EventError::ReentrantDispatch(bus_id));
        }

        let stream = std::mem::take(&mut self.buses[idx].stream);
        if stream.is_empty() {
            return Ok(0);
        }

        let mut snapshot: Vec<(u64, Vec<EventCallback>)> = Vec::new();
        {
            let bus = &self.buses[idx];
            for event in &stream {
                let event_type = event.event_type();
                if snapshot.iter().any(|(t, _)| *t == event_type) {
                    continue;
                }
                let callbacks = bus
                    .subscribers(event_type)
                    .iter()
                    .map(|s| Arc::clone(&s.callback))
                    .collect();
                snapshot.push((event_type, callbacks));
            }
        }

        let mut guard = DispatchGuard::new(self, idx);
        let mut delivered = 0;
        for event in &stream {
            if let Some((_, callbacks)) = snapshot.iter().find(|(t, _)| *t == event.event_type()) {
                for callback in callbacks {
                    callback(&mut *guard.hub, &event);
                }
            }
            delivered += 1;
        }
        drop(guard);

        Ok(delivered)
    }

    /// Dispatch every bus in creation order, skipping buses already
    /// mid-dispatch
    pub fn dispatch_all(&mut self) -> usize {
        let mut delivered = 0;
        for idx in 0..self.buses.len() {
            let bus_id = self.buses[idx].id;
            match self.dispatch(bus_id) {
                Ok(n) => delivered += n,
                Err(e) => log::debug!("Skipped bus {:#018x}: {}", bus_id, e),
            }
        }
        delivered
    }
}

/// Marks a bus as dispatching until dropped, so a panicking subscriber
/// does not leave the bus locked
struct DispatchGuard<'a> {
    hub: &'a mut EventHub,
    bus: usize,
}

impl<'a> DispatchGuard<'a> {
    fn new(hub: &'a mut EventHub, bus: usize) -> Self {
        hub.buses[bus].dispatching = true;
        Self { hub, bus }
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.hub.buses[self.bus].dispatching = false;
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("buses", &self.buses.len())
            .field("subscriptions", &self.ids.len())
            .field("owner", &self.owner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use void_core::id64;

    const BUS: u64 = id64("test_bus");
    const TICK: u64 = id64("tick");
    const ECHO: u64 = id64("echo");

    fn recorder() -> Arc<Mutex<Vec<i32>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn test_priority_order() {
        let mut hub = EventHub::new();
        let order = recorder();

        for priority in [10, 5, 20] {
            let order = order.clone();
            hub.connect(BUS, TICK, priority, move |_, _| order.lock().push(priority))
                .unwrap();
        }

        hub.publish(BUS, TICK, &[]).unwrap();
        assert_eq!(hub.dispatch(BUS).unwrap(), 1);
        assert_eq!(*order.lock(), vec![5, 10, 20]);
    }

    #[test]
    fn test_equal_priority_keeps_connect_order() {
        let mut hub = EventHub::new();
        let order = recorder();

        for tag in 0..4 {
            let order = order.clone();
            hub.connect(BUS, TICK, 7, move |_, _| order.lock().push(tag)).unwrap();
        }

        hub.publish(BUS, TICK, &[]).unwrap();
        hub.dispatch(BUS).unwrap();
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_publish_during_dispatch_is_deferred() {
        let mut hub = EventHub::new();
        let seen = recorder();

        hub.connect(BUS, TICK, 0, |hub, _| {
            hub.publish(BUS, ECHO, &[]).unwrap();
        })
        .unwrap();
        let s = seen.clone();
        hub.connect(BUS, ECHO, 0, move |_, _| s.lock().push(1)).unwrap();

        hub.publish(BUS, TICK, &[]).unwrap();
        assert_eq!(hub.dispatch(BUS).unwrap(), 1);
        assert!(seen.lock().is_empty());
        assert_eq!(hub.pending(BUS), 1);

        assert_eq!(hub.dispatch(BUS).unwrap(), 1);
        assert_eq!(*seen.lock(), vec![1]);
        assert_eq!(hub.pending(BUS), 0);
    }

    #[test]
    fn test_reentrant_dispatch_rejected() {
        let mut hub = EventHub::new();
        let result = Arc::new(Mutex::new(None));

        let r = result.clone();
        hub.connect(BUS, TICK, 0, move |hub, _| {
            *r.lock() = Some(hub.dispatch(BUS));
        })
        .unwrap();

        hub.publish(BUS, TICK, &[]).unwrap();
        hub.dispatch(BUS).unwrap();
        assert_eq!(*result.lock(), Some(Err(EventError::ReentrantDispatch(BUS))));

        // Flag is reset afterwards
        assert_eq!(hub.dispatch(BUS), Ok(0));
    }

    #[test]
    fn test_panicking_subscriber_releases_bus() {
        let mut hub = EventHub::new();
        let id = hub
            .connect(BUS, TICK, 0, |_, _| panic!("subscriber failed"))
            .unwrap();
        hub.publish(BUS, TICK, &[]).unwrap();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hub.dispatch(BUS)));
        assert!(result.is_err());

        assert!(hub.disconnect(BUS, TICK, id));
        let order = recorder();
        let o = order.clone();
        hub.connect(BUS, TICK, 0, move |_, _| o.lock().push(1)).unwrap();
        hub.publish(BUS, TICK, &[]).unwrap();
        assert_eq!(hub.dispatch(BUS), Ok(1));
        assert_eq!(*order.lock(), vec![1]);
    }

    #[test]
    fn test_connect_during_dispatch_waits() {
        let mut hub = EventHub::new();
        let seen = recorder();

        let s = seen.clone();
        hub.connect(BUS, TICK, 0, move |hub, _| {
            let s = s.clone();
            hub.connect(BUS, TICK, 1, move |_, _| s.lock().push(1)).unwrap();
        })
        .unwrap();

        hub.publish(BUS, TICK, &[]).unwrap();
        hub.dispatch(BUS).unwrap();
        assert!(seen.lock().is_empty());
        assert_eq!(hub.subscriber_count(BUS, TICK), 2);
    }

    #[test]
    fn test_disconnect() {
        let mut hub = EventHub::new();
        let seen = recorder();

        let s = seen.clone();
        let id = hub.connect(BUS, TICK, 0, move |_, _| s.lock().push(1)).unwrap();
        assert!(hub.disconnect(BUS, TICK, id));
        assert!(!hub.disconnect(BUS, TICK, id));
        assert!(!hub.disconnect(id64("other"), TICK, id));

        hub.publish(BUS, TICK, &[]).unwrap();
        hub.dispatch(BUS).unwrap();
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_disconnect_owner() {
        let mut hub = EventHub::new();
        hub.set_owner(Some(1));
        hub.connect(BUS, TICK, 0, |_, _| {}).unwrap();
        hub.connect(BUS, ECHO, 0, |_, _| {}).unwrap();
        hub.set_owner(Some(2));
        hub.connect(BUS, TICK, 0, |_, _| {}).unwrap();
        hub.set_owner(None);

        assert_eq!(hub.disconnect_owner(1), 2);
        assert_eq!(hub.subscriber_count(BUS, TICK), 1);
        assert_eq!(hub.subscriber_count(BUS, ECHO), 0);
    }

    #[test]
    fn test_unknown_bus() {
        let mut hub = EventHub::new();
        let other = id64("missing");
        assert_eq!(hub.publish(other, TICK, &[]), Err(EventError::BusNotFound(other)));
        assert_eq!(hub.dispatch(other), Err(EventError::BusNotFound(other)));
        assert!(hub.events(other).is_none());
        assert_eq!(hub.pending(other), 0);
    }

    #[test]
    fn test_events_polling_and_payload() {
        let mut hub = EventHub::new();
        hub.create_bus(BUS).unwrap();
        hub.create_bus(BUS).unwrap();
        hub.publish_pod(BUS, TICK, &42u32).unwrap();
        hub.publish(BUS, ECHO, b"hi").unwrap();

        let events: Vec<_> = hub.events(BUS).unwrap().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].read::<u32>(), Some(42));
        assert_eq!(events[1].payload(), b"hi");

        hub.clear(BUS);
        assert_eq!(hub.pending(BUS), 0);
        assert_eq!(hub.bus_ids().collect::<Vec<_>>(), vec![BUS]);
    }

    #[test]
    fn test_dispatch_all_counts_every_bus() {
        let mut hub = EventHub::new();
        let second = id64("second");
        hub.create_bus(BUS).unwrap();
        hub.create_bus(second).unwrap();
        hub.publish(BUS, TICK, &[]).unwrap();
        hub.publish(second, TICK, &[]).unwrap();
        hub.publish(second, TICK, &[]).unwrap();

        assert_eq!(hub.dispatch_all(), 3);
        assert_eq!(hub.dispatch_all(), 0);
    }

    #[test]
    fn test_reserved_ids_rejected() {
        let mut hub = EventHub::new();
        assert_eq!(hub.create_bus(EMPTY), Err(EventError::ReservedId(EMPTY)));
        assert!(hub.connect(BUS, TOMBSTONE, 0, |_, _| {}).is_err());
    }
}
