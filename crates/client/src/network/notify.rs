//! Notification watchers
//!
//! Watchers subscribe to a set of bank 1 bits. Each level report is XORed
//! with the previous one and every watcher whose bits intersect the change
//! is called. A stopped watcher gets exactly one [`WatchEvent::Stopped`]
//! before it is removed.

use crate::error::{ClientError, Result};

/// Maximum number of registered watchers
pub const MAX_WATCHERS: usize = 32;

/// Identifier returned by `start_notifications`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(pub u32);

impl std::fmt::Display for WatcherId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a watcher callback receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    /// Monitored bits changed; `levels` is the whole bank
    Change { levels: u32, tick: u32 },
    /// Terminal; no further events follow
    Stopped,
}

pub type WatchCallback = Box<dyn FnMut(WatchEvent) + Send + 'static>;

struct Watcher {
    id: WatcherId,
    bits: u32,
    stopping: bool,
    callback: WatchCallback,
}

/// Registered watchers plus the last seen levels
pub struct WatcherRegistry {
    next_id: u32,
    watchers: Vec<Watcher>,
    previous: u32,
}

impl Default for WatcherRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WatcherRegistry {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            watchers: Vec::new(),
            previous: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    /// Bits monitored on the daemon: the OR of every watcher not being stopped
    pub fn mask(&self) -> u32 {
        self.watchers
            .iter()
            .filter(|w| !w.stopping)
            .fold(0, |mask, w| mask | w.bits)
    }

    pub fn previous(&self) -> u32 {
        self.previous
    }

    /// Seed the previous levels, typically from a BR1 read
    pub fn prime(&mut self, levels: u32) {
        self.previous = levels;
    }

    pub fn register(&mut self, bits: u32, callback: WatchCallback) -> Result<WatcherId> {
        if self.watchers.len() >= MAX_WATCHERS {
            return Err(ClientError::WatcherLimit);
        }
        let id = WatcherId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.watchers.push(Watcher {
            id,
            bits,
            stopping: false,
            callback,
        });
        Ok(id)
    }

    /// Mark a watcher as stopping and return the mask without it
    ///
    /// The watcher keeps receiving changes until [`finish_stop`](Self::finish_stop).
    pub fn begin_stop(&mut self, id: WatcherId) -> Result<u32> {
        let watcher = self
            .watchers
            .iter_mut()
            .find(|w| w.id == id && !w.stopping)
            .ok_or(ClientError::UnknownWatcher(id.0))?;
        watcher.stopping = true;
        Ok(self.mask())
    }

    /// Deliver the terminal event and remove the watcher
    pub fn finish_stop(&mut self, id: WatcherId) -> bool {
        match self.watchers.iter().position(|w| w.id == id) {
            Some(index) => {
                let mut watcher = self.watchers.remove(index);
                (watcher.callback)(WatchEvent::Stopped);
                true
            }
            None => false,
        }
    }

    /// Stop every watcher, e.g. when the session goes away
    pub fn stop_all(&mut self) {
        for mut watcher in self.watchers.drain(..) {
            (watcher.callback)(WatchEvent::Stopped);
        }
    }

    /// Process one level report; returns how many watchers were called
    pub fn dispatch(&mut self, levels: u32, tick: u32) -> usize {
        let changed = self.previous ^ levels;
        self.previous = levels;
        if changed == 0 {
            return 0;
        }

        let mut fired = 0;
        for watcher in self.watchers.iter_mut().filter(|w| w.bits & changed != 0) {
            (watcher.callback)(WatchEvent::Change { levels, tick });
            fired += 1;
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (WatchCallback, Arc<Mutex<Vec<WatchEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (
            Box::new(move |event| sink.lock().unwrap().push(event)),
            seen,
        )
    }

    #[test]
    fn test_xor_dispatch() {
        let mut registry = WatcherRegistry::new();
        let (cb4, seen4) = recorder();
        let (cb5, seen5) = recorder();
        registry.register(1 << 4, cb4).unwrap();
        registry.register(1 << 5, cb5).unwrap();

        assert_eq!(registry.dispatch(1 << 4, 100), 1);
        // Identical report fires nothing
        assert_eq!(registry.dispatch(1 << 4, 200), 0);
        assert_eq!(registry.dispatch(1 << 5, 300), 2);

        assert_eq!(
            *seen4.lock().unwrap(),
            vec![
                WatchEvent::Change {
                    levels: 1 << 4,
                    tick: 100
                },
                WatchEvent::Change {
                    levels: 1 << 5,
                    tick: 300
                },
            ]
        );
        assert_eq!(seen5.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_prime_suppresses_known_levels() {
        let mut registry = WatcherRegistry::new();
        let (cb, seen) = recorder();
        registry.register(0b11, cb).unwrap();
        registry.prime(0b01);

        assert_eq!(registry.dispatch(0b01, 1), 0);
        assert_eq!(registry.dispatch(0b00, 2), 1);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_limit() {
        let mut registry = WatcherRegistry::new();
        for bit in 0..MAX_WATCHERS {
            registry
                .register(1 << bit, Box::new(|_| {}))
                .unwrap();
        }
        let err = registry.register(1, Box::new(|_| {})).unwrap_err();
        assert!(matches!(err, ClientError::WatcherLimit));
        assert_eq!(registry.len(), MAX_WATCHERS);
    }

    #[test]
    fn test_stop_sequence() {
        let mut registry = WatcherRegistry::new();
        let (cb, seen) = recorder();
        let a = registry.register(0b01, cb).unwrap();
        let b = registry.register(0b10, Box::new(|_| {})).unwrap();
        assert_eq!(registry.mask(), 0b11);

        assert_eq!(registry.begin_stop(a).unwrap(), 0b10);
        // A second stop of the same watcher is rejected
        assert!(matches!(
            registry.begin_stop(a),
            Err(ClientError::UnknownWatcher(0))
        ));

        // Still registered until the NB reply
        registry.dispatch(0b01, 5);
        assert!(registry.finish_stop(a));
        assert!(!registry.finish_stop(a));

        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], WatchEvent::Stopped);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.mask(), 0b10);
        let _ = b;
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut registry = WatcherRegistry::new();
        let a = registry.register(1, Box::new(|_| {})).unwrap();
        registry.begin_stop(a).unwrap();
        registry.finish_stop(a);
        let b = registry.register(1, Box::new(|_| {})).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_stop_all_delivers_sentinels() {
        let mut registry = WatcherRegistry::new();
        let (cb, seen) = recorder();
        registry.register(1, cb).unwrap();
        registry.stop_all();
        assert!(registry.is_empty());
        assert_eq!(*seen.lock().unwrap(), vec![WatchEvent::Stopped]);
    }
}
