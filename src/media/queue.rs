use std::{collections::VecDeque, time::Duration};

use parking_lot::{Condvar, Mutex};

use crate::common::{Result, SourceError};

struct QueueState<T> {
    events: VecDeque<T>,
    shut_down: bool,
}

/// FIFO of events consumed by another thread. Once shut down every call
/// fails with `Shutdown` and pending events are dropped.
pub struct EventQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                events: VecDeque::new(),
                shut_down: false,
            }),
            available: Condvar::new(),
        }
    }

    pub fn push(&self, event: T) -> Result<()> {
        let mut state = self.state.lock();
        if state.shut_down {
            return Err(SourceError::Shutdown);
        }
        state.events.push_back(event);
        self.available.notify_one();
        Ok(())
    }

    /// Blocks until an event is available.
    pub fn next(&self) -> Result<T> {
        let mut state = self.state.lock();
        loop {
            if state.shut_down {
                return Err(SourceError::Shutdown);
            }
            if let Some(event) = state.events.pop_front() {
                return Ok(event);
            }
            self.available.wait(&mut state);
        }
    }

    /// Like `next`, but gives up with `Ok(None)` after `timeout`.
    pub fn next_timeout(&self, timeout: Duration) -> Result<Option<T>> {
        let mut state = self.state.lock();
        loop {
            if state.shut_down {
                return Err(SourceError::Shutdown);
            }
            if let Some(event) = state.events.pop_front() {
                return Ok(Some(event));
            }
            if self.available.wait_for(&mut state, timeout).timed_out() {
                return match state.shut_down {
                    true => Err(SourceError::Shutdown),
                    false => Ok(state.events.pop_front()),
                };
            }
        }
    }

    pub fn try_next(&self) -> Result<Option<T>> {
        let mut state = self.state.lock();
        if state.shut_down {
            return Err(SourceError::Shutdown);
        }
        Ok(state.events.pop_front())
    }

    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shut_down = true;
        state.events.clear();
        self.available.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn events_come_out_in_posting_order() {
        let queue = EventQueue::new();
        for i in 0..5 {
            queue.push(i).unwrap();
        }
        let drained: Vec<_> = std::iter::from_fn(|| queue.try_next().unwrap()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn blocked_reader_wakes_on_push() {
        let queue = Arc::new(EventQueue::new());
        let reader = {
            let queue = queue.clone();
            thread::spawn(move || queue.next())
        };
        thread::sleep(Duration::from_millis(20));
        queue.push("hello").unwrap();
        assert_eq!(reader.join().unwrap().unwrap(), "hello");
    }

    #[test]
    fn shutdown_releases_blocked_reader() {
        let queue: Arc<EventQueue<u8>> = Arc::new(EventQueue::new());
        let reader = {
            let queue = queue.clone();
            thread::spawn(move || queue.next())
        };
        thread::sleep(Duration::from_millis(20));
        queue.shutdown();
        assert!(matches!(reader.join().unwrap(), Err(SourceError::Shutdown)));
        assert!(matches!(queue.push(1), Err(SourceError::Shutdown)));
    }

    #[test]
    fn timeout_returns_none_when_idle() {
        let queue: EventQueue<u8> = EventQueue::new();
        assert!(queue.next_timeout(Duration::from_millis(10)).unwrap().is_none());
    }
}
