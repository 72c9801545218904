use std::collections::HashMap;
use std::hash::Hash;
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Periodic repeat of a held key.
struct HoldTask {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Turns a held key into repeated presses.
///
/// Each `press` of a key starts a timer thread that sends one tick every
/// `interval` until the key is released. A key can have up to `multiplier`
/// timers running at once, so auto-repeating presses speed the count up.
pub struct HoldRepeater<K, E> {
    interval: Duration,
    multiplier: usize,
    sink: Sender<E>,
    wrap: fn(K) -> E,
    tasks: HashMap<K, Vec<HoldTask>>,
}

impl<K, E> HoldRepeater<K, E>
where
    K: Clone + Eq + Hash + Send + 'static,
    E: Send + 'static,
{
    pub fn new(interval: Duration, multiplier: usize, sink: Sender<E>, wrap: fn(K) -> E) -> Self {
        Self {
            interval,
            multiplier,
            sink,
            wrap,
            tasks: HashMap::new(),
        }
    }

    /// Start another repeat task for `key` unless it already has `multiplier` of them.
    pub fn press(&mut self, key: K) {
        let running = self.tasks.entry(key.clone()).or_default();
        if running.len() >= self.multiplier {
            return;
        }

        let (stop, stopped) = channel::<()>();
        let sink = self.sink.clone();
        let wrap = self.wrap;
        let interval = self.interval;
        let handle = thread::spawn(move || loop {
            match stopped.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    if sink.send(wrap(key.clone())).is_err() {
                        break;
                    }
                }
                _ => break,
            }
        });
        running.push(HoldTask { stop, handle });
    }

    /// Cancel every repeat task of `key`.
    pub fn release(&mut self, key: &K) {
        if let Some(tasks) = self.tasks.remove(key) {
            stop_all(tasks);
        }
    }

    pub fn release_all(&mut self) {
        for (_, tasks) in self.tasks.drain() {
            stop_all(tasks);
        }
    }

    pub fn active(&self, key: &K) -> usize {
        self.tasks.get(key).map(Vec::len).unwrap_or(0)
    }
}

impl<K, E> Drop for HoldRepeater<K, E> {
    fn drop(&mut self) {
        for (_, tasks) in self.tasks.drain() {
            stop_all(tasks);
        }
    }
}

/// Dropping the stop sender wakes the timer thread immediately.
fn stop_all(tasks: Vec<HoldTask>) {
    for task in tasks {
        drop(task.stop);
        let _ = task.handle.join();
    }
}
