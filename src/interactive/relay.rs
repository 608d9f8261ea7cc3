//! Blocking hand-off of single input lines from the host to the worker thread.
//!
//! The channel is a signal cell plus a fixed-size buffer holding one
//! length-prefixed line. The worker announces that it is waiting and then
//! suspends its thread on a condition variable. The host may only write the
//! buffer while the worker is waiting and the previous line has been consumed;
//! it writes length and bytes first and flips the signal to `DataReady` last,
//! under the same lock, before waking the worker.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

const LEN_PREFIX: usize = std::mem::size_of::<u32>();

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("previous line has not been consumed yet")]
    Busy,
    #[error("worker is not waiting for input")]
    NotWaiting,
    #[error("line of {len} bytes exceeds input buffer of {capacity} bytes")]
    LineTooLong { len: usize, capacity: usize },
    #[error("no input received within {0:?}")]
    InputTimeout(Duration),
    #[error("input channel is closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Empty,
    DataReady,
}

#[derive(Debug)]
struct Cell {
    signal: Signal,
    awaiting: bool,
    closed: bool,
    buffer: Box<[u8]>,
}

#[derive(Debug)]
pub struct StdinRelay {
    cell: Mutex<Cell>,
    wake: Condvar,
    capacity: usize,
}

impl StdinRelay {
    pub fn new(capacity: usize) -> Self {
        Self {
            cell: Mutex::new(Cell {
                signal: Signal::Empty,
                awaiting: false,
                closed: false,
                buffer: vec![0u8; LEN_PREFIX + capacity].into_boxed_slice(),
            }),
            wake: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Worker side. Marks the worker as waiting, runs `announce` (used to
    /// notify the host), then blocks the calling thread until a line arrives,
    /// the channel is closed (`Ok(None)`), or `timeout` expires.
    pub fn read_line(
        &self,
        timeout: Option<Duration>,
        announce: impl FnOnce(),
    ) -> Result<Option<String>, RelayError> {
        {
            let mut cell = self.lock();
            if cell.closed && cell.signal == Signal::Empty {
                return Ok(None);
            }
            cell.awaiting = true;
        }

        announce();

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut cell = self.lock();
        while cell.signal == Signal::Empty && !cell.closed {
            cell = match deadline {
                None => self
                    .wake
                    .wait(cell)
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        cell.awaiting = false;
                        return Err(RelayError::InputTimeout(timeout.unwrap_or_default()));
                    }
                    self.wake
                        .wait_timeout(cell, deadline - now)
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .0
                }
            };
        }

        cell.awaiting = false;
        if cell.signal == Signal::Empty {
            return Ok(None);
        }

        // Consume before anything else so the host may send the next line.
        cell.signal = Signal::Empty;
        let mut len_bytes = [0u8; LEN_PREFIX];
        len_bytes.copy_from_slice(&cell.buffer[..LEN_PREFIX]);
        let len = u32::from_le_bytes(len_bytes) as usize;
        let line = String::from_utf8_lossy(&cell.buffer[LEN_PREFIX..LEN_PREFIX + len]).into_owned();

        Ok(Some(line))
    }

    /// Host side. Never blocks beyond the short critical section.
    pub fn deliver(&self, line: &str) -> Result<(), RelayError> {
        let bytes = line.as_bytes();
        if bytes.len() > self.capacity {
            return Err(RelayError::LineTooLong {
                len: bytes.len(),
                capacity: self.capacity,
            });
        }

        let mut cell = self.lock();
        if cell.closed {
            return Err(RelayError::Closed);
        }
        if cell.signal == Signal::DataReady {
            return Err(RelayError::Busy);
        }
        if !cell.awaiting {
            return Err(RelayError::NotWaiting);
        }

        cell.buffer[..LEN_PREFIX].copy_from_slice(&(bytes.len() as u32).to_le_bytes());
        cell.buffer[LEN_PREFIX..LEN_PREFIX + bytes.len()].copy_from_slice(bytes);
        cell.signal = Signal::DataReady;
        drop(cell);

        self.wake.notify_one();
        Ok(())
    }

    /// True while the worker is blocked and the buffer is free for a new line.
    pub fn is_awaiting(&self) -> bool {
        let cell = self.lock();
        cell.awaiting && cell.signal == Signal::Empty && !cell.closed
    }

    pub fn signal(&self) -> Signal {
        self.lock().signal
    }

    /// Ends input: a waiting worker wakes with `None`, later reads return
    /// `None` immediately. A line already delivered is still consumed first.
    pub fn close(&self) {
        self.lock().closed = true;
        self.wake.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, Cell> {
        self.cell
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
