/*
 * memory.rs
 *
 * Copyright (C) 2024 Posit Software, PBC. All rights reserved.
 *
 */

use std::cell::RefCell;
use std::time::Duration;

use crossbeam::channel::unbounded;
use crossbeam::channel::Receiver;
use crossbeam::channel::RecvTimeoutError;
use crossbeam::channel::Sender;

use crate::error::Error;
use crate::socket::transport::Transport;

/// One end of an in-process transport. Messages sent on one end are received,
/// in order, on the other. Used to run a kernel without any network sockets,
/// e.g. in tests.
pub struct MemoryTransport {
    name: String,
    tx: Sender<Vec<Vec<u8>>>,
    rx: Receiver<Vec<Vec<u8>>>,

    /// A message taken off the channel by `poll_incoming()` and not yet
    /// received
    pending: RefCell<Option<Vec<Vec<u8>>>>,
}

impl MemoryTransport {
    /// Creates the two connected ends of a transport.
    pub fn pair(name: &str) -> (MemoryTransport, MemoryTransport) {
        let (left_tx, left_rx) = unbounded();
        let (right_tx, right_rx) = unbounded();
        (
            Self::new(name, left_tx, right_rx),
            Self::new(name, right_tx, left_rx),
        )
    }

    fn new(name: &str, tx: Sender<Vec<Vec<u8>>>, rx: Receiver<Vec<Vec<u8>>>) -> Self {
        Self {
            name: String::from(name),
            tx,
            rx,
            pending: RefCell::new(None),
        }
    }

    fn closed(&self) -> Error {
        Error::ChannelClosed(self.name.clone())
    }
}

impl Transport for MemoryTransport {
    fn recv_multipart(&self) -> crate::Result<Vec<Vec<u8>>> {
        if let Some(parts) = self.pending.borrow_mut().take() {
            return Ok(parts);
        }
        self.rx.recv().map_err(|_| self.closed())
    }

    fn send_multipart(&self, parts: &[Vec<u8>]) -> crate::Result<()> {
        self.tx.send(parts.to_vec()).map_err(|_| self.closed())
    }

    fn poll_incoming(&self, timeout_ms: i64) -> crate::Result<bool> {
        let mut pending = self.pending.borrow_mut();
        if pending.is_some() {
            return Ok(true);
        }

        let received = match timeout_ms {
            ms if ms < 0 => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            ms => self.rx.recv_timeout(Duration::from_millis(ms as u64)),
        };

        match received {
            Ok(parts) => {
                *pending = Some(parts);
                Ok(true)
            },
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => Err(self.closed()),
        }
    }

    fn last_endpoint(&self) -> Option<String> {
        Some(format!("memory://{}:0", self.name))
    }
}
