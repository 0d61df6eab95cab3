/*
 * kernel_state.rs
 *
 * Copyright (C) 2024 Posit Software, PBC. All rights reserved.
 *
 */

use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use crossbeam::channel::bounded;
use crossbeam::channel::Receiver;
use crossbeam::channel::Sender;

use crate::error::Error;
use crate::socket::iopub::IOPubMessage;
use crate::wire::header::JupyterHeader;
use crate::wire::status::ExecutionState;
use crate::wire::status::KernelStatus;

/// The single authority over the kernel's publicly observable state: its
/// busy/idle status, the request holding it busy, and the shutdown flags.
///
/// Other components never touch the status directly; they go through the
/// transition methods, each of which publishes the matching IOPub `status`
/// message while holding the state lock so observers see transitions in the
/// order they happened.
pub struct KernelState {
    inner: Mutex<StateInner>,

    /// Signalled on every transition
    changed: Condvar,

    /// Status messages are published through here
    iopub_tx: Sender<IOPubMessage>,

    /// Dropped to halt the kernel; receivers see a disconnected channel
    halt_tx: Mutex<Option<Sender<()>>>,
    halt_rx: Receiver<()>,
}

#[derive(Debug)]
struct StateInner {
    status: ExecutionState,

    /// The Shell request currently holding the kernel busy
    active: Option<JupyterHeader>,

    /// Set once shutdown was requested, with the `restart` flag
    shutdown: Option<bool>,

    halted: bool,

    /// Halt once the request in flight is done
    halt_pending: bool,

    /// The failure that brought the kernel down, if any
    fatal: Option<String>,
}

impl KernelState {
    pub fn new(iopub_tx: Sender<IOPubMessage>) -> Self {
        let (halt_tx, halt_rx) = bounded(0);
        Self {
            inner: Mutex::new(StateInner {
                status: ExecutionState::Starting,
                active: None,
                shutdown: None,
                halted: false,
                halt_pending: false,
                fatal: None,
            }),
            changed: Condvar::new(),
            iopub_tx,
            halt_tx: Mutex::new(Some(halt_tx)),
            halt_rx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StateInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> ExecutionState {
        self.lock().status
    }

    /// The header of the Shell request currently being processed.
    pub fn active_request(&self) -> Option<JupyterHeader> {
        self.lock().active.clone()
    }

    /// Publishes the `starting` status. Sent once, before `ready()`.
    pub fn announce_starting(&self) {
        let inner = self.lock();
        if inner.status == ExecutionState::Starting {
            self.publish(None, ExecutionState::Starting);
        }
    }

    /// Leaves the `starting` state once the kernel can take requests.
    pub fn ready(&self) -> crate::Result<()> {
        let mut inner = self.lock();
        self.transition(&mut inner, ExecutionState::Starting, ExecutionState::Idle)?;
        self.publish(None, ExecutionState::Idle);
        Ok(())
    }

    /// Marks the start of a Shell request: idle to busy. Waits for the kernel
    /// to finish starting, and refuses new work once shutdown was requested.
    pub fn begin_request(&self, parent: &JupyterHeader) -> crate::Result<()> {
        let mut inner = self
            .changed
            .wait_while(self.lock(), |inner| {
                inner.status == ExecutionState::Starting && !inner.halted
            })
            .unwrap_or_else(PoisonError::into_inner);

        if inner.shutdown.is_some() || inner.halted {
            return Err(Error::ShuttingDown);
        }

        self.transition(&mut inner, ExecutionState::Idle, ExecutionState::Busy)?;
        inner.active = Some(parent.clone());
        self.publish(Some(parent.clone()), ExecutionState::Busy);
        Ok(())
    }

    /// Marks the end of a Shell request, after its reply was sent: busy to
    /// idle.
    pub fn end_request(&self, parent: &JupyterHeader) -> crate::Result<()> {
        let mut inner = self.lock();
        self.transition(&mut inner, ExecutionState::Busy, ExecutionState::Idle)?;
        inner.active = None;
        self.publish(Some(parent.clone()), ExecutionState::Idle);

        if inner.halt_pending {
            drop(inner);
            self.halt();
        }
        Ok(())
    }

    /// Answers a Shell request refused during shutdown with `reply`,
    /// bracketed by busy and idle like any other request. A pending halt
    /// waits for the idle.
    pub fn refuse_request<F>(&self, parent: &JupyterHeader, reply: F) -> crate::Result<()>
    where
        F: FnOnce() -> crate::Result<()>,
    {
        let mut inner = self.lock();
        if inner.halted {
            drop(inner);
            return reply();
        }
        self.transition(&mut inner, ExecutionState::Idle, ExecutionState::Busy)?;
        inner.active = Some(parent.clone());
        self.publish(Some(parent.clone()), ExecutionState::Busy);
        drop(inner);

        let result = reply();
        self.end_request(parent)?;
        result
    }

    fn transition(
        &self,
        inner: &mut StateInner,
        from: ExecutionState,
        to: ExecutionState,
    ) -> crate::Result<()> {
        if inner.status != from {
            return Err(Error::InvalidTransition(inner.status, to));
        }
        log::debug!("status '{}' => '{}'", inner.status, to);
        inner.status = to;
        self.changed.notify_all();
        Ok(())
    }

    fn publish(&self, parent: Option<JupyterHeader>, execution_state: ExecutionState) {
        let status = KernelStatus { execution_state };
        if let Err(err) = self.iopub_tx.send(IOPubMessage::Status(parent, status)) {
            log::warn!("Could not publish '{execution_state}' status: {err}");
        }
    }

    /// Records a shutdown request. Returns false if one was already recorded.
    pub fn request_shutdown(&self, restart: bool) -> bool {
        let mut inner = self.lock();
        if inner.shutdown.is_some() {
            return false;
        }
        log::info!("Shutdown requested (restart: {restart})");
        inner.shutdown = Some(restart);
        self.changed.notify_all();
        true
    }

    /// The `restart` flag of the shutdown request, if shutdown was requested.
    pub fn shutdown_requested(&self) -> Option<bool> {
        self.lock().shutdown
    }

    /// Blocks until no Shell request is in flight.
    pub fn wait_for_idle(&self) {
        let _inner = self
            .changed
            .wait_while(self.lock(), |inner| {
                inner.status == ExecutionState::Busy && !inner.halted
            })
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Halts the kernel, letting the request in flight finish first. Used
    /// when the request in flight is the one asking for the halt.
    pub fn halt_when_idle(&self) {
        let mut inner = self.lock();
        if inner.status == ExecutionState::Busy {
            inner.halt_pending = true;
            return;
        }
        drop(inner);
        self.halt();
    }

    /// Stops every loop of the kernel.
    pub fn halt(&self) {
        let mut inner = self.lock();
        if inner.halted {
            return;
        }
        log::info!("Halting kernel");
        inner.halted = true;
        self.halt_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.changed.notify_all();
    }

    /// Halts the kernel because of an unrecoverable error.
    pub fn fail(&self, error: &Error) {
        {
            let mut inner = self.lock();
            log::error!("Kernel failed: {error}");
            if inner.fatal.is_none() {
                inner.fatal = Some(error.to_string());
            }
        }
        self.halt();
    }

    pub fn is_halted(&self) -> bool {
        self.lock().halted
    }

    /// A channel that disconnects when the kernel halts, for use in
    /// `select!` loops.
    pub fn halt_signal(&self) -> Receiver<()> {
        self.halt_rx.clone()
    }

    pub fn fatal_error(&self) -> Option<String> {
        self.lock().fatal.clone()
    }
}
