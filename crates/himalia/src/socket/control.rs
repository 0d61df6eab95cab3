/*
 * control.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use crossbeam::channel::Receiver;
use crossbeam::channel::Sender;
use futures::executor::block_on;
use log::error;
use log::info;
use log::trace;
use log::warn;
use stdext::spawn;

use crate::execution::coordinator::Coordinator;
use crate::execution::coordinator::InterruptHandle;
use crate::kernel_state::KernelState;
use crate::language::control_handler::ControlHandler;
use crate::socket::dispatcher::route;
use crate::socket::dispatcher::Dispatcher;
use crate::socket::dispatcher::Responder;
use crate::socket::socket::poll_timeout;
use crate::socket::socket::Socket;
use crate::wire::debug_request::DebugRequest;
use crate::wire::interrupt_reply::InterruptReply;
use crate::wire::interrupt_request::InterruptRequest;
use crate::wire::jupyter_message::JupyterMessage;
use crate::wire::jupyter_message::Status;
use crate::wire::originator::Originator;
use crate::wire::shutdown_reply::ShutdownReply;
use crate::wire::shutdown_request::ShutdownRequest;

/// A shutdown reply built off the Control thread. Only the Control loop may
/// touch its socket, so the reply is handed back to it for sending.
pub struct DeferredReply {
    originator: Originator,
    reply: ShutdownReply,
}

pub struct Control {
    socket: Socket,
    dispatcher: Dispatcher,
    state: Arc<KernelState>,
    replies_rx: Receiver<DeferredReply>,
    poll_interval: Duration,
}

impl Control {
    pub fn new(
        socket: Socket,
        dispatcher: Dispatcher,
        state: Arc<KernelState>,
        replies_rx: Receiver<DeferredReply>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            socket,
            dispatcher,
            state,
            replies_rx,
            poll_interval,
        }
    }

    /// Main loop for the Control thread; to be invoked by the kernel. Runs
    /// until the kernel halts, and returns an error if the socket failed.
    ///
    /// Keeps serving requests while a shutdown waits for the request in
    /// flight, so that the latter can still be interrupted.
    pub fn listen(&mut self) -> crate::Result<()> {
        let timeout = poll_timeout(self.poll_interval);
        loop {
            self.send_deferred_replies()?;
            if self.state.is_halted() {
                trace!("Control: Kernel halted, exiting");
                return Ok(());
            }
            if !self.socket.poll_incoming(timeout)? {
                continue;
            }
            self.dispatcher.receive(&self.socket)?;
        }
    }

    fn send_deferred_replies(&self) -> crate::Result<()> {
        while let Ok(deferred) = self.replies_rx.try_recv() {
            let sent = JupyterMessage::create_with_identity(
                deferred.originator,
                deferred.reply,
                &self.socket.session,
            )
            .send(&self.socket);

            // Halt even if the reply couldn't be delivered
            self.state.halt_when_idle();
            sent?;
        }
        Ok(())
    }
}

/// The shutdown procedure, shared by the Shell and Control channels.
#[derive(Clone)]
pub struct Shutdown {
    state: Arc<KernelState>,
    coordinator: Arc<Coordinator>,
    handler: Arc<Mutex<dyn ControlHandler>>,
    timeout: Duration,
}

impl Shutdown {
    /// * `timeout` - How long the backend's shutdown hook may take
    pub fn new(
        state: Arc<KernelState>,
        coordinator: Arc<Coordinator>,
        handler: Arc<Mutex<dyn ControlHandler>>,
        timeout: Duration,
    ) -> Self {
        Self {
            state,
            coordinator,
            handler,
            timeout,
        }
    }

    /// Shuts down on behalf of the Shell request in flight: there is nothing
    /// to wait for, so the hooks run right away before replying and halting.
    pub fn run(&self, responder: &Responder, restart: bool) -> crate::Result<()> {
        self.begin(restart);
        let reply = responder.reply(self.finish(restart));

        // Halt even if the reply couldn't be delivered
        self.state.halt_when_idle();
        reply
    }

    /// Shuts down on behalf of a Control request. New Shell work is refused
    /// right away, but the hooks run on a `shutdown` thread once the request
    /// in flight has finished. The reply goes back to the Control loop over
    /// `replies_tx`, which sends it and halts the kernel.
    pub fn defer(&self, originator: Originator, restart: bool, replies_tx: Sender<DeferredReply>) {
        self.begin(restart);
        let shutdown = self.clone();

        spawn!("shutdown", move || {
            trace!("Waiting for the current request to finish before shutting down");
            shutdown.state.wait_for_idle();

            let reply = shutdown.finish(restart);
            if replies_tx.send(DeferredReply { originator, reply }).is_err() {
                warn!("Control loop exited before the shutdown reply could be sent");
                shutdown.state.halt();
            }
        });
    }

    fn begin(&self, restart: bool) {
        if !self.state.request_shutdown(restart) {
            info!("Shutdown already in progress");
        }
    }

    /// Runs the backend and handler hooks and builds the reply.
    fn finish(&self, restart: bool) -> ShutdownReply {
        let finished = self.coordinator.run_with_timeout(
            move |backend| block_on(backend.shutdown(restart)),
            self.timeout,
        );
        match finished {
            Ok(Some(Ok(()))) => {},
            Ok(Some(Err(err))) => warn!("Backend failed to shut down: {err}"),
            Ok(None) => warn!(
                "Backend didn't shut down within {} ms",
                self.timeout.as_millis()
            ),
            Err(err) => warn!("Failed to shut down backend: {err}"),
        }

        let mut handler = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = block_on(handler.handle_shutdown_request(restart)) {
            error!("Failed to handle shutdown request: {err}");
        }
        drop(handler);

        ShutdownReply {
            status: Status::Ok,
            restart,
        }
    }
}

/// Default handlers of the Control channel.
pub struct ControlHandlers {
    interrupt: InterruptHandle,
    handler: Arc<Mutex<dyn ControlHandler>>,
    shutdown: Shutdown,
    replies_tx: Sender<DeferredReply>,
}

impl ControlHandlers {
    /// * `replies_tx` - Hands deferred shutdown replies to the Control loop
    pub fn new(
        interrupt: InterruptHandle,
        handler: Arc<Mutex<dyn ControlHandler>>,
        shutdown: Shutdown,
        replies_tx: Sender<DeferredReply>,
    ) -> Self {
        Self {
            interrupt,
            handler,
            shutdown,
            replies_tx,
        }
    }

    /// Registers the handlers for `interrupt_request`, `shutdown_request`,
    /// and `debug_request`.
    pub fn register(self, dispatcher: &mut Dispatcher) {
        let handlers = Arc::new(self);
        route!(dispatcher, handlers, InterruptRequest => handle_interrupt_request);
        route!(dispatcher, handlers, ShutdownRequest => handle_shutdown_request);
        route!(dispatcher, handlers, DebugRequest => handle_debug_request);
    }

    fn handle_interrupt_request(
        &self,
        responder: &Responder,
        _req: JupyterMessage<InterruptRequest>,
    ) -> crate::Result<()> {
        info!("Received interrupt request");

        let mut handler = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = block_on(handler.handle_interrupt_request()) {
            error!("Failed to handle interrupt request: {err}");
        }
        drop(handler);

        self.interrupt.interrupt();

        responder.reply(InterruptReply { status: Status::Ok })
    }

    fn handle_shutdown_request(
        &self,
        responder: &Responder,
        req: JupyterMessage<ShutdownRequest>,
    ) -> crate::Result<()> {
        info!("Received shutdown request (restart: {})", req.content.restart);
        self.shutdown.defer(
            responder.originator().clone(),
            req.content.restart,
            self.replies_tx.clone(),
        );
        Ok(())
    }

    fn handle_debug_request(
        &self,
        responder: &Responder,
        req: JupyterMessage<DebugRequest>,
    ) -> crate::Result<()> {
        let mut handler = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
        let reply = block_on(handler.handle_debug_request(&req.content))?;
        drop(handler);
        responder.reply(reply)
    }
}
