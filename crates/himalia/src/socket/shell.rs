/*
 * shell.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::bounded;
use futures::executor::block_on;
use log::info;
use log::trace;
use log::warn;
use serde_json::json;
use serde_json::Value;

use crate::comm::event::CommManagerEvent;
use crate::error::Error;
use crate::execution::coordinator::Coordinator;
use crate::execution::coordinator::ExecutionResult;
use crate::kernel_state::KernelState;
use crate::socket::comm::CommInitiator;
use crate::socket::comm::CommMsg;
use crate::socket::comm::CommSocket;
use crate::socket::control::Shutdown;
use crate::socket::dispatcher::route;
use crate::socket::dispatcher::Dispatcher;
use crate::socket::dispatcher::Responder;
use crate::socket::iopub::IOPubMessage;
use crate::socket::socket::poll_timeout;
use crate::socket::socket::Socket;
use crate::wire::comm_close::CommClose;
use crate::wire::comm_info_reply::CommInfoReply;
use crate::wire::comm_info_request::CommInfoRequest;
use crate::wire::comm_msg::CommWireMsg;
use crate::wire::comm_open::CommOpen;
use crate::wire::complete_request::CompleteRequest;
use crate::wire::execute_reply::ExecuteReply;
use crate::wire::execute_reply_exception::ExecuteReplyException;
use crate::wire::execute_request::ExecuteRequest;
use crate::wire::history_reply::HistoryReply;
use crate::wire::history_request::HistoryRequest;
use crate::wire::inspect_request::InspectRequest;
use crate::wire::is_complete_request::IsCompleteRequest;
use crate::wire::jupyter_message::JupyterMessage;
use crate::wire::jupyter_message::Status;
use crate::wire::kernel_info_reply::KernelInfoReply;
use crate::wire::kernel_info_request::KernelInfoRequest;
use crate::wire::originator::Originator;
use crate::wire::shutdown_request::ShutdownRequest;

/// Wrapper for the Shell socket; receives requests for execution, etc. from
/// the frontend and processes them.
pub struct Shell {
    socket: Socket,
    dispatcher: Dispatcher,
    state: Arc<KernelState>,

    /// Set once an execution failed with `stop_on_error`; the requests
    /// queued behind it are aborted
    aborting: Arc<AtomicBool>,

    poll_interval: Duration,
}

impl Shell {
    pub fn new(
        socket: Socket,
        dispatcher: Dispatcher,
        state: Arc<KernelState>,
        aborting: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            socket,
            dispatcher,
            state,
            aborting,
            poll_interval,
        }
    }

    /// Main loop for the Shell thread; to be invoked by the kernel. Requests
    /// are processed one at a time, in the order they arrive.
    pub fn listen(&mut self) -> crate::Result<()> {
        let timeout = poll_timeout(self.poll_interval);
        loop {
            if self.state.is_halted() {
                trace!("Shell: Kernel halted, exiting");
                return Ok(());
            }
            if !self.socket.poll_incoming(timeout)? {
                continue;
            }
            self.dispatcher.receive(&self.socket)?;

            if self.aborting.load(Ordering::SeqCst) {
                self.abort_queued()?;
            }
        }
    }

    /// Processes the requests that were already queued when an execution
    /// failed. Execute requests among them are answered with `aborted`.
    fn abort_queued(&mut self) -> crate::Result<()> {
        while self.socket.has_incoming_data()? {
            self.dispatcher.receive(&self.socket)?;
        }
        self.aborting.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Default handlers of the Shell channel. Everything that touches the
/// backend goes through the coordinator, so it runs on the execution
/// thread.
pub struct ShellHandlers {
    coordinator: Arc<Coordinator>,
    aborting: Arc<AtomicBool>,
    shutdown: Shutdown,
}

impl ShellHandlers {
    pub fn new(coordinator: Arc<Coordinator>, aborting: Arc<AtomicBool>, shutdown: Shutdown) -> Self {
        Self {
            coordinator,
            aborting,
            shutdown,
        }
    }

    /// Registers a handler for every request the Shell channel answers.
    pub fn register(self, dispatcher: &mut Dispatcher) {
        let handlers = Arc::new(self);
        route!(dispatcher, handlers, KernelInfoRequest => handle_kernel_info_request);
        route!(dispatcher, handlers, ExecuteRequest => handle_execute_request);
        route!(dispatcher, handlers, CompleteRequest => handle_complete_request);
        route!(dispatcher, handlers, InspectRequest => handle_inspect_request);
        route!(dispatcher, handlers, IsCompleteRequest => handle_is_complete_request);
        route!(dispatcher, handlers, HistoryRequest => handle_history_request);
        route!(dispatcher, handlers, CommInfoRequest => handle_comm_info_request);
        route!(dispatcher, handlers, CommOpen => handle_comm_open);
        route!(dispatcher, handlers, CommMsg => handle_comm_msg);
        route!(dispatcher, handlers, CommClose => handle_comm_close);
        route!(dispatcher, handlers, ShutdownRequest => handle_shutdown_request);
    }

    fn handle_kernel_info_request(
        &self,
        responder: &Responder,
        _req: JupyterMessage<KernelInfoRequest>,
    ) -> crate::Result<()> {
        let info = self.coordinator.run(|backend| block_on(backend.kernel_info()))?;
        responder.reply(KernelInfoReply::from(info))
    }

    fn handle_execute_request(
        &self,
        responder: &Responder,
        req: JupyterMessage<ExecuteRequest>,
    ) -> crate::Result<()> {
        if self.aborting.load(Ordering::SeqCst) {
            info!("Aborting execute request queued behind a failed execution");
            return responder.reply(ExecuteReply {
                status: Status::Aborted,
                execution_count: responder.session().execution_count(),
                user_expressions: json!({}),
            });
        }

        let result = self
            .coordinator
            .execute(&req.content, Originator::from(&req))?;

        if !result.is_ok() && req.content.stop_on_error {
            self.aborting.store(true, Ordering::SeqCst);
        }

        match result {
            ExecutionResult::Ok { execution_count } => responder.reply(ExecuteReply {
                status: Status::Ok,
                execution_count,
                user_expressions: json!({}),
            }),
            ExecutionResult::Error {
                execution_count,
                exception,
            } => responder.reply(ExecuteReplyException {
                status: Status::Error,
                execution_count,
                exception,
            }),
            ExecutionResult::Aborted { execution_count } => responder.reply(ExecuteReply {
                status: Status::Aborted,
                execution_count,
                user_expressions: json!({}),
            }),
        }
    }

    fn handle_complete_request(
        &self,
        responder: &Responder,
        req: JupyterMessage<CompleteRequest>,
    ) -> crate::Result<()> {
        let request = req.content;
        let reply = self
            .coordinator
            .run(move |backend| block_on(backend.complete(&request)))??;
        responder.reply(reply)
    }

    fn handle_inspect_request(
        &self,
        responder: &Responder,
        req: JupyterMessage<InspectRequest>,
    ) -> crate::Result<()> {
        let request = req.content;
        let reply = self
            .coordinator
            .run(move |backend| block_on(backend.inspect(&request)))??;
        responder.reply(reply)
    }

    fn handle_is_complete_request(
        &self,
        responder: &Responder,
        req: JupyterMessage<IsCompleteRequest>,
    ) -> crate::Result<()> {
        let request = req.content;
        let reply = self
            .coordinator
            .run(move |backend| block_on(backend.is_complete(&request)))??;
        responder.reply(reply)
    }

    fn handle_history_request(
        &self,
        responder: &Responder,
        req: JupyterMessage<HistoryRequest>,
    ) -> crate::Result<()> {
        responder.reply(HistoryReply {
            status: Status::Ok,
            history: self.coordinator.query_history(&req.content),
        })
    }

    /// Lists the open comms, optionally only those of one target.
    fn handle_comm_info_request(
        &self,
        responder: &Responder,
        req: JupyterMessage<CommInfoRequest>,
    ) -> crate::Result<()> {
        let (info_tx, info_rx) = bounded(1);
        self.send_comm_event(CommManagerEvent::Info(info_tx))?;
        let comms = info_rx
            .recv()
            .map_err(|_| Error::ChannelClosed(String::from("comm manager")))?;

        let comms: serde_json::Map<String, Value> = comms
            .into_iter()
            .filter(|comm| match &req.content.target_name {
                Some(target) => comm.name == *target,
                None => true,
            })
            .map(|comm| (comm.id, json!({ "target_name": comm.name })))
            .collect();

        responder.reply(CommInfoReply {
            status: Status::Ok,
            comms,
        })
    }

    /// Offers a comm opened by the frontend to the backend. Declined comms
    /// are closed right away.
    fn handle_comm_open(&self, responder: &Responder, req: JupyterMessage<CommOpen>) -> crate::Result<()> {
        let open = req.content;
        let comm = CommSocket::new(
            CommInitiator::FrontEnd,
            open.comm_id.clone(),
            open.target_name.clone(),
        );

        let target_name = open.target_name.clone();
        let data = open.data.clone();
        let backend_comm = comm.clone();
        let accepted = self
            .coordinator
            .run(move |backend| block_on(backend.comm_open(&target_name, backend_comm, &data)))?;

        match accepted {
            Ok(true) => {
                info!("Opened comm '{}' ({})", open.target_name, open.comm_id);
                self.send_comm_event(CommManagerEvent::Opened(comm, open.data, None))
            },
            Ok(false) => {
                info!("No backend handles comm target '{}'", open.target_name);
                self.close_declined(responder, open.comm_id)
            },
            Err(err) => {
                warn!("Failed to open comm '{}': {err}", open.target_name);
                self.close_declined(responder, open.comm_id)
            },
        }
    }

    fn close_declined(&self, responder: &Responder, comm_id: String) -> crate::Result<()> {
        responder.publish(IOPubMessage::CommClose(
            Some(responder.header().clone()),
            CommClose {
                comm_id,
                data: json!({}),
            },
        ))
    }

    /// Relays a frontend message to its comm. Messages carrying an `id` are
    /// RPCs: the backend's reply is sent with this message as its parent.
    fn handle_comm_msg(&self, responder: &Responder, req: JupyterMessage<CommWireMsg>) -> crate::Result<()> {
        let msg = req.content;
        let is_rpc = msg.data.get("id").is_some();

        let comm_msg = if is_rpc {
            self.send_comm_event(CommManagerEvent::PendingRpc(responder.header().clone()))?;
            CommMsg::Rpc(responder.header().msg_id.clone(), msg.data)
        } else {
            CommMsg::Data(msg.data)
        };

        self.send_comm_event(CommManagerEvent::Message(msg.comm_id, comm_msg))
    }

    fn handle_comm_close(&self, _responder: &Responder, req: JupyterMessage<CommClose>) -> crate::Result<()> {
        self.send_comm_event(CommManagerEvent::Closed(req.content.comm_id))
    }

    fn handle_shutdown_request(
        &self,
        responder: &Responder,
        req: JupyterMessage<ShutdownRequest>,
    ) -> crate::Result<()> {
        info!("Received shutdown request on Shell (restart: {})", req.content.restart);
        self.shutdown.run(responder, req.content.restart)
    }

    fn send_comm_event(&self, event: CommManagerEvent) -> crate::Result<()> {
        self.coordinator
            .comm_manager_tx()
            .send(event)
            .map_err(|_| Error::ChannelClosed(String::from("comm manager")))
    }
}
