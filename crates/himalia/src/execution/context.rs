/*
 * context.rs
 *
 * Copyright (C) 2024 Posit Software, PBC. All rights reserved.
 *
 */

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use crossbeam::channel::bounded;
use crossbeam::channel::Sender;
use serde_json::json;
use serde_json::Value;

use crate::comm::event::CommManagerEvent;
use crate::error::Error;
use crate::execution::cancel::CancellationToken;
use crate::socket::comm::CommInitiator;
use crate::socket::comm::CommSocket;
use crate::socket::iopub::Flush;
use crate::socket::iopub::IOPubMessage;
use crate::socket::stdin::StdinRequest;
use crate::wire::clear_output::ClearOutput;
use crate::wire::display_data::DisplayData;
use crate::wire::header::JupyterHeader;
use crate::wire::input_request::InputRequest;
use crate::wire::originator::Originator;
use crate::wire::stream::Stream;
use crate::wire::stream::StreamOutput;
use crate::wire::update_display_data::UpdateDisplayData;

/// Publishes the IOPub output of one execution until the execution is
/// abandoned. Closing the gate and publishing are mutually exclusive, so
/// nothing gets through once the coordinator gave up on the execution.
#[derive(Clone)]
pub(crate) struct OutputGate {
    iopub_tx: Sender<IOPubMessage>,
    open: Arc<Mutex<bool>>,
}

impl OutputGate {
    pub(crate) fn new(iopub_tx: Sender<IOPubMessage>) -> Self {
        Self {
            iopub_tx,
            open: Arc::new(Mutex::new(true)),
        }
    }

    pub(crate) fn publish(&self, message: IOPubMessage) {
        let open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if !*open {
            log::trace!("Dropping output of abandoned execution: {message:?}");
            return;
        }
        if let Err(err) = self.iopub_tx.send(message) {
            log::warn!("Could not publish execution output: {err}");
        }
    }

    pub(crate) fn close(&self) {
        *self.open.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    pub(crate) fn is_open(&self) -> bool {
        *self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Everything a backend may do while executing a request. Output is
/// published on IOPub with the request as parent.
pub struct ExecutionContext {
    execution_count: u32,
    originator: Originator,
    token: CancellationToken,
    allow_stdin: bool,
    gate: OutputGate,
    stdin_tx: Sender<StdinRequest>,
    comm_manager_tx: Sender<CommManagerEvent>,
}

impl ExecutionContext {
    pub(crate) fn new(
        execution_count: u32,
        originator: Originator,
        token: CancellationToken,
        allow_stdin: bool,
        gate: OutputGate,
        stdin_tx: Sender<StdinRequest>,
        comm_manager_tx: Sender<CommManagerEvent>,
    ) -> Self {
        Self {
            execution_count,
            originator,
            token,
            allow_stdin,
            gate,
            stdin_tx,
            comm_manager_tx,
        }
    }

    /// The execution count the request runs under.
    pub fn execution_count(&self) -> u32 {
        self.execution_count
    }

    /// The header of the `execute_request` being run.
    pub fn parent(&self) -> &JupyterHeader {
        &self.originator.header
    }

    /// Whether the frontend interrupted the execution. Backends should
    /// return as soon as they can once this is set.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn stream(&self, name: Stream, text: impl Into<String>) {
        self.gate.publish(IOPubMessage::Stream(self.parent().clone(), StreamOutput {
            name,
            text: text.into(),
        }));
    }

    pub fn stdout(&self, text: impl Into<String>) {
        self.stream(Stream::Stdout, text)
    }

    pub fn stderr(&self, text: impl Into<String>) {
        self.stream(Stream::Stderr, text)
    }

    /// Publishes rich output. A `display_id` lets later calls to
    /// `update_display()` replace it.
    pub fn display(&self, data: Value, metadata: Value, display_id: Option<&str>) {
        let transient = match display_id {
            Some(id) => json!({ "display_id": id }),
            None => json!({}),
        };
        self.gate.publish(IOPubMessage::DisplayData(
            Some(self.parent().clone()),
            DisplayData {
                data,
                metadata,
                transient,
            },
        ));
    }

    pub fn update_display(&self, display_id: &str, data: Value, metadata: Value) {
        self.gate.publish(IOPubMessage::UpdateDisplayData(
            Some(self.parent().clone()),
            UpdateDisplayData {
                data,
                metadata,
                transient: json!({ "display_id": display_id }),
            },
        ));
    }

    pub fn clear_output(&self, wait: bool) {
        self.gate.publish(IOPubMessage::ClearOutput(
            self.parent().clone(),
            ClearOutput { wait },
        ));
    }

    /// Asks the frontend for a line of input. Blocks until the reply arrives
    /// or the execution is interrupted.
    pub fn input(&self, prompt: &str) -> crate::Result<String> {
        self.request_input(prompt, false)
    }

    /// Like `input()`, but the frontend hides what is typed.
    pub fn password(&self, prompt: &str) -> crate::Result<String> {
        self.request_input(prompt, true)
    }

    fn request_input(&self, prompt: &str, password: bool) -> crate::Result<String> {
        if !self.allow_stdin {
            return Err(Error::StdinUnavailable(String::from(
                "The frontend does not accept input requests for this execution",
            )));
        }
        if self.is_cancelled() || !self.gate.is_open() {
            return Err(Error::Interrupted);
        }

        // Output written so far should be visible before the prompt
        self.flush();

        let (reply_tx, reply_rx) = bounded(1);
        let request = StdinRequest {
            originator: self.originator.clone(),
            request: InputRequest {
                prompt: String::from(prompt),
                password,
            },
            reply_tx,
        };
        self.stdin_tx
            .send(request)
            .map_err(|_| Error::ChannelClosed(String::from("Stdin")))?;

        reply_rx
            .recv()
            .map_err(|_| Error::ChannelClosed(String::from("Stdin")))?
    }

    /// Opens a comm from the backend side. The frontend is notified with a
    /// `comm_open` message.
    pub fn open_comm(&self, target_name: &str, data: Value) -> crate::Result<CommSocket> {
        let comm = CommSocket::new(
            CommInitiator::BackEnd,
            uuid::Uuid::new_v4().to_string(),
            String::from(target_name),
        );
        self.comm_manager_tx
            .send(CommManagerEvent::Opened(
                comm.clone(),
                data,
                Some(self.parent().clone()),
            ))
            .map_err(|_| Error::ChannelClosed(String::from("comm manager")))?;
        Ok(comm)
    }

    /// Waits until everything published so far was handed to the IOPub
    /// socket.
    pub fn flush(&self) {
        let (flush_tx, flush_rx) = bounded(1);
        self.gate.publish(IOPubMessage::Flush(Flush {
            flush_tx: Some(flush_tx),
        }));
        // Fails right away when the gate dropped the request
        let _ = flush_rx.recv();
    }
}
