/*
 * backend.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use async_trait::async_trait;
use serde_json::json;
use serde_json::Value;

use crate::execution::context::ExecutionContext;
use crate::socket::comm::CommSocket;
use crate::wire::complete_reply::CompleteReply;
use crate::wire::complete_request::CompleteRequest;
use crate::wire::exception::Exception;
use crate::wire::inspect_reply::InspectReply;
use crate::wire::inspect_request::InspectRequest;
use crate::wire::is_complete_reply::IsComplete;
use crate::wire::is_complete_reply::IsCompleteReply;
use crate::wire::is_complete_request::IsCompleteRequest;
use crate::wire::kernel_info_reply::KernelInfo;

/// The result of a successful execution, published as `execute_result`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutput {
    /// A MIME bundle, e.g. `{"text/plain": "2"}`
    pub data: Value,
    pub metadata: Value,
}

impl ExecutionOutput {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            data: json!({ "text/plain": text.into() }),
            metadata: json!({}),
        }
    }

    /// The `text/plain` representation, which is what history records.
    pub fn plain_text(&self) -> Option<String> {
        self.data
            .get("text/plain")
            .and_then(Value::as_str)
            .map(String::from)
    }
}

/// The language-specific side of a kernel. The backend is only ever called
/// from one thread, one request at a time, so it need not be reentrant.
#[async_trait]
pub trait ExecutionBackend: Send {
    /// Describes the kernel for `kernel_info_reply`.
    ///
    /// Docs: https://jupyter-client.readthedocs.io/en/stable/messaging.html#kernel-info
    async fn kernel_info(&mut self) -> KernelInfo;

    /// Runs `code`. Output goes through the `context`; the returned value,
    /// if any, becomes the `execute_result`. A failure is reported as an
    /// exception, which the kernel publishes and replies with.
    ///
    /// Implementations should check `context.is_cancelled()` regularly and
    /// return once the frontend interrupts them.
    ///
    /// Docs: https://jupyter-client.readthedocs.io/en/stable/messaging.html#execute
    async fn execute(
        &mut self,
        code: &str,
        context: &mut ExecutionContext,
    ) -> Result<Option<ExecutionOutput>, Exception>;

    /// Docs: https://jupyter-client.readthedocs.io/en/stable/messaging.html#completion
    async fn complete(&mut self, req: &CompleteRequest) -> crate::Result<CompleteReply> {
        Ok(CompleteReply::empty(req.cursor_pos))
    }

    /// Docs: https://jupyter-client.readthedocs.io/en/stable/messaging.html#introspection
    async fn inspect(&mut self, _req: &InspectRequest) -> crate::Result<InspectReply> {
        Ok(InspectReply::not_found())
    }

    /// Docs: https://jupyter-client.readthedocs.io/en/stable/messaging.html#code-completeness
    async fn is_complete(&mut self, _req: &IsCompleteRequest) -> crate::Result<IsCompleteReply> {
        Ok(IsCompleteReply {
            status: IsComplete::Unknown,
            indent: String::new(),
        })
    }

    /// Handles a request from the frontend to open a comm. Returns whether
    /// the backend accepted it; declined comms are closed right away.
    ///
    /// * `target_name` - The target name of the comm
    /// * `comm` - The channel to exchange messages with the frontend over
    /// * `data` - The data sent along with `comm_open`
    async fn comm_open(
        &mut self,
        _target_name: &str,
        _comm: CommSocket,
        _data: &Value,
    ) -> crate::Result<bool> {
        Ok(false)
    }

    /// Called once before the kernel shuts down.
    async fn shutdown(&mut self, _restart: bool) -> crate::Result<()> {
        Ok(())
    }
}
