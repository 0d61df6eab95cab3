/*
 * control_handler.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use async_trait::async_trait;
use serde_json::json;

use crate::wire::debug_reply::DebugReply;
use crate::wire::debug_request::DebugRequest;

/// Hooks into the Control channel. Control requests are handled on their own
/// thread, even while the backend is busy running code, so implementations
/// must not wait on the backend.
#[async_trait]
pub trait ControlHandler: Send {
    /// Called when the frontend interrupts the kernel, before the running
    /// execution is cancelled.
    async fn handle_interrupt_request(&mut self) -> crate::Result<()> {
        Ok(())
    }

    /// Called during shutdown, after the backend's own shutdown hook.
    async fn handle_shutdown_request(&mut self, _restart: bool) -> crate::Result<()> {
        Ok(())
    }

    /// Handles a Debug Adapter Protocol request. Kernels without a debugger
    /// answer every request with an unsuccessful response.
    ///
    /// Docs: https://jupyter-client.readthedocs.io/en/stable/messaging.html#debug-request
    async fn handle_debug_request(&mut self, req: &DebugRequest) -> crate::Result<DebugReply> {
        let command = req.0.get("command").cloned().unwrap_or(json!(""));
        let request_seq = req.0.get("seq").cloned().unwrap_or(json!(0));
        Ok(DebugReply(json!({
            "type": "response",
            "request_seq": request_seq,
            "success": false,
            "command": command,
            "message": "Debugging is not supported by this kernel",
        })))
    }
}

/// A control handler relying on the default hooks.
#[derive(Debug, Default)]
pub struct DefaultControlHandler;

impl ControlHandler for DefaultControlHandler {}
