/*
 * mod.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use himalia::execution::context::ExecutionContext;
use himalia::language::backend::ExecutionBackend;
use himalia::language::backend::ExecutionOutput;
use himalia::socket::comm::CommSocket;
use himalia::wire::complete_reply::CompleteReply;
use himalia::wire::complete_request::CompleteRequest;
use himalia::wire::exception::Exception;
use himalia::wire::is_complete_reply::IsComplete;
use himalia::wire::is_complete_reply::IsCompleteReply;
use himalia::wire::is_complete_request::IsCompleteRequest;
use himalia::wire::jupyter_message::Status;
use himalia::wire::kernel_info_reply::KernelInfo;
use himalia::wire::language_info::LanguageInfo;
use serde_json::json;

/// The comm target the stub backend accepts
pub const TEST_TARGET: &str = "test_target";

/// Stub backend for the test harness. Code is echoed back as the result,
/// except for a few commands:
///
/// - `error`: fails
/// - `slow_error`: fails after a short while
/// - `print`: writes to stdout
/// - `prompt`: asks for input and prints it
/// - `sleep`: runs until interrupted
/// - `hang`: ignores interrupts for about a second
/// - `slow`: takes a short while
/// - `comm`: opens a comm to the frontend
pub struct StubBackend {
    comms: Arc<Mutex<Vec<CommSocket>>>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            comms: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The comms opened so far, by either side
    pub fn comms(&self) -> Arc<Mutex<Vec<CommSocket>>> {
        self.comms.clone()
    }
}

#[async_trait]
impl ExecutionBackend for StubBackend {
    async fn kernel_info(&mut self) -> KernelInfo {
        KernelInfo {
            implementation: String::from("stub"),
            implementation_version: String::from(env!("CARGO_PKG_VERSION")),
            language_info: LanguageInfo {
                name: String::from("Test"),
                version: String::from("1.0"),
                mimetype: String::from("text/echo"),
                file_extension: String::from(".ech"),
                pygments_lexer: None,
                codemirror_mode: None,
                nbconvert_exporter: None,
            },
            banner: String::from("Stub backend"),
            debugger: false,
            help_links: Vec::new(),
        }
    }

    async fn execute(
        &mut self,
        code: &str,
        context: &mut ExecutionContext,
    ) -> Result<Option<ExecutionOutput>, Exception> {
        match code {
            "error" => Err(Exception::new("TestError", "Boom")),
            "slow_error" => {
                thread::sleep(Duration::from_millis(200));
                Err(Exception::new("TestError", "Slow boom"))
            },
            "print" => {
                context.stdout("hello\n");
                Ok(Some(ExecutionOutput::plain(code)))
            },
            "prompt" => {
                let value = context
                    .input("Echo> ")
                    .map_err(|err| Exception::from(&err))?;
                context.stdout(value);
                Ok(Some(ExecutionOutput::plain(code)))
            },
            "sleep" => {
                while !context.is_cancelled() {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(Exception::interrupted())
            },
            "hang" => {
                thread::sleep(Duration::from_millis(1000));
                Ok(Some(ExecutionOutput::plain(code)))
            },
            "slow" => {
                thread::sleep(Duration::from_millis(200));
                Ok(Some(ExecutionOutput::plain(code)))
            },
            "comm" => {
                let comm = context
                    .open_comm(TEST_TARGET, json!({ "from": "backend" }))
                    .map_err(|err| Exception::from(&err))?;
                self.comms.lock().unwrap().push(comm);
                Ok(None)
            },
            code => Ok(Some(ExecutionOutput::plain(code))),
        }
    }

    async fn complete(&mut self, req: &CompleteRequest) -> himalia::Result<CompleteReply> {
        let prefix = &req.code[..req.cursor_pos as usize];
        let matches = ["foo", "foobar", "bar"]
            .into_iter()
            .filter(|candidate| candidate.starts_with(prefix))
            .map(String::from)
            .collect();
        Ok(CompleteReply {
            status: Status::Ok,
            matches,
            cursor_start: 0,
            cursor_end: req.cursor_pos,
            metadata: json!({}),
        })
    }

    async fn is_complete(&mut self, req: &IsCompleteRequest) -> himalia::Result<IsCompleteReply> {
        if req.code.ends_with('(') {
            return Ok(IsCompleteReply {
                status: IsComplete::Incomplete,
                indent: String::from("  "),
            });
        }
        Ok(IsCompleteReply {
            status: IsComplete::Complete,
            indent: String::new(),
        })
    }

    async fn comm_open(
        &mut self,
        target_name: &str,
        comm: CommSocket,
        _data: &serde_json::Value,
    ) -> himalia::Result<bool> {
        if target_name != TEST_TARGET {
            return Ok(false);
        }
        self.comms.lock().unwrap().push(comm);
        Ok(true)
    }
}
