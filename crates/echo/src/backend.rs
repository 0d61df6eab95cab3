/*
 * backend.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use async_trait::async_trait;
use himalia::execution::context::ExecutionContext;
use himalia::language::backend::ExecutionBackend;
use himalia::language::backend::ExecutionOutput;
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

/// Words the echo kernel knows how to complete.
const KEYWORDS: [&str; 3] = ["echo", "error", "prompt"];

/// Echoes the code it's given. A few inputs behave differently:
///
/// - `error`: fails with an exception
/// - `prompt`: asks the frontend for a line of input and echoes it
/// - `sleep`: waits until interrupted
#[derive(Default)]
pub struct EchoBackend {}

#[async_trait]
impl ExecutionBackend for EchoBackend {
    async fn kernel_info(&mut self) -> KernelInfo {
        KernelInfo {
            implementation: String::from("echo"),
            implementation_version: String::from(env!("CARGO_PKG_VERSION")),
            language_info: LanguageInfo {
                name: String::from("Echo"),
                version: String::from("1.0"),
                mimetype: String::from("text/echo"),
                file_extension: String::from(".ech"),
                pygments_lexer: None,
                codemirror_mode: None,
                nbconvert_exporter: None,
            },
            banner: String::from("Himalia Echo"),
            debugger: false,
            help_links: Vec::new(),
        }
    }

    async fn execute(
        &mut self,
        code: &str,
        context: &mut ExecutionContext,
    ) -> Result<Option<ExecutionOutput>, Exception> {
        match code.trim() {
            "error" => Err(Exception::new("EchoError", "Something went wrong")),
            "prompt" => {
                let value = context
                    .input("Echo> ")
                    .map_err(|err| Exception::from(&err))?;
                Ok(Some(ExecutionOutput::plain(value)))
            },
            "sleep" => {
                while !context.is_cancelled() {
                    std::thread::sleep(std::time::Duration::from_millis(50));
                }
                Err(Exception::interrupted())
            },
            "" => Ok(None),
            code => {
                log::trace!("Echoing '{code}'");
                Ok(Some(ExecutionOutput::plain(code)))
            },
        }
    }

    async fn complete(&mut self, req: &CompleteRequest) -> himalia::Result<CompleteReply> {
        let code = req.code.get(..req.cursor_pos as usize).unwrap_or(&req.code);
        let cursor = code.len();
        let prefix = code
            .rsplit(char::is_whitespace)
            .next()
            .unwrap_or_default();
        let matches = KEYWORDS
            .into_iter()
            .filter(|keyword| !prefix.is_empty() && keyword.starts_with(prefix))
            .map(String::from)
            .collect();

        Ok(CompleteReply {
            status: Status::Ok,
            matches,
            cursor_start: (cursor - prefix.len()) as u32,
            cursor_end: cursor as u32,
            metadata: json!({}),
        })
    }

    async fn is_complete(&mut self, req: &IsCompleteRequest) -> himalia::Result<IsCompleteReply> {
        // A trailing backslash continues the line
        if req.code.trim_end().ends_with('\\') {
            return Ok(IsCompleteReply {
                status: IsComplete::Incomplete,
                indent: String::new(),
            });
        }
        Ok(IsCompleteReply {
            status: IsComplete::Complete,
            indent: String::new(),
        })
    }
}
