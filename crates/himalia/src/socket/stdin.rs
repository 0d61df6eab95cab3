/*
 * stdin.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use std::time::Duration;

use crossbeam::channel::Receiver;
use crossbeam::channel::Sender;
use crossbeam::channel::TryRecvError;
use crossbeam::select;
use log::info;
use log::trace;
use log::warn;

use crate::error::Error;
use crate::socket::socket::poll_timeout;
use crate::socket::socket::Socket;
use crate::wire::input_request::InputRequest;
use crate::wire::jupyter_message::JupyterMessage;
use crate::wire::jupyter_message::Message;
use crate::wire::originator::Originator;

/// A request for input from the backend, made on behalf of the
/// `execute_request` in `originator`.
pub struct StdinRequest {
    pub originator: Originator,
    pub request: InputRequest,

    /// Receives the frontend's answer, or the reason there won't be one
    pub reply_tx: Sender<crate::Result<String>>,
}

pub struct Stdin {
    /// The Stdin socket; the kernel is the one making requests on it
    socket: Socket,

    /// Input requests from the running execution
    request_rx: Receiver<StdinRequest>,

    /// Notified when the frontend interrupts the kernel, so a pending request
    /// stops waiting for a reply that will never come
    interrupt_rx: Receiver<()>,

    /// Disconnected when the kernel halts
    halt_rx: Receiver<()>,

    poll_interval: Duration,
}

impl Stdin {
    pub fn new(
        socket: Socket,
        request_rx: Receiver<StdinRequest>,
        interrupt_rx: Receiver<()>,
        halt_rx: Receiver<()>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            socket,
            request_rx,
            interrupt_rx,
            halt_rx,
            poll_interval,
        }
    }

    /// Serves input requests, one at a time, until the kernel halts.
    pub fn listen(&self) {
        loop {
            select! {
                recv(self.request_rx) -> request => {
                    let Ok(request) = request else {
                        return;
                    };
                    let result = self.handle_request(&request);
                    if request.reply_tx.send(result).is_err() {
                        warn!("Input reply arrived after the execution stopped waiting");
                    }
                },
                recv(self.halt_rx) -> _ => return,
            }
        }
    }

    /// Sends an `input_request` to the frontend and waits for its
    /// `input_reply`.
    fn handle_request(&self, request: &StdinRequest) -> crate::Result<String> {
        // Interrupts that arrived while nobody was waiting are stale
        while self.interrupt_rx.try_recv().is_ok() {}

        let msg = JupyterMessage::create_with_identity(
            request.originator.clone(),
            request.request.clone(),
            &self.socket.session,
        );
        let request_id = msg.header.msg_id.clone();

        // Fails when the frontend has no Stdin socket connected
        if let Err(err) = msg.send(&self.socket) {
            info!("Could not deliver input request: {err}");
            return Err(Error::StdinUnavailable(err.to_string()));
        }
        trace!("Sent input request to frontend, waiting for input reply...");

        let timeout = poll_timeout(self.poll_interval);
        loop {
            if self.interrupt_rx.try_recv().is_ok() {
                info!("Input request interrupted");
                return Err(Error::Interrupted);
            }
            if let Err(TryRecvError::Disconnected) = self.halt_rx.try_recv() {
                return Err(Error::ShuttingDown);
            }
            if !self.socket.poll_incoming(timeout)? {
                continue;
            }

            let message = match Message::read_from_socket(&self.socket) {
                Ok(message) => message,
                Err(err) if err.is_transport() => return Err(err),
                Err(err) => {
                    warn!("Dropping message on stdin socket: {err}");
                    continue;
                },
            };

            // Only input replies to the pending request are expected here
            match message {
                Message::InputReply(reply)
                    if reply.parent_header.as_ref().map(|h| &h.msg_id) == Some(&request_id) =>
                {
                    trace!("Received input reply from frontend");
                    return Ok(reply.content.value);
                },
                Message::InputReply(_) => {
                    warn!("Ignoring input reply to a previous input request");
                },
                message => {
                    warn!(
                        "Received unexpected message on stdin socket: {}",
                        message.describe()
                    );
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use crossbeam::channel::bounded;
    use crossbeam::channel::unbounded;

    use super::*;
    use crate::session::Session;
    use crate::socket::memory::MemoryTransport;
    use crate::wire::input_reply::InputReply;
    use crate::wire::message_kind::MessageKind;

    struct Fixture {
        frontend: Option<Socket>,
        requests_tx: Sender<StdinRequest>,
        interrupt_tx: Sender<()>,
        _halt_tx: Sender<()>,
        originator: Originator,
        handle: std::thread::JoinHandle<()>,
    }

    fn fixture() -> Fixture {
        let session = Session::create("key").unwrap();
        let (kernel, frontend) = MemoryTransport::pair("Stdin");
        let (requests_tx, requests_rx) = unbounded();
        let (interrupt_tx, interrupt_rx) = bounded(1);
        let (halt_tx, halt_rx) = bounded(0);

        let stdin = Stdin::new(
            Socket::from_transport(session.clone(), String::from("Stdin"), kernel),
            requests_rx,
            interrupt_rx,
            halt_rx,
            Duration::from_millis(10),
        );
        let handle = std::thread::spawn(move || stdin.listen());

        Fixture {
            frontend: Some(Socket::from_transport(
                session.clone(),
                String::from("Stdin"),
                frontend,
            )),
            requests_tx,
            interrupt_tx,
            _halt_tx: halt_tx,
            originator: Originator {
                zmq_identities: vec![],
                header: session.header(MessageKind::ExecuteRequest),
            },
            handle,
        }
    }

    fn request(fixture: &Fixture, prompt: &str) -> Receiver<crate::Result<String>> {
        let (reply_tx, reply_rx) = bounded(1);
        fixture
            .requests_tx
            .send(StdinRequest {
                originator: fixture.originator.clone(),
                request: InputRequest {
                    prompt: String::from(prompt),
                    password: false,
                },
                reply_tx,
            })
            .unwrap();
        reply_rx
    }

    #[test]
    fn test_input_round_trip() {
        let fixture = fixture();
        let reply_rx = request(&fixture, "name? ");
        let frontend = fixture.frontend.as_ref().unwrap();

        let Message::InputRequest(req) = Message::read_from_socket(frontend).unwrap() else {
            panic!("Expected an input request");
        };
        assert_eq!(req.content.prompt, "name? ");
        assert_eq!(req.parent_header, Some(fixture.originator.header.clone()));

        // A stale reply is skipped
        let stale = JupyterMessage::create(
            InputReply {
                value: String::from("old"),
            },
            Some(fixture.originator.header.clone()),
            &frontend.session,
        );
        stale.send(frontend).unwrap();

        let reply = req.create_reply(
            InputReply {
                value: String::from("Ada"),
            },
            &frontend.session,
        );
        reply.send(frontend).unwrap();

        assert_eq!(reply_rx.recv().unwrap().unwrap(), "Ada");
    }

    #[test]
    fn test_interrupt_cancels_pending_input() {
        let fixture = fixture();
        let reply_rx = request(&fixture, "name? ");
        let frontend = fixture.frontend.as_ref().unwrap();
        Message::read_from_socket(frontend).unwrap();

        fixture.interrupt_tx.send(()).unwrap();
        assert_matches!(reply_rx.recv().unwrap(), Err(Error::Interrupted));
    }

    #[test]
    fn test_missing_frontend_is_unavailable() {
        let mut fixture = fixture();
        fixture.frontend.take();

        let reply_rx = request(&fixture, "name? ");
        assert_matches!(
            reply_rx.recv().unwrap(),
            Err(Error::StdinUnavailable(_))
        );

        drop(fixture._halt_tx);
        fixture.handle.join().unwrap();
    }
}
