/*
 * dummy_frontend.rs
 *
 * Copyright (C) 2022-2024 Posit Software, PBC. All rights reserved.
 *
 */

use assert_matches::assert_matches;
use serde_json::Value;

use crate::connection_file::ConnectionFile;
use crate::kernel::Transports;
use crate::session::Session;
use crate::socket::memory::MemoryTransport;
use crate::socket::socket::Socket;
use crate::socket::transport::Channel;
use crate::wire::execute_input::ExecuteInput;
use crate::wire::execute_request::ExecuteRequest;
use crate::wire::input_reply::InputReply;
use crate::wire::input_request::InputRequest;
use crate::wire::jupyter_message::JupyterMessage;
use crate::wire::jupyter_message::Message;
use crate::wire::jupyter_message::ProtocolMessage;
use crate::wire::jupyter_message::Status;
use crate::wire::status::ExecutionState;
use crate::wire::stream::Stream;
use crate::wire::wire_message::WireMessage;

/// How long `recv()` waits for a message before failing the test.
pub const RECV_TIMEOUT_MS: i64 = 5000;

/// A synthetic frontend for driving a kernel in tests, connected either over
/// ZeroMQ or over in-memory transports.
pub struct DummyFrontend {
    pub control_socket: Socket,
    pub shell_socket: Socket,
    pub iopub_socket: Socket,
    pub stdin_socket: Socket,
    pub heartbeat_socket: Socket,
    session: Session,
}

impl DummyFrontend {
    /// Connects to a kernel bound with `Kernel::connect()`, and subscribes
    /// to IOPub.
    pub fn connect(connection_file: &ConnectionFile, session: Session) -> Self {
        let ctx = zmq::Context::new();

        // Per the Jupyter specification, the Shell and Stdin sockets must
        // share a ZeroMQ identity
        let identity = uuid::Uuid::new_v4();
        let identity = identity.as_bytes();

        let connect = |channel: Channel, kind: zmq::SocketType, identity: Option<&[u8]>, port: u16| {
            Socket::new(
                session.clone(),
                ctx.clone(),
                channel.to_string(),
                kind,
                identity,
                connection_file.endpoint(port),
            )
            .unwrap()
        };

        let frontend = Self {
            control_socket: connect(Channel::Control, zmq::DEALER, None, connection_file.control_port),
            shell_socket: connect(Channel::Shell, zmq::DEALER, Some(identity), connection_file.shell_port),
            iopub_socket: connect(Channel::IOPub, zmq::SUB, None, connection_file.iopub_port),
            stdin_socket: connect(Channel::Stdin, zmq::DEALER, Some(identity), connection_file.stdin_port),
            heartbeat_socket: connect(Channel::Heartbeat, zmq::REQ, None, connection_file.hb_port),
            session,
        };
        frontend.iopub_socket.subscribe().unwrap();
        frontend
    }

    /// Creates a frontend together with the kernel side of its transports.
    /// The IOPub subscription is sent right away. Both sides sign with
    /// `session`, and the kernel must be built with a clone of it so its
    /// execution counter is the one replies report.
    pub fn in_memory(session: Session) -> (Self, Transports) {
        let pair = |channel: Channel| {
            let name = channel.to_string();
            let (kernel, frontend) = MemoryTransport::pair(&name);
            (
                Socket::from_transport(session.clone(), name.clone(), kernel),
                Socket::from_transport(session.clone(), name, frontend),
            )
        };

        let (shell, shell_socket) = pair(Channel::Shell);
        let (control, control_socket) = pair(Channel::Control);
        let (iopub, iopub_socket) = pair(Channel::IOPub);
        let (stdin, stdin_socket) = pair(Channel::Stdin);
        let (heartbeat, heartbeat_socket) = pair(Channel::Heartbeat);

        // What a SUB socket sends its XPUB peer when subscribing to everything
        iopub_socket.send_multipart(&[vec![1]]).unwrap();

        let frontend = Self {
            control_socket,
            shell_socket,
            iopub_socket,
            stdin_socket,
            heartbeat_socket,
            session,
        };
        let transports = Transports {
            shell,
            control,
            iopub,
            stdin,
            heartbeat,
        };
        (frontend, transports)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Sends a Jupyter message on the Shell socket; returns the ID of the newly
    /// created message
    pub fn send_shell<T: ProtocolMessage>(&self, msg: T) -> String {
        self.send(&self.shell_socket, msg)
    }

    /// Sends a Jupyter message on the Control socket; returns the ID of the
    /// newly created message
    pub fn send_control<T: ProtocolMessage>(&self, msg: T) -> String {
        self.send(&self.control_socket, msg)
    }

    pub fn send_execute_request(&self, code: &str) -> String {
        self.send_shell(ExecuteRequest::new(code))
    }

    /// Sends raw frames on the Shell socket, e.g. to check that the kernel
    /// drops what it can't decode.
    pub fn send_shell_frames(&self, frames: &[Vec<u8>]) {
        self.shell_socket.send_multipart(frames).unwrap();
    }

    /// Answers an input request with `value`.
    pub fn send_stdin_input_reply(&self, request: &JupyterMessage<InputRequest>, value: &str) {
        let reply = JupyterMessage::create(
            InputReply {
                value: String::from(value),
            },
            Some(request.header.clone()),
            &self.session,
        );
        reply.send(&self.stdin_socket).unwrap();
    }

    fn send<T: ProtocolMessage>(&self, socket: &Socket, msg: T) -> String {
        let message = JupyterMessage::create(msg, None, &self.session);
        let id = message.header.msg_id.clone();
        message.send(socket).unwrap();
        id
    }

    pub fn recv(&self, socket: &Socket) -> Message {
        // It's important to wait with a timeout because the kernel thread might
        // have panicked, preventing it from sending the expected message. The
        // tests would then hang indefinitely.
        if socket.poll_incoming(RECV_TIMEOUT_MS).unwrap() {
            return Message::read_from_socket(socket).unwrap();
        }

        panic!("Timeout while expecting message on socket {}", socket.name);
    }

    /// Receives a Jupyter message from the Shell socket
    pub fn recv_shell(&self) -> Message {
        self.recv(&self.shell_socket)
    }

    /// Receives a Jupyter message from the Control socket
    pub fn recv_control(&self) -> Message {
        self.recv(&self.control_socket)
    }

    /// Receives a Jupyter message from the IOPub socket
    pub fn recv_iopub(&self) -> Message {
        self.recv(&self.iopub_socket)
    }

    /// Receives a Jupyter message from the Stdin socket
    pub fn recv_stdin(&self) -> Message {
        self.recv(&self.stdin_socket)
    }

    /// Receive from Shell and assert `ExecuteReply` message.
    /// Returns `execution_count`.
    pub fn recv_shell_execute_reply(&self) -> u32 {
        let msg = self.recv_shell();

        assert_matches!(msg, Message::ExecuteReply(data) => {
            assert_eq!(data.content.status, Status::Ok);
            data.content.execution_count
        })
    }

    /// Receive from Shell and assert an aborted `ExecuteReply`.
    /// Returns `execution_count`.
    pub fn recv_shell_execute_reply_aborted(&self) -> u32 {
        let msg = self.recv_shell();

        assert_matches!(msg, Message::ExecuteReply(data) => {
            assert_eq!(data.content.status, Status::Aborted);
            data.content.execution_count
        })
    }

    /// Receive from Shell and assert `ExecuteReplyException` message.
    /// Returns `execution_count`.
    pub fn recv_shell_execute_reply_exception(&self) -> u32 {
        let msg = self.recv_shell();

        assert_matches!(msg, Message::ExecuteReplyException(data) => {
            assert_eq!(data.content.status, Status::Error);
            data.content.execution_count
        })
    }

    /// Receive from IOPub and return the status it announces
    /// Receive a status from IOPub and return its state, asserting that it
    /// answers `parent` if given
    pub fn recv_iopub_status(&self, parent: Option<&str>) -> ExecutionState {
        let msg = self.recv_iopub();

        assert_matches!(msg, Message::Status(data) => {
            if let Some(parent) = parent {
                assert_parent(&data, parent);
            }
            data.content.execution_state
        })
    }

    /// Receive the `starting` and `idle` statuses a kernel announces itself
    /// with
    pub fn recv_iopub_startup(&self) {
        assert_eq!(self.recv_iopub_status(None), ExecutionState::Starting);
        assert_eq!(self.recv_iopub_status(None), ExecutionState::Idle);
    }

    /// Receive from IOPub and assert Busy message for the request `parent`
    pub fn recv_iopub_busy(&self, parent: &str) {
        assert_eq!(self.recv_iopub_status(Some(parent)), ExecutionState::Busy);
    }

    /// Receive from IOPub and assert Idle message for the request `parent`
    pub fn recv_iopub_idle(&self, parent: &str) {
        assert_eq!(self.recv_iopub_status(Some(parent)), ExecutionState::Idle);
    }

    /// Receive from IOPub and assert ExecuteInput message
    pub fn recv_iopub_execute_input(&self, parent: &str) -> ExecuteInput {
        let msg = self.recv_iopub();

        assert_matches!(msg, Message::ExecuteInput(data) => {
            assert_parent(&data, parent);
            data.content
        })
    }

    /// Receive from IOPub and assert ExecuteResult message. Returns compulsory
    /// `text/plain` result.
    pub fn recv_iopub_execute_result(&self, parent: &str) -> String {
        let msg = self.recv_iopub();

        assert_matches!(msg, Message::ExecuteResult(data) => {
            assert_parent(&data, parent);
            assert_matches!(data.content.data, Value::Object(map) => {
                assert_matches!(map["text/plain"], Value::String(ref string) => {
                    string.clone()
                })
            })
        })
    }

    pub fn recv_iopub_stream_stdout(&self) -> String {
        let msg = self.recv_iopub();

        assert_matches!(msg, Message::Stream(data) => {
            assert_eq!(data.content.name, Stream::Stdout);
            data.content.text
        })
    }

    pub fn recv_iopub_stream_stderr(&self) -> String {
        let msg = self.recv_iopub();

        assert_matches!(msg, Message::Stream(data) => {
            assert_eq!(data.content.name, Stream::Stderr);
            data.content.text
        })
    }

    /// Receive from IOPub and assert ExecuteError message. Returns compulsory
    /// `evalue` field.
    pub fn recv_iopub_execute_error(&self) -> String {
        let msg = self.recv_iopub();

        assert_matches!(msg, Message::ExecuteError(data) => {
            data.content.exception.evalue
        })
    }

    /// Receive from Stdin and assert `InputRequest` message.
    pub fn recv_stdin_input_request(&self) -> JupyterMessage<InputRequest> {
        let msg = self.recv_stdin();

        assert_matches!(msg, Message::InputRequest(data) => {
            data
        })
    }

    /// Sends raw bytes to the heartbeat socket
    pub fn send_heartbeat(&self, data: &[u8]) {
        self.heartbeat_socket.send_multipart(&[data.to_vec()]).unwrap();
    }

    /// Receives raw frames from the heartbeat socket
    pub fn recv_heartbeat(&self) -> Vec<Vec<u8>> {
        if self.heartbeat_socket.poll_incoming(RECV_TIMEOUT_MS).unwrap() {
            return self.heartbeat_socket.recv_multipart().unwrap();
        }
        panic!("Timeout while expecting a heartbeat echo");
    }

    /// Asserts that no socket has incoming data
    pub fn assert_no_incoming(&self) {
        let mut has_incoming = false;

        for socket in [
            &self.iopub_socket,
            &self.shell_socket,
            &self.control_socket,
            &self.stdin_socket,
        ] {
            if socket.has_incoming_data().unwrap() {
                has_incoming = true;
                Self::flush_incoming(socket);
            }
        }

        if has_incoming {
            panic!("Sockets must be empty on exit (see details above)");
        }
    }

    fn flush_incoming(socket: &Socket) {
        println!("{} has incoming data:", socket.name);

        while socket.has_incoming_data().unwrap() {
            dbg!(WireMessage::read_from_socket(socket).unwrap());
            println!("---");
        }
    }
}

fn assert_parent<T>(msg: &JupyterMessage<T>, parent: &str) {
    let header = msg.parent_header.as_ref();
    assert_eq!(header.map(|header| header.msg_id.as_str()), Some(parent));
}
