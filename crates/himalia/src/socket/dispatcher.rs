/*
 * dispatcher.rs
 *
 * Copyright (C) 2024 Posit Software, PBC. All rights reserved.
 *
 */

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam::channel::Sender;
use log::debug;
use log::error;
use log::info;
use log::trace;
use log::warn;

use crate::error::Error;
use crate::kernel_state::KernelState;
use crate::session::Session;
use crate::socket::iopub::IOPubMessage;
use crate::socket::socket::Socket;
use crate::socket::transport::Channel;
use crate::wire::exception::Exception;
use crate::wire::execute_error::ExecuteError;
use crate::wire::execute_reply_exception::ExecuteReplyException;
use crate::wire::header::JupyterHeader;
use crate::wire::jupyter_message::error_reply;
use crate::wire::jupyter_message::JupyterMessage;
use crate::wire::jupyter_message::Message;
use crate::wire::jupyter_message::ProtocolMessage;
use crate::wire::jupyter_message::Status;
use crate::wire::message_kind::MessageKind;
use crate::wire::originator::Originator;
use crate::wire::wire_message::WireMessage;

/// A message handler. Handlers only see the message types they were
/// registered for, already decoded.
pub type Handler = Box<dyn FnMut(&Responder, Message) -> crate::Result<()> + Send>;

/// Boxes a closure into a `Handler`.
pub fn handler<F>(f: F) -> Handler
where
    F: FnMut(&Responder, Message) -> crate::Result<()> + Send + 'static,
{
    Box::new(f)
}

/// Registers a method of a shared handler object for one message type. The
/// method receives the decoded message of that type.
macro_rules! route {
    ($dispatcher:expr, $handlers:expr, $variant:ident => $method:ident) => {{
        let handlers = std::sync::Arc::clone(&$handlers);
        $dispatcher.register_handler(
            $crate::wire::message_kind::MessageKind::$variant,
            $crate::socket::dispatcher::handler(move |responder, message| match message {
                $crate::wire::jupyter_message::Message::$variant(msg) => {
                    handlers.$method(responder, msg)
                },
                other => Err($crate::error::Error::UnhandledMessageType(
                    other.kind().to_string(),
                    String::from(stringify!($method)),
                )),
            }),
        );
    }};
}
pub(crate) use route;

/// Routes the decoded messages of one channel to their handlers.
///
/// On Shell, every handler call is bracketed by the busy and idle
/// transitions of the kernel state, and handler failures are turned into
/// error replies. Control messages are handled without touching the status.
pub struct Dispatcher {
    channel: Channel,
    handlers: HashMap<MessageKind, Handler>,
    state: Arc<KernelState>,
    iopub_tx: Sender<IOPubMessage>,
}

impl Dispatcher {
    pub fn new(channel: Channel, state: Arc<KernelState>, iopub_tx: Sender<IOPubMessage>) -> Self {
        Self {
            channel,
            handlers: HashMap::new(),
            state,
            iopub_tx,
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Registers the handler for a message type, replacing any previous one.
    pub fn register_handler(&mut self, kind: MessageKind, handler: Handler) {
        if self.handlers.insert(kind, handler).is_some() {
            debug!("{}: Replaced handler for '{kind}'", self.channel);
        }
    }

    pub fn has_handler(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Reads the next message from the socket and dispatches it. Messages
    /// that can't be processed are logged and dropped; only transport
    /// failures are returned.
    pub fn receive(&mut self, socket: &Socket) -> crate::Result<()> {
        let result = WireMessage::read_from_socket(socket).and_then(|msg| self.dispatch(socket, msg));
        match result {
            Err(err) if err.is_transport() => Err(err),
            Err(err) => {
                log_dropped(self.channel, &err);
                Ok(())
            },
            Ok(()) => Ok(()),
        }
    }

    /// Dispatches a verified envelope to the handler registered for its
    /// message type.
    pub fn dispatch(&mut self, socket: &Socket, msg: WireMessage) -> crate::Result<()> {
        let kind = msg.kind()?;
        let Some(handler) = self.handlers.get_mut(&kind) else {
            return Err(Error::UnhandledMessageType(
                kind.to_string(),
                self.channel.to_string(),
            ));
        };
        let message = Message::try_from(&msg)?;
        trace!("{}: Dispatching {}", self.channel, message.describe());

        let responder = Responder {
            socket,
            iopub_tx: &self.iopub_tx,
            originator: Originator::from(&msg),
            kind,
            publish_errors: self.channel == Channel::Shell,
        };

        if self.channel != Channel::Shell {
            return handler(&responder, message).or_else(|err| responder.report(err));
        }

        match self.state.begin_request(&msg.header) {
            Ok(()) => {},
            Err(Error::ShuttingDown) => {
                // No more work is accepted, but the request still gets an answer
                info!("Shell: Refusing '{kind}' request during shutdown");
                return self.state.refuse_request(&msg.header, || {
                    responder.reply_error(Exception::from(&Error::ShuttingDown))
                });
            },
            Err(err) => return Err(err),
        }

        let result = handler(&responder, message).or_else(|err| responder.report(err));

        // Always return to idle, even if the reply couldn't be delivered
        self.state.end_request(&msg.header)?;
        result
    }
}

/// Logs a message that was dropped, at the severity its error category
/// calls for.
fn log_dropped(channel: Channel, err: &Error) {
    if err.is_signature() {
        error!("{channel}: Dropping unauthenticated message: {err}");
    } else if err.is_malformed() {
        warn!("{channel}: Dropping malformed message: {err}");
    } else if err.is_unknown_message() {
        info!("{channel}: Ignoring message: {err}");
    } else {
        warn!("{channel}: Could not handle message: {err}");
    }
}

/// Gives handlers what they need to answer the request they are processing.
pub struct Responder<'a> {
    socket: &'a Socket,
    iopub_tx: &'a Sender<IOPubMessage>,
    originator: Originator,
    kind: MessageKind,
    publish_errors: bool,
}

impl Responder<'_> {
    pub fn session(&self) -> &Session {
        &self.socket.session
    }

    /// The header of the request being handled.
    pub fn header(&self) -> &JupyterHeader {
        &self.originator.header
    }

    pub fn originator(&self) -> &Originator {
        &self.originator
    }

    /// Sends the reply to the request on the channel it arrived on.
    pub fn reply<R: ProtocolMessage>(&self, content: R) -> crate::Result<()> {
        let reply = JupyterMessage::create_with_identity(
            self.originator.clone(),
            content,
            self.session(),
        );
        reply.send(self.socket)
    }

    /// Sends an error reply, of the reply type the request expects.
    pub fn reply_error(&self, exception: Exception) -> crate::Result<()> {
        let Some(reply_kind) = self.kind.reply_kind() else {
            // Notifications have no reply
            return Ok(());
        };

        if self.kind == MessageKind::ExecuteRequest {
            return self.reply(ExecuteReplyException {
                status: Status::Error,
                execution_count: self.session().execution_count(),
                exception,
            });
        }

        let msg = error_reply(&self.originator, reply_kind, exception, self.session())?;
        msg.send(self.socket)
    }

    /// Publishes a message on IOPub.
    pub fn publish(&self, message: IOPubMessage) -> crate::Result<()> {
        self.iopub_tx
            .send(message)
            .map_err(|_| Error::ChannelClosed(String::from("IOPub")))
    }

    /// Surfaces a handler failure to the frontend: an `error` message on
    /// IOPub, then an error reply.
    fn report(&self, err: Error) -> crate::Result<()> {
        if err.is_transport() {
            return Err(err);
        }
        warn!("Failed to handle '{}' request: {err}", self.kind);

        let exception = Exception::from(&err);
        if self.publish_errors {
            self.publish(IOPubMessage::ExecuteError(self.header().clone(), ExecuteError {
                exception: exception.clone(),
            }))?;
        }
        self.reply_error(exception)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use crossbeam::channel::unbounded;
    use crossbeam::channel::Receiver;

    use super::*;
    use crate::socket::memory::MemoryTransport;
    use crate::wire::kernel_info_request::KernelInfoRequest;
    use crate::wire::shutdown_request::ShutdownRequest;
    use crate::wire::status::ExecutionState;

    struct Fixture {
        dispatcher: Dispatcher,
        kernel: Socket,
        frontend: Socket,
        state: Arc<KernelState>,
        iopub_rx: Receiver<IOPubMessage>,
    }

    fn fixture(channel: Channel) -> Fixture {
        let session = Session::create("secret").unwrap();
        let (iopub_tx, iopub_rx) = unbounded();
        let state = Arc::new(KernelState::new(iopub_tx.clone()));
        state.ready().unwrap();
        iopub_rx.try_recv().unwrap();

        let (kernel, frontend) = MemoryTransport::pair(&channel.to_string());
        Fixture {
            dispatcher: Dispatcher::new(channel, state.clone(), iopub_tx),
            kernel: Socket::from_transport(session.clone(), channel.to_string(), kernel),
            frontend: Socket::from_transport(session, channel.to_string(), frontend),
            state,
            iopub_rx,
        }
    }

    fn request<T: ProtocolMessage>(fixture: &Fixture, content: T) -> WireMessage {
        let msg = JupyterMessage::create(content, None, &fixture.frontend.session);
        WireMessage::try_from(&msg).unwrap()
    }

    fn status(message: IOPubMessage) -> ExecutionState {
        match message {
            IOPubMessage::Status(_, status) => status.execution_state,
            other => panic!("Unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_shell_dispatch_brackets_handler() {
        let mut fixture = fixture(Channel::Shell);
        fixture.dispatcher.register_handler(
            MessageKind::KernelInfoRequest,
            Box::new(|responder, msg| {
                assert_matches!(msg, Message::KernelInfoRequest(_));
                responder.reply(ShutdownRequest { restart: false })
            }),
        );

        let msg = request(&fixture, KernelInfoRequest {});
        let kernel = &fixture.kernel;
        fixture.dispatcher.dispatch(kernel, msg.clone()).unwrap();

        assert_eq!(status(fixture.iopub_rx.try_recv().unwrap()), ExecutionState::Busy);
        assert_eq!(status(fixture.iopub_rx.try_recv().unwrap()), ExecutionState::Idle);

        let reply = WireMessage::read_from_socket(&fixture.frontend).unwrap();
        assert_eq!(reply.parent_header, Some(msg.header));
    }

    #[test]
    fn test_shell_handler_failure_is_reported() {
        let mut fixture = fixture(Channel::Shell);
        fixture.dispatcher.register_handler(
            MessageKind::KernelInfoRequest,
            Box::new(|_, _| Err(crate::anyhow!("Backend is gone"))),
        );

        let msg = request(&fixture, KernelInfoRequest {});
        let kernel = &fixture.kernel;
        fixture.dispatcher.dispatch(kernel, msg).unwrap();

        assert_eq!(status(fixture.iopub_rx.try_recv().unwrap()), ExecutionState::Busy);
        assert_matches!(fixture.iopub_rx.try_recv().unwrap(), IOPubMessage::ExecuteError(_, error) => {
            assert_eq!(error.exception.ename, "InternalError");
        });
        assert_eq!(status(fixture.iopub_rx.try_recv().unwrap()), ExecutionState::Idle);

        let reply = WireMessage::read_from_socket(&fixture.frontend).unwrap();
        assert_eq!(reply.message_type(), "kernel_info_reply");
        assert_eq!(reply.content["status"], "error");
    }

    #[test]
    fn test_shell_request_refused_during_shutdown() {
        let mut fixture = fixture(Channel::Shell);
        fixture.dispatcher.register_handler(
            MessageKind::KernelInfoRequest,
            Box::new(|_, _| panic!("Handler must not run during shutdown")),
        );
        assert!(fixture.state.request_shutdown(false));

        let msg = request(&fixture, KernelInfoRequest {});
        let kernel = &fixture.kernel;
        fixture.dispatcher.dispatch(kernel, msg.clone()).unwrap();

        // The refusal is bracketed by busy and idle like any other answer
        assert_matches!(fixture.iopub_rx.try_recv().unwrap(), IOPubMessage::Status(parent, status) => {
            assert_eq!(parent, Some(msg.header.clone()));
            assert_eq!(status.execution_state, ExecutionState::Busy);
        });
        assert_matches!(fixture.iopub_rx.try_recv().unwrap(), IOPubMessage::Status(parent, status) => {
            assert_eq!(parent, Some(msg.header.clone()));
            assert_eq!(status.execution_state, ExecutionState::Idle);
        });
        assert!(fixture.iopub_rx.try_recv().is_err());
        assert_eq!(fixture.state.status(), ExecutionState::Idle);

        let reply = WireMessage::read_from_socket(&fixture.frontend).unwrap();
        assert_eq!(reply.parent_header, Some(msg.header));
        assert_eq!(reply.message_type(), "kernel_info_reply");
        assert_eq!(reply.content["status"], "error");
    }

    #[test]
    fn test_control_dispatch_is_not_bracketed() {
        let mut fixture = fixture(Channel::Control);
        fixture.dispatcher.register_handler(
            MessageKind::ShutdownRequest,
            Box::new(|responder, _| responder.reply(ShutdownRequest { restart: true })),
        );

        let msg = request(&fixture, ShutdownRequest { restart: true });
        let kernel = &fixture.kernel;
        fixture.dispatcher.dispatch(kernel, msg).unwrap();
        assert!(fixture.iopub_rx.try_recv().is_err());
    }

    #[test]
    fn test_unregistered_and_unknown_types() {
        let mut fixture = fixture(Channel::Shell);
        let kernel = &fixture.kernel;

        let msg = request(&fixture, KernelInfoRequest {});
        assert_matches!(
            fixture.dispatcher.dispatch(kernel, msg.clone()),
            Err(Error::UnhandledMessageType(kind, channel)) => {
                assert_eq!(kind, "kernel_info_request");
                assert_eq!(channel, "Shell");
            }
        );

        let mut unknown = msg;
        unknown.header.msg_type = String::from("future_request");
        assert_matches!(
            fixture.dispatcher.dispatch(kernel, unknown),
            Err(Error::UnknownMessageType(_))
        );

        // Neither touched the kernel status
        assert!(fixture.iopub_rx.try_recv().is_err());
    }

    #[test]
    fn test_receive_drops_bad_messages() {
        let mut fixture = fixture(Channel::Shell);
        fixture
            .frontend
            .send_multipart(&[b"<IDS|MSG>".to_vec(), b"nonsense".to_vec()])
            .unwrap();

        let kernel = &fixture.kernel;
        fixture.dispatcher.receive(kernel).unwrap();
        assert!(fixture.iopub_rx.try_recv().is_err());
    }
}
