/*
 * kernel.rs
 *
 * Copyright (C) 2022 Posit Software, PBC. All rights reserved.
 *
 */

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread::JoinHandle;

use crossbeam::channel::bounded;
use crossbeam::channel::unbounded;
use crossbeam::channel::Receiver;
use crossbeam::channel::Sender;
use log::error;
use log::info;
use log::warn;
use stdext::spawn;
use stdext::ResultOrLog;

use crate::comm::comm_manager::CommManager;
use crate::config::KernelConfig;
use crate::connection_file::ConnectionFile;
use crate::error::Error;
use crate::execution::coordinator::Coordinator;
use crate::execution::coordinator::InterruptHandle;
use crate::kernel_state::KernelState;
use crate::language::backend::ExecutionBackend;
use crate::language::control_handler::ControlHandler;
use crate::language::control_handler::DefaultControlHandler;
use crate::session::Session;
use crate::socket::control::Control;
use crate::socket::control::ControlHandlers;
use crate::socket::control::Shutdown;
use crate::socket::dispatcher::Dispatcher;
use crate::socket::dispatcher::Handler;
use crate::socket::heartbeat::Heartbeat;
use crate::socket::iopub::IOPub;
use crate::socket::iopub::IOPubMessage;
use crate::socket::shell::Shell;
use crate::socket::shell::ShellHandlers;
use crate::socket::socket::Socket;
use crate::socket::stdin::Stdin;
use crate::socket::transport::Channel;
use crate::wire::message_kind::MessageKind;

/// The sockets a kernel serves, one per channel.
pub struct Transports {
    pub shell: Socket,
    pub control: Socket,
    pub iopub: Socket,
    pub stdin: Socket,
    pub heartbeat: Socket,
}

/// Builds a kernel around an execution backend.
pub struct Kernel {
    name: String,
    session: Session,
    backend: Box<dyn ExecutionBackend>,
    config: KernelConfig,
    control_handler: Arc<Mutex<dyn ControlHandler>>,
    shell_handlers: Vec<(MessageKind, Handler)>,
    control_handlers: Vec<(MessageKind, Handler)>,
}

impl Kernel {
    pub fn new(name: &str, session: Session, backend: Box<dyn ExecutionBackend>) -> Self {
        Self {
            name: String::from(name),
            session,
            backend,
            config: KernelConfig::default(),
            control_handler: Arc::new(Mutex::new(DefaultControlHandler)),
            shell_handlers: Vec::new(),
            control_handlers: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_control_handler(mut self, handler: Arc<Mutex<dyn ControlHandler>>) -> Self {
        self.control_handler = handler;
        self
    }

    /// Handles a message type on Shell, replacing the default handler if
    /// there is one. Shell handlers run inside the busy/idle bracket.
    pub fn register_shell_handler(mut self, kind: MessageKind, handler: Handler) -> Self {
        self.shell_handlers.push((kind, handler));
        self
    }

    /// Handles a message type on Control, replacing the default handler if
    /// there is one.
    pub fn register_control_handler(mut self, kind: MessageKind, handler: Handler) -> Self {
        self.control_handlers.push((kind, handler));
        self
    }

    /// Binds ZeroMQ sockets as described by the connection file and starts
    /// the kernel on them. Ports given as 0 are picked by the system; the
    /// returned handle knows the actual ones.
    pub fn connect(self, connection_file: &ConnectionFile) -> crate::Result<KernelHandle> {
        let ctx = zmq::Context::new();
        let bind = |channel: Channel, kind: zmq::SocketType, port: u16| {
            Socket::new(
                self.session.clone(),
                ctx.clone(),
                channel.to_string(),
                kind,
                None,
                connection_file.endpoint(port),
            )
        };

        let transports = Transports {
            shell: bind(Channel::Shell, zmq::ROUTER, connection_file.shell_port)?,
            control: bind(Channel::Control, zmq::ROUTER, connection_file.control_port)?,
            iopub: bind(Channel::IOPub, zmq::XPUB, connection_file.iopub_port)?,
            stdin: bind(Channel::Stdin, zmq::ROUTER, connection_file.stdin_port)?,
            heartbeat: bind(Channel::Heartbeat, zmq::ROUTER, connection_file.hb_port)?,
        };

        let connection_file = ConnectionFile {
            shell_port: transports.shell.port()?,
            control_port: transports.control.port()?,
            iopub_port: transports.iopub.port()?,
            stdin_port: transports.stdin.port()?,
            hb_port: transports.heartbeat.port()?,
            ..connection_file.clone()
        };
        info!(
            "Kernel '{}' bound to {}://{} (shell {}, control {}, iopub {}, stdin {}, heartbeat {})",
            self.name,
            connection_file.transport,
            connection_file.ip,
            connection_file.shell_port,
            connection_file.control_port,
            connection_file.iopub_port,
            connection_file.stdin_port,
            connection_file.hb_port
        );

        let mut handle = self.start(transports)?;
        handle.connection_file = Some(connection_file);
        Ok(handle)
    }

    /// Starts the kernel over the given transports. Each channel gets its own
    /// thread, next to the IOPub publisher, the comm manager, and the
    /// execution thread that owns the backend.
    pub fn start(self, transports: Transports) -> crate::Result<KernelHandle> {
        let Kernel {
            name,
            session,
            backend,
            config,
            control_handler,
            shell_handlers,
            control_handlers,
        } = self;

        let (iopub_tx, iopub_rx) = unbounded();
        let (comm_manager_tx, comm_manager_rx) = unbounded();
        let (stdin_tx, stdin_rx) = unbounded();
        let (stdin_interrupt_tx, stdin_interrupt_rx) = bounded(1);
        let (subscription_tx, subscription_rx) = bounded(1);
        let (control_replies_tx, control_replies_rx) = unbounded();

        let state = Arc::new(KernelState::new(iopub_tx.clone()));

        // The execution thread isn't joined: an abandoned backend call may
        // keep it busy for good
        let (coordinator, _worker) = Coordinator::start(
            backend,
            session.clone(),
            iopub_tx.clone(),
            stdin_tx,
            stdin_interrupt_tx,
            comm_manager_tx,
            config.interrupt_grace(),
        );
        let coordinator = Arc::new(coordinator);
        let interrupt = coordinator.interrupt_handle();

        let shutdown = Shutdown::new(
            state.clone(),
            coordinator.clone(),
            control_handler.clone(),
            config.interrupt_grace(),
        );

        let aborting = Arc::new(AtomicBool::new(false));
        let mut shell_dispatcher = Dispatcher::new(Channel::Shell, state.clone(), iopub_tx.clone());
        ShellHandlers::new(coordinator.clone(), aborting.clone(), shutdown.clone())
            .register(&mut shell_dispatcher);
        for (kind, handler) in shell_handlers {
            shell_dispatcher.register_handler(kind, handler);
        }

        let mut control_dispatcher =
            Dispatcher::new(Channel::Control, state.clone(), iopub_tx.clone());
        ControlHandlers::new(interrupt.clone(), control_handler, shutdown, control_replies_tx)
            .register(&mut control_dispatcher);
        for (kind, handler) in control_handlers {
            control_dispatcher.register_handler(kind, handler);
        }

        // Dropped so the coordinator goes away with the dispatchers, which
        // lets the execution thread exit
        drop(coordinator);

        let mut threads = Vec::new();

        let mut iopub = IOPub::new(
            transports.iopub,
            iopub_rx,
            subscription_tx,
            state.halt_signal(),
            config.iopub_retry.clone(),
            config.stream_flush_interval(),
        );
        threads.push(spawn_loop(format!("{name}-iopub"), state.clone(), move || {
            iopub.listen()
        }));

        let mut shell = Shell::new(
            transports.shell,
            shell_dispatcher,
            state.clone(),
            aborting,
            config.poll_interval(),
        );
        threads.push(spawn_loop(format!("{name}-shell"), state.clone(), move || {
            shell.listen()
        }));

        let mut control = Control::new(
            transports.control,
            control_dispatcher,
            state.clone(),
            control_replies_rx,
            config.poll_interval(),
        );
        threads.push(spawn_loop(format!("{name}-control"), state.clone(), move || {
            control.listen()
        }));

        let stdin = Stdin::new(
            transports.stdin,
            stdin_rx,
            stdin_interrupt_rx,
            state.halt_signal(),
            config.poll_interval(),
        );
        threads.push(spawn!(format!("{name}-stdin"), move || stdin.listen()));

        let heartbeat = Heartbeat::new(
            transports.heartbeat,
            state.halt_signal(),
            config.poll_interval(),
        );
        threads.push(spawn!(format!("{name}-heartbeat"), move || heartbeat.listen()));

        threads.push(CommManager::start(
            iopub_tx.clone(),
            comm_manager_rx,
            state.halt_signal(),
        ));

        let startup_state = state.clone();
        threads.push(spawn!(format!("{name}-startup"), move || {
            startup(&startup_state, &config, subscription_rx)
        }));

        info!("Kernel '{name}' started");
        Ok(KernelHandle {
            state,
            session,
            interrupt,
            iopub_tx,
            connection_file: None,
            threads,
        })
    }
}

/// Spawns the loop of a channel whose failure is fatal to the kernel.
fn spawn_loop<F>(name: String, state: Arc<KernelState>, f: F) -> JoinHandle<()>
where
    F: FnOnce() -> crate::Result<()> + Send + 'static,
{
    spawn!(name.clone(), move || {
        if let Err(err) = f() {
            error!("The '{name}' loop failed: {err}");
            state.fail(&err);
        }
    })
}

/// Waits for the frontend to subscribe to IOPub, so the first status
/// messages aren't lost, then announces the kernel.
fn startup(state: &KernelState, config: &KernelConfig, subscription_rx: Receiver<()>) {
    if let Some(timeout) = config.subscription_timeout() {
        info!("Waiting on IOPub subscription confirmation");
        match subscription_rx.recv_timeout(timeout) {
            Ok(()) => info!("Received IOPub subscription confirmation"),
            Err(_) => warn!(
                "No IOPub subscriber after {} ms; starting anyway",
                timeout.as_millis()
            ),
        }
    }

    state.announce_starting();
    state.ready().or_log_error("Failed to make the kernel ready");
}

/// A running kernel.
pub struct KernelHandle {
    state: Arc<KernelState>,
    session: Session,
    interrupt: InterruptHandle,
    iopub_tx: Sender<IOPubMessage>,
    connection_file: Option<ConnectionFile>,
    threads: Vec<JoinHandle<()>>,
}

impl KernelHandle {
    pub fn state(&self) -> &Arc<KernelState> {
        &self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// A channel to publish unsolicited messages on IOPub, e.g. debug events
    /// or displays updated outside of any request.
    pub fn iopub(&self) -> Sender<IOPubMessage> {
        self.iopub_tx.clone()
    }

    /// The connection parameters with the ports actually bound, for kernels
    /// started with `Kernel::connect()`.
    pub fn connection_file(&self) -> Option<&ConnectionFile> {
        self.connection_file.as_ref()
    }

    /// Halts the kernel without a request from the frontend. The execution
    /// in flight, if any, is interrupted.
    pub fn shutdown(&self) {
        info!("Shutting down kernel");
        self.state.request_shutdown(false);
        self.interrupt.interrupt();
        self.state.halt();
    }

    /// Waits for every loop of the kernel to exit. Returns an error if the
    /// kernel stopped because of a fatal failure.
    pub fn wait(self) -> crate::Result<()> {
        for thread in self.threads {
            let name = thread.thread().name().map(String::from);
            if thread.join().is_err() {
                error!("Thread '{}' panicked", name.unwrap_or_default());
            }
        }

        match self.state.fatal_error() {
            Some(reason) => Err(Error::KernelFailed(reason)),
            None => Ok(()),
        }
    }
}
