/*
 * coordinator.rs
 *
 * Copyright (C) 2024 Posit Software, PBC. All rights reserved.
 *
 */

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::bounded;
use crossbeam::channel::unbounded;
use crossbeam::channel::Receiver;
use crossbeam::channel::RecvTimeoutError;
use crossbeam::channel::Sender;
use crossbeam::select;
use futures::executor::block_on;
use log::info;
use log::warn;
use stdext::spawn;

use crate::comm::event::CommManagerEvent;
use crate::error::Error;
use crate::execution::cancel::CancellationToken;
use crate::execution::context::ExecutionContext;
use crate::execution::context::OutputGate;
use crate::history::History;
use crate::language::backend::ExecutionBackend;
use crate::language::backend::ExecutionOutput;
use crate::session::Session;
use crate::socket::iopub::IOPubMessage;
use crate::socket::stdin::StdinRequest;
use crate::wire::exception::Exception;
use crate::wire::execute_error::ExecuteError;
use crate::wire::execute_input::ExecuteInput;
use crate::wire::execute_request::ExecuteRequest;
use crate::wire::execute_result::ExecuteResult;
use crate::wire::history_reply::HistoryEntry;
use crate::wire::history_request::HistoryRequest;
use crate::wire::originator::Originator;

/// A unit of work for the backend, run on the execution thread.
type Job = Box<dyn FnOnce(&mut dyn ExecutionBackend) + Send>;

type BackendResult = Result<Option<ExecutionOutput>, Exception>;

/// How an `execute_request` ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    Ok {
        execution_count: u32,
    },
    Error {
        execution_count: u32,
        exception: Exception,
    },
    /// Interrupted, and the backend didn't yield within the grace period
    Aborted {
        execution_count: u32,
    },
}

impl ExecutionResult {
    pub fn execution_count(&self) -> u32 {
        match self {
            ExecutionResult::Ok { execution_count } |
            ExecutionResult::Error {
                execution_count, ..
            } |
            ExecutionResult::Aborted { execution_count } => *execution_count,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ExecutionResult::Ok { .. })
    }
}

/// Interrupts the execution in flight, if any. Handed to the Control
/// channel, which runs independently of the execution.
#[derive(Clone)]
pub struct InterruptHandle {
    inner: Arc<InterruptInner>,
}

struct InterruptInner {
    /// The token of the execution in flight
    active: Mutex<Option<CancellationToken>>,

    /// Wakes up the coordinator waiting on the execution
    signal_tx: Sender<()>,

    /// Wakes up a pending input request
    stdin_tx: Sender<()>,
}

impl InterruptHandle {
    /// Cancels the execution in flight. Returns false when there was nothing
    /// to interrupt.
    pub fn interrupt(&self) -> bool {
        let active = self.inner.active.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(token) = active.as_ref() else {
            info!("Interrupt requested while no execution is running");
            return false;
        };

        info!("Interrupting the execution in flight");
        token.cancel();

        // Both channels hold at most one signal; one is all it takes
        let _ = self.inner.signal_tx.try_send(());
        let _ = self.inner.stdin_tx.try_send(());
        true
    }

    fn arm(&self, token: CancellationToken) {
        *self.inner.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    fn disarm(&self) {
        *self.inner.active.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Serializes all work against the backend on a single execution thread
/// and turns executions into their IOPub output.
///
/// At most one job runs against the backend at a time; jobs queue in the
/// order they were submitted. Interrupts are cooperative: the backend gets
/// a grace period to yield, after which the execution is abandoned. An
/// abandoned job keeps the execution thread until the backend returns, so
/// later jobs wait for it.
pub struct Coordinator {
    jobs_tx: Sender<Job>,
    session: Session,
    iopub_tx: Sender<IOPubMessage>,
    stdin_tx: Sender<StdinRequest>,
    comm_manager_tx: Sender<CommManagerEvent>,
    history: Mutex<History>,
    interrupt: InterruptHandle,
    interrupt_rx: Receiver<()>,
    grace: Duration,
}

impl Coordinator {
    /// Starts the execution thread, which takes ownership of the backend.
    ///
    /// * `stdin_interrupt_tx` - Notifies the Stdin loop of interrupts
    /// * `grace` - How long an interrupted execution may keep running
    pub fn start(
        backend: Box<dyn ExecutionBackend>,
        session: Session,
        iopub_tx: Sender<IOPubMessage>,
        stdin_tx: Sender<StdinRequest>,
        stdin_interrupt_tx: Sender<()>,
        comm_manager_tx: Sender<CommManagerEvent>,
        grace: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (jobs_tx, jobs_rx) = unbounded::<Job>();
        let worker = spawn!("execution", move || {
            let mut backend = backend;
            for job in jobs_rx {
                job(backend.as_mut());
            }
            log::trace!("Execution thread exiting");
        });

        let (signal_tx, interrupt_rx) = bounded(1);
        let interrupt = InterruptHandle {
            inner: Arc::new(InterruptInner {
                active: Mutex::new(None),
                signal_tx,
                stdin_tx: stdin_interrupt_tx,
            }),
        };

        let coordinator = Self {
            jobs_tx,
            session,
            iopub_tx,
            stdin_tx,
            comm_manager_tx,
            history: Mutex::new(History::new()),
            interrupt,
            interrupt_rx,
            grace,
        };
        (coordinator, worker)
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    pub fn comm_manager_tx(&self) -> &Sender<CommManagerEvent> {
        &self.comm_manager_tx
    }

    /// Runs `f` against the backend and waits for its result.
    pub fn run<R, F>(&self, f: F) -> crate::Result<R>
    where
        F: FnOnce(&mut dyn ExecutionBackend) -> R + Send + 'static,
        R: Send + 'static,
    {
        let rx = self.submit_returning(f)?;
        rx.recv().map_err(|_| worker_gone())
    }

    /// Like `run()`, but stops waiting after `timeout`. Returns `None` if the
    /// backend didn't get to it in time.
    pub fn run_with_timeout<R, F>(&self, f: F, timeout: Duration) -> crate::Result<Option<R>>
    where
        F: FnOnce(&mut dyn ExecutionBackend) -> R + Send + 'static,
        R: Send + 'static,
    {
        let rx = self.submit_returning(f)?;
        match rx.recv_timeout(timeout) {
            Ok(result) => Ok(Some(result)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(worker_gone()),
        }
    }

    fn submit_returning<R, F>(&self, f: F) -> crate::Result<Receiver<R>>
    where
        F: FnOnce(&mut dyn ExecutionBackend) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = bounded(1);
        self.submit(Box::new(move |backend: &mut dyn ExecutionBackend| {
            // The caller may have stopped waiting
            let _ = tx.send(f(backend));
        }))?;
        Ok(rx)
    }

    fn submit(&self, job: Job) -> crate::Result<()> {
        self.jobs_tx.send(job).map_err(|_| worker_gone())
    }

    /// Executes a request, publishing `execute_input`, the backend's output,
    /// and the `execute_result` or `error` on IOPub. The reply is left to the
    /// caller.
    pub fn execute(
        &self,
        request: &ExecuteRequest,
        originator: Originator,
    ) -> crate::Result<ExecutionResult> {
        let store_history = request.store_history && !request.silent;
        let execution_count = match store_history {
            true => self.session.next_execution_count(),
            false => self.session.execution_count(),
        };
        let parent = originator.header.clone();

        // Interrupts that arrived after the previous execution finished are
        // stale
        while self.interrupt_rx.try_recv().is_ok() {}

        // Armed before `execute_input` goes out, so a frontend reacting to it
        // can already interrupt
        let token = CancellationToken::new();
        self.interrupt.arm(token.clone());

        if !request.silent {
            let published = self.publish(IOPubMessage::ExecuteInput(parent.clone(), ExecuteInput {
                code: request.code.clone(),
                execution_count,
            }));
            if let Err(err) = published {
                self.interrupt.disarm();
                return Err(err);
            }
        }

        let gate = OutputGate::new(self.iopub_tx.clone());
        let mut context = ExecutionContext::new(
            execution_count,
            originator,
            token,
            request.allow_stdin,
            gate.clone(),
            self.stdin_tx.clone(),
            self.comm_manager_tx.clone(),
        );

        let (result_tx, result_rx) = bounded(1);
        let code = request.code.clone();

        let outcome = self
            .submit(Box::new(move |backend: &mut dyn ExecutionBackend| {
                let result = block_on(backend.execute(&code, &mut context));
                // Nobody listens anymore if the execution was abandoned
                let _ = result_tx.send(result);
            }))
            .and_then(|_| self.wait(&result_rx, &gate));
        self.interrupt.disarm();

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err @ Error::ExecutionAbandoned(_)) => {
                warn!("{err}");
                return Ok(ExecutionResult::Aborted { execution_count });
            },
            Err(err) => return Err(err),
        };

        match outcome {
            Ok(output) => {
                let text = output.as_ref().and_then(ExecutionOutput::plain_text);
                if let Some(output) = output.filter(|_| !request.silent) {
                    self.publish(IOPubMessage::ExecuteResult(parent, ExecuteResult {
                        data: output.data,
                        execution_count,
                        metadata: output.metadata,
                    }))?;
                }
                if store_history {
                    self.record(execution_count, &request.code, text);
                }
                Ok(ExecutionResult::Ok { execution_count })
            },
            Err(exception) => {
                self.publish(IOPubMessage::ExecuteError(parent, ExecuteError {
                    exception: exception.clone(),
                }))?;
                if store_history {
                    self.record(execution_count, &request.code, None);
                }
                Ok(ExecutionResult::Error {
                    execution_count,
                    exception,
                })
            },
        }
    }

    /// Waits for the backend to finish, giving it the grace period to yield
    /// once interrupted.
    fn wait(
        &self,
        result_rx: &Receiver<BackendResult>,
        gate: &OutputGate,
    ) -> crate::Result<BackendResult> {
        select! {
            recv(result_rx) -> result => return result.map_err(|_| worker_gone()),
            recv(self.interrupt_rx) -> _ => {},
        }

        info!(
            "Waiting up to {}ms for the interrupted execution to yield",
            self.grace.as_millis()
        );
        match result_rx.recv_timeout(self.grace) {
            Ok(result) => Ok(result),
            Err(RecvTimeoutError::Timeout) => {
                gate.close();
                Err(Error::ExecutionAbandoned(self.grace))
            },
            Err(RecvTimeoutError::Disconnected) => Err(worker_gone()),
        }
    }

    pub fn query_history(&self, request: &HistoryRequest) -> Vec<HistoryEntry> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .query(request)
    }

    fn record(&self, execution_count: u32, code: &str, output: Option<String>) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(execution_count, code, output);
    }

    fn publish(&self, message: IOPubMessage) -> crate::Result<()> {
        self.iopub_tx
            .send(message)
            .map_err(|_| Error::ChannelClosed(String::from("IOPub")))
    }
}

fn worker_gone() -> Error {
    Error::ChannelClosed(String::from("execution"))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use async_trait::async_trait;

    use super::*;
    use crate::wire::kernel_info_reply::KernelInfo;
    use crate::wire::language_info::LanguageInfo;
    use crate::wire::message_kind::MessageKind;

    /// Echoes its input, fails on "fail", and loops on "loop" until
    /// cancelled or, with "stubborn", for a while regardless.
    struct TestBackend;

    #[async_trait]
    impl ExecutionBackend for TestBackend {
        async fn kernel_info(&mut self) -> KernelInfo {
            KernelInfo {
                implementation: String::from("test"),
                implementation_version: String::from("0.0.0"),
                language_info: LanguageInfo {
                    name: String::from("test"),
                    version: String::from("0.0.0"),
                    file_extension: String::from(".txt"),
                    mimetype: String::from("text/plain"),
                    pygments_lexer: None,
                    codemirror_mode: None,
                    nbconvert_exporter: None,
                },
                banner: String::new(),
                debugger: false,
                help_links: vec![],
            }
        }

        async fn execute(
            &mut self,
            code: &str,
            context: &mut ExecutionContext,
        ) -> Result<Option<ExecutionOutput>, Exception> {
            match code {
                "fail" => Err(Exception::new("ValueError", "failed")),
                "loop" => {
                    while !context.is_cancelled() {
                        std::thread::sleep(Duration::from_millis(5));
                    }
                    Err(Exception::interrupted())
                },
                "stubborn" => {
                    std::thread::sleep(Duration::from_millis(300));
                    context.stdout("too late");
                    Ok(None)
                },
                code => {
                    context.stdout("running");
                    Ok(Some(ExecutionOutput::plain(code)))
                },
            }
        }
    }

    struct Fixture {
        coordinator: Coordinator,
        iopub_rx: Receiver<IOPubMessage>,
        session: Session,
        _stdin_rx: Receiver<StdinRequest>,
        _stdin_interrupt_rx: Receiver<()>,
        _comm_rx: Receiver<CommManagerEvent>,
    }

    fn fixture(grace: Duration) -> Fixture {
        let session = Session::create("key").unwrap();
        let (iopub_tx, iopub_rx) = unbounded();
        let (stdin_tx, stdin_rx) = unbounded();
        let (stdin_interrupt_tx, stdin_interrupt_rx) = bounded(1);
        let (comm_tx, comm_rx) = unbounded();
        let (coordinator, _) = Coordinator::start(
            Box::new(TestBackend),
            session.clone(),
            iopub_tx,
            stdin_tx,
            stdin_interrupt_tx,
            comm_tx,
            grace,
        );
        Fixture {
            coordinator,
            iopub_rx,
            session,
            _stdin_rx: stdin_rx,
            _stdin_interrupt_rx: stdin_interrupt_rx,
            _comm_rx: comm_rx,
        }
    }

    fn originator(session: &Session) -> Originator {
        Originator {
            zmq_identities: vec![],
            header: session.header(MessageKind::ExecuteRequest),
        }
    }

    #[test]
    fn test_execute_publishes_input_output_and_result() {
        let fixture = fixture(Duration::from_secs(1));
        let request = ExecuteRequest::new("42");
        let originator = originator(&fixture.session);

        let result = fixture
            .coordinator
            .execute(&request, originator.clone())
            .unwrap();
        assert_eq!(result, ExecutionResult::Ok { execution_count: 1 });

        assert_matches!(fixture.iopub_rx.try_recv().unwrap(), IOPubMessage::ExecuteInput(parent, input) => {
            assert_eq!(parent, originator.header);
            assert_eq!(input.code, "42");
            assert_eq!(input.execution_count, 1);
        });
        assert_matches!(fixture.iopub_rx.try_recv().unwrap(), IOPubMessage::Stream(_, output) => {
            assert_eq!(output.text, "running");
        });
        assert_matches!(fixture.iopub_rx.try_recv().unwrap(), IOPubMessage::ExecuteResult(_, result) => {
            assert_eq!(result.data["text/plain"], "42");
            assert_eq!(result.execution_count, 1);
        });
    }

    #[test]
    fn test_execute_error_and_silent() {
        let fixture = fixture(Duration::from_secs(1));
        let originator = originator(&fixture.session);

        let result = fixture
            .coordinator
            .execute(&ExecuteRequest::new("fail"), originator.clone())
            .unwrap();
        assert_matches!(result, ExecutionResult::Error { execution_count: 1, exception } => {
            assert_eq!(exception.ename, "ValueError");
        });
        assert_matches!(fixture.iopub_rx.try_recv().unwrap(), IOPubMessage::ExecuteInput(..));
        assert_matches!(fixture.iopub_rx.try_recv().unwrap(), IOPubMessage::ExecuteError(..));

        // Silent requests don't count, don't echo, and have no result
        let mut silent = ExecuteRequest::new("7");
        silent.silent = true;
        let result = fixture.coordinator.execute(&silent, originator).unwrap();
        assert_eq!(result, ExecutionResult::Ok { execution_count: 1 });
        assert_matches!(fixture.iopub_rx.try_recv().unwrap(), IOPubMessage::Stream(..));
        assert!(fixture.iopub_rx.try_recv().is_err());
    }

    #[test]
    fn test_interrupt_within_grace() {
        let fixture = fixture(Duration::from_secs(5));
        let handle = fixture.coordinator.interrupt_handle();
        assert!(!handle.interrupt());

        let interrupter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            handle.interrupt()
        });
        let result = fixture
            .coordinator
            .execute(&ExecuteRequest::new("loop"), originator(&fixture.session))
            .unwrap();
        assert!(interrupter.join().unwrap());
        assert_matches!(result, ExecutionResult::Error { exception, .. } => {
            assert_eq!(exception.ename, "KeyboardInterrupt");
        });
    }

    #[test]
    fn test_stuck_execution_is_abandoned() {
        let fixture = fixture(Duration::from_millis(50));
        let handle = fixture.coordinator.interrupt_handle();

        let interrupter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            handle.interrupt()
        });
        let result = fixture
            .coordinator
            .execute(&ExecuteRequest::new("stubborn"), originator(&fixture.session))
            .unwrap();
        interrupter.join().unwrap();
        assert_eq!(result, ExecutionResult::Aborted { execution_count: 1 });

        // The next job waits for the stuck one, whose output is dropped
        let info = fixture
            .coordinator
            .run(|backend| block_on(backend.kernel_info()))
            .unwrap();
        assert_eq!(info.implementation, "test");
        assert_matches!(fixture.iopub_rx.try_recv().unwrap(), IOPubMessage::ExecuteInput(..));
        assert!(fixture.iopub_rx.try_recv().is_err());
    }
}
