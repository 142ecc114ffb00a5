//! Async runtime for the messaging orchestrator.
//!
//! The Runtime drives the orchestrator, coordinating between:
//! - [`Orchestrator`]: pure messaging state machine
//! - [`Executor`]: wallet, ledger and FHE I/O
//! - Subscribers: a `watch` channel carrying the latest [`StatusSnapshot`]
//!
//! There is one execution context. In-flight operations are boxed futures in
//! a `FuturesUnordered`; operations of different kinds overlap, but every
//! state change happens on the runtime between polls.

use futures::{FutureExt, StreamExt, future::BoxFuture, stream::FuturesUnordered};
use hushboard_core::{Environment, MessageId, SignatureStore, WalletEvent};
use tokio::sync::{mpsc, watch};

use crate::{
    Action, Event, Executor, OperationError, Orchestrator, OrchestratorConfig, StatusSnapshot,
};

/// User commands accepted by [`Runtime::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Request wallet accounts.
    Connect,
    /// Send a message.
    Send {
        /// Recipient address text.
        recipient: String,
        /// Message text.
        text: String,
    },
    /// Refresh message lists.
    Refresh,
    /// Decrypt a received message.
    Decrypt {
        /// Message to decrypt.
        message_id: MessageId,
    },
    /// Switch to a supported network.
    SwitchNetwork,
    /// Retry a failed instance derivation.
    RetryInstance,
}

/// Runtime owning the orchestrator and its in-flight operations.
///
/// # Type Parameters
///
/// - `S`: Signature store backend
/// - `E`: Environment for time and randomness
pub struct Runtime<S, E> {
    orchestrator: Orchestrator,
    executor: Executor<S, E>,
    in_flight: FuturesUnordered<BoxFuture<'static, Option<Event>>>,
    status: watch::Sender<StatusSnapshot>,
}

impl<S, E> Runtime<S, E>
where
    S: SignatureStore,
    E: Environment,
{
    /// Create a runtime in the disconnected state.
    pub fn new(config: OrchestratorConfig, executor: Executor<S, E>) -> Self {
        let orchestrator = Orchestrator::new(config);
        let (status, _) = watch::channel(orchestrator.snapshot());
        Self { orchestrator, executor, in_flight: FuturesUnordered::new(), status }
    }

    /// Subscribe to status snapshots.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.subscribe()
    }

    /// Latest published status.
    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    /// The orchestrator.
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// The executor.
    pub fn executor(&self) -> &Executor<S, E> {
        &self.executor
    }

    /// Number of operations in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Request wallet accounts.
    pub fn connect(&mut self) {
        let actions = self.orchestrator.connect();
        self.dispatch(actions);
    }

    /// Start sending `text` to `recipient`.
    ///
    /// Returns once the operation is in flight; drive it with
    /// [`Runtime::step`], [`Runtime::settle`] or [`Runtime::run`].
    pub fn send(&mut self, recipient: &str, text: &str) -> Result<(), OperationError> {
        let result = self.orchestrator.send(recipient, text);
        self.submit(result)
    }

    /// Start refreshing the message lists.
    pub fn refresh(&mut self) -> Result<(), OperationError> {
        let result = self.orchestrator.refresh();
        self.submit(result)
    }

    /// Start decrypting a received message.
    pub fn decrypt(&mut self, message_id: MessageId) -> Result<(), OperationError> {
        let result = self.orchestrator.decrypt(message_id);
        self.submit(result)
    }

    /// Start switching to a supported network.
    pub fn switch_network(&mut self) -> Result<(), OperationError> {
        let result = self.orchestrator.switch_network();
        self.submit(result)
    }

    /// Retry a failed instance derivation.
    pub fn retry_instance(&mut self) {
        let actions = self.orchestrator.retry_instance();
        self.dispatch(actions);
    }

    /// Feed a wallet provider notification.
    pub fn apply_wallet_event(&mut self, event: WalletEvent) {
        let actions = self.orchestrator.handle(Event::Wallet(event));
        self.dispatch(actions);
    }

    /// Execute a user command. Rejections are logged and published.
    pub fn command(&mut self, command: Command) {
        let result = match command {
            Command::Connect => {
                self.connect();
                Ok(())
            },
            Command::Send { recipient, text } => self.send(&recipient, &text),
            Command::Refresh => self.refresh(),
            Command::Decrypt { message_id } => self.decrypt(message_id),
            Command::SwitchNetwork => self.switch_network(),
            Command::RetryInstance => {
                self.retry_instance();
                Ok(())
            },
        };

        if let Err(err) = result {
            tracing::info!(error = %err, "command rejected");
        }
    }

    /// Wait for one in-flight operation and apply its result.
    ///
    /// Returns `false` if nothing was in flight.
    pub async fn step(&mut self) -> bool {
        match self.in_flight.next().await {
            Some(event) => {
                if let Some(event) = event {
                    self.complete(event);
                }
                true
            },
            None => false,
        }
    }

    /// Drive in-flight operations until none remain.
    ///
    /// Completions may start follow-up operations (a connect starts instance
    /// derivation); those are driven too.
    pub async fn settle(&mut self) {
        while self.step().await {}
    }

    /// Run until both input channels are closed and nothing is in flight.
    ///
    /// Returns the final status.
    pub async fn run(
        mut self,
        mut wallet_events: mpsc::Receiver<WalletEvent>,
        mut commands: mpsc::Receiver<Command>,
    ) -> StatusSnapshot {
        let mut wallet_open = true;
        let mut commands_open = true;

        loop {
            if !wallet_open && !commands_open && self.in_flight.is_empty() {
                break;
            }

            tokio::select! {
                event = wallet_events.recv(), if wallet_open => match event {
                    Some(event) => self.apply_wallet_event(event),
                    None => wallet_open = false,
                },
                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.command(command),
                    None => commands_open = false,
                },
                Some(event) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    if let Some(event) = event {
                        self.complete(event);
                    }
                },
                else => break,
            }
        }

        tracing::debug!("runtime stopped");
        self.status()
    }

    fn complete(&mut self, event: Event) {
        let actions = self.orchestrator.handle(event);
        self.dispatch(actions);
    }

    fn submit(
        &mut self,
        result: Result<Vec<Action>, OperationError>,
    ) -> Result<(), OperationError> {
        match result {
            Ok(actions) => {
                self.dispatch(actions);
                Ok(())
            },
            Err(err) => {
                self.publish();
                Err(err)
            },
        }
    }

    fn dispatch(&mut self, actions: Vec<Action>) {
        for action in actions {
            if matches!(action, Action::Publish) {
                self.publish();
                continue;
            }
            if self.executor.apply_local(&action) {
                continue;
            }
            let executor = self.executor.clone();
            self.in_flight.push(executor.execute(action).boxed());
        }
    }

    fn publish(&self) {
        self.status.send_replace(self.orchestrator.snapshot());
    }
}
