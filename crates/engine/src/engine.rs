//! The engine lifecycle contract.
//!
//! An engine moves through `Unconfigured -> Configured -> Listening -> Stopped`
//! exactly once. Handler and logger can only be bound before [`Engine::start`],
//! and a stopped engine can't be started again.

use std::fmt;
use std::fmt::Display;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::Dispatch;

use crate::error::EngineError;
use crate::handler::BoxHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Unconfigured,
    Configured,
    Listening,
    Stopped,
}

impl Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Unconfigured => "unconfigured",
            EngineState::Configured => "configured",
            EngineState::Listening => "listening",
            EngineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[async_trait]
pub trait Engine: Send {
    /// Binds the handler every exchange is dispatched to.
    fn set_handler(&mut self, handler: BoxHandler) -> Result<(), EngineError>;

    /// Binds the dispatcher the engine and its connections log to.
    fn set_logger(&mut self, logger: Dispatch) -> Result<(), EngineError>;

    /// A handle that stops a running engine from elsewhere.
    fn shutdown_handle(&self) -> ShutdownHandle;

    fn state(&self) -> EngineState;

    /// Serves until shutdown is requested or a fatal bind/accept error occurs.
    async fn start(&mut self) -> Result<(), EngineError>;
}

/// The state machine shared by engine implementations.
#[derive(Debug)]
pub struct Lifecycle {
    state: EngineState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self { state: EngineState::Unconfigured }
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Checks that `operation` may still change the configuration.
    pub fn ensure_configurable(&self, operation: &'static str) -> Result<(), EngineError> {
        match self.state {
            EngineState::Unconfigured | EngineState::Configured => Ok(()),
            state => Err(EngineError::invalid_state(operation, state)),
        }
    }

    pub fn handler_bound(&mut self) -> Result<(), EngineError> {
        self.ensure_configurable("set handler")?;
        self.state = EngineState::Configured;
        Ok(())
    }

    pub fn listen(&mut self) -> Result<(), EngineError> {
        match self.state {
            EngineState::Configured => {
                self.state = EngineState::Listening;
                Ok(())
            }
            EngineState::Unconfigured => Err(EngineError::MissingHandler),
            state => Err(EngineError::invalid_state("start", state)),
        }
    }

    pub fn stop(&mut self) {
        self.state = EngineState::Stopped;
    }
}

/// Requests a graceful stop of a running engine.
///
/// Clones share the same signal. Exchanges get a child of the token through
/// [`Request::cancellation`](crate::Request::cancellation).
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown is requested.
    pub async fn wait(&self) {
        self.token.cancelled().await
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}
