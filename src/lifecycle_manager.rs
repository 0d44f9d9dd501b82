use std::fmt;

use thiserror::Error;
use tokio::{
    runtime::{Handle, TryCurrentError},
    task::{JoinError, JoinHandle},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    control_loop::{ControlError, ControlLoop, LoopSettings},
    fan_curve::BreakpointTable,
    hardware::{FanActuator, TemperatureSensor},
};

type Result<T> = std::result::Result<T, LifecycleError>;

type LoopHandle =
    JoinHandle<std::result::Result<BreakpointTable, ControlError>>;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Cannot {operation} the control loop while it is {state}")]
    InvalidState {
        operation: &'static str,
        state: LoopState,
    },
    #[error("Failed to start the control loop task: {0}")]
    NoRuntime(#[from] TryCurrentError),
    #[error("Failed to wait for the control loop task: {0}")]
    Join(#[from] JoinError),
    #[error(transparent)]
    Loop(#[from] ControlError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    // The loop owns its table but the task is not spawned yet
    Created,
    Running,
    // The exit signal is set, the task has not been joined yet
    Stopping,
    Stopped,
}

// Own the control loop task together with its exit signal
pub struct LifecycleManager {
    state: LoopState,

    // Exit signal polled by the loop
    exit: CancellationToken,

    // Present until the task is spawned
    control_loop: Option<ControlLoop>,
    // Present while the task is alive
    handle: Option<LoopHandle>,
}

impl LifecycleManager {
    // Hand the table and the hardware over to a new control loop
    pub fn init(
        table: BreakpointTable,
        sensor: Box<dyn TemperatureSensor>,
        actuator: Box<dyn FanActuator>,
        settings: LoopSettings,
    ) -> Self {
        debug!("Control loop created with fan curve: {:?}", table.points());

        Self {
            state: LoopState::Created,
            exit: CancellationToken::new(),
            control_loop: Some(ControlLoop::new(
                table, sensor, actuator, settings,
            )),
            handle: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn exit_requested(&self) -> bool {
        self.exit.is_cancelled()
    }

    // Spawn the control loop on the current tokio runtime
    pub fn start(&mut self) -> Result<()> {
        let control_loop = match (self.state, self.control_loop.take()) {
            (LoopState::Created, Some(control_loop)) => control_loop,
            (state, control_loop) => {
                self.control_loop = control_loop;
                return Err(LifecycleError::InvalidState {
                    operation: "start",
                    state,
                });
            }
        };

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                error!("Error starting the control loop: {err}");
                self.control_loop = Some(control_loop);
                return Err(err.into());
            }
        };

        self.handle = Some(runtime.spawn(control_loop.run(self.exit.clone())));
        self.state = LoopState::Running;

        info!("Control loop started");

        Ok(())
    }

    // Signal the loop to exit, wait for it and release its table.
    // Dropping the returned future leaves the manager Stopping,
    // calling stop again resumes the wait
    pub async fn stop(&mut self) -> Result<()> {
        match self.state {
            LoopState::Created => {
                // Never started, only the table has to go
                self.control_loop = None;
                self.state = LoopState::Stopped;
                return Ok(());
            }
            LoopState::Stopped => {
                return Err(LifecycleError::InvalidState {
                    operation: "stop",
                    state: self.state,
                });
            }
            LoopState::Running | LoopState::Stopping => {}
        }

        self.state = LoopState::Stopping;
        self.exit.cancel();

        let result = self.join().await;

        // Clear the exit signal
        self.exit = CancellationToken::new();

        result
    }

    // Wait for the loop to exit on its own
    pub async fn wait(&mut self) -> Result<()> {
        match self.state {
            LoopState::Running | LoopState::Stopping => self.join().await,
            state => Err(LifecycleError::InvalidState {
                operation: "wait for",
                state,
            }),
        }
    }

    async fn join(&mut self) -> Result<()> {
        let Some(handle) = self.handle.as_mut() else {
            self.state = LoopState::Stopped;
            return Ok(());
        };

        let joined = handle.await;

        self.handle = None;
        self.state = LoopState::Stopped;

        match joined {
            Ok(Ok(table)) => {
                // The table handed back by the loop is released here
                debug!("Releasing fan curve: {:?}", table.points());
                info!("Control loop stopped");
                Ok(())
            }
            Ok(Err(err)) => Err(err.into()),
            Err(err) => {
                error!("Error waiting for the control loop: {err}");
                Err(err.into())
            }
        }
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        // Do not leave a detached loop driving the fan
        self.exit.cancel();
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            LoopState::Created => "created",
            LoopState::Running => "running",
            LoopState::Stopping => "stopping",
            LoopState::Stopped => "stopped",
        };

        f.write_str(state)
    }
}
