//! Cancellation token bound to a kill command

use crate::command::Command;
use crate::error::{Error, Result};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// A cancellation token shared between the execution path and a control path
///
/// The execution path binds a kill command (typically `docker stop -t 0
/// <container>`) while the container is running and unbinds it afterwards.
/// A control thread invokes [`CancelToken::cancel`], which runs whatever kill
/// command is currently bound; the running step then observes the killed exit
/// code and the walk fails fast through its normal teardown.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    cancelled: bool,
    killer: Option<Command>,
}

impl CancelToken {
    /// Create a fresh, unbound token
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the token has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.state.lock().unwrap().cancelled
    }

    /// Bind the kill command to run on cancellation
    ///
    /// Returns `Err(Cancelled)` if the token was already cancelled, in which
    /// case the caller must not start the process the kill command targets.
    pub fn bind(&self, killer: Command) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.cancelled {
            return Err(Error::Cancelled);
        }
        state.killer = Some(killer);
        Ok(())
    }

    /// Drop the bound kill command, once the bound process has exited
    pub fn unbind(&self) {
        self.state.lock().unwrap().killer = None;
    }

    /// Cancel: mark the token and run the bound kill command, if any
    ///
    /// Kill failures are logged and swallowed; the token stays cancelled
    /// either way so nothing new can be bound to it.
    pub async fn cancel(&self) {
        let killer = {
            let mut state = self.state.lock().unwrap();
            state.cancelled = true;
            state.killer.take()
        };
        if let Some(killer) = killer {
            debug!("running kill command: {}", killer.display());
            match killer.prepare().output().await {
                Ok(output) if output.status.success() => {}
                Ok(output) => warn!(
                    "kill command failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
                Err(err) => warn!("failed to run kill command: {err}"),
            }
        }
    }
}
