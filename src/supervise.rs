//! The loop every background activity runs in.

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::error::{ErrorClass, TelloError};
use crate::published::Lifeline;

/// One long-lived background activity, driven one iteration at a time.
#[async_trait]
pub trait Activity: Send + 'static {
    fn name(&self) -> &'static str;

    /// Run a single iteration.
    async fn step(&mut self) -> Result<(), TelloError>;

    /// Checked at the top of every iteration, next to the lifeline.
    fn should_continue(&self) -> bool {
        true
    }
}

/// Run `activity` until the lifeline is cut, the activity asks to stop, or
/// an iteration fails fatally. Hands the activity back on exit.
pub async fn supervise<A: Activity>(mut activity: A, lifeline: Lifeline) -> A {
    let name = activity.name();
    debug!(activity = name, "started");
    while lifeline.is_alive() && activity.should_continue() {
        let Err(err) = activity.step().await else {
            continue;
        };
        match err.class() {
            ErrorClass::Transient => trace!(activity = name, error = %err, "skipped iteration"),
            ErrorClass::Malformed => warn!(activity = name, error = %err, "dropped malformed input"),
            ErrorClass::Fatal => {
                if lifeline.is_alive() {
                    error!(activity = name, error = %err, "stopping");
                }
                break;
            }
        }
    }
    debug!(activity = name, "stopped");
    activity
}

pub fn spawn_on<A: Activity>(runtime: &Handle, activity: A, lifeline: Lifeline) -> JoinHandle<A> {
    runtime.spawn(supervise(activity, lifeline))
}

/// Like [`spawn_on`], for activities that own nothing worth handing back.
pub fn spawn_unit_on<A: Activity>(
    runtime: &Handle,
    activity: A,
    lifeline: Lifeline,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        supervise(activity, lifeline).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct Script {
        outcomes: Vec<Result<(), TelloError>>,
        runs: usize,
        limit: usize,
    }

    impl Script {
        fn new(outcomes: Vec<Result<(), TelloError>>) -> Self {
            Self {
                outcomes,
                runs: 0,
                limit: usize::MAX,
            }
        }
    }

    #[async_trait]
    impl Activity for Script {
        fn name(&self) -> &'static str {
            "script"
        }

        async fn step(&mut self) -> Result<(), TelloError> {
            self.runs += 1;
            if self.outcomes.is_empty() {
                return Err(TelloError::ShutDown);
            }
            self.outcomes.remove(0)
        }

        fn should_continue(&self) -> bool {
            self.runs < self.limit
        }
    }

    #[tokio::test]
    async fn test_transient_and_malformed_errors_keep_looping() {
        let script = Script::new(vec![
            Err(io::Error::new(io::ErrorKind::TimedOut, "recv").into()),
            Err(TelloError::MalformedTelemetry("bat".into())),
            Ok(()),
        ]);
        let script = supervise(script, Lifeline::new()).await;
        // three scripted steps, then the fatal ShutDown
        assert_eq!(script.runs, 4);
    }

    #[tokio::test]
    async fn test_fatal_error_stops_loop() {
        let script = Script::new(vec![Err(TelloError::Closed("command")), Ok(())]);
        let script = supervise(script, Lifeline::new()).await;
        assert_eq!(script.runs, 1);
        assert_eq!(script.outcomes.len(), 1);
    }

    #[tokio::test]
    async fn test_dead_lifeline_never_steps() {
        let lifeline = Lifeline::new();
        lifeline.cut();
        let script = supervise(Script::new(vec![Ok(())]), lifeline).await;
        assert_eq!(script.runs, 0);
    }

    #[tokio::test]
    async fn test_should_continue_is_checked_each_iteration() {
        let mut script = Script::new(vec![Ok(()), Ok(()), Ok(()), Ok(())]);
        script.limit = 2;
        let script = supervise(script, Lifeline::new()).await;
        assert_eq!(script.runs, 2);
    }
}
