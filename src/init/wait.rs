use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tower::BoxError;
use tracing::error;

pub async fn wait_for_any_task(
    tasks: &mut JoinSet<Result<(), BoxError>>,
) -> Result<(), BoxError> {
    let r = tasks.join_next().await;

    match r {
        None => Ok(()), // should not happen
        Some(res) => res?,
    }
}

pub async fn wait_for_tasks_with_timeout(
    tasks: &mut JoinSet<Result<(), BoxError>>,
    timeout: Duration,
) -> Result<(), BoxError> {
    let stop_at = Instant::now() + timeout;
    let mut result = Ok(());
    loop {
        match timeout_at(stop_at, tasks.join_next()).await {
            Err(_) => {
                result = Err("timed out waiting for tasks to complete".into());
                break;
            }
            Ok(None) => break,
            Ok(Some(v)) => match v {
                Ok(Ok(())) => {}
                Ok(Err(e)) => result = Err(e),
                Err(e) => error!("Failed to join with task: {:?}", e),
            },
        }
    }

    result
}
