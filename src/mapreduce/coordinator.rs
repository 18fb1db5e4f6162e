//! Client side of the worker/coordinator protocol.
//!
//! Workers use [`register`] once at startup. A coordinator, or a test harness standing in for
//! one, drives a worker through [`WorkerConnection`].

use tonic::transport::Channel;
use tonic::Status;
use tracing::info;

use super::error::WorkerError;
use super::proto::master_client::MasterClient;
use super::proto::worker_client::WorkerClient;
use super::proto::{Empty, RegisterArgs, RunTaskArgs};
use super::task::Task;

/// Tells the coordinator at `coordinator` that a worker reachable at `me` is ready for work.
pub async fn register(coordinator: &str, me: &str) -> Result<(), WorkerError> {
    let mut client = MasterClient::connect(coordinator.to_string())
        .await
        .map_err(|source| WorkerError::Connect {
            addr: coordinator.to_string(),
            source,
        })?;

    client
        .register(RegisterArgs {
            worker: me.to_string(),
        })
        .await
        .map_err(WorkerError::Register)?;

    info!(coordinator, worker = me, "registered with coordinator");
    Ok(())
}

/// Connection to one worker's `Worker` service.
#[derive(Debug, Clone)]
pub struct WorkerConnection {
    client: WorkerClient<Channel>,
}

impl WorkerConnection {
    pub async fn connect(addr: impl Into<String>) -> Result<Self, tonic::transport::Error> {
        let client = WorkerClient::connect(addr.into()).await?;
        Ok(Self { client })
    }

    /// Runs `task` on the worker and waits for it to finish.
    pub async fn run_task(&mut self, task: &Task) -> Result<(), Status> {
        self.client.run_task(RunTaskArgs::from(task)).await?;
        Ok(())
    }

    /// Asks the worker to stop and returns how many tasks it completed.
    pub async fn shutdown(&mut self) -> Result<u64, Status> {
        let reply = self.client.shutdown(Empty {}).await?;
        Ok(reply.into_inner().n_tasks)
    }
}
