use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{Mutex, Notify};
use tokio::task::{JoinError, JoinHandle};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

use super::apps::MapReduce;
use super::config::{CallBudget, WorkerConfig};
use super::coordinator::register;
use super::error::{TaskError, TaskResult, WorkerError};
use super::map_task::run_map_task;
use super::naming::NamingScheme;
use super::proto::worker_server::WorkerServer;
use super::proto::{self, Empty, RunTaskArgs, ShutdownReply};
use super::reduce_task::run_reduce_task;
use super::task::{JobPhase, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServicePhase {
    Unregistered,
    Registered,
    Serving,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    RunTask,
    Shutdown,
}

#[derive(Debug)]
struct WorkerState {
    phase: ServicePhase,
    budget: CallBudget,
    completed: u64,
}

/// State shared by the server and every call handler. All reads and writes go through the one
/// lock.
#[derive(Debug)]
pub struct SharedState {
    inner: Mutex<WorkerState>,
    stop: Notify,
}

impl SharedState {
    fn new(budget: CallBudget) -> Self {
        Self {
            inner: Mutex::new(WorkerState {
                phase: ServicePhase::Unregistered,
                budget,
                completed: 0,
            }),
            stop: Notify::new(),
        }
    }

    pub async fn phase(&self) -> ServicePhase {
        self.inner.lock().await.phase
    }

    /// Number of `RunTask` calls that have returned successfully.
    pub async fn completed_tasks(&self) -> u64 {
        self.inner.lock().await.completed
    }

    pub async fn remaining_calls(&self) -> CallBudget {
        self.inner.lock().await.budget
    }

    async fn set_phase(&self, phase: ServicePhase) {
        self.inner.lock().await.phase = phase;
    }

    /// Charges one call against the budget, or refuses it. The call that spends the last unit
    /// is still serviced; it also tells the server to stop listening.
    async fn admit(&self, call: Call) -> Result<(), Status> {
        let mut state = self.inner.lock().await;
        match (state.phase, call) {
            (ServicePhase::Serving, _) => {}
            // repeated shutdowns are answered while the server drains
            (ServicePhase::Draining, Call::Shutdown) => return Ok(()),
            (phase, _) => {
                return Err(Status::unavailable(format!(
                    "worker is {:?}, not accepting calls",
                    phase
                )))
            }
        }

        if !state.budget.try_take() {
            drop(state);
            self.stop.notify_one();
            return Err(Status::resource_exhausted("worker call budget is spent"));
        }
        if state.budget.is_exhausted() {
            debug!("last call of the budget admitted");
            self.stop.notify_one();
        }
        Ok(())
    }

    async fn task_completed(&self) {
        self.inner.lock().await.completed += 1;
    }

    /// Moves to `Draining` and returns the completed count plus whether this call began the
    /// drain.
    async fn begin_drain(&self) -> (u64, bool) {
        let mut state = self.inner.lock().await;
        let first = state.phase == ServicePhase::Serving;
        if first {
            state.phase = ServicePhase::Draining;
            state.budget = CallBudget::Limited(0);
        }
        let completed = state.completed;
        drop(state);

        self.stop.notify_one();
        (completed, first)
    }

    async fn stopped(&self) {
        self.stop.notified().await;
    }
}

/// Runs one task to completion on the calling thread.
pub fn execute(naming: &NamingScheme, app: &dyn MapReduce, task: &Task) -> TaskResult<()> {
    match task.phase {
        JobPhase::Map => {
            let input = task
                .file
                .as_deref()
                .ok_or_else(|| TaskError::InvalidTask("map task without input file".into()))?;
            run_map_task(
                naming,
                &task.job_name,
                task.task_number,
                input,
                task.num_other_phase,
                app,
            )
        }
        JobPhase::Reduce => run_reduce_task(
            naming,
            &task.job_name,
            task.task_number,
            task.num_other_phase,
            app,
        ),
    }
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string()),
        Err(err) => err.to_string(),
    }
}

/// What a worker does once the grace period after `Shutdown` has passed.
pub type ExitAction = Arc<dyn Fn() + Send + Sync>;

fn exit_process() -> ExitAction {
    Arc::new(|| {
        info!("exiting after shutdown");
        std::process::exit(0);
    })
}

fn schedule_exit(grace: Duration, action: ExitAction) {
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        action();
    });
}

struct WorkerService {
    name: String,
    state: Arc<SharedState>,
    app: Arc<dyn MapReduce>,
    naming: NamingScheme,
    exit_on_shutdown: bool,
    exit_grace: Duration,
    exit_action: ExitAction,
}

#[tonic::async_trait]
impl proto::worker_server::Worker for WorkerService {
    async fn run_task(&self, request: Request<RunTaskArgs>) -> Result<Response<Empty>, Status> {
        self.state.admit(Call::RunTask).await?;

        let task = Task::try_from(request.into_inner()).map_err(|err| {
            warn!(worker = %self.name, %err, "rejected task");
            Status::from(err)
        })?;
        let (job, phase, number) = (task.job_name.clone(), task.phase, task.task_number);
        info!(
            worker = %self.name,
            job = %job,
            %phase,
            task = number,
            file = ?task.file,
            num_other_phase = task.num_other_phase,
            "running task"
        );

        let app = Arc::clone(&self.app);
        let naming = self.naming.clone();
        let outcome = tokio::task::spawn_blocking(move || execute(&naming, app.as_ref(), &task))
            .await
            .unwrap_or_else(|err| Err(TaskError::Panicked(panic_message(err))));

        match outcome {
            Ok(()) => {
                self.state.task_completed().await;
                info!(worker = %self.name, job = %job, %phase, task = number, "task done");
                Ok(Response::new(Empty {}))
            }
            Err(err) => {
                warn!(worker = %self.name, job = %job, %phase, task = number, %err, "task failed");
                Err(err.into())
            }
        }
    }

    async fn shutdown(&self, _request: Request<Empty>) -> Result<Response<ShutdownReply>, Status> {
        self.state.admit(Call::Shutdown).await?;

        let (n_tasks, first) = self.state.begin_drain().await;
        info!(worker = %self.name, n_tasks, "shutdown requested");
        if first && self.exit_on_shutdown {
            schedule_exit(self.exit_grace, Arc::clone(&self.exit_action));
        }
        Ok(Response::new(ShutdownReply { n_tasks }))
    }
}

/// A worker process: registers with the coordinator, then services `RunTask` and `Shutdown`
/// calls until its budget is spent or it is told to shut down.
pub struct Worker {
    config: WorkerConfig,
    app: Arc<dyn MapReduce>,
    exit_action: ExitAction,
}

impl Worker {
    pub fn new(config: WorkerConfig, app: Arc<dyn MapReduce>) -> Self {
        Self {
            config,
            app,
            exit_action: exit_process(),
        }
    }

    /// Replaces the default `process::exit(0)` run after a `Shutdown` when
    /// `exit_on_shutdown` is set.
    pub fn with_exit_action(mut self, action: ExitAction) -> Self {
        self.exit_action = action;
        self
    }

    /// Binds the listening socket, registers, and starts serving in the background.
    pub async fn start(self) -> Result<RunningWorker, WorkerError> {
        let Worker {
            config,
            app,
            exit_action,
        } = self;

        fs::create_dir_all(&config.work_dir).map_err(|source| WorkerError::WorkDir {
            path: config.work_dir.clone(),
            source,
        })?;

        let state = Arc::new(SharedState::new(config.call_budget));

        let bind_err = |source| WorkerError::Bind {
            addr: config.listen,
            source,
        };
        let listener = TcpListener::bind(config.listen).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        let name = config
            .advertise
            .clone()
            .unwrap_or_else(|| format!("http://{}", local_addr));

        register(&config.coordinator, &name).await?;
        state.set_phase(ServicePhase::Registered).await;

        let service = WorkerService {
            name: name.clone(),
            state: Arc::clone(&state),
            app,
            naming: NamingScheme::new(&config.work_dir),
            exit_on_shutdown: config.exit_on_shutdown,
            exit_grace: config.exit_grace(),
            exit_action,
        };

        state.set_phase(ServicePhase::Serving).await;
        if state.remaining_calls().await.is_exhausted() {
            state.stop.notify_one();
        }

        let stop = Arc::clone(&state);
        let server = Server::builder()
            .add_service(WorkerServer::new(service))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                stop.stopped().await
            });
        let server = tokio::spawn(server);

        info!(worker = %name, %local_addr, budget = ?config.call_budget, "worker serving");
        Ok(RunningWorker {
            name,
            local_addr,
            state,
            server,
        })
    }

    pub async fn run(self) -> Result<(), WorkerError> {
        self.start().await?.join().await
    }
}

pub struct RunningWorker {
    name: String,
    local_addr: SocketAddr,
    state: Arc<SharedState>,
    server: JoinHandle<Result<(), tonic::transport::Error>>,
}

impl RunningWorker {
    /// Identity the worker registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> Arc<SharedState> {
        Arc::clone(&self.state)
    }

    /// Waits for the server to stop listening and finish its in-flight calls.
    pub async fn join(self) -> Result<(), WorkerError> {
        let served = self.server.await;
        self.state.set_phase(ServicePhase::Stopped).await;
        let completed = self.state.completed_tasks().await;
        info!(worker = %self.name, completed, "worker stopped");
        served??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use super::proto::worker_server::Worker as WorkerRpc;
    use super::*;
    use crate::mapreduce::apps::get_app;
    use crate::mapreduce::records::read_records;
    use crate::mapreduce::util::KeyValue;

    async fn serving(budget: CallBudget) -> SharedState {
        let state = SharedState::new(budget);
        state.set_phase(ServicePhase::Serving).await;
        state
    }

    #[tokio::test]
    async fn budget_refuses_calls_once_spent() {
        let state = serving(CallBudget::Limited(2)).await;
        assert!(state.admit(Call::RunTask).await.is_ok());
        assert!(state.admit(Call::RunTask).await.is_ok());
        assert_eq!(state.remaining_calls().await, CallBudget::Limited(0));

        let refused = state.admit(Call::RunTask).await.unwrap_err();
        assert_eq!(refused.code(), tonic::Code::ResourceExhausted);
        // the exhausted budget has already asked the server to stop
        tokio::time::timeout(Duration::from_secs(1), state.stopped())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn drain_reports_completed_tasks_and_blocks_new_work() {
        let state = serving(CallBudget::Unlimited).await;
        state.task_completed().await;
        state.task_completed().await;

        assert!(state.admit(Call::Shutdown).await.is_ok());
        assert_eq!(state.begin_drain().await, (2, true));
        assert_eq!(state.phase().await, ServicePhase::Draining);

        let refused = state.admit(Call::RunTask).await.unwrap_err();
        assert_eq!(refused.code(), tonic::Code::Unavailable);

        // a second shutdown still gets an answer
        assert!(state.admit(Call::Shutdown).await.is_ok());
        assert_eq!(state.begin_drain().await, (2, false));
    }

    #[tokio::test]
    async fn calls_before_serving_are_refused() {
        let state = SharedState::new(CallBudget::Unlimited);
        assert!(state.admit(Call::RunTask).await.is_err());
        assert_eq!(state.remaining_calls().await, CallBudget::Unlimited);
    }

    #[tokio::test]
    async fn concurrent_completions_are_all_counted() {
        let state = Arc::new(serving(CallBudget::Unlimited).await);
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let state = Arc::clone(&state);
                tokio::spawn(async move { state.task_completed().await })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(state.completed_tasks().await, 32);
    }

    async fn test_service(exit_grace: Duration, exit_action: ExitAction) -> WorkerService {
        let state = Arc::new(serving(CallBudget::Unlimited).await);
        WorkerService {
            name: "test-worker".to_string(),
            state,
            app: Arc::new(get_app("wc").unwrap()),
            naming: NamingScheme::new("unused"),
            exit_on_shutdown: true,
            exit_grace,
            exit_action,
        }
    }

    #[tokio::test]
    async fn first_shutdown_schedules_exit_once_after_grace() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let grace = Duration::from_millis(200);
        let service = test_service(
            grace,
            Arc::new(move || {
                let _ = tx.send(Instant::now());
            }),
        )
        .await;

        let asked = Instant::now();
        let reply = service.shutdown(Request::new(Empty {})).await.unwrap();
        assert_eq!(reply.into_inner().n_tasks, 0);
        assert_eq!(service.state.phase().await, ServicePhase::Draining);
        assert!(rx.try_recv().is_err(), "exit ran before the grace period");

        // a repeated shutdown is answered but schedules nothing more
        service.shutdown(Request::new(Empty {})).await.unwrap();

        let fired = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(fired.duration_since(asked) >= grace);

        tokio::time::sleep(grace * 2).await;
        assert!(rx.try_recv().is_err(), "exit scheduled twice");
    }

    #[tokio::test]
    async fn no_exit_without_exit_on_shutdown() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut service = test_service(
            Duration::from_millis(10),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await;
        service.exit_on_shutdown = false;

        service.shutdown(Request::new(Empty {})).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn execute_dispatches_on_phase() {
        let dir = tempfile::tempdir().unwrap();
        let naming = NamingScheme::new(dir.path());
        let app = get_app("wc").unwrap();
        let input = dir.path().join("in");
        fs::write(&input, "b a b").unwrap();

        execute(&naming, &app, &Task::map("wc", 0, &input, 1)).unwrap();
        execute(&naming, &app, &Task::reduce("wc", 0, 1)).unwrap();

        let mut out = vec![];
        read_records(&naming.reduce_out_name("wc", 0), |kv| out.push(kv)).unwrap();
        assert_eq!(
            out,
            vec![
                KeyValue::new("a".into(), "1".into()),
                KeyValue::new("b".into(), "2".into()),
            ]
        );
    }

    #[test]
    fn panic_payload_is_reported() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let err = rt
            .block_on(async { tokio::task::spawn_blocking(|| -> u8 { panic!("boom") }).await })
            .unwrap_err();
        assert_eq!(panic_message(err), "boom");
    }
}
