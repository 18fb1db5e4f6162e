//! Worker side of a distributed map-reduce.
//!
//! A coordinator hands a worker map and reduce tasks over gRPC. Map tasks split their output by
//! key hash into one intermediate file per reduce task. Reduce tasks read the files addressed to
//! them, group by key and write one output file each. All files share one work directory and
//! are named by [`naming::NamingScheme`].

pub mod apps;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod map_task;
pub mod naming;
pub mod records;
pub mod reduce_task;
pub mod sequential;
pub mod task;
pub mod util;
pub mod worker;

pub mod proto {
    tonic::include_proto!("mapreduce");
}

pub use apps::{get_app, App, MapReduce};
pub use config::{CallBudget, WorkerConfig};
pub use error::{TaskError, WorkerError};
pub use naming::NamingScheme;
pub use task::{JobPhase, Task};
pub use util::KeyValue;
pub use worker::{ExitAction, RunningWorker, ServicePhase, SharedState, Worker};
