use std::fmt;
use std::path::PathBuf;

use super::error::TaskError;
use super::proto;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Map,
    Reduce,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPhase::Map => f.write_str("map"),
            JobPhase::Reduce => f.write_str("reduce"),
        }
    }
}

impl From<JobPhase> for proto::JobPhase {
    fn from(phase: JobPhase) -> Self {
        match phase {
            JobPhase::Map => proto::JobPhase::Map,
            JobPhase::Reduce => proto::JobPhase::Reduce,
        }
    }
}

/// One unit of work handed to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub job_name: String,
    pub phase: JobPhase,
    pub task_number: usize,
    /// Input partition of a map task. Reduce tasks locate their inputs by name.
    pub file: Option<PathBuf>,
    /// Reduce bucket count for a map task, map task count for a reduce task.
    pub num_other_phase: usize,
}

impl Task {
    pub fn map(
        job_name: impl Into<String>,
        task_number: usize,
        file: impl Into<PathBuf>,
        n_reduce: usize,
    ) -> Self {
        Task {
            job_name: job_name.into(),
            phase: JobPhase::Map,
            task_number,
            file: Some(file.into()),
            num_other_phase: n_reduce,
        }
    }

    pub fn reduce(job_name: impl Into<String>, task_number: usize, n_map: usize) -> Self {
        Task {
            job_name: job_name.into(),
            phase: JobPhase::Reduce,
            task_number,
            file: None,
            num_other_phase: n_map,
        }
    }
}

impl TryFrom<proto::RunTaskArgs> for Task {
    type Error = TaskError;

    fn try_from(args: proto::RunTaskArgs) -> Result<Self, Self::Error> {
        let phase = match proto::JobPhase::try_from(args.phase) {
            Ok(proto::JobPhase::Map) => JobPhase::Map,
            Ok(proto::JobPhase::Reduce) => JobPhase::Reduce,
            Err(_) => {
                return Err(TaskError::InvalidTask(format!(
                    "unknown phase {}",
                    args.phase
                )))
            }
        };

        if args.job_name.is_empty() {
            return Err(TaskError::InvalidTask("empty job name".into()));
        }
        // job names become part of file names in the shared work directory
        if args.job_name.contains(['/', '\\']) || args.job_name == "." || args.job_name == ".." {
            return Err(TaskError::InvalidTask(format!(
                "job name {:?} is not a plain file name component",
                args.job_name
            )));
        }
        if args.num_other_phase == 0 {
            return Err(TaskError::InvalidTask(format!(
                "{} task needs at least one {} task on the other side",
                phase,
                match phase {
                    JobPhase::Map => JobPhase::Reduce,
                    JobPhase::Reduce => JobPhase::Map,
                }
            )));
        }

        let file = match phase {
            JobPhase::Map if args.file.is_empty() => {
                return Err(TaskError::InvalidTask("map task without input file".into()))
            }
            JobPhase::Map => Some(PathBuf::from(args.file)),
            JobPhase::Reduce => None,
        };

        Ok(Task {
            job_name: args.job_name,
            phase,
            task_number: args.task_number as usize,
            file,
            num_other_phase: args.num_other_phase as usize,
        })
    }
}

impl From<&Task> for proto::RunTaskArgs {
    fn from(task: &Task) -> Self {
        proto::RunTaskArgs {
            job_name: task.job_name.clone(),
            phase: proto::JobPhase::from(task.phase) as i32,
            task_number: task.task_number as u32,
            file: task
                .file
                .as_ref()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default(),
            num_other_phase: task.num_other_phase as u32,
        }
    }
}
