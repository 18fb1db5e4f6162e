use std::path::PathBuf;

/// Derives the file names map and reduce tasks hand data through.
///
/// Every name lives directly under one working directory. The job name is followed by the
/// numeric task indices, so two distinct `(job, map, reduce)` triples never share a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingScheme {
    dir: PathBuf,
}

impl NamingScheme {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File that map task `map_task` writes for reduce task `reduce_task`.
    pub fn intermediate_name(
        &self,
        job_name: &str,
        map_task: usize,
        reduce_task: usize,
    ) -> PathBuf {
        let name = format!("mrtmp.{}-{}-{}", job_name, map_task, reduce_task);
        self.dir.join(name)
    }

    /// Output file of reduce task `reduce_task`.
    pub fn reduce_out_name(&self, job_name: &str, reduce_task: usize) -> PathBuf {
        self.dir.join(format!("mrtmp.{}-res-{}", job_name, reduce_task))
    }
}
