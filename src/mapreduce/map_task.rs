use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use super::apps::MapReduce;
use super::error::{TaskError, TaskResult};
use super::naming::NamingScheme;
use super::records::RecordWriter;
use super::util::{ihash, KeyValue};

/// Reduce bucket a key belongs to.
pub fn bucket_for(key: &str, n_reduce: usize) -> usize {
    ihash(key) as usize % n_reduce
}

/// Splits map output into `n` buckets by key hash.
pub fn partition(keyvals: Vec<KeyValue>, n: usize) -> Vec<Vec<KeyValue>> {
    let mut res: Vec<Vec<KeyValue>> = (0..n)
        .map(|_| Vec::with_capacity(keyvals.len() / n))
        .collect();

    for keyval in keyvals {
        res[bucket_for(&keyval.key, n)].push(keyval);
    }

    res
}

/// Runs map task `map_task` of `job_name` over `input`, writing one intermediate file per
/// non-empty reduce bucket.
///
/// Buckets are staged first and renamed into place only once all of them are written, so a
/// failed attempt publishes nothing and a repeated attempt replaces the earlier output.
pub fn run_map_task(
    naming: &NamingScheme,
    job_name: &str,
    map_task: usize,
    input: &Path,
    n_reduce: usize,
    app: &dyn MapReduce,
) -> TaskResult<()> {
    if n_reduce == 0 {
        return Err(TaskError::InvalidTask(
            "map task needs at least one reduce bucket".into(),
        ));
    }

    let contents = fs::read_to_string(input).map_err(|e| TaskError::io(input, e))?;
    let file_name = input
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_else(|| input.to_string_lossy());

    let emitted = app.map(&file_name, &contents);
    debug!(job = job_name, map_task, records = emitted.len(), "map function returned");

    let mut staged = Vec::with_capacity(n_reduce);
    for (reduce_task, bucket) in partition(emitted, n_reduce).into_iter().enumerate() {
        if bucket.is_empty() {
            staged.push((reduce_task, None));
            continue;
        }
        let path = naming.intermediate_name(job_name, map_task, reduce_task);
        let mut out = RecordWriter::create(&path)?;
        for kv in &bucket {
            out.write(kv)?;
        }
        staged.push((reduce_task, Some(out.finish()?)));
    }

    for (reduce_task, file) in staged {
        match file {
            Some(file) => file.persist()?,
            None => {
                // an earlier attempt may have written this bucket
                let path = naming.intermediate_name(job_name, map_task, reduce_task);
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(TaskError::io(path, e)),
                }
            }
        }
    }

    Ok(())
}
