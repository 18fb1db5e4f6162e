use std::collections::BTreeMap;

use tracing::debug;

use super::apps::MapReduce;
use super::error::{TaskError, TaskResult};
use super::naming::NamingScheme;
use super::records::{read_records, RecordWriter};
use super::util::KeyValue;

/// Collects the values for every key across the intermediate files of all `n_map` map tasks
/// addressed to `reduce_task`. Files a map task never wrote count as empty.
pub fn gather(
    naming: &NamingScheme,
    job_name: &str,
    reduce_task: usize,
    n_map: usize,
) -> TaskResult<BTreeMap<String, Vec<String>>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for map_task in 0..n_map {
        let path = naming.intermediate_name(job_name, map_task, reduce_task);
        let found = read_records(&path, |kv| {
            grouped.entry(kv.key).or_default().push(kv.value);
        })?;
        if !found {
            debug!(
                job = job_name,
                map_task,
                reduce_task,
                "no intermediate file, treating as empty"
            );
        }
    }

    Ok(grouped)
}

/// Runs reduce task `reduce_task` of `job_name` and writes one record per distinct key, in
/// ascending byte order of the keys, to the task's output file. The file only appears once
/// every key has been reduced.
pub fn run_reduce_task(
    naming: &NamingScheme,
    job_name: &str,
    reduce_task: usize,
    n_map: usize,
    app: &dyn MapReduce,
) -> TaskResult<()> {
    if n_map == 0 {
        return Err(TaskError::InvalidTask(
            "reduce task needs at least one map task".into(),
        ));
    }

    let grouped = gather(naming, job_name, reduce_task, n_map)?;
    debug!(
        job = job_name,
        reduce_task,
        keys = grouped.len(),
        "grouped intermediate records"
    );

    let path = naming.reduce_out_name(job_name, reduce_task);
    let mut out = RecordWriter::create(&path)?;
    for (key, values) in grouped {
        let output = app.reduce(&key, values.iter().map(String::as_str).collect());
        out.write(&KeyValue::new(key, output))?;
    }
    out.finish()?.persist()
}
