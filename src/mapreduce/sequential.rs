use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::apps::MapReduce;
use super::error::{TaskError, TaskResult};
use super::records::RecordWriter;
use super::util::KeyValue;

/// Runs a whole job in one process: map every input, group by key, reduce each key.
///
/// Gives the same per-key results as a distributed run with any number of map and reduce
/// tasks, which makes it the reference for checking one.
pub fn run_sequential<P: AsRef<Path>>(
    app: &dyn MapReduce,
    inputs: &[P],
) -> TaskResult<Vec<KeyValue>> {
    // read each input, pass to map, accumulate grouped by key
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for input in inputs {
        let input = input.as_ref();
        let contents = fs::read_to_string(input).map_err(|e| TaskError::io(input, e))?;
        let file_name = input
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| input.to_string_lossy());
        for kv in app.map(&file_name, &contents) {
            grouped.entry(kv.key).or_default().push(kv.value);
        }
    }

    Ok(grouped
        .into_iter()
        .map(|(key, values)| {
            let output = app.reduce(&key, values.iter().map(String::as_str).collect());
            KeyValue::new(key, output)
        })
        .collect())
}

/// Writes `results` as a fresh output file at `path`.
pub fn write_output(path: &Path, results: &[KeyValue]) -> TaskResult<()> {
    let mut out = RecordWriter::create(path)?;
    for kv in results {
        out.write(kv)?;
    }
    out.finish()?.persist()
}
