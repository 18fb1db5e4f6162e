use crate::mapreduce::util::KeyValue;

use std::collections::BTreeSet;

use super::wc::words;

// inverted index: word -> documents containing it

pub fn map(filename: &str, contents: &str) -> Vec<KeyValue> {
    let unique: BTreeSet<&str> = words(contents).collect();

    unique
        .into_iter()
        .map(|s| KeyValue::new(s.to_owned(), filename.to_owned()))
        .collect()
}

pub fn reduce(_key: &str, mut values: Vec<&str>) -> String {
    values.sort_unstable();
    values.dedup();
    format!("{} {}", values.len(), values.join(","))
}
