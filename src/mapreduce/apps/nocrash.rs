use crate::mapreduce::util::KeyValue;

// same as crash but never fails; its output is the baseline crash runs are compared against

pub fn map(filename: &str, contents: &str) -> Vec<KeyValue> {
    vec![
        KeyValue::new("a".to_owned(), filename.to_owned()),
        KeyValue::new("b".to_owned(), filename.len().to_string()),
        KeyValue::new("c".to_owned(), contents.len().to_string()),
        KeyValue::new("d".to_owned(), "xyzzy".to_owned()),
    ]
}

pub fn reduce(_key: &str, mut values: Vec<&str>) -> String {
    values.sort_unstable();
    values.join(" ")
}
