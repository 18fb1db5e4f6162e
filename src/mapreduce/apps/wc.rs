use crate::mapreduce::util::KeyValue;

// word count: every run of letters is a word

pub(crate) fn words(contents: &str) -> impl Iterator<Item = &str> {
    contents
        .split(|c: char| !c.is_alphabetic())
        .filter(|s| !s.is_empty())
}

pub fn map(_filename: &str, contents: &str) -> Vec<KeyValue> {
    words(contents)
        .map(|s| KeyValue::new(s.to_string(), String::from("1")))
        .collect()
}

pub fn reduce(_key: &str, values: Vec<&str>) -> String {
    values.len().to_string()
}
