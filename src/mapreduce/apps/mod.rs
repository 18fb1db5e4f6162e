use std::fmt;
use std::sync::Arc;

use crate::mapreduce::util::KeyValue;

pub mod crash;
pub mod indexer;
pub mod nocrash;
pub mod wc;

pub type MapFn = fn(&str, &str) -> Vec<KeyValue>;
pub type ReduceFn = fn(&str, Vec<&str>) -> String;

/// The user functions a worker runs.
///
/// `map` receives the base name of an input file and its contents. `reduce` receives one key
/// and every value emitted for it, in no particular order.
pub trait MapReduce: Send + Sync {
    fn map(&self, filename: &str, contents: &str) -> Vec<KeyValue>;

    fn reduce(&self, key: &str, values: Vec<&str>) -> String;
}

/// A pair of plain functions.
#[derive(Clone, Copy)]
pub struct App {
    pub name: &'static str,
    pub map: MapFn,
    pub reduce: ReduceFn,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App").field("name", &self.name).finish()
    }
}

impl MapReduce for App {
    fn map(&self, filename: &str, contents: &str) -> Vec<KeyValue> {
        (self.map)(filename, contents)
    }

    fn reduce(&self, key: &str, values: Vec<&str>) -> String {
        (self.reduce)(key, values)
    }
}

pub const APP_NAMES: &[&str] = &["wc", "indexer", "nocrash", "crash"];

pub fn get_app(name: &str) -> Option<App> {
    let (name, map, reduce): (_, MapFn, ReduceFn) = match name {
        "wc" => ("wc", wc::map, wc::reduce),
        "indexer" => ("indexer", indexer::map, indexer::reduce),
        "nocrash" => ("nocrash", nocrash::map, nocrash::reduce),
        "crash" => ("crash", crash::map, crash::reduce),
        _ => return None,
    };
    Some(App { name, map, reduce })
}

pub fn get_shared_app(name: &str) -> Option<Arc<dyn MapReduce>> {
    get_app(name).map(|app| Arc::new(app) as Arc<dyn MapReduce>)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_app_resolves() {
        for name in APP_NAMES {
            assert_eq!(get_app(name).map(|a| a.name), Some(*name));
        }
        assert!(get_app("early_exit").is_none());
    }

    #[test]
    fn app_dispatches_to_its_functions() {
        let app = get_app("wc").unwrap();
        let kvs = app.map("f", "a b a");
        assert_eq!(kvs.len(), 3);
        assert_eq!(app.reduce("a", vec!["1", "1"]), "2");
    }
}
