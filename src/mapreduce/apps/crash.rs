use crate::mapreduce::util::KeyValue;

use rand::Rng;

use std::thread::sleep;
use std::time::Duration;

use super::nocrash;

// sometimes panics and sometimes takes a long time, so a coordinator
// sees both failed and slow RunTask replies

fn maybe_crash() {
    let mut rng = rand::thread_rng();
    if rng.gen_range(0..1000) < 330 {
        panic!("worker crashed!");
    } else if rng.gen_range(0..1000) < 660 {
        let ms = rng.gen_range(0..10_000);
        sleep(Duration::from_millis(ms));
    }
}

pub fn map(filename: &str, contents: &str) -> Vec<KeyValue> {
    maybe_crash();
    nocrash::map(filename, contents)
}

pub fn reduce(key: &str, values: Vec<&str>) -> String {
    maybe_crash();
    nocrash::reduce(key, values)
}
