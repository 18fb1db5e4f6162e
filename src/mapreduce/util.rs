use serde::{Deserialize, Serialize};

/// A single record emitted by a map function and grouped for a reduce function.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: String, value: String) -> Self {
        KeyValue { key, value }
    }
}

/// 32-bit FNV-1a over the bytes of `key`.
///
/// Stable across processes and platforms, unlike `DefaultHasher`, so every map task routes a
/// given key to the same reduce bucket.
pub fn ihash(key: &str) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    key.bytes().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_reference_values() {
        assert_eq!(ihash(""), 0x811c_9dc5);
        assert_eq!(ihash("a"), 0xe40c_292c);
        assert_eq!(ihash("foobar"), 0xbf9c_f968);
    }

    #[test]
    fn equal_keys_hash_equal() {
        let owned = String::from("sat");
        assert_eq!(ihash("sat"), ihash(&owned));
        assert_ne!(ihash("sat"), ihash("cat"));
    }
}
