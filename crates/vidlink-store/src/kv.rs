//! Key-value storage trait and typed helpers.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use vidlink_core::Result;

/// Flat string-keyed durable store. Last write wins per key.
pub trait KeyValueStore: Send + Sync {
    /// Read a key. `None` if absent or cleared.
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write a key. Writing `Value::Null` clears it.
    fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Typed access over any [`KeyValueStore`].
pub trait KeyValueStoreExt: KeyValueStore {
    /// Read and deserialize. A value that no longer matches `T` reads as `None`.
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        Ok(self
            .get(key)?
            .and_then(|v| serde_json::from_value(v).ok()))
    }

    fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, serde_json::to_value(value)?)
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}
