//! Key-value storage behind every component.
//!
//! Records are JSON documents. Set-valued fields are only ever changed
//! through [`KvStore::update`], so two requests adding different ids to the
//! same set cannot overwrite each other on a backend with an atomic update.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Outcome of an [`KvStore::update`] closure.
pub enum Write {
    Keep,
    Put(Vec<u8>),
    Delete,
}

pub type UpdateFn<'a> = dyn FnMut(Option<Vec<u8>>) -> anyhow::Result<Write> + 'a;

pub trait KvStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;
    fn delete(&self, key: &str) -> anyhow::Result<()>;
    /// Read-modify-write of a single key.
    fn update(&self, key: &str, f: &mut UpdateFn<'_>) -> anyhow::Result<()>;
}

/// In-process store used by the native server and by tests. `update` holds
/// the lock for the whole read-modify-write.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.lock()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn update(&self, key: &str, f: &mut UpdateFn<'_>) -> anyhow::Result<()> {
        let mut entries = self.lock()?;
        match f(entries.get(key).cloned())? {
            Write::Keep => {}
            Write::Put(value) => {
                entries.insert(key.to_string(), value);
            }
            Write::Delete => {
                entries.remove(key);
            }
        }
        Ok(())
    }
}

/// Spin's key-value API has no compare-and-swap, so `update` is a plain
/// get-then-set here.
impl KvStore for spin_sdk::key_value::Store {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(spin_sdk::key_value::Store::get(self, key)?)
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        Ok(spin_sdk::key_value::Store::set(self, key, value)?)
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        Ok(spin_sdk::key_value::Store::delete(self, key)?)
    }

    fn update(&self, key: &str, f: &mut UpdateFn<'_>) -> anyhow::Result<()> {
        let current = KvStore::get(self, key)?;
        match f(current)? {
            Write::Keep => Ok(()),
            Write::Put(value) => KvStore::set(self, key, &value),
            Write::Delete => KvStore::delete(self, key),
        }
    }
}

/// JSON helpers available on every store, including `dyn KvStore`.
pub trait KvStoreExt: KvStore {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        self.set(key, &serde_json::to_vec(value)?)
    }

    /// Applies `f` to an existing record and writes it back if `f` succeeds.
    /// Returns `Ok(None)` without calling `f` when the key is absent.
    fn modify_json<T, R, E, F>(&self, key: &str, f: F) -> Result<Option<R>, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<anyhow::Error>,
        F: FnOnce(&mut T) -> Result<R, E>,
    {
        let mut f = Some(f);
        let mut outcome: Option<Result<R, E>> = None;
        self.update(key, &mut |current: Option<Vec<u8>>| -> anyhow::Result<Write> {
            let (Some(bytes), Some(f)) = (current, f.take()) else {
                return Ok(Write::Keep);
            };
            let mut record: T = serde_json::from_slice(&bytes)?;
            match f(&mut record) {
                Ok(value) => {
                    outcome = Some(Ok(value));
                    Ok(Write::Put(serde_json::to_vec(&record)?))
                }
                Err(err) => {
                    outcome = Some(Err(err));
                    Ok(Write::Keep)
                }
            }
        })?;
        outcome.transpose()
    }

    /// Like [`KvStoreExt::modify_json`] but starts from `T::default()` when the
    /// key is absent.
    fn upsert_json<T, R, F>(&self, key: &str, f: F) -> anyhow::Result<R>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut T) -> R,
    {
        let mut f = Some(f);
        let mut outcome = None;
        self.update(key, &mut |current: Option<Vec<u8>>| -> anyhow::Result<Write> {
            let mut record: T = match current {
                Some(bytes) => serde_json::from_slice(&bytes)?,
                None => T::default(),
            };
            if let Some(f) = f.take() {
                outcome = Some(f(&mut record));
            }
            Ok(Write::Put(serde_json::to_vec(&record)?))
        })?;
        outcome.ok_or_else(|| anyhow::anyhow!("update closure for {key} was not run"))
    }
}

impl<S: KvStore + ?Sized> KvStoreExt for S {}
