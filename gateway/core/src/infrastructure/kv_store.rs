// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Settings Mapping Implementations
//!
//! Infrastructure implementations of [`KeyValueStore`]:
//! - **InMemoryKeyValueStore** - HashMap-backed, for tests and embedded use
//! - **FileKeyValueStore** - one JSON object on disk, for the CLI and daemon
//!
//! Both publish `StoreChanged` on the event bus after every successful write,
//! standing in for the platform's storage change notification. The file store
//! can also be watched, so writes made by another process (for example
//! `guardian sites add` next to a running `guardian serve`) are announced too.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::error::GatewayError;
use crate::domain::events::GatewayEvent;
use crate::domain::repository::KeyValueStore;
use crate::infrastructure::event_bus::EventBus;

/// Key reported in read errors raised while polling the whole file.
const WATCHED_FILE: &str = "*";

#[derive(Clone, Default)]
pub struct InMemoryKeyValueStore {
    values: Arc<RwLock<HashMap<String, Value>>>,
    event_bus: Option<EventBus>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_bus(event_bus: EventBus) -> Self {
        Self {
            event_bus: Some(event_bus),
            ..Self::default()
        }
    }

    /// Make every following read fail, as if the mapping were unavailable.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every following write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, GatewayError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(GatewayError::StoreRead {
                key: key.to_string(),
                message: "store unavailable".to_string(),
            });
        }
        Ok(self.values.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), GatewayError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(GatewayError::StoreWrite {
                key: key.to_string(),
                message: "store unavailable".to_string(),
            });
        }
        self.values.write().insert(key.to_string(), value);
        if let Some(bus) = &self.event_bus {
            bus.publish(GatewayEvent::store_changed(key));
        }
        Ok(())
    }
}

/// JSON-object file store. Writes go to a sibling temp file and are renamed into place.
pub struct FileKeyValueStore {
    path: PathBuf,
    event_bus: Option<EventBus>,
    write_lock: Mutex<()>,
    /// File contents as of our last write or poll.
    seen: RwLock<Option<Map<String, Value>>>,
}

impl FileKeyValueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            event_bus: None,
            write_lock: Mutex::new(()),
            seen: RwLock::new(None),
        }
    }

    pub fn with_event_bus(path: impl Into<PathBuf>, event_bus: EventBus) -> Self {
        Self {
            event_bus: Some(event_bus),
            ..Self::new(path)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start polling the file every `interval`. The current contents become the baseline.
    pub async fn watch(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        self.poll_changes().await;
        info!(path = %self.path.display(), interval = ?interval, "Watching settings file");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.poll_changes().await;
            }
        })
    }

    /// Compare the file with what we saw last and publish `StoreChanged` for every key
    /// that differs. Returns the changed keys. The first call only records a baseline.
    pub async fn poll_changes(&self) -> Vec<String> {
        let _guard = self.write_lock.lock().await;
        let current = match self.read_all(WATCHED_FILE).await {
            Ok(current) => current,
            Err(e) => {
                warn!("Cannot poll settings file: {}", e);
                return Vec::new();
            }
        };

        let Some(previous) = self.seen.write().replace(current.clone()) else {
            return Vec::new();
        };
        let mut changed: Vec<String> = previous
            .keys()
            .chain(current.keys())
            .filter(|key| previous.get(*key) != current.get(*key))
            .cloned()
            .collect();
        changed.sort();
        changed.dedup();

        for key in &changed {
            debug!(path = %self.path.display(), key, "Settings changed outside this process");
            if let Some(bus) = &self.event_bus {
                bus.publish(GatewayEvent::store_changed(key.clone()));
            }
        }
        changed
    }

    async fn read_all(&self, key: &str) -> Result<Map<String, Value>, GatewayError> {
        let read_error = |message: String| GatewayError::StoreRead {
            key: key.to_string(),
            message,
        };

        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Map::new()),
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(map)) => Ok(map),
                Ok(_) => Err(read_error(format!(
                    "{} does not contain a JSON object",
                    self.path.display()
                ))),
                Err(e) => Err(read_error(e.to_string())),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(read_error(e.to_string())),
        }
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, GatewayError> {
        Ok(self.read_all(key).await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), GatewayError> {
        let write_error = |message: String| GatewayError::StoreWrite {
            key: key.to_string(),
            message,
        };

        let _guard = self.write_lock.lock().await;
        let mut all = self
            .read_all(key)
            .await
            .map_err(|e| write_error(e.to_string()))?;
        all.insert(key.to_string(), value);

        let body = serde_json::to_vec_pretty(&all)
            .map_err(|e| write_error(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| write_error(e.to_string()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| write_error(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| write_error(e.to_string()))?;

        *self.seen.write() = Some(all);
        debug!(path = %self.path.display(), key, "Persisted settings");
        if let Some(bus) = &self.event_bus {
            bus.publish(GatewayEvent::store_changed(key));
        }
        Ok(())
    }
}
