//! MemorySink - in-process store for tests and demos

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use contracts::{ContractError, DeviceMessage, RecordId, RecordSink};
use tracing::{debug, instrument};

/// 故障注入配置
#[derive(Debug, Clone, Default)]
pub struct MemorySinkConfig {
    /// 模拟存储不可用
    pub fail_ready: bool,
    /// 对这些 device_id 的写入失败
    pub fail_device_ids: HashSet<String>,
    /// 所有写入失败
    pub fail_all_writes: bool,
}

#[derive(Debug, Default)]
struct MemoryStore {
    records: Vec<DeviceMessage>,
    next_id: RecordId,
    flushes: u32,
    closed: bool,
}

fn lock(store: &Mutex<MemoryStore>) -> MutexGuard<'_, MemoryStore> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sink that keeps records in memory
///
/// Assigns increasing ids and server timestamps like a database would.
pub struct MemorySink {
    name: String,
    config: MemorySinkConfig,
    store: Arc<Mutex<MemoryStore>>,
}

impl MemorySink {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, MemorySinkConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: MemorySinkConfig) -> Self {
        Self {
            name: name.into(),
            config,
            store: Arc::new(Mutex::new(MemoryStore::default())),
        }
    }

    /// Read handle that outlives the sink
    pub fn handle(&self) -> MemorySinkHandle {
        MemorySinkHandle {
            store: self.store.clone(),
        }
    }

    fn should_fail(&self, message: &DeviceMessage) -> bool {
        self.config.fail_all_writes || self.config.fail_device_ids.contains(&message.device_id)
    }
}

impl RecordSink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_ready(&mut self) -> Result<(), ContractError> {
        if self.config.fail_ready {
            return Err(ContractError::storage_connection(
                &self.name,
                "simulated storage outage",
            ));
        }
        Ok(())
    }

    #[instrument(
        name = "memory_sink_create_record",
        skip(self, message),
        fields(sink = %self.name, device_id = %message.device_id)
    )]
    async fn create_record(&mut self, message: &DeviceMessage) -> Result<(), ContractError> {
        if self.should_fail(message) {
            return Err(ContractError::persistence(&self.name, "simulated write failure"));
        }

        let mut store = lock(&self.store);
        store.next_id += 1;
        let id = store.next_id;
        let now = Utc::now();

        let mut stored = message.clone();
        stored.id = Some(id);
        stored.created_at = Some(now);
        stored.updated_at = Some(now);
        stored.device.id = Some(id);
        stored.device.created_at = Some(now);
        stored.device.updated_at = Some(now);
        store.records.push(stored);

        debug!(id, "record stored");
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        lock(&self.store).flushes += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        lock(&self.store).closed = true;
        Ok(())
    }
}

/// Shared read access to a `MemorySink`
#[derive(Clone)]
pub struct MemorySinkHandle {
    store: Arc<Mutex<MemoryStore>>,
}

impl MemorySinkHandle {
    /// Stored records in write order
    pub fn records(&self) -> Vec<DeviceMessage> {
        lock(&self.store).records.clone()
    }

    /// Stored device ids in write order
    pub fn device_ids(&self) -> Vec<String> {
        lock(&self.store)
            .records
            .iter()
            .map(|m| m.device_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.store).records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flush_count(&self) -> u32 {
        lock(&self.store).flushes
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.store).closed
    }
}
