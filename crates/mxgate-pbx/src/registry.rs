//! Monitor registry
//!
//! Maps live PBX monitors both by cross-reference id (the dispatch path)
//! and by extension (the start/stop path). The two indices live behind one
//! lock so removals update both atomically; start/stop sequences are
//! additionally serialized so concurrent calls keep the one-monitor-per-
//! extension invariant.

use crate::broker::Broker;
use crate::commands::{self, MonitorStart, MonitorStop};
use crate::events;
use crate::transport::Transport;
use mxgate_core::GatewayResult;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// One live monitor: PBX cross-ref id, the monitored extension and its
/// event broker.
pub struct MonitorEntry {
    pub monitor_id: i64,
    pub extension: String,
    pub broker: Broker,
}

#[derive(Default)]
struct Indices {
    by_id: HashMap<i64, Arc<MonitorEntry>>,
    by_ext: HashMap<String, i64>,
}

/// Registry of live monitors for one PBX session.
#[derive(Default)]
pub struct MonitorRegistry {
    inner: RwLock<Indices>,
    /// Serializes start/stop sequences (registry mutation + PBX command).
    ops: tokio::sync::Mutex<()>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start monitoring `ext`. A second start for the same extension is a
    /// no-op returning the existing monitor id.
    pub async fn start(&self, transport: &Transport, ext: &str) -> GatewayResult<i64> {
        let _ops = self.ops.lock().await;
        if let Some(id) = self.monitor_id(ext) {
            debug!(ext = %ext, monitor_id = id, "monitor already running");
            return Ok(id);
        }

        let reply = transport
            .send_await(&commands::to_xml(&MonitorStart::device(ext))?)
            .await?;
        let monitor_id = events::monitor_cross_ref(&reply)?;

        let entry = Arc::new(MonitorEntry {
            monitor_id,
            extension: ext.to_string(),
            broker: Broker::new(),
        });
        let mut inner = self.inner.write().expect("registry lock");
        inner.by_id.insert(monitor_id, Arc::clone(&entry));
        inner.by_ext.insert(ext.to_string(), monitor_id);
        drop(inner);

        info!(ext = %ext, monitor_id, "monitor started");
        Ok(monitor_id)
    }

    /// Stop monitoring `ext`. Unknown extensions are a no-op.
    ///
    /// The registry entry is removed and its broker closed before the
    /// `MonitorStop` command goes out, so a concurrent event for the old
    /// id is already treated as unmonitored.
    pub async fn stop(&self, transport: &Transport, ext: &str) -> GatewayResult<()> {
        let _ops = self.ops.lock().await;
        let entry = {
            let mut inner = self.inner.write().expect("registry lock");
            match inner.by_ext.remove(ext) {
                Some(id) => inner.by_id.remove(&id),
                None => None,
            }
        };
        let Some(entry) = entry else {
            debug!(ext = %ext, "no monitor to stop");
            return Ok(());
        };

        entry.broker.close();
        transport
            .send_await(&commands::to_xml(&MonitorStop {
                monitor_cross_ref_id: entry.monitor_id,
            })?)
            .await?;

        info!(ext = %ext, monitor_id = entry.monitor_id, "monitor stopped");
        Ok(())
    }

    /// Dispatch-path lookup by PBX cross-ref id.
    pub fn lookup(&self, monitor_id: i64) -> Option<Arc<MonitorEntry>> {
        self.inner
            .read()
            .expect("registry lock")
            .by_id
            .get(&monitor_id)
            .cloned()
    }

    /// Lookup by extension.
    pub fn by_extension(&self, ext: &str) -> Option<Arc<MonitorEntry>> {
        let inner = self.inner.read().expect("registry lock");
        let id = inner.by_ext.get(ext)?;
        inner.by_id.get(id).cloned()
    }

    /// Monitor id for an extension, if monitored.
    pub fn monitor_id(&self, ext: &str) -> Option<i64> {
        self.inner
            .read()
            .expect("registry lock")
            .by_ext
            .get(ext)
            .copied()
    }

    /// Subscriber counts per monitored extension.
    pub fn connection_info(&self) -> HashMap<String, usize> {
        self.inner
            .read()
            .expect("registry lock")
            .by_id
            .values()
            .map(|entry| (entry.extension.clone(), entry.broker.connected()))
            .collect()
    }

    /// Drop every monitor and close its broker. Used when the session
    /// dies; no PBX commands are issued.
    pub fn close_all(&self) {
        let entries: Vec<Arc<MonitorEntry>> = {
            let mut inner = self.inner.write().expect("registry lock");
            inner.by_ext.clear();
            inner.by_id.drain().map(|(_, entry)| entry).collect()
        };
        for entry in entries {
            entry.broker.close();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("registry lock").by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn insert(&self, entry: MonitorEntry) -> Arc<MonitorEntry> {
        let entry = Arc::new(entry);
        let mut inner = self.inner.write().expect("registry lock");
        inner
            .by_ext
            .insert(entry.extension.clone(), entry.monitor_id);
        inner.by_id.insert(entry.monitor_id, Arc::clone(&entry));
        entry
    }
}
