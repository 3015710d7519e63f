// Reactive device cache.
//
// Lock-free concurrent storage keyed by the string device id, with a
// watch-channel snapshot rebuilt on every mutation so consumers can
// either poll cheaply or subscribe for changes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;

use decora_api::models::{Device, StateUpdate};

pub struct DeviceCache {
    by_id: DashMap<String, Arc<Device>>,

    /// Full snapshot, rebuilt on mutation for cheap subscription.
    snapshot: watch::Sender<Arc<Vec<Arc<Device>>>>,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,

    /// When the last full snapshot landed. `None` until the first one.
    refreshed_at: watch::Sender<Option<DateTime<Utc>>>,
}

impl Default for DeviceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceCache {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        let (version, _) = watch::channel(0u64);
        let (refreshed_at, _) = watch::channel(None);

        Self {
            by_id: DashMap::new(),
            snapshot,
            version,
            refreshed_at,
        }
    }

    /// Replace the cache contents with a full device list. Devices no
    /// longer present are removed.
    pub fn apply_snapshot(&self, devices: Vec<Device>) {
        let fresh: Vec<String> = devices.iter().map(Device::id_str).collect();

        self.by_id
            .retain(|id, _| fresh.iter().any(|f| f == id));
        for device in devices {
            self.by_id.insert(device.id_str(), Arc::new(device));
        }

        self.refreshed_at.send_modify(|t| *t = Some(Utc::now()));
        self.rebuild_snapshot();
        self.bump_version();
    }

    /// Merge a partial state update into the matching device, field by
    /// field. Returns `false` when the device is not cached — the
    /// update is dropped and the next full refresh reconverges.
    pub fn apply_update(&self, update: &StateUpdate) -> bool {
        let Some(mut entry) = self.by_id.get_mut(&update.device_id) else {
            debug!(device_id = %update.device_id, "update for uncached device dropped");
            return false;
        };

        let mut device = (**entry).clone();
        device.apply_patch(&update.fields);
        *entry = Arc::new(device);
        drop(entry);

        self.rebuild_snapshot();
        self.bump_version();
        true
    }

    pub fn get(&self, device_id: &str) -> Option<Arc<Device>> {
        self.by_id.get(device_id).map(|r| Arc::clone(r.value()))
    }

    /// Current snapshot (cheap `Arc` clone), sorted by name for stable
    /// listing order.
    pub fn snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Device>>>> {
        self.snapshot.subscribe()
    }

    pub fn subscribe_version(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        *self.refreshed_at.borrow()
    }

    pub fn device_ids(&self) -> Vec<String> {
        self.by_id.iter().map(|r| r.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn rebuild_snapshot(&self) {
        let mut values: Vec<Arc<Device>> =
            self.by_id.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }

    fn bump_version(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn device(id: u64, name: &str, power: &str) -> Device {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": name,
            "power": power,
            "brightness": 50,
        }))
        .unwrap()
    }

    fn update(id: &str, fields: serde_json::Value) -> StateUpdate {
        StateUpdate {
            device_id: id.to_owned(),
            fields: fields.as_object().unwrap().clone(),
        }
    }

    #[test]
    fn snapshot_replaces_and_removes() {
        let cache = DeviceCache::new();
        cache.apply_snapshot(vec![device(1, "A", "ON"), device(2, "B", "OFF")]);
        assert_eq!(cache.len(), 2);

        cache.apply_snapshot(vec![device(2, "B", "ON"), device(3, "C", "OFF")]);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("1").is_none());
        assert_eq!(cache.get("2").unwrap().power.as_deref(), Some("ON"));
        assert!(cache.get("3").is_some());
    }

    #[test]
    fn update_merges_field_wise() {
        let cache = DeviceCache::new();
        cache.apply_snapshot(vec![device(1, "A", "ON")]);

        assert!(cache.apply_update(&update("1", serde_json::json!({ "power": "OFF" }))));

        let d = cache.get("1").unwrap();
        assert_eq!(d.power.as_deref(), Some("OFF"));
        // Untouched fields keep their prior values.
        assert_eq!(d.brightness, Some(50));
        assert_eq!(d.name.as_deref(), Some("A"));
    }

    #[test]
    fn update_for_unknown_device_is_dropped() {
        let cache = DeviceCache::new();
        cache.apply_snapshot(vec![device(1, "A", "ON")]);

        assert!(!cache.apply_update(&update("99", serde_json::json!({ "power": "OFF" }))));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn subscribers_see_changes() {
        let cache = DeviceCache::new();
        let mut rx = cache.subscribe();
        assert!(rx.borrow_and_update().is_empty());

        cache.apply_snapshot(vec![device(1, "A", "ON")]);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 1);

        cache.apply_update(&update("1", serde_json::json!({ "power": "OFF" })));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow().first().unwrap().power.as_deref(), Some("OFF"));
    }

    #[test]
    fn snapshot_is_sorted_by_name() {
        let cache = DeviceCache::new();
        cache.apply_snapshot(vec![
            device(3, "Zebra", "ON"),
            device(1, "Apple", "ON"),
            device(2, "Mango", "ON"),
        ]);

        let names: Vec<_> = cache
            .snapshot()
            .iter()
            .filter_map(|d| d.name.clone())
            .collect();
        assert_eq!(names, vec!["Apple", "Mango", "Zebra"]);
    }

    #[test]
    fn refreshed_at_set_by_snapshot_only() {
        let cache = DeviceCache::new();
        assert!(cache.refreshed_at().is_none());

        cache.apply_snapshot(vec![device(1, "A", "ON")]);
        assert!(cache.refreshed_at().is_some());
    }
}
