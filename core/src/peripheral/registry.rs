// Connected/subscribed device bookkeeping.
//
// GATT server callbacks arrive on platform threads, concurrently for
// different remote devices. All three sets live behind ONE lock so that
// removing a device on disconnect is atomic across connected,
// CMD-subscribed and DATA-subscribed; no reader can observe a
// disconnected device that is still a notify target.

use parking_lot::Mutex;
use std::collections::HashSet;

use crate::platform::DeviceId;

/// Which TX characteristic a subscription refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionChannel {
    /// CMD_TX notifications
    Command,
    /// DATA_TX notifications
    Data,
}

/// Snapshot of the registry counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryCounts {
    pub connected: usize,
    pub cmd_subscribers: usize,
    pub data_subscribers: usize,
}

#[derive(Default)]
struct RegistryInner {
    connected: HashSet<DeviceId>,
    cmd_subscribers: HashSet<DeviceId>,
    data_subscribers: HashSet<DeviceId>,
}

impl RegistryInner {
    fn set_of(&mut self, channel: SubscriptionChannel) -> &mut HashSet<DeviceId> {
        match channel {
            SubscriptionChannel::Command => &mut self.cmd_subscribers,
            SubscriptionChannel::Data => &mut self.data_subscribers,
        }
    }
}

/// Thread-safe device registry for the peripheral session.
#[derive(Default)]
pub struct DeviceRegistry {
    inner: Mutex<RegistryInner>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly connected device. Returns `false` when it was
    /// already present.
    pub fn add_connected(&self, device: DeviceId) -> bool {
        self.inner.lock().connected.insert(device)
    }

    /// Remove a device from the connected set AND both subscription
    /// sets, atomically with respect to every reader.
    pub fn remove_device(&self, device: &DeviceId) {
        let mut inner = self.inner.lock();
        inner.connected.remove(device);
        inner.cmd_subscribers.remove(device);
        inner.data_subscribers.remove(device);
    }

    pub fn is_connected(&self, device: &DeviceId) -> bool {
        self.inner.lock().connected.contains(device)
    }

    pub fn subscribe(&self, channel: SubscriptionChannel, device: DeviceId) {
        self.inner.lock().set_of(channel).insert(device);
    }

    pub fn unsubscribe(&self, channel: SubscriptionChannel, device: &DeviceId) {
        self.inner.lock().set_of(channel).remove(device);
    }

    pub fn is_subscribed(&self, channel: SubscriptionChannel, device: &DeviceId) -> bool {
        let mut inner = self.inner.lock();
        inner.set_of(channel).contains(device)
    }

    /// Snapshot of the devices currently subscribed to a channel. The
    /// streaming loop takes this at every iteration, so late subscribers
    /// miss prior blocks, departed ones are skipped.
    pub fn subscribers(&self, channel: SubscriptionChannel) -> Vec<DeviceId> {
        let mut inner = self.inner.lock();
        inner.set_of(channel).iter().cloned().collect()
    }

    /// Snapshot of the connected devices.
    pub fn connected(&self) -> Vec<DeviceId> {
        self.inner.lock().connected.iter().cloned().collect()
    }

    pub fn counts(&self) -> RegistryCounts {
        let inner = self.inner.lock();
        RegistryCounts {
            connected: inner.connected.len(),
            cmd_subscribers: inner.cmd_subscribers.len(),
            data_subscribers: inner.data_subscribers.len(),
        }
    }

    /// Drop everything. Used by `stop()`.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.connected.clear();
        inner.cmd_subscribers.clear();
        inner.data_subscribers.clear();
    }
}
