// One-shot waiter slots for the awaited GATT steps.
//
// `connect()` runs its sub-steps strictly one at a time, so a single
// optional slot per step suffices: armed before the platform call is
// issued, completed from the platform callback, failed as a group on any
// terminal disconnect so no waiter ever blocks until its timeout.

use parking_lot::Mutex;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::CentralError;
use crate::platform::{AdvertisedDevice, ServiceInfo};

type Slot<T> = Mutex<Option<oneshot::Sender<Result<T, CentralError>>>>;

fn arm<T>(slot: &Slot<T>) -> oneshot::Receiver<Result<T, CentralError>> {
    let (tx, rx) = oneshot::channel();
    // A stale sender from an abandoned attempt is simply dropped; its
    // receiver is gone too.
    *slot.lock() = Some(tx);
    rx
}

fn resolve<T>(slot: &Slot<T>, value: Result<T, CentralError>) {
    if let Some(tx) = slot.lock().take() {
        let _ = tx.send(value);
    }
}

/// The waiter table. One instance per central session.
#[derive(Default)]
pub struct StepWaiters {
    scan: Slot<AdvertisedDevice>,
    bond: Slot<()>,
    connect: Slot<()>,
    discover: Slot<Vec<ServiceInfo>>,
    mtu: Slot<u16>,
    descriptor: Slot<Uuid>,
}

impl StepWaiters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm_scan(&self) -> oneshot::Receiver<Result<AdvertisedDevice, CentralError>> {
        arm(&self.scan)
    }

    pub fn disarm_scan(&self) {
        self.scan.lock().take();
    }

    pub fn complete_scan(&self, device: AdvertisedDevice) {
        resolve(&self.scan, Ok(device));
    }

    pub fn arm_bond(&self) -> oneshot::Receiver<Result<(), CentralError>> {
        arm(&self.bond)
    }

    pub fn complete_bond(&self) {
        resolve(&self.bond, Ok(()));
    }

    pub fn fail_bond(&self, error: CentralError) {
        resolve(&self.bond, Err(error));
    }

    pub fn arm_connect(&self) -> oneshot::Receiver<Result<(), CentralError>> {
        arm(&self.connect)
    }

    pub fn complete_connect(&self) {
        resolve(&self.connect, Ok(()));
    }

    pub fn arm_discover(&self) -> oneshot::Receiver<Result<Vec<ServiceInfo>, CentralError>> {
        arm(&self.discover)
    }

    pub fn complete_discover(&self, services: Vec<ServiceInfo>) {
        resolve(&self.discover, Ok(services));
    }

    pub fn arm_mtu(&self) -> oneshot::Receiver<Result<u16, CentralError>> {
        arm(&self.mtu)
    }

    pub fn complete_mtu(&self, mtu: u16) {
        resolve(&self.mtu, Ok(mtu));
    }

    pub fn arm_descriptor(&self) -> oneshot::Receiver<Result<Uuid, CentralError>> {
        arm(&self.descriptor)
    }

    pub fn complete_descriptor(&self, characteristic: Uuid) {
        resolve(&self.descriptor, Ok(characteristic));
    }

    /// Fail every armed waiter. Called on terminal disconnects and on
    /// teardown so in-flight `connect()` steps fail immediately instead
    /// of running into their timeouts.
    pub fn fail_all(&self, error: &CentralError) {
        resolve(&self.scan, Err(error.clone()));
        resolve(&self.bond, Err(error.clone()));
        resolve(&self.connect, Err(error.clone()));
        resolve(&self.discover, Err(error.clone()));
        resolve(&self.mtu, Err(error.clone()));
        resolve(&self.descriptor, Err(error.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_complete_resolves_armed_waiter() {
        let waiters = StepWaiters::new();
        let rx = waiters.arm_mtu();
        waiters.complete_mtu(247);
        assert_eq!(rx.await.unwrap().unwrap(), 247);
    }

    #[tokio::test]
    async fn test_complete_without_waiter_is_noop() {
        let waiters = StepWaiters::new();
        // No panic, nothing armed
        waiters.complete_mtu(247);
        waiters.complete_connect();
    }

    #[tokio::test]
    async fn test_fail_all_resolves_every_armed_slot() {
        let waiters = StepWaiters::new();
        let bond = waiters.arm_bond();
        let connect = waiters.arm_connect();
        let mtu = waiters.arm_mtu();

        waiters.fail_all(&CentralError::ConnectionLost);

        assert!(matches!(
            bond.await.unwrap(),
            Err(CentralError::ConnectionLost)
        ));
        assert!(matches!(
            connect.await.unwrap(),
            Err(CentralError::ConnectionLost)
        ));
        assert!(matches!(mtu.await.unwrap(), Err(CentralError::ConnectionLost)));
    }

    #[tokio::test]
    async fn test_rearming_replaces_stale_waiter() {
        let waiters = StepWaiters::new();
        let stale = waiters.arm_connect();
        let fresh = waiters.arm_connect();

        waiters.complete_connect();

        // The stale receiver sees a dropped sender, the fresh one the value
        assert!(stale.await.is_err());
        assert!(fresh.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_disarm_scan_drops_sender() {
        let waiters = StepWaiters::new();
        let rx = waiters.arm_scan();
        waiters.disarm_scan();
        assert!(rx.await.is_err());
    }
}
