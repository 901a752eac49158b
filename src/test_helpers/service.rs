use std::sync::{
    Mutex,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;

use crate::{
    models::{Destination, Notification},
    notification::{NotificationError, NotificationService},
};

/// A notification delivered to a [`RecordingService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    /// The rendered notification.
    pub notification: Notification,
    /// Where it was sent.
    pub destination: Destination,
}

/// A notification service that records deliveries in memory.
///
/// It can be switched to fail or to panic on the next deliveries, to
/// exercise the failure paths of the controller.
#[derive(Debug, Default)]
pub struct RecordingService {
    sent: Mutex<Vec<SentNotification>>,
    failing: AtomicBool,
    panicking: AtomicBool,
}

impl RecordingService {
    /// Creates a service that accepts every notification.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent deliveries fail, or succeed again.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes subsequent deliveries panic, or succeed again.
    pub fn set_panicking(&self, panicking: bool) {
        self.panicking.store(panicking, Ordering::SeqCst);
    }

    /// Deliveries recorded so far.
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of deliveries recorded so far.
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Messages recorded so far, in delivery order.
    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|s| s.notification.message.clone()).collect()
    }
}

#[async_trait]
impl NotificationService for RecordingService {
    async fn send(
        &self,
        notification: &Notification,
        destination: &Destination,
    ) -> Result<(), NotificationError> {
        if self.panicking.load(Ordering::SeqCst) {
            panic!("recording service panicked for {destination}");
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::NotifyFailed(format!("delivery to {destination} refused")));
        }
        self.sent.lock().unwrap().push(SentNotification {
            notification: notification.clone(),
            destination: destination.clone(),
        });
        Ok(())
    }
}
