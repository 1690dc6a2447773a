//! Cooperative cancellation for the sync driver.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
	cancelled: AtomicBool,
	notify: Notify,
}

/// Shared stop flag, checked by the driver between blocks.
#[derive(Clone, Default)]
pub struct CancellationSignal {
	inner: Arc<Inner>,
}

impl CancellationSignal {
	pub fn new() -> Self {
		Self::default()
	}

	/// Request a stop. Idempotent.
	pub fn cancel(&self) {
		self.inner.cancelled.store(true, Ordering::SeqCst);
		self.inner.notify.notify_waiters();
	}

	pub fn is_cancelled(&self) -> bool {
		self.inner.cancelled.load(Ordering::SeqCst)
	}

	/// Resolves once `cancel` has been called.
	pub async fn cancelled(&self) {
		loop {
			let notified = self.inner.notify.notified();
			if self.is_cancelled() {
				return;
			}
			notified.await;
		}
	}

	/// Sleep for `duration` unless cancelled first.
	///
	/// # Returns
	/// `true` if the sleep was cut short by cancellation.
	pub async fn sleep(&self, duration: Duration) -> bool {
		tokio::select! {
			_ = tokio::time::sleep(duration) => self.is_cancelled(),
			_ = self.cancelled() => true,
		}
	}
}
