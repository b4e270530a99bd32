//! State-change listener bookkeeping

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::state::ConnectionState;

type StateCallback = Box<dyn Fn(&ConnectionState) + Send + Sync>;

struct ListenerSlot {
	id: u64,
	callback: StateCallback,
	removed: AtomicBool,
}

/// Ordered list of state listeners.
///
/// Notification iterates over a copy, so listeners may register or remove
/// listeners (including themselves) while being called.
#[derive(Default)]
pub(crate) struct StateListeners {
	slots: Mutex<Vec<Arc<ListenerSlot>>>,
	next_id: AtomicU64,
	closed: AtomicBool,
}

impl StateListeners {
	pub(crate) fn add(
		self: &Arc<Self>,
		callback: impl Fn(&ConnectionState) + Send + Sync + 'static,
	) -> StateListenerHandle {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let mut slots = self.slots.lock();
		// Checked under the lock so `clear` can not miss a late add
		if !self.closed.load(Ordering::Acquire) {
			slots.push(Arc::new(ListenerSlot {
				id,
				callback: Box::new(callback),
				removed: AtomicBool::new(false),
			}));
		}
		StateListenerHandle {
			listeners: Arc::downgrade(self),
			id,
		}
	}

	fn remove(&self, id: u64) {
		let mut slots = self.slots.lock();
		if let Some(pos) = slots.iter().position(|slot| slot.id == id) {
			let slot = slots.remove(pos);
			slot.removed.store(true, Ordering::Release);
		}
	}

	/// Calls every listener registered when notification starts, skipping
	/// the ones removed in the meantime.
	pub(crate) fn notify(&self, state: &ConnectionState) {
		let snapshot = self.slots.lock().clone();
		for slot in snapshot {
			if !slot.removed.load(Ordering::Acquire) {
				(slot.callback)(state);
			}
		}
	}

	/// Drops every listener and refuses new ones.
	pub(crate) fn clear(&self) {
		let mut slots = self.slots.lock();
		self.closed.store(true, Ordering::Release);
		for slot in slots.drain(..) {
			slot.removed.store(true, Ordering::Release);
		}
	}

	#[cfg(test)]
	fn len(&self) -> usize {
		self.slots.lock().len()
	}
}

/// Registration of a state listener.
///
/// The listener stays registered until the handle is dropped or
/// [`unsubscribe`](Self::unsubscribe) is called. Use
/// [`detach`](Self::detach) to keep it for the manager's lifetime.
#[must_use = "dropping the handle removes the listener"]
pub struct StateListenerHandle {
	listeners: Weak<StateListeners>,
	id: u64,
}

impl StateListenerHandle {
	/// Removes the listener. It is not called after this returns, unless
	/// it is currently running on another thread.
	pub fn unsubscribe(self) {
		drop(self)
	}

	/// Keeps the listener registered without holding the handle.
	pub fn detach(self) {
		let mut this = std::mem::ManuallyDrop::new(self);
		// Release the weak reference without removing the listener
		drop(std::mem::take(&mut this.listeners));
	}
}

impl Drop for StateListenerHandle {
	fn drop(&mut self) {
		if let Some(listeners) = self.listeners.upgrade() {
			listeners.remove(self.id);
		}
	}
}

impl std::fmt::Debug for StateListenerHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("StateListenerHandle")
			.field("id", &self.id)
			.finish()
	}
}
