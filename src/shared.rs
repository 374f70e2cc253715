//! Sharing one [`ClientManager`] between execution contexts.
//!
//! The manager itself does no locking. When an interrupt handler, a second
//! executor or another thread needs it, put it behind an `embassy-sync`
//! blocking mutex and go through [`with_manager`]:
//!
//! ```ignore
//! use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
//!
//! static MQTT: StaticCell<SharedClientManager<CriticalSectionRawMutex>> = StaticCell::new();
//! let mqtt = MQTT.init(shared(manager));
//!
//! with_manager(mqtt, |m| m.publish("dev/state", b"online", QoS::AtMostOnce, true));
//! ```

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::backend::MAX_BACKENDS;
use crate::manager::ClientManager;

/// A [`ClientManager`] behind a blocking mutex of flavour `R`.
pub type SharedClientManager<R, const N: usize = MAX_BACKENDS> = Mutex<R, RefCell<ClientManager<N>>>;

pub fn shared<R: RawMutex, const N: usize>(manager: ClientManager<N>) -> SharedClientManager<R, N> {
    Mutex::new(RefCell::new(manager))
}

/// Runs `f` with exclusive access to the manager.
///
/// Returns `None` without running `f` when called from inside another
/// `with_manager` on the same manager, e.g. from a message callback.
pub fn with_manager<R, const N: usize, T, F>(shared: &SharedClientManager<R, N>, f: F) -> Option<T>
where
    R: RawMutex,
    F: FnOnce(&mut ClientManager<N>) -> T,
{
    shared.lock(|cell| match cell.try_borrow_mut() {
        Ok(mut manager) => Some(f(&mut manager)),
        Err(_) => {
            warn!("client manager is already in use");
            None
        }
    })
}
