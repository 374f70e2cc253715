//! Backend registration and lookup.

use alloc::boxed::Box;
use core::fmt;

use heapless::{String, Vec};

use super::traits::{Capabilities, MqttBackend};
use crate::error::ErrorKind;

/// Default number of backends a registry can hold.
pub const MAX_BACKENDS: usize = 8;

/// Maximum length for a backend name.
pub const MAX_BACKEND_NAME_LEN: usize = 32;

/// A registered backend: its unique name, the capabilities it declared at
/// registration time and the implementation itself.
///
/// Descriptors are owned by the [`BackendRegistry`] and only handed out by
/// reference.
pub struct BackendDescriptor {
    name: String<MAX_BACKEND_NAME_LEN>,
    capabilities: Capabilities,
    backend: Box<dyn MqttBackend>,
}

impl BackendDescriptor {
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn version(&self) -> &str {
        self.backend.version()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn has(&self, capability: Capabilities) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn backend(&self) -> &dyn MqttBackend {
        self.backend.as_ref()
    }

    pub(crate) fn backend_mut(&mut self) -> &mut dyn MqttBackend {
        self.backend.as_mut()
    }
}

impl fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("name", &self.name.as_str())
            .field("version", &self.version())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// Why a registration was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegisterError {
    EmptyName,
    NameTooLong,
    /// The backend lacks the listed required operations.
    Incomplete(Capabilities),
    AlreadyRegistered,
    Full,
}

impl RegisterError {
    pub const fn as_str(self) -> &'static str {
        match self {
            RegisterError::EmptyName => "Backend name is empty",
            RegisterError::NameTooLong => "Backend name is too long",
            RegisterError::Incomplete(_) => "Incomplete backend operations",
            RegisterError::AlreadyRegistered => "Backend already registered",
            RegisterError::Full => "Too many backends registered",
        }
    }
}

impl fmt::Display for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RegisterError> for ErrorKind {
    fn from(err: RegisterError) -> Self {
        match err {
            RegisterError::EmptyName | RegisterError::NameTooLong | RegisterError::Incomplete(_) => {
                ErrorKind::InvalidParam
            }
            RegisterError::AlreadyRegistered => ErrorKind::AlreadyRegistered,
            RegisterError::Full => ErrorKind::CapacityExceeded,
        }
    }
}

/// A bounded, insertion-ordered table of named backends.
///
/// # Example
///
/// ```ignore
/// let mut registry = BackendRegistry::<8>::new();
/// registry.register("pubsub", Box::new(PubSubBackend::<_, 512>::new(transport)))?;
///
/// for descriptor in registry.iter() {
///     info!("{} v{}", descriptor.name(), descriptor.version());
/// }
/// ```
pub struct BackendRegistry<const MAX: usize = MAX_BACKENDS> {
    entries: Vec<BackendDescriptor, MAX>,
}

impl<const MAX: usize> Default for BackendRegistry<MAX> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<const MAX: usize> BackendRegistry<MAX> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend under `name`.
    ///
    /// The backend's capabilities are read once here and must include
    /// [`Capabilities::REQUIRED`].
    pub fn register(
        &mut self,
        name: &str,
        backend: Box<dyn MqttBackend>,
    ) -> Result<(), RegisterError> {
        if name.is_empty() {
            return Err(RegisterError::EmptyName);
        }

        let mut owned = String::new();
        if owned.push_str(name).is_err() {
            return Err(RegisterError::NameTooLong);
        }

        let capabilities = backend.capabilities();
        if !capabilities.is_complete() {
            return Err(RegisterError::Incomplete(capabilities.missing_required()));
        }

        if self.position(name).is_some() {
            return Err(RegisterError::AlreadyRegistered);
        }

        self.entries
            .push(BackendDescriptor {
                name: owned,
                capabilities,
                backend,
            })
            .map_err(|_| RegisterError::Full)
    }

    /// Look up a backend by exact name.
    pub fn find(&self, name: &str) -> Option<&BackendDescriptor> {
        self.entries.iter().find(|d| d.name.as_str() == name)
    }

    /// Index of the backend called `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|d| d.name.as_str() == name)
    }

    pub fn get(&self, index: usize) -> Option<&BackendDescriptor> {
        self.entries.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut BackendDescriptor> {
        self.entries.get_mut(index)
    }

    /// Snapshot of at most `max` descriptors, in registration order.
    pub fn list(&self, max: usize) -> Vec<&BackendDescriptor, MAX> {
        self.entries.iter().take(max).collect()
    }

    /// Get an iterator over the registered backends.
    pub fn iter(&self) -> impl Iterator<Item = &BackendDescriptor> {
        self.entries.iter()
    }

    /// Get the number of registered backends.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        MAX
    }
}
