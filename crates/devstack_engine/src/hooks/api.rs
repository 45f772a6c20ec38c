use core::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::events::ProvisionEvent;

type Observer = Arc<dyn Fn(&ProvisionEvent) + Send + Sync>;

/// Errors that can occur during hook registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookRegistrationError {
    /// An observer with this name is already registered.
    DuplicateName(String),
}

impl fmt::Display for HookRegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookRegistrationError::DuplicateName(name) => {
                write!(f, "hook '{name}' is already registered")
            }
        }
    }
}

impl core::error::Error for HookRegistrationError {}

struct HookEntry {
    name: String,
    observer: Observer,
}

/// Registry of named provisioning observers.
///
/// Uses interior mutability so hooks can be registered through a shared
/// reference to the engine. Observers run in registration order and must not
/// register further hooks.
#[derive(Default)]
pub struct ProvisionHooks {
    hooks: RwLock<Vec<HookEntry>>,
}

impl fmt::Debug for ProvisionHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.hooks.read().iter().map(|e| e.name.clone()).collect();
        f.debug_struct("ProvisionHooks").field("hooks", &names).finish()
    }
}

impl ProvisionHooks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer that receives every event.
    ///
    /// # Errors
    ///
    /// Returns [`HookRegistrationError::DuplicateName`] if `name` is taken.
    ///
    /// # Example
    ///
    /// ```
    /// use devstack_engine::hooks::{ProvisionEvent, ProvisionHooks};
    ///
    /// let hooks = ProvisionHooks::new();
    /// hooks.register_observer("logger", |event: &ProvisionEvent| {
    ///     if let ProvisionEvent::ResourceFailed { resource, error, .. } = event {
    ///         eprintln!("{resource} failed: {error}");
    ///     }
    /// })?;
    /// assert!(hooks.contains("logger"));
    /// # Ok::<(), devstack_engine::hooks::HookRegistrationError>(())
    /// ```
    pub fn register_observer<F>(
        &self,
        name: impl Into<String>,
        observer: F,
    ) -> Result<&Self, HookRegistrationError>
    where
        F: Fn(&ProvisionEvent) + Send + Sync + 'static,
    {
        let name = name.into();
        let mut hooks = self.hooks.write();
        if hooks.iter().any(|entry| entry.name == name) {
            return Err(HookRegistrationError::DuplicateName(name));
        }
        hooks.push(HookEntry {
            name,
            observer: Arc::new(observer),
        });
        Ok(self)
    }

    /// Invokes every observer with `event`, in registration order.
    pub fn invoke(&self, event: &ProvisionEvent) {
        let observers: Vec<Observer> = self
            .hooks
            .read()
            .iter()
            .map(|entry| Arc::clone(&entry.observer))
            .collect();
        for observer in observers {
            observer(event);
        }
    }

    /// Returns the number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    /// Returns `true` if no observer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }

    /// Checks if an observer with the given name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.hooks.read().iter().any(|entry| entry.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn duplicate_name_is_rejected() {
        let hooks = ProvisionHooks::new();
        hooks.register_observer("a", |_: &ProvisionEvent| {}).unwrap();

        let err = hooks.register_observer("a", |_: &ProvisionEvent| {}).unwrap_err();
        assert_eq!(err, HookRegistrationError::DuplicateName("a".into()));
        assert_eq!(hooks.len(), 1);
    }

    #[test]
    fn observers_run_in_registration_order() {
        let hooks = ProvisionHooks::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for name in ["first", "second"] {
            let seen = Arc::clone(&seen);
            hooks
                .register_observer(name, move |_: &ProvisionEvent| seen.lock().push(name))
                .unwrap();
        }
        hooks.invoke(&ProvisionEvent::ApplyStart { resource_count: 0 });

        assert_eq!(*seen.lock(), vec!["first", "second"]);
    }

    #[test]
    fn registration_chains() {
        let hooks = ProvisionHooks::new();
        let count = Arc::new(AtomicUsize::new(0));
        let (a, b) = (Arc::clone(&count), Arc::clone(&count));

        hooks
            .register_observer("a", move |_: &ProvisionEvent| {
                a.fetch_add(1, Ordering::SeqCst);
            })
            .and_then(|hooks| {
                hooks.register_observer("b", move |_: &ProvisionEvent| {
                    b.fetch_add(1, Ordering::SeqCst);
                })
            })
            .unwrap();
        hooks.invoke(&ProvisionEvent::ApplyStart { resource_count: 3 });

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
