//! Simulated input/event layer
//!
//! Input actions are pooled objects owned by the action map. Gameplay
//! systems subscribe with weak references and simply stop hearing about an
//! action once it is unbound.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use handle_engine::memory::{HandleResult, Ref, RegistryDirectory, Unique, Weak};

/// One named input action and its latest value
#[derive(Debug, Clone, PartialEq)]
pub struct InputAction {
    pub name: String,
    pub value: f32,
    pub presses: u32,
}

/// Action map: sole owner of every bound action
pub struct ActionMap {
    directory: Arc<RegistryDirectory>,
    actions: HashMap<String, Unique<InputAction>>,
}

impl ActionMap {
    pub fn new(directory: Arc<RegistryDirectory>) -> Self {
        Self {
            directory,
            actions: HashMap::new(),
        }
    }

    /// Bind `name`, replacing (and destroying) any previous binding
    pub fn bind(&mut self, name: &str) -> HandleResult<()> {
        let action = self.directory.create(InputAction {
            name: name.to_string(),
            value: 0.0,
            presses: 0,
        })?;
        action.set_name(format!("action:{}", name))?;
        if self.actions.insert(name.to_string(), action).is_some() {
            log::debug!("Rebound input action '{}'", name);
        }
        Ok(())
    }

    /// Drop the binding; subscribers see the action disappear
    pub fn unbind(&mut self, name: &str) -> bool {
        self.actions.remove(name).is_some()
    }

    /// Feed a raw input event into the action
    pub fn press(&mut self, name: &str, value: f32) -> HandleResult<bool> {
        let Some(action) = self.actions.get_mut(name) else {
            return Ok(false);
        };
        action.with_mut(|a| {
            a.value = value;
            a.presses += 1;
        })?;
        Ok(true)
    }

    /// Weak subscription to `name`; empty if the action is not bound
    pub fn subscribe(&self, name: &str) -> Weak<InputAction> {
        self.actions.get(name).map_or_else(Weak::empty, Unique::downgrade)
    }

    /// Strong observer for systems that must not outlive the binding
    pub fn observe(&self, name: &str) -> Option<HandleResult<Ref<InputAction>>> {
        self.actions.get(name).map(Unique::share)
    }

    pub fn bound(&self) -> usize {
        self.actions.len()
    }
}

/// Gameplay system listening to a fixed set of actions
pub struct Listener {
    subscriptions: Vec<Weak<InputAction>>,
    heard: Arc<AtomicUsize>,
}

impl Listener {
    pub fn new(subscriptions: Vec<Weak<InputAction>>) -> Self {
        Self {
            subscriptions,
            heard: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Poll every subscription, dropping those whose action is gone
    pub fn poll(&mut self) -> usize {
        let mut active = 0;
        self.subscriptions.retain(|subscription| match subscription.with(|a| a.presses) {
            Some(presses) => {
                active += usize::from(presses > 0);
                true
            }
            None => {
                log::debug!("Subscription {:?} lost its action", subscription.handle());
                false
            }
        });
        self.heard.fetch_add(active, Ordering::Relaxed);
        active
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn heard(&self) -> usize {
        self.heard.load(Ordering::Relaxed)
    }
}
