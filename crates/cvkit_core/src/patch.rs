//! Core patch structure for DSP processing
//!
//! This module contains the core `Patch` struct which represents a graph of
//! connected modules. The patch owns the module map, routes dispatched
//! messages to the modules that registered for them, and gathers/restores
//! persisted module state.

use crate::types::{Message, MessageTag, Sampleable, SampleableMap};

use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

#[derive(Clone)]
struct MessageListenerRef {
    id: String,
    weak: Weak<Box<dyn Sampleable>>,
}

/// The core patch structure containing the DSP graph
pub struct Patch {
    pub sampleables: SampleableMap,
    message_listeners: HashMap<MessageTag, Vec<MessageListenerRef>>,
}

impl Patch {
    /// Create a new patch from a module map
    pub fn new(sampleables: SampleableMap) -> Self {
        let mut patch = Patch {
            sampleables,
            message_listeners: HashMap::new(),
        };
        patch.rebuild_message_listeners();
        patch
    }

    pub fn rebuild_message_listeners(&mut self) {
        self.message_listeners.clear();
        for (id, sampleable) in &self.sampleables {
            for tag in sampleable.handled_message_tags() {
                self.message_listeners
                    .entry(*tag)
                    .or_default()
                    .push(MessageListenerRef {
                        id: id.clone(),
                        weak: Arc::downgrade(sampleable),
                    });
            }
        }
    }

    /// Resolve every cable input against the modules currently in the patch.
    /// Call after inserting or replacing modules.
    pub fn connect_all(&self) {
        for sampleable in self.sampleables.values() {
            sampleable.connect(self);
        }
    }

    /// Collect strong references to all modules currently in this patch that
    /// have registered to handle the given message tag.
    ///
    /// This method prunes stale entries. In particular, it will never return a
    /// module that is no longer present in `self.sampleables`, even if some
    /// other subsystem still holds a strong `Arc` to that module.
    pub fn message_listeners_for(&mut self, tag: MessageTag) -> Vec<Arc<Box<dyn Sampleable>>> {
        let Some(list) = self.message_listeners.get_mut(&tag) else {
            return Vec::new();
        };

        list.retain(|r| {
            if !self.sampleables.contains_key(&r.id) {
                return false;
            }
            r.weak.upgrade().is_some()
        });

        list.iter()
            .filter(|r| self.sampleables.contains_key(&r.id))
            .filter_map(|r| r.weak.upgrade())
            .collect()
    }

    #[profiling::function]
    pub fn dispatch_message(&mut self, message: &Message) -> Result<()> {
        let listeners = self.message_listeners_for(message.tag());
        for s in listeners {
            s.handle_message(message)?;
        }
        Ok(())
    }

    /// Gather persisted state from every stateful module, keyed by module id.
    pub fn save_state(&self) -> HashMap<String, Value> {
        let mut states = HashMap::new();
        for (id, sampleable) in &self.sampleables {
            if let Some(state) = sampleable.get_state() {
                states.insert(id.clone(), state);
            }
        }
        states
    }

    /// Restore previously saved state. Entries for unknown module ids are
    /// ignored; each module applies its own state tolerantly.
    pub fn restore_state(&self, states: &HashMap<String, Value>) -> Result<()> {
        for (id, state) in states {
            if let Some(sampleable) = self.sampleables.get(id) {
                sampleable.set_state(state)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::types::MessageHandler;
    use anyhow::Result;

    #[test]
    fn test_patch_new_empty() {
        let patch = Patch::new(HashMap::new());
        assert!(patch.sampleables.is_empty());
    }

    struct DummyMessageSampleable {
        id: String,
    }

    impl Sampleable for DummyMessageSampleable {
        fn get_id(&self) -> &String {
            &self.id
        }

        fn tick(&self) {}

        fn update(&self) {}

        fn get_poly_sample(&self, _port: &str) -> Result<crate::poly::PolyOutput> {
            Ok(crate::poly::PolyOutput::mono(0.0))
        }

        fn get_module_type(&self) -> String {
            "dummy".to_string()
        }

        fn try_update_params(&self, _params: serde_json::Value) -> Result<()> {
            Ok(())
        }

        fn connect(&self, _patch: &Patch) {}
    }

    impl MessageHandler for DummyMessageSampleable {
        fn handled_message_tags(&self) -> &'static [MessageTag] {
            &[MessageTag::Clock]
        }

        fn handle_message(&self, _message: &Message) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn message_listeners_never_return_removed_modules() {
        let s: Arc<Box<dyn Sampleable>> = Arc::new(Box::new(DummyMessageSampleable {
            id: "m1".to_string(),
        }));

        let mut sampleables: SampleableMap = HashMap::new();
        sampleables.insert("m1".to_string(), Arc::clone(&s));
        let mut patch = Patch::new(sampleables);

        // Index should include it.
        assert_eq!(patch.message_listeners_for(MessageTag::Clock).len(), 1);

        // Remove from patch but keep an external strong ref (`s`).
        patch.sampleables.remove("m1");

        // Rebuild/prune and ensure it is not returned.
        assert_eq!(patch.message_listeners_for(MessageTag::Clock).len(), 0);
    }

    #[test]
    fn save_state_skips_stateless_modules() {
        let s: Arc<Box<dyn Sampleable>> = Arc::new(Box::new(DummyMessageSampleable {
            id: "m1".to_string(),
        }));

        let mut sampleables: SampleableMap = HashMap::new();
        sampleables.insert("m1".to_string(), s);
        let patch = Patch::new(sampleables);

        assert!(patch.save_state().is_empty());
    }
}
