use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

/// Last raw state reported for each sensor entity. Written by the MQTT loop,
/// read on demand by the climate runtimes.
#[derive(Debug, Clone, Default)]
pub struct SensorCache {
    states: Arc<RwLock<HashMap<String, String>>>,
}

impl SensorCache {
    /// Returns true when the raw state differs from the cached one.
    pub fn update(&self, entity_id: &str, raw: &str) -> bool {
        let Ok(mut states) = self.states.write() else {
            return false;
        };
        match states.get(entity_id) {
            Some(previous) if previous == raw => false,
            _ => {
                states.insert(entity_id.to_string(), raw.to_string());
                true
            }
        }
    }

    pub fn read(&self, entity_id: &str) -> Option<String> {
        self.states.read().ok()?.get(entity_id).cloned()
    }
}

/// Maps sensor state topics to the entities published on them.
#[derive(Debug, Clone, Default)]
pub struct SensorRoutes {
    by_topic: HashMap<String, Vec<String>>,
}

impl SensorRoutes {
    pub fn add(&mut self, state_topic: &str, entity_id: &str) {
        let entities = self.by_topic.entry(state_topic.to_string()).or_default();
        if !entities.iter().any(|existing| existing == entity_id) {
            entities.push(entity_id.to_string());
        }
    }

    pub fn entities(&self, topic: &str) -> &[String] {
        self.by_topic.get(topic).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.by_topic.keys().map(String::as_str)
    }
}
