//! Server-side entry processing.
//!
//! A processor is pushed to the entries rather than the entries being pulled
//! to the caller. Each invocation may keep, rewrite or remove the entry, and
//! may produce a per-key output collected into the call's result map.

use serde_json::Value;

use crate::entry::CacheEntry;

/// Decision returned by a processor for one key.
#[derive(Debug, Clone)]
pub enum ProcessorAction<V> {
    /// Leave the entry untouched; optionally report a per-key output.
    Keep(Option<Value>),
    /// Replace the entry's value.
    Write(V, Option<Value>),
    /// Delete the entry.
    Remove(Option<Value>),
}

impl<V> ProcessorAction<V> {
    pub fn output(&self) -> Option<&Value> {
        match self {
            ProcessorAction::Keep(out) | ProcessorAction::Write(_, out) | ProcessorAction::Remove(out) => out.as_ref(),
        }
    }
}

/// Arbitrary logic applied to entries where they live.
///
/// The entry argument is `None` when the key is absent, so a processor can
/// implement insert-if-missing style logic.
pub trait EntryProcessor<K, V>: Send + Sync {
    fn process(&self, key: &K, entry: Option<&CacheEntry<K, V>>) -> ProcessorAction<V>;
}

impl<K, V, F> EntryProcessor<K, V> for F
where
    F: Fn(&K, Option<&CacheEntry<K, V>>) -> ProcessorAction<V> + Send + Sync,
{
    fn process(&self, key: &K, entry: Option<&CacheEntry<K, V>>) -> ProcessorAction<V> {
        self(key, entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_output() {
        let action: ProcessorAction<String> = ProcessorAction::Keep(Some(Value::from(7)));
        assert_eq!(action.output(), Some(&Value::from(7)));

        let silent: ProcessorAction<String> = ProcessorAction::Remove(None);
        assert_eq!(silent.output(), None);
    }

    #[test]
    fn test_closure_processor() {
        let processor = |_key: &String, entry: Option<&CacheEntry<String, String>>| match entry {
            Some(_) => ProcessorAction::Keep(None),
            None => ProcessorAction::Write("default".to_string(), None),
        };
        let action = processor.process(&"k".to_string(), None);
        assert!(matches!(action, ProcessorAction::Write(v, None) if v == "default"));
    }
}
