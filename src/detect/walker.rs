//! Full-payload walker.
//!
//! Feed events can bury a sale announcement anywhere in their arguments. The
//! walker visits every object and array once, runs the extractor on each object
//! and reports matches without descending into the matched branch.

use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

use crate::detect::extractor::extract;
use crate::types::LaunchEvent;

/// Depth-first search over a payload tree for launch events.
#[derive(Debug, Default, Clone, Copy)]
pub struct PayloadWalker;

impl PayloadWalker {
    pub fn new() -> Self {
        Self
    }

    /// Walk `payload`, calling `on_match` for every launch event found.
    ///
    /// Returns the number of matches. Nodes are tracked by address so each one is
    /// inspected at most once per call.
    pub fn walk<F>(&self, payload: &Value, mut on_match: F) -> usize
    where
        F: FnMut(LaunchEvent),
    {
        let mut visited: HashSet<*const Value> = HashSet::new();
        let mut stack: Vec<&Value> = vec![payload];
        let mut matches = 0;

        while let Some(node) = stack.pop() {
            let children: Vec<&Value> = match node {
                Value::Object(map) => map.values().collect(),
                Value::Array(items) => items.iter().collect(),
                _ => continue,
            };
            if !visited.insert(node as *const Value) {
                continue;
            }

            if node.is_object() {
                if let Some(event) = extract(node) {
                    debug!("Launch event found for vault {}", event.vault_address);
                    matches += 1;
                    on_match(event);
                    continue;
                }
            }

            // reversed so siblings are visited in document order
            stack.extend(children.into_iter().rev());
        }

        matches
    }

    /// Convenience wrapper returning every match in visit order.
    pub fn collect(&self, payload: &Value) -> Vec<LaunchEvent> {
        let mut events = Vec::new();
        self.walk(payload, |event| events.push(event));
        events
    }
}
