//! Diagnostic registry of unrooted heap nodes.
//!
//! Every pair, closure and exception payload registers itself here when it is created.
//! Binding a value in an environment frame roots it (removes it from the registry); when a
//! frame releases a binding that still has other holders, the value is registered again.
//! Nodes leave the registry for good when they are freed.
//!
//! Nothing is ever collected from this registry. It exists so that leaks are observable:
//! after evaluating an acyclic program and discarding its result, [`unrooted_count`]
//! returns to its previous value, while reference cycles (a closure that is reachable
//! from its own captured environment) stay in it forever.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

type NodeId = u64;

#[derive(Default)]
struct Registry {
    next_id: NodeId,
    unrooted: HashMap<NodeId, &'static str>,
}

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::default());
}

/// Registry membership handle owned by a heap node
#[derive(Debug)]
pub(crate) struct Tracked {
    id: NodeId,
    kind: &'static str,
}

impl Tracked {
    /// Allocate an id and register the node as unrooted
    pub(crate) fn new(kind: &'static str) -> Self {
        let id = REGISTRY.with(|registry| {
            let mut registry = registry.borrow_mut();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.unrooted.insert(id, kind);
            id
        });
        Tracked { id, kind }
    }

    pub(crate) fn root(&self) {
        REGISTRY.with(|registry| {
            registry.borrow_mut().unrooted.remove(&self.id);
        });
    }

    pub(crate) fn unroot(&self) {
        REGISTRY.with(|registry| {
            registry.borrow_mut().unrooted.insert(self.id, self.kind);
        });
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        // The registry may already be gone during thread teardown
        let _ = REGISTRY.try_with(|registry| {
            if let Ok(mut registry) = registry.try_borrow_mut() {
                registry.unrooted.remove(&self.id);
            }
        });
    }
}

/// Number of live heap nodes not held by any environment binding
pub fn unrooted_count() -> usize {
    REGISTRY.with(|registry| registry.borrow().unrooted.len())
}

/// Unrooted node counts grouped by node kind (`"pair"`, `"closure"`, `"exception"`)
pub fn unrooted_by_kind() -> BTreeMap<&'static str, usize> {
    REGISTRY.with(|registry| {
        let mut counts = BTreeMap::new();
        for kind in registry.borrow().unrooted.values() {
            *counts.entry(*kind).or_insert(0) += 1;
        }
        counts
    })
}
