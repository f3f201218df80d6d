use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use super::value::Value;

pub type NamespaceRef = Rc<RefCell<Namespace>>;

/// One scope in the lookup chain. Resolution walks parents outward;
/// definition always writes the innermost namespace, so assignment at the
/// top level shadows rather than mutates an outer binding.
#[derive(Default)]
pub struct Namespace {
    parent: Option<NamespaceRef>,
    bindings: IndexMap<String, Value>,
}

impl Namespace {
    pub fn root() -> NamespaceRef {
        Rc::new(RefCell::new(Self {
            parent: None,
            bindings: IndexMap::new(),
        }))
    }

    pub fn with_parent(parent: NamespaceRef) -> NamespaceRef {
        Rc::new(RefCell::new(Self {
            parent: Some(parent),
            bindings: IndexMap::new(),
        }))
    }

    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn lookup(namespace: &NamespaceRef, name: &str) -> Option<Value> {
        if let Some(value) = namespace.borrow().bindings.get(name) {
            return Some(value.clone());
        }
        let parent = namespace.borrow().parent.clone();
        parent.and_then(|parent| Namespace::lookup(&parent, name))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
