use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use crate::interpreter::value::Value;

pub type EnvironmentRef = Rc<RefCell<Environment>>;

/// One scope frame. Frames hold their parent strongly: a closure keeps its
/// whole defining chain alive, and reference cycles through stored closures
/// are tolerated.
#[derive(Debug, Default)]
pub struct Environment {
    values: HashMap<String, Value>,
    parent: Option<EnvironmentRef>,
}

impl Environment {
    pub fn new_global() -> EnvironmentRef {
        Rc::new(RefCell::new(Environment::default()))
    }

    pub fn new_with_parent(parent: EnvironmentRef) -> EnvironmentRef {
        Rc::new(RefCell::new(Environment {
            values: HashMap::new(),
            parent: Some(parent),
        }))
    }

    /// Declares or redeclares a name in this frame.
    pub fn define(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_owned(), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }

    /// Overwrites an existing binding in this frame only. Returns `false`
    /// when the name is not bound here.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        match self.values.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            },
            None => false,
        }
    }

    pub fn parent(&self) -> Option<EnvironmentRef> {
        self.parent.as_ref().map(Rc::clone)
    }

    /// Walks `distance` frames up the chain.
    pub fn ancestor(this: &EnvironmentRef, distance: usize) -> Option<EnvironmentRef> {
        let mut environment = Rc::clone(this);

        for _ in 0..distance {
            let parent = environment.borrow().parent()?;
            environment = parent;
        }

        Some(environment)
    }

    /// The outermost frame of the chain, i.e. the global scope of the module
    /// that created it.
    pub fn root(this: &EnvironmentRef) -> EnvironmentRef {
        let mut environment = Rc::clone(this);

        loop {
            let parent = environment.borrow().parent();

            match parent {
                Some(parent) => environment = parent,
                None => return environment,
            }
        }
    }

    pub fn get_at(this: &EnvironmentRef, distance: usize, name: &str) -> Option<Value> {
        Self::ancestor(this, distance).and_then(|environment| environment.borrow().get(name))
    }

    pub fn assign_at(this: &EnvironmentRef, distance: usize, name: &str, value: Value) -> bool {
        Self::ancestor(this, distance).map(|environment| environment.borrow_mut().assign(name, value)).unwrap_or(false)
    }
}
