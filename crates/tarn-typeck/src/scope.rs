use crate::types::Ty;
use std::collections::HashMap;
use tarn_lexer::Name;

/// What a name resolves to.
#[derive(Clone, Debug)]
pub struct Binding {
    pub ty: Ty,
    pub global: bool,
    pub mutable: bool,
}

/// Stack of name→binding maps. Lookup searches innermost to outermost;
/// popping a scope restores whatever an inner binding shadowed.
#[derive(Debug, Default)]
pub(crate) struct Scopes {
    globals: HashMap<Name, Binding>,
    locals: Vec<HashMap<Name, Binding>>,
}

impl Scopes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self) {
        self.locals.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        self.locals.pop();
    }

    /// Drop every local scope; used when a fresh top-level inference
    /// starts (and after an aborted one).
    pub fn clear_locals(&mut self) {
        self.locals.clear();
    }

    pub fn insert_global(&mut self, name: Name, binding: Binding) {
        self.globals.insert(name, binding);
    }

    /// Insert into the innermost scope.
    pub fn insert(&mut self, name: Name, binding: Binding) {
        match self.locals.last_mut() {
            Some(scope) => {
                scope.insert(name, binding);
            }
            None => {
                self.globals.insert(name, binding);
            }
        }
    }

    pub fn lookup(&self, name: Name) -> Option<&Binding> {
        self.locals
            .iter()
            .rev()
            .find_map(|scope| scope.get(&name))
            .or_else(|| self.globals.get(&name))
    }
}
