use anyhow::Result;
use std::collections::HashMap;

pub type Handler<C> = Box<dyn FnMut(&mut C) -> Result<()>>;
pub type Fallback<C> = Box<dyn FnMut(&mut C, &str) -> Result<()>>;

/// Routes named actions to their handlers. Names without a handler go to the fallback.
pub struct Dispatcher<C> {
    handlers: HashMap<String, Handler<C>>,
    fallback: Fallback<C>,
}

impl<C> Dispatcher<C> {
    pub fn new(fallback: impl FnMut(&mut C, &str) -> Result<()> + 'static) -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Box::new(fallback),
        }
    }

    pub fn register(
        mut self,
        name: impl Into<String>,
        handler: impl FnMut(&mut C) -> Result<()> + 'static,
    ) -> Self {
        self.handlers.insert(name.into(), Box::new(handler));
        self
    }

    pub fn handles(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn dispatch(&mut self, ctx: &mut C, name: &str) -> Result<()> {
        match self.handlers.get_mut(name) {
            Some(handler) => handler(ctx),
            None => (self.fallback)(ctx, name),
        }
    }
}
