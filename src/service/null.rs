use super::{Component, NullServiceImp};
use crate::error::Result;
use futures::future::BoxFuture;
use std::sync::Arc;

/// A scheduler component with no socket; only its hooks run.
pub struct NullService<I: NullServiceImp> {
    name: String,
    imp: Arc<I>,
}

impl<I: NullServiceImp> NullService<I> {
    pub fn new(name: impl Into<String>, imp: Arc<I>) -> Self {
        Self {
            name: name.into(),
            imp,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn imp(&self) -> &Arc<I> {
        &self.imp
    }
}

impl<I: NullServiceImp> Component for NullService<I> {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&self) -> Result<()> {
        self.imp.init()
    }

    fn register(&self) -> Result<()> {
        Ok(())
    }

    fn activate(&self) {}

    fn tick(&self) {
        self.imp.on_loop();
    }

    fn destroy(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move { self.imp.destroy() })
    }
}
