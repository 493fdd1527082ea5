use std::ops::Deref;
use std::sync::Arc;

use derive_new::new;

use crate::translator::Translator;

/// Shared state of the HTTP transport.
#[derive(Debug, new)]
pub struct App<M, S> {
    pub translator: Arc<Translator<M, S>>,
    pub token: Arc<str>,
}

impl<M, S> Clone for App<M, S> {
    fn clone(&self) -> Self {
        Self {
            translator: Arc::clone(&self.translator),
            token: Arc::clone(&self.token),
        }
    }
}

impl<M, S> Deref for App<M, S> {
    type Target = Translator<M, S>;

    fn deref(&self) -> &Self::Target {
        &self.translator
    }
}

pub fn create_app<M, S>(translator: Translator<M, S>, token: &str) -> App<M, S> {
    App {
        translator: Arc::new(translator),
        token: Arc::from(token),
    }
}
