//! One-shot terminal result of a pipeline run.

use std::cell::RefCell;
use std::rc::Rc;

use once_cell::unsync::OnceCell;

use crate::error::{Result, StreamError};

type Listener = Box<dyn FnOnce(&Result<()>)>;

#[derive(Default)]
struct CompletionState {
    result: OnceCell<Result<()>>,
    listeners: RefCell<Vec<Listener>>,
}

/// Completes exactly once; later results are ignored.
#[derive(Clone, Default)]
pub struct StreamCompletion {
    state: Rc<CompletionState>,
}

impl StreamCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome. Returns false if a result was already recorded.
    pub fn complete(&self, result: Result<()>) -> bool {
        if self.state.result.set(result).is_err() {
            return false;
        }
        let listeners = std::mem::take(&mut *self.state.listeners.borrow_mut());
        if let Some(result) = self.state.result.get() {
            for listener in listeners {
                listener(result);
            }
        }
        true
    }

    pub fn succeed(&self) -> bool {
        self.complete(Ok(()))
    }

    pub fn fail(&self, err: StreamError) -> bool {
        self.complete(Err(err))
    }

    /// Run `f` once the outcome is known; immediately if it already is.
    pub fn on_complete(&self, f: impl FnOnce(&Result<()>) + 'static) {
        match self.state.result.get() {
            Some(result) => f(result),
            None => self.state.listeners.borrow_mut().push(Box::new(f)),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state.result.get().is_some()
    }

    pub fn result(&self) -> Option<Result<()>> {
        self.state.result.get().cloned()
    }

    pub fn error(&self) -> Option<StreamError> {
        match self.state.result.get() {
            Some(Err(e)) => Some(e.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn first_result_wins() {
        let c = StreamCompletion::new();
        let calls = Rc::new(Cell::new(0));
        let k = calls.clone();
        c.on_complete(move |r| {
            assert!(r.is_err());
            k.set(k.get() + 1);
        });
        assert!(c.fail(StreamError::custom("boom")));
        assert!(!c.succeed());
        assert_eq!(calls.get(), 1);
        assert_eq!(c.error(), Some(StreamError::custom("boom")));
    }

    #[test]
    fn late_listener_fires_immediately() {
        let c = StreamCompletion::new();
        c.succeed();
        let seen = Rc::new(Cell::new(false));
        let s = seen.clone();
        c.on_complete(move |r| s.set(r.is_ok()));
        assert!(seen.get());
    }
}
