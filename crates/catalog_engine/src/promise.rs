use std::fmt;
use std::sync::{Arc, Weak};

use tokio::sync::watch;

/// Terminal result of a [`CancellablePromise`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T, E> {
    Succeeded(T),
    Failed(E),
    Cancelled,
}

impl<T, E> Outcome<T, E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn succeeded(self) -> Option<T> {
        match self {
            Outcome::Succeeded(value) => Some(value),
            _ => None,
        }
    }

    pub fn failed(self) -> Option<E> {
        match self {
            Outcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug)]
enum State<T, E> {
    Pending,
    Done(Outcome<T, E>),
}

/// Single-assignment outcome cell shared between a producer and any number of
/// observers.
///
/// The first of `succeed`, `fail` or `cancel` wins; later calls return
/// `false` and leave the stored outcome untouched.
pub struct CancellablePromise<T, E> {
    cell: Arc<watch::Sender<State<T, E>>>,
}

impl<T, E> CancellablePromise<T, E> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(State::Pending);
        Self { cell: Arc::new(tx) }
    }

    pub fn succeed(&self, value: T) -> bool {
        self.complete(Outcome::Succeeded(value))
    }

    pub fn fail(&self, err: E) -> bool {
        self.complete(Outcome::Failed(err))
    }

    pub fn cancel(&self) -> bool {
        self.complete(Outcome::Cancelled)
    }

    pub fn is_done(&self) -> bool {
        matches!(*self.cell.borrow(), State::Done(_))
    }

    /// Handle that does not keep the outcome alive once every strong handle
    /// is gone.
    pub fn downgrade(&self) -> WeakPromise<T, E> {
        WeakPromise {
            cell: Arc::downgrade(&self.cell),
        }
    }

    fn complete(&self, outcome: Outcome<T, E>) -> bool {
        // The closure runs under the channel lock, so the check and the store
        // are one atomic step.
        let mut outcome = Some(outcome);
        self.cell.send_if_modified(|state| match state {
            State::Pending => {
                if let Some(outcome) = outcome.take() {
                    *state = State::Done(outcome);
                }
                true
            }
            State::Done(_) => false,
        })
    }
}

impl<T: Clone, E: Clone> CancellablePromise<T, E> {
    /// Current outcome, if the promise has resolved.
    pub fn peek(&self) -> Option<Outcome<T, E>> {
        match &*self.cell.borrow() {
            State::Pending => None,
            State::Done(outcome) => Some(outcome.clone()),
        }
    }

    /// Waits for the terminal outcome.
    pub async fn wait(&self) -> Outcome<T, E> {
        let mut rx = self.cell.subscribe();
        let resolved = rx
            .wait_for(|state| matches!(state, State::Done(_)))
            .await;
        match resolved {
            Ok(state) => match &*state {
                State::Done(outcome) => outcome.clone(),
                State::Pending => Outcome::Cancelled,
            },
            // The sender lives as long as `self`, so this is unreachable in
            // practice; a vanished producer reads as cancelled.
            Err(_) => Outcome::Cancelled,
        }
    }
}

/// Non-owning handle to a [`CancellablePromise`].
pub struct WeakPromise<T, E> {
    cell: Weak<watch::Sender<State<T, E>>>,
}

impl<T, E> WeakPromise<T, E> {
    /// Returns the promise while some strong handle still exists.
    pub fn upgrade(&self) -> Option<CancellablePromise<T, E>> {
        self.cell.upgrade().map(|cell| CancellablePromise { cell })
    }
}

impl<T, E> Default for CancellablePromise<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Clone for CancellablePromise<T, E> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T, E> fmt::Debug for CancellablePromise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match *self.cell.borrow() {
            State::Pending => "pending",
            State::Done(Outcome::Succeeded(_)) => "succeeded",
            State::Done(Outcome::Failed(_)) => "failed",
            State::Done(Outcome::Cancelled) => "cancelled",
        };
        f.debug_struct("CancellablePromise")
            .field("state", &state)
            .finish()
    }
}
