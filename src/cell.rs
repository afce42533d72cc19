//! Reactive value cells
//!
//! The display reads everything the host controls (bandwidth, tuned
//! frequency, averaging coefficient, GPU preference, split ratio) through the
//! [`Cell`] trait. Two interest styles are supported:
//! - `depend`: one-shot. The callback runs at most once, on the next change,
//!   and has to be registered again by whoever still cares.
//! - `subscribe`: push notification on every change until unsubscribed.
//!
//! [`LocalCell`] is a single-threaded implementation for hosts and tests.

use std::cell::RefCell;
use std::rc::Rc;

pub type SubscriptionId = u64;

/// One-shot change callback registered through [`Cell::depend`]
pub type Interest = Box<dyn FnOnce()>;

pub trait Cell<T> {
    /// Current value
    fn get(&self) -> T;

    /// Current value, plus a one-shot callback fired on the next change
    fn depend(&self, on_change: Interest) -> T;

    /// Push notifications on every change
    fn subscribe(&self, handler: Box<dyn FnMut(&T)>) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);
}

type Handler<T> = Rc<RefCell<Box<dyn FnMut(&T)>>>;

struct Inner<T> {
    value: RefCell<T>,
    interest: RefCell<Vec<Interest>>,
    subscribers: RefCell<Vec<(SubscriptionId, Handler<T>)>>,
    next_id: std::cell::Cell<SubscriptionId>,
}

/// Shared, single-threaded mutable cell
pub struct LocalCell<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for LocalCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + PartialEq + 'static> LocalCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(Inner {
                value: RefCell::new(value),
                interest: RefCell::new(Vec::new()),
                subscribers: RefCell::new(Vec::new()),
                next_id: std::cell::Cell::new(1),
            }),
        }
    }

    /// Store a new value and notify. Equal values are ignored.
    pub fn set(&self, value: T) {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return;
            }
            *current = value.clone();
        }

        // Drained before running so a callback that registers again is kept
        // for the next change instead of firing in this pass.
        let interest = std::mem::take(&mut *self.inner.interest.borrow_mut());
        for callback in interest {
            callback();
        }

        let subscribers: Vec<Handler<T>> = self
            .inner
            .subscribers
            .borrow()
            .iter()
            .map(|(_, handler)| Rc::clone(handler))
            .collect();
        for handler in subscribers {
            // A handler that sets this cell again is not re-entered
            if let Ok(mut handler) = handler.try_borrow_mut() {
                (*handler)(&value);
            }
        }
    }

    /// Number of pending one-shot callbacks
    pub fn interest_count(&self) -> usize {
        self.inner.interest.borrow().len()
    }
}

impl<T: Clone + PartialEq + 'static> Cell<T> for LocalCell<T> {
    fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    fn depend(&self, on_change: Interest) -> T {
        self.inner.interest.borrow_mut().push(on_change);
        self.get()
    }

    fn subscribe(&self, handler: Box<dyn FnMut(&T)>) -> SubscriptionId {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner
            .subscribers
            .borrow_mut()
            .push((id, Rc::new(RefCell::new(handler))));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.inner
            .subscribers
            .borrow_mut()
            .retain(|(existing, _)| *existing != id);
    }
}

/// A cell that never changes
#[derive(Debug, Clone)]
pub struct ConstantCell<T>(pub T);

impl<T: Clone> Cell<T> for ConstantCell<T> {
    fn get(&self) -> T {
        self.0.clone()
    }

    fn depend(&self, _on_change: Interest) -> T {
        self.0.clone()
    }

    fn subscribe(&self, _handler: Box<dyn FnMut(&T)>) -> SubscriptionId {
        0
    }

    fn unsubscribe(&self, _id: SubscriptionId) {}
}
