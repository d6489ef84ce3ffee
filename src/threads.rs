use std::{
    collections::HashMap,
    sync::Arc,
    thread::{self, ThreadId},
};

use crossbeam_utils::sync::Unparker;
use parking_lot::RwLock;

/* Workers of one pool, with the handle used to wake each of them */
#[derive(Clone, Default)]
pub(crate) struct Threads(Arc<RwLock<HashMap<ThreadId, Unparker>>>);

impl Threads {
    pub(crate) fn register_current(&self, unparker: Unparker) {
        self.0.write().insert(thread::current().id(), unparker);
    }

    pub(crate) fn deregister_current(&self) {
        self.0.write().remove(&thread::current().id());
    }

    pub(crate) fn contains_current(&self) -> bool {
        self.0.read().contains_key(&thread::current().id())
    }

    pub(crate) fn unpark(&self, thread: ThreadId) {
        if let Some(unparker) = self.0.read().get(&thread) {
            unparker.unpark();
        }
    }

    pub(crate) fn unpark_all(&self) {
        for unparker in self.0.read().values() {
            unparker.unpark();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.0.read().len()
    }
}
