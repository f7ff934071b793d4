//! Writers the process flushes on the maintenance tick and at exit.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use crate::observability::writer::RotatingFileWriter;

#[derive(Default)]
pub struct FlushRegistry {
    writers: Mutex<Vec<Arc<RotatingFileWriter>>>,
}

impl FlushRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, writer: Arc<RotatingFileWriter>) {
        self.writers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(writer);
    }

    pub fn len(&self) -> usize {
        self.writers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush every writer, collecting failures instead of stopping at the
    /// first one.
    pub fn flush_all(&self) -> Vec<io::Error> {
        let writers = self.writers.lock().unwrap_or_else(PoisonError::into_inner).clone();
        writers.iter().filter_map(|w| w.flush().err()).collect()
    }
}
