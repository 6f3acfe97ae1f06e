use parking_lot::Mutex;

/// Append-only log of undo records owned by one transaction.
///
/// Records are replayed newest first on rollback and simply dropped on commit.
#[derive(Debug)]
pub struct UndoLog<T> {
    entries: Mutex<Vec<T>>,
}

impl<T> UndoLog<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, entry: T) {
        self.entries.lock().push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Removes every record, newest first.
    pub fn take_reversed(&self) -> impl Iterator<Item = T> {
        let entries = std::mem::take(&mut *self.entries.lock());
        entries.into_iter().rev()
    }

    /// Drops every record without replaying it.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl<T> Default for UndoLog<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_reversed() {
        let log = UndoLog::new();
        log.push(1);
        log.push(2);
        log.push(3);
        assert_eq!(log.len(), 3);
        assert_eq!(log.take_reversed().collect::<Vec<_>>(), vec![3, 2, 1]);
        assert!(log.is_empty());
    }
}
