/// A duration that has been pushed but not popped yet.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct OpenEvent {
    pub name: String,
    pub thread_id: u64,
    /// Microseconds since the capture origin.
    pub start_ts: u64,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum StackError {
    /// The stack already holds `capacity` events.
    Capacity,
    /// There is nothing to pop.
    Empty,
}

/// Bounded LIFO of open events.
///
/// Pops always return the most recently pushed event, which is what keeps
/// nested regions paired with their own begin timestamp.
#[derive(Debug)]
pub struct OpenEventStack {
    events: Vec<OpenEvent>,
    capacity: usize,
}

impl OpenEventStack {
    pub fn new(capacity: usize) -> OpenEventStack {
        OpenEventStack {
            events: Vec::new(),
            capacity,
        }
    }

    /// Pushes an event and returns its depth in the stack (0 for the
    /// outermost event).
    pub fn push_open(
        &mut self,
        name: String,
        thread_id: u64,
        start_ts: u64,
    ) -> Result<usize, StackError> {
        if self.events.len() >= self.capacity {
            return Err(StackError::Capacity);
        }

        let depth = self.events.len();
        self.events.push(OpenEvent {
            name,
            thread_id,
            start_ts,
        });
        Ok(depth)
    }

    pub fn pop_open(&mut self) -> Result<OpenEvent, StackError> {
        self.events.pop().ok_or(StackError::Empty)
    }

    /// The event the next `pop_open` would return.
    #[inline]
    pub fn peek(&self) -> Option<&OpenEvent> {
        self.events.last()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_most_recent_first() {
        let mut stack = OpenEventStack::new(4);
        assert_eq!(stack.push_open("outer".into(), 1, 10), Ok(0));
        assert_eq!(stack.push_open("inner".into(), 1, 20), Ok(1));
        assert_eq!(stack.peek().map(|e| e.name.as_str()), Some("inner"));

        let inner = stack.pop_open().unwrap();
        assert_eq!(inner.name, "inner");
        assert_eq!(inner.start_ts, 20);

        let outer = stack.pop_open().unwrap();
        assert_eq!(outer.name, "outer");
        assert_eq!(outer.start_ts, 10);

        assert_eq!(stack.pop_open(), Err(StackError::Empty));
    }

    #[test]
    fn rejects_push_when_full() {
        let mut stack = OpenEventStack::new(2);
        stack.push_open("a".into(), 0, 0).unwrap();
        stack.push_open("b".into(), 0, 1).unwrap();
        assert_eq!(
            stack.push_open("c".into(), 0, 2),
            Err(StackError::Capacity)
        );
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.capacity(), 2);

        // The rejected push must not disturb what is already open.
        assert_eq!(stack.pop_open().unwrap().name, "b");
        assert_eq!(stack.pop_open().unwrap().name, "a");
    }

    #[test]
    fn zero_capacity_never_accepts() {
        let mut stack = OpenEventStack::new(0);
        assert_eq!(stack.push_open("a".into(), 0, 0), Err(StackError::Capacity));
        assert!(stack.is_empty());
    }
}
