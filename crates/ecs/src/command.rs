/// Queue of structural commands recorded while iteration is in progress.
///
/// `begin`/`end` nest; commands accumulate until the outermost scope ends,
/// at which point `end` hands the whole batch back for application.
#[derive(Debug)]
pub struct CommandQueue<C> {
    depth: u32,
    pending: Vec<C>,
}

impl<C> Default for CommandQueue<C> {
    fn default() -> Self {
        Self {
            depth: 0,
            pending: Vec::new(),
        }
    }
}

impl<C> CommandQueue<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) {
        self.depth += 1;
    }

    /// Close one scope. Returns the recorded batch when the outermost scope
    /// closes, `None` while still nested (or if `end` is unbalanced).
    pub fn end(&mut self) -> Option<Vec<C>> {
        if self.depth == 0 {
            tracing::warn!("unbalanced deferred scope end");
            return None;
        }
        self.depth -= 1;
        if self.depth == 0 {
            Some(std::mem::take(&mut self.pending))
        } else {
            None
        }
    }

    pub fn is_deferred(&self) -> bool {
        self.depth > 0
    }

    pub fn push(&mut self, command: C) {
        self.pending.push(command);
    }

    /// Commands recorded so far in the current scope.
    pub fn pending(&self) -> &[C] {
        &self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flushes_only_at_outermost_end() {
        let mut queue = CommandQueue::new();
        queue.begin();
        queue.push(1);
        queue.begin();
        queue.push(2);
        assert!(queue.end().is_none());
        assert!(queue.is_deferred());
        assert_eq!(queue.end(), Some(vec![1, 2]));
        assert!(!queue.is_deferred());
        assert!(queue.pending().is_empty());
    }

    #[test]
    fn unbalanced_end_is_ignored() {
        let mut queue: CommandQueue<u8> = CommandQueue::new();
        assert!(queue.end().is_none());
        assert!(!queue.is_deferred());
    }
}
