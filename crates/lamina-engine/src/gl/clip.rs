use super::backend::Scissor;

/// Stack of active scissor rects (physical pixels).
///
/// The top is always the effective scissor, already intersected with every
/// rect below it, so popping restores the previous scissor exactly.
#[derive(Debug, Default, Clone)]
pub(crate) struct ClipStack {
    stack: Vec<Scissor>,
}

impl ClipStack {
    /// Pushes `rect` intersected with the current top and returns the new top.
    pub(crate) fn push(&mut self, rect: Scissor) -> Scissor {
        let effective = match self.stack.last() {
            None => rect,
            Some(&parent) => parent.intersect(rect),
        };
        self.stack.push(effective);
        effective
    }

    /// Pops the top and returns the scissor now in effect (`None` = disabled).
    ///
    /// # Panics
    /// Panics if called without a matching `push`.
    pub(crate) fn pop(&mut self) -> Option<Scissor> {
        assert!(self.stack.pop().is_some(), "end_clipped called without matching start_clipped");
        self.stack.last().copied()
    }

    #[inline]
    pub(crate) fn current(&self) -> Option<Scissor> {
        self.stack.last().copied()
    }

    #[inline]
    pub(crate) fn depth(&self) -> usize {
        self.stack.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}
