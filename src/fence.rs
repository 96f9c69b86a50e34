//! Cancel-by-superseding: a monotonically increasing integer that in-flight
//! asynchronous work checks before applying its result. Advancing the fence
//! invalidates everything issued earlier. Used both as the camera generation
//! counter and as the revalidation request token.

#[derive(Debug, Default)]
pub struct Fence {
    current: u64,
}

impl Fence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate all outstanding tickets and return the new current one.
    pub fn advance(&mut self) -> u64 {
        self.current += 1;
        self.current
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn is_current(&self, ticket: u64) -> bool {
        self.current == ticket
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_invalidates_earlier_tickets() {
        let mut fence = Fence::new();
        let first = fence.advance();
        let second = fence.advance();
        assert!(!fence.is_current(first));
        assert!(fence.is_current(second));
        assert_eq!(fence.current(), second);
        assert!(second > first);
    }
}
