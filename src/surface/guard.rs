use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AnimationGuard {
    #[default]
    Idle,
    Adding,
    Removing,
}

impl AnimationGuard {
    pub fn is_idle(self) -> bool {
        matches!(self, Self::Idle)
    }
}

pub fn can_transition(from: AnimationGuard, to: AnimationGuard) -> bool {
    matches!(
        (from, to),
        (AnimationGuard::Idle, AnimationGuard::Adding)
            | (AnimationGuard::Idle, AnimationGuard::Removing)
            | (AnimationGuard::Adding, AnimationGuard::Idle)
            | (AnimationGuard::Removing, AnimationGuard::Idle)
    )
}

/// Lets at most one add or remove run at a time.
#[derive(Debug, Default)]
pub struct TransitionGuard {
    state: Mutex<AnimationGuard>,
}

impl TransitionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> AnimationGuard {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims the guard for `next`. Returns `None` when another transition
    /// is in flight; callers drop the request instead of queueing it.
    pub fn try_begin(&self, next: AnimationGuard) -> Option<GuardTicket<'_>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !can_transition(*state, next) || next.is_idle() {
            tracing::trace!(current = ?*state, requested = ?next, "transition refused");
            return None;
        }
        *state = next;
        Some(GuardTicket { guard: self, kind: next })
    }
}

/// Held for the length of one transition. Dropping it, on success, failure
/// or unwind, puts the guard back to `Idle`.
#[derive(Debug)]
pub struct GuardTicket<'a> {
    guard: &'a TransitionGuard,
    kind: AnimationGuard,
}

impl GuardTicket<'_> {
    pub fn kind(&self) -> AnimationGuard {
        self.kind
    }
}

impl Drop for GuardTicket<'_> {
    fn drop(&mut self) {
        let mut state = self
            .guard
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        debug_assert!(can_transition(*state, AnimationGuard::Idle));
        *state = AnimationGuard::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_must_pass_through_idle() {
        assert!(can_transition(AnimationGuard::Idle, AnimationGuard::Adding));
        assert!(can_transition(AnimationGuard::Removing, AnimationGuard::Idle));
        assert!(!can_transition(AnimationGuard::Adding, AnimationGuard::Removing));
        assert!(!can_transition(AnimationGuard::Adding, AnimationGuard::Adding));
        assert!(!can_transition(AnimationGuard::Idle, AnimationGuard::Idle));
    }

    #[test]
    fn second_claim_is_refused_until_ticket_drops() {
        let guard = TransitionGuard::new();
        let ticket = guard.try_begin(AnimationGuard::Adding).expect("first claim");
        assert_eq!(ticket.kind(), AnimationGuard::Adding);
        assert!(guard.try_begin(AnimationGuard::Removing).is_none());
        assert_eq!(guard.current(), AnimationGuard::Adding);
        drop(ticket);
        assert!(guard.current().is_idle());
        assert!(guard.try_begin(AnimationGuard::Removing).is_some());
    }

    #[test]
    fn unwinding_releases_the_guard() {
        let guard = TransitionGuard::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ticket = guard.try_begin(AnimationGuard::Adding);
            panic!("attach blew up");
        }));
        assert!(result.is_err());
        assert_eq!(guard.current(), AnimationGuard::Idle);
    }
}
