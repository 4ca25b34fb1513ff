//! Window manager and animator that only record what they were asked to do.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use super::backend::{OverlayWindowManager, SurfaceAnimator, SurfaceError, SurfaceSpec};
use super::geometry::SurfaceGeometry;
use super::SurfaceId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    Attach(SurfaceId, SurfaceGeometry),
    Detach(SurfaceId),
    Update(SurfaceId, SurfaceGeometry),
    AnimateIn(SurfaceId),
    AnimateOut(SurfaceId),
}

impl SurfaceCall {
    pub fn surface(&self) -> SurfaceId {
        match self {
            SurfaceCall::Attach(id, _)
            | SurfaceCall::Detach(id)
            | SurfaceCall::Update(id, _)
            | SurfaceCall::AnimateIn(id)
            | SurfaceCall::AnimateOut(id) => *id,
        }
    }

    pub fn is_attach_or_detach(&self) -> bool {
        matches!(self, SurfaceCall::Attach(..) | SurfaceCall::Detach(_))
    }
}

/// Shared, append-only call log.
#[derive(Debug, Clone, Default)]
pub struct SurfaceLog {
    calls: Arc<Mutex<Vec<SurfaceCall>>>,
    failures: Arc<Mutex<VecDeque<SurfaceError>>>,
    attached: Arc<Mutex<BTreeSet<SurfaceId>>>,
    specs: Arc<Mutex<Vec<SurfaceSpec>>>,
}

impl SurfaceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Calls recorded since the last `take`.
    pub fn take(&self) -> Vec<SurfaceCall> {
        std::mem::take(&mut *self.calls.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Specs passed to attach and update, in order.
    pub fn specs(&self) -> Vec<SurfaceSpec> {
        self.specs.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_attached(&self, surface: SurfaceId) -> bool {
        self.attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&surface)
    }

    /// The next window manager call fails with `error` instead of running.
    pub fn fail_next(&self, error: SurfaceError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
    }

    fn record(&self, call: SurfaceCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn next_failure(&self) -> Option<SurfaceError> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

/// Window manager backed by a [`SurfaceLog`]. Behaves like a strict
/// platform: double attach and detach of an unknown surface are errors.
#[derive(Debug, Clone, Default)]
pub struct RecordingWindowManager {
    log: SurfaceLog,
}

impl RecordingWindowManager {
    pub fn new(log: SurfaceLog) -> Self {
        Self { log }
    }
}

impl OverlayWindowManager for RecordingWindowManager {
    fn attach(&mut self, spec: &SurfaceSpec) -> Result<(), SurfaceError> {
        if let Some(err) = self.log.next_failure() {
            return Err(err);
        }
        let mut attached = self.log.attached.lock().unwrap_or_else(PoisonError::into_inner);
        if !attached.insert(spec.surface) {
            return Err(SurfaceError::AlreadyAttached(spec.surface));
        }
        drop(attached);
        self.log
            .specs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(spec.clone());
        self.log.record(SurfaceCall::Attach(spec.surface, spec.geometry));
        Ok(())
    }

    fn detach(&mut self, surface: SurfaceId) -> Result<(), SurfaceError> {
        if let Some(err) = self.log.next_failure() {
            return Err(err);
        }
        let removed = self
            .log
            .attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&surface);
        if !removed {
            return Err(SurfaceError::NotAttached(surface));
        }
        self.log.record(SurfaceCall::Detach(surface));
        Ok(())
    }

    fn update_geometry(&mut self, spec: &SurfaceSpec) -> Result<(), SurfaceError> {
        if let Some(err) = self.log.next_failure() {
            return Err(err);
        }
        if !self.log.is_attached(spec.surface) {
            return Err(SurfaceError::NotAttached(spec.surface));
        }
        self.log
            .specs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(spec.clone());
        self.log.record(SurfaceCall::Update(spec.surface, spec.geometry));
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingAnimator {
    log: SurfaceLog,
}

impl RecordingAnimator {
    pub fn new(log: SurfaceLog) -> Self {
        Self { log }
    }
}

impl SurfaceAnimator for RecordingAnimator {
    fn animate_in(&mut self, surface: SurfaceId) {
        self.log.record(SurfaceCall::AnimateIn(surface));
    }

    fn animate_out(&mut self, surface: SurfaceId) {
        self.log.record(SurfaceCall::AnimateOut(surface));
    }
}
