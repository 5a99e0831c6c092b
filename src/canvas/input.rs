use crate::canvas::model::{DocumentPoint, Eraser, RawSample};
use crate::canvas::pagination::PageLayout;

/// Driver-assigned id of one stylus contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContactId(pub u32);

/// Callbacks a stylus driver delivers. Samples arrive in device pixels.
///
/// `on_samples` outside of a begin/end pair is treated as one complete
/// gesture, which is how drivers that only report whole point lists behave.
pub trait InputSink: Send + Sync {
    fn on_gesture_begin(&self, contact: ContactId, sample: RawSample);
    fn on_samples(&self, contact: ContactId, samples: &[RawSample]);
    fn on_gesture_end(&self, contact: ContactId, sample: Option<RawSample>);
    fn on_erase_begin(&self, contact: ContactId, sample: RawSample);
    fn on_erase_samples(&self, contact: ContactId, samples: &[RawSample]);
    fn on_erase_end(&self, contact: ContactId, sample: Option<RawSample>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Idle,
    Accumulating,
    Committing,
    Rejected,
}

pub fn can_transition(from: GesturePhase, to: GesturePhase) -> bool {
    matches!(
        (from, to),
        (GesturePhase::Idle, GesturePhase::Accumulating)
            | (GesturePhase::Accumulating, GesturePhase::Committing)
            | (GesturePhase::Accumulating, GesturePhase::Rejected)
            | (GesturePhase::Accumulating, GesturePhase::Idle)
            | (GesturePhase::Committing, GesturePhase::Idle)
            | (GesturePhase::Rejected, GesturePhase::Idle)
    ) || from == to
}

/// What a gesture does once it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    Draw,
    Line,
    Erase(Eraser),
    Select,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InGap,
    CrossPageLine,
    NoPoints,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gesture {
    pub contact: ContactId,
    pub kind: GestureKind,
    pub points: Vec<DocumentPoint>,
    pub started_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GestureOutcome {
    /// Sample batch or end for a contact that is not being tracked.
    Ignored,
    Accepted,
    Rejected(RejectReason),
    Completed(Gesture),
}

/// Gesture state machine for one surface. Only one contact is tracked at a
/// time; samples of any other contact are ignored until it ends.
#[derive(Debug)]
pub struct GestureTracker {
    phase: GesturePhase,
    contact: Option<ContactId>,
    kind: GestureKind,
    gate_gaps: bool,
    points: Vec<DocumentPoint>,
    started_ms: u64,
    rejection: Option<RejectReason>,
}

impl Default for GestureTracker {
    fn default() -> Self {
        Self {
            phase: GesturePhase::Idle,
            contact: None,
            kind: GestureKind::Draw,
            gate_gaps: true,
            points: Vec::new(),
            started_ms: 0,
            rejection: None,
        }
    }
}

impl GestureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    pub fn contact(&self) -> Option<ContactId> {
        self.contact
    }

    pub fn is_idle(&self) -> bool {
        self.phase == GesturePhase::Idle
    }

    fn transition(&mut self, to: GesturePhase) {
        debug_assert!(
            can_transition(self.phase, to),
            "invalid gesture transition {:?} -> {:?}",
            self.phase,
            to
        );
        self.phase = to;
    }

    /// Starts tracking `contact`. Returns false while another gesture is in
    /// flight.
    pub fn begin(&mut self, contact: ContactId, kind: GestureKind, gate_gaps: bool, started_ms: u64) -> bool {
        if !self.is_idle() {
            if self.contact != Some(contact) {
                tracing::debug!(?contact, active = ?self.contact, "ignoring extra contact");
            }
            return false;
        }
        self.contact = Some(contact);
        self.kind = kind;
        self.gate_gaps = gate_gaps;
        self.points.clear();
        self.started_ms = started_ms;
        self.rejection = None;
        self.transition(GesturePhase::Accumulating);
        true
    }

    /// Appends a transformed batch. With gap gating on, a single point in a
    /// page gap rejects the whole gesture.
    pub fn push(&mut self, contact: ContactId, batch: &[DocumentPoint], layout: &PageLayout) -> GestureOutcome {
        if self.contact != Some(contact) {
            return GestureOutcome::Ignored;
        }
        match self.phase {
            GesturePhase::Accumulating => {}
            GesturePhase::Rejected => {
                return GestureOutcome::Rejected(self.rejection.unwrap_or(RejectReason::InGap))
            }
            _ => return GestureOutcome::Ignored,
        }
        if self.gate_gaps && batch.iter().any(|point| layout.is_in_gap(point.y)) {
            tracing::debug!(?contact, points = self.points.len() + batch.len(), "gesture touches page gap, rejecting");
            self.points.clear();
            self.rejection = Some(RejectReason::InGap);
            self.transition(GesturePhase::Rejected);
            return GestureOutcome::Rejected(RejectReason::InGap);
        }
        self.points.extend_from_slice(batch);
        GestureOutcome::Accepted
    }

    /// Ends the gesture. A completed gesture leaves the tracker in
    /// `Committing` until [`Self::settle`] is called.
    pub fn finish(&mut self, contact: ContactId, layout: &PageLayout) -> GestureOutcome {
        if self.contact != Some(contact) {
            return GestureOutcome::Ignored;
        }
        match self.phase {
            GesturePhase::Rejected => {
                let reason = self.rejection.unwrap_or(RejectReason::InGap);
                self.reset();
                return GestureOutcome::Rejected(reason);
            }
            GesturePhase::Accumulating => {}
            _ => return GestureOutcome::Ignored,
        }
        if self.points.is_empty() {
            self.reset();
            return GestureOutcome::Rejected(RejectReason::NoPoints);
        }
        if self.kind == GestureKind::Line && layout.is_paginated() {
            let first = self.points[0].y;
            let last = self.points[self.points.len() - 1].y;
            if layout.page_number_for_f32(first) != layout.page_number_for_f32(last) {
                tracing::debug!(?contact, first, last, "line spans two pages, rejecting");
                self.reset();
                return GestureOutcome::Rejected(RejectReason::CrossPageLine);
            }
        }
        self.transition(GesturePhase::Committing);
        GestureOutcome::Completed(Gesture {
            contact,
            kind: self.kind,
            points: std::mem::take(&mut self.points),
            started_ms: self.started_ms,
        })
    }

    /// Back to `Idle` after the completed gesture was committed.
    pub fn settle(&mut self) {
        if self.phase == GesturePhase::Committing {
            self.reset();
        }
    }

    fn reset(&mut self) {
        self.transition(GesturePhase::Idle);
        self.contact = None;
        self.points.clear();
        self.rejection = None;
    }
}
