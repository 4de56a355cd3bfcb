//! Eager/lazy materialization decisions and per-attachment state.

use std::collections::BTreeMap;

use attach_flow::AttachmentId;

use crate::geometry::Rect;

/// Which attachments get replacement content when content is applied.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum MaterializationPolicy {
    /// Materialize every attachment.
    #[default]
    Unbounded,
    /// Materialize the first `n` attachments in document order; skip the rest.
    MaxCount(usize),
    /// Materialize attachments whose anchor starts above the rectangle's
    /// bottom edge; defer the rest until revealed.
    Viewport(Rect),
}

/// Outcome of [`MaterializationController::decide`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    MaterializeNow,
    Defer,
    Skip,
}

/// Lifecycle of one attachment inside a view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AttachmentState {
    #[default]
    Parsed,
    Skipped,
    Deferred,
    Materialized,
    Destroyed,
}

impl AttachmentState {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        use AttachmentState::*;
        matches!(
            (self, next),
            (Parsed, Skipped | Deferred | Materialized)
                | (Deferred, Materialized)
                | (Materialized, Materialized)
                | (Skipped | Deferred, Parsed)
                | (Parsed | Skipped | Deferred | Materialized, Destroyed)
        )
    }
}

/// Decides per attachment whether to materialize now, defer, or skip, and
/// tracks deferred attachments until they are revealed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MaterializationController {
    policy: MaterializationPolicy,
    /// Running maximum bottom edge seen during a viewport scan.
    cursor: f32,
    states: BTreeMap<AttachmentId, AttachmentState>,
    pending: Vec<AttachmentId>,
}

impl MaterializationController {
    pub fn new(policy: MaterializationPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> MaterializationPolicy {
        self.policy
    }

    /// Switch policy; skipped and deferred attachments return to `Parsed`
    /// so the next scan re-evaluates them.
    pub fn set_policy(&mut self, policy: MaterializationPolicy) {
        self.policy = policy;
        self.pending.clear();
        let reconsidered: Vec<AttachmentId> = self
            .states
            .iter()
            .filter(|(_, state)| matches!(state, AttachmentState::Skipped | AttachmentState::Deferred))
            .map(|(id, _)| id.clone())
            .collect();
        for id in reconsidered {
            self.transition(&id, AttachmentState::Parsed);
        }
    }

    /// Start tracking a new document's attachments, all `Parsed`.
    pub fn track<'a, I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = &'a AttachmentId>,
    {
        self.states = ids
            .into_iter()
            .map(|id| (id.clone(), AttachmentState::Parsed))
            .collect();
        self.pending.clear();
        self.cursor = 0.0;
    }

    /// Reset the viewport cursor before a top-to-bottom scan.
    pub fn begin_scan(&mut self) {
        self.cursor = 0.0;
    }

    /// Decide for the attachment at document-order `index`, whose anchor
    /// occupies `anchor_rect` in the host (if laid out).
    pub fn decide(&mut self, index: usize, anchor_rect: Option<Rect>) -> Decision {
        match self.policy {
            MaterializationPolicy::Unbounded => Decision::MaterializeNow,
            MaterializationPolicy::MaxCount(max) => {
                if index < max {
                    Decision::MaterializeNow
                } else {
                    Decision::Skip
                }
            }
            MaterializationPolicy::Viewport(viewport) => {
                let bottom = viewport.max_y();
                if self.cursor > bottom {
                    return Decision::Defer;
                }
                let Some(rect) = anchor_rect else {
                    return Decision::Defer;
                };
                self.cursor = self.cursor.max(rect.max_y());
                if rect.min_y() < bottom {
                    Decision::MaterializeNow
                } else {
                    Decision::Defer
                }
            }
        }
    }

    pub fn state(&self, id: &AttachmentId) -> Option<AttachmentState> {
        self.states.get(id).copied()
    }

    /// Move `id` to `next`; illegal transitions are refused with a warning.
    pub fn transition(&mut self, id: &AttachmentId, next: AttachmentState) -> bool {
        let Some(state) = self.states.get_mut(id) else {
            log::warn!("state change for untracked attachment {}", id);
            return false;
        };
        if !state.can_transition_to(next) {
            log::warn!("refusing {:?} -> {:?} for {}", *state, next, id);
            return false;
        }
        log::debug!("{}: {:?} -> {:?}", id, *state, next);
        *state = next;
        match next {
            AttachmentState::Deferred if !self.pending.contains(id) => self.pending.push(id.clone()),
            AttachmentState::Deferred => {}
            _ => self.pending.retain(|pending| pending != id),
        }
        true
    }

    /// Deferred attachments in the order they were deferred.
    pub fn pending(&self) -> &[AttachmentId] {
        &self.pending
    }

    /// Switch to `Unbounded`, reset the cursor, and hand back every deferred
    /// attachment. The pending list is empty afterwards.
    pub fn reveal(&mut self) -> Vec<AttachmentId> {
        self.policy = MaterializationPolicy::Unbounded;
        self.cursor = 0.0;
        core::mem::take(&mut self.pending)
    }

    /// Mark everything `Destroyed` and restore `policy`.
    pub fn reset(&mut self, policy: MaterializationPolicy) {
        for state in self.states.values_mut() {
            *state = AttachmentState::Destroyed;
        }
        self.pending.clear();
        self.cursor = 0.0;
        self.policy = policy;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attach_flow::TagKind;

    fn ids(n: usize) -> Vec<AttachmentId> {
        (1..=n)
            .map(|i| AttachmentId::placeholder(TagKind::Image, i))
            .collect()
    }

    #[test]
    fn max_count_materializes_a_prefix_and_skips_the_rest() {
        let mut controller = MaterializationController::new(MaterializationPolicy::MaxCount(2));
        let decisions: Vec<Decision> = (0..5).map(|i| controller.decide(i, None)).collect();
        assert_eq!(
            decisions,
            vec![
                Decision::MaterializeNow,
                Decision::MaterializeNow,
                Decision::Skip,
                Decision::Skip,
                Decision::Skip,
            ]
        );
    }

    #[test]
    fn viewport_defers_once_the_cursor_passes_the_bottom_edge() {
        let viewport = Rect::new(0.0, 0.0, 320.0, 250.0);
        let mut controller = MaterializationController::new(MaterializationPolicy::Viewport(viewport));
        controller.begin_scan();
        let at = |y: f32| Some(Rect::new(0.0, y, 10.0, 20.0));
        assert_eq!(controller.decide(0, at(10.0)), Decision::MaterializeNow);
        assert_eq!(controller.decide(1, at(200.0)), Decision::MaterializeNow);
        assert_eq!(controller.decide(2, at(500.0)), Decision::Defer);
        // cursor is now past the bottom, so even a higher anchor defers
        assert_eq!(controller.decide(3, at(0.0)), Decision::Defer);
    }

    #[test]
    fn reveal_drains_pending_and_unbounds_the_policy() {
        let ids = ids(2);
        let mut controller = MaterializationController::new(MaterializationPolicy::MaxCount(0));
        controller.track(&ids);
        assert!(controller.transition(&ids[0], AttachmentState::Deferred));
        assert!(controller.transition(&ids[1], AttachmentState::Deferred));
        assert_eq!(controller.pending(), &ids[..]);

        let revealed = controller.reveal();
        assert_eq!(revealed, ids);
        assert!(controller.pending().is_empty());
        assert_eq!(controller.policy(), MaterializationPolicy::Unbounded);
    }

    #[test]
    fn destroyed_is_terminal_and_skipped_needs_a_policy_change() {
        let ids = ids(2);
        let mut controller = MaterializationController::default();
        controller.track(&ids);
        assert!(controller.transition(&ids[0], AttachmentState::Skipped));
        assert!(!controller.transition(&ids[0], AttachmentState::Materialized));

        controller.set_policy(MaterializationPolicy::Unbounded);
        assert_eq!(controller.state(&ids[0]), Some(AttachmentState::Parsed));

        controller.reset(MaterializationPolicy::Unbounded);
        assert_eq!(controller.state(&ids[1]), Some(AttachmentState::Destroyed));
        assert!(!controller.transition(&ids[1], AttachmentState::Materialized));
    }
}
