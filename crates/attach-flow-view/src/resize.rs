//! Container-fit sizing and late natural-size reconciliation.

use attach_flow::{Attachment, Size};

/// Fit a replacement of size `current` to a container `container_width`
/// wide.
///
/// Without a `max` bound, or with one wider than the container, the width
/// becomes the (floored) container width and the height follows the current
/// aspect ratio. Otherwise `max` is used as is. Zero-height replacements are
/// left alone, and a one-unit-high marker never collapses to zero.
pub fn fit_to_container(current: Size, max: Size, container_width: f32) -> Size {
    if current.height == 0.0 {
        return current;
    }
    let ratio = current.width / current.height;
    let mut fitted = if max.width == 0.0 || max.width > container_width {
        let width = container_width.floor();
        Size::new(width, (width / ratio).floor())
    } else {
        max
    };
    if fitted.height == 0.0 && current.height == 1.0 {
        fitted.height = 1.0;
    }
    fitted
}

/// Applies natural sizes that arrive after materialization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResizeReconciler {
    resolved: usize,
}

impl ResizeReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of natural sizes applied so far.
    pub fn resolved(&self) -> usize {
        self.resolved
    }

    /// Record `natural` for `attachment` and return the replacement's new
    /// size, or `None` if the natural size is itself unknown.
    ///
    /// The natural size is clamped to the container preserving its aspect
    /// ratio, and the clamped size becomes the attachment's `max_size`.
    pub fn natural_size_resolved(
        &mut self,
        attachment: &mut Attachment,
        natural: Size,
        container_width: f32,
    ) -> Option<Size> {
        if natural.is_unknown() {
            log::debug!("{} resolved to an unknown size; ignoring", attachment.id());
            return None;
        }
        let clamped = natural.clamp_width(container_width.floor());
        attachment.set_max_size(clamped);
        self.resolved += 1;
        let size = fit_to_container(clamped, clamped, container_width);
        log::debug!(
            "{} natural {}x{} -> {}x{}",
            attachment.id(),
            natural.width,
            natural.height,
            size.width,
            size.height
        );
        Some(size)
    }
}
