//! Sidebar visibility state.
//!
//! The list panel is always shown on wide viewports. On narrow viewports it
//! can be collapsed, and it collapses by itself after a selection so the map
//! flight is visible.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Widths below this are narrow (logical pixels).
pub const NARROW_BREAKPOINT_PX: u32 = 768;

/// Read access to the current viewport width.
pub trait ViewportQuery: Send + Sync {
    /// Current width in logical pixels.
    fn width(&self) -> u32;

    fn is_narrow(&self) -> bool {
        self.width() < NARROW_BREAKPOINT_PX
    }
}

/// Viewport width shared between the web surface and the view binding.
#[derive(Debug, Clone)]
pub struct SharedViewport {
    width: Arc<AtomicU32>,
}

impl SharedViewport {
    #[must_use]
    pub fn new(width: u32) -> Self {
        Self {
            width: Arc::new(AtomicU32::new(width)),
        }
    }

    pub fn set_width(&self, width: u32) {
        self.width.store(width, Ordering::Relaxed);
    }
}

impl ViewportQuery for SharedViewport {
    fn width(&self) -> u32 {
        self.width.load(Ordering::Relaxed)
    }
}

/// Collapsed or expanded list panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidebarState {
    Expanded,
    Collapsed,
}

impl SidebarState {
    /// Initial state: expanded on wide viewports, collapsed on narrow ones.
    #[must_use]
    pub fn for_viewport(viewport: &dyn ViewportQuery) -> Self {
        if viewport.is_narrow() {
            Self::Collapsed
        } else {
            Self::Expanded
        }
    }

    pub fn toggle(&mut self) {
        *self = match self {
            Self::Expanded => Self::Collapsed,
            Self::Collapsed => Self::Expanded,
        };
    }

    /// Collapse after a selection, narrow viewports only.
    ///
    /// Returns whether the state changed.
    pub fn collapse_if_narrow(&mut self, viewport: &dyn ViewportQuery) -> bool {
        if viewport.is_narrow() && *self == Self::Expanded {
            *self = Self::Collapsed;
            return true;
        }
        false
    }

    /// Whether the panel is drawn. Wide viewports ignore the stored state.
    #[must_use]
    pub fn is_visible(self, viewport: &dyn ViewportQuery) -> bool {
        !viewport.is_narrow() || self == Self::Expanded
    }
}
