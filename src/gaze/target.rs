use std::sync::{Arc, RwLock};

use super::state::{Rect, Viewport};

/// Live view of the element gaze is measured against (usually the video
/// surface). A `None` rect means the element is not mounted.
pub trait TargetElement: Send + Sync {
    fn bounding_rect(&self) -> Option<Rect>;
    fn viewport(&self) -> Viewport;
}

#[derive(Debug, Clone, Copy, Default)]
struct Layout {
    rect: Option<Rect>,
    viewport: Viewport,
}

/// Layout cell the host updates on resize/scroll of the target element.
#[derive(Debug, Clone, Default)]
pub struct SharedTarget {
    layout: Arc<RwLock<Layout>>,
}

impl SharedTarget {
    pub fn new(rect: Rect, viewport: Viewport) -> Self {
        Self {
            layout: Arc::new(RwLock::new(Layout {
                rect: Some(rect),
                viewport,
            })),
        }
    }

    pub fn set_rect(&self, rect: Option<Rect>) {
        self.layout
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .rect = rect;
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        self.layout
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .viewport = viewport;
    }

    fn layout(&self) -> Layout {
        *self
            .layout
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TargetElement for SharedTarget {
    fn bounding_rect(&self) -> Option<Rect> {
        self.layout().rect
    }

    fn viewport(&self) -> Viewport {
        self.layout().viewport
    }
}
