//! Per-client in-progress drag state. Local only, never replicated.

/// Drags smaller than this in either dimension are discarded on release
pub const MIN_DRAG_SIZE: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    /// Bottom-left corner
    pub pos: (f32, f32),
    pub size: (f32, f32),
}

/// Rectangle spanned by a drag from `anchor` to `pos`, in any direction
pub fn drag_rect(anchor: (f32, f32), pos: (f32, f32)) -> Rect {
    Rect {
        pos: (anchor.0.min(pos.0), anchor.1.min(pos.1)),
        size: ((pos.0 - anchor.0).abs(), (pos.1 - anchor.1).abs()),
    }
}

#[derive(Debug, Clone, Default)]
pub struct Gesture {
    anchor: Option<(f32, f32)>,
    preview: Option<Rect>,
    /// Press landed on an existing object; swallow the matching release
    skip_release: bool,
}

impl Gesture {
    /// Start a drag at `pos`
    pub fn press(&mut self, pos: (f32, f32)) {
        self.anchor = Some(pos);
        self.preview = Some(Rect {
            pos,
            size: (0.0, 0.0),
        });
    }

    /// Mark the current press as consumed by something else
    pub fn consume(&mut self) {
        self.anchor = None;
        self.preview = None;
        self.skip_release = true;
    }

    pub fn drag(&mut self, pos: (f32, f32)) -> Option<Rect> {
        let rect = drag_rect(self.anchor?, pos);
        self.preview = Some(rect);
        Some(rect)
    }

    pub fn preview(&self) -> Option<Rect> {
        self.preview
    }

    /// Finish the drag. Yields the final rectangle if it is large enough.
    pub fn release(&mut self) -> Option<Rect> {
        self.anchor = None;
        let preview = self.preview.take();
        if std::mem::take(&mut self.skip_release) {
            return None;
        }
        preview.filter(|r| r.size.0 > MIN_DRAG_SIZE && r.size.1 > MIN_DRAG_SIZE)
    }
}
