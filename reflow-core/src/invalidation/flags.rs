//! Invalidation flags.

use bitflags::bitflags;

bitflags! {
    /// What a widget needs before it is up to date on screen.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InvalidationFlags: u8 {
        /// Size or child placement may have changed. Propagates to ancestors.
        const LAYOUT = 1 << 0;
        /// Appearance changed. Local to the node.
        const PAINT  = 1 << 1;
    }
}

impl InvalidationFlags {
    /// Everything: a freshly inserted widget.
    pub const ALL: Self = Self::LAYOUT.union(Self::PAINT);

    /// Whether these flags require a layout pass.
    pub fn needs_layout(self) -> bool {
        self.contains(Self::LAYOUT)
    }

    /// Whether these flags require a paint pass.
    pub fn needs_paint(self) -> bool {
        self.contains(Self::PAINT)
    }
}
