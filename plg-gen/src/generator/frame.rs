//! Entry and exit bounds of generated fragments.

use plg_core::{
    ComponentId,
    Process,
    ProcessError,
};

/// Boundary of a generated fragment: the node control enters through and the one it leaves by.
///
/// An absent fragment (`None`) stands for a skipped pattern; [`PatternFrame::connect`] treats it
/// as the identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatternFrame {
    /// First node of the fragment.
    entry: ComponentId,
    /// Last node of the fragment.
    exit: ComponentId,
}

impl PatternFrame {
    /// Frame spanning `entry` to `exit`.
    #[must_use]
    pub const fn new(entry: ComponentId, exit: ComponentId) -> Self {
        Self { entry, exit }
    }

    /// Frame made of one node.
    #[must_use]
    pub const fn single(node: ComponentId) -> Self {
        Self::new(node, node)
    }

    /// First node of the fragment.
    #[must_use]
    pub const fn entry(&self) -> ComponentId {
        self.entry
    }

    /// Last node of the fragment.
    #[must_use]
    pub const fn exit(&self) -> ComponentId {
        self.exit
    }

    /// Chain `left` before `right`, returning the frame spanning both.
    pub fn connect(
        process: &mut Process,
        left: Option<Self>,
        right: Option<Self>,
    ) -> Result<Option<Self>, ProcessError> {
        match (left, right) {
            (Some(l), Some(r)) => {
                process.new_sequence(l.exit, r.entry)?;
                Ok(Some(Self::new(l.entry, r.exit)))
            },
            (frame, None) | (None, frame) => Ok(frame),
        }
    }

    /// Wire `frame` between two existing nodes; a skipped frame links them directly.
    pub fn link(
        process: &mut Process,
        from: ComponentId,
        frame: Option<Self>,
        to: ComponentId,
    ) -> Result<(), ProcessError> {
        let head = Self::connect(process, Some(Self::single(from)), frame)?;
        Self::connect(process, head, Some(Self::single(to)))?;
        Ok(())
    }
}
