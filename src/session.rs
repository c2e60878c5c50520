use crate::model::Diagram;

/// How the diagram is presented.
///
/// `Static` shows every message at once; `Dynamic` steps through them one at
/// a time under the control of [`Session::current_step`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PlaybackMode {
    Static,
    Dynamic,
}

/// Observable progress of an in-flight sequence export.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExportProgress {
    /// 1-based index of the frame about to be captured.
    pub current: usize,
    /// Total frame count (`messages + 1` for the initial empty frame).
    pub total: usize,
}

/// The active editing/viewing session: the diagram plus ephemeral view state.
///
/// `current_step` lives in the inclusive range `[-1, N-1]` where `N` is the
/// message count: `-1` means no messages shown, `N-1` means all shown. The
/// `exporting` flag is the mutual-exclusion gate for exports; it is owned by
/// the export controller and only ever toggled through it.
#[derive(Clone, Debug)]
pub struct Session {
    diagram: Diagram,
    pub mode: PlaybackMode,
    pub current_step: i32,
    pub(crate) exporting: bool,
    pub(crate) export_progress: Option<ExportProgress>,
}

impl Session {
    /// Start a session showing `diagram` fully (Static mode, all messages).
    pub fn new(diagram: Diagram) -> Self {
        let last = last_step(&diagram);
        Self {
            diagram,
            mode: PlaybackMode::Static,
            current_step: last,
            exporting: false,
            export_progress: None,
        }
    }

    pub fn diagram(&self) -> &Diagram {
        &self.diagram
    }

    /// Replace the diagram wholesale and reset view state to Static with all
    /// messages visible. Partial mutation of the active diagram is
    /// deliberately unsupported.
    pub fn replace_diagram(&mut self, diagram: Diagram) {
        self.current_step = last_step(&diagram);
        self.diagram = diagram;
        self.mode = PlaybackMode::Static;
    }

    /// Drop all actors and messages and return to the initial view state.
    pub fn clear(&mut self) {
        self.diagram = Diagram::default();
        self.mode = PlaybackMode::Static;
        self.current_step = -1;
    }

    /// Switch playback mode. Static jumps to the final step (everything
    /// visible); Dynamic rewinds to the initial empty state.
    pub fn set_mode(&mut self, mode: PlaybackMode) {
        self.mode = mode;
        self.current_step = match mode {
            PlaybackMode::Static => last_step(&self.diagram),
            PlaybackMode::Dynamic => -1,
        };
    }

    /// Set the playback position, clamped to `[-1, N-1]`.
    pub fn set_step(&mut self, step: i32) {
        self.current_step = step.clamp(-1, last_step(&self.diagram));
    }

    /// Advance one step if not already at the end.
    pub fn next_step(&mut self) {
        if self.current_step < last_step(&self.diagram) {
            self.current_step += 1;
        }
    }

    /// Rewind to the initial empty state.
    pub fn reset_steps(&mut self) {
        self.current_step = -1;
    }

    /// Whether an export currently owns the view state.
    pub fn is_exporting(&self) -> bool {
        self.exporting
    }

    /// Progress of the in-flight sequence export, if one is running.
    pub fn export_progress(&self) -> Option<ExportProgress> {
        self.export_progress
    }
}

fn last_step(diagram: &Diagram) -> i32 {
    diagram.messages.len() as i32 - 1
}
