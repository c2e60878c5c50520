use std::{
    fs::File,
    io::{BufWriter, Seek, Write},
    path::Path,
};

use crate::{
    capture::capture_frame,
    error::{LifelineError, LifelineResult},
    session::{ExportProgress, PlaybackMode, Session},
    surface::CaptureSurface,
};

/// Default output name for a single-image export.
pub const SINGLE_IMAGE_FILE_NAME: &str = "sequence-diagram.jpg";
/// Default output name for a sequence export archive.
pub const ANIMATION_ARCHIVE_FILE_NAME: &str = "sequence-diagram-animation.zip";

/// Outcome of a sequence export.
///
/// `frames_total` counts every playback step (`messages + 1` including the
/// initial empty frame); captures the surface reported unavailable are
/// counted in `frames_skipped` and have no archive entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub frames_total: usize,
    pub frames_captured: usize,
    pub frames_skipped: usize,
}

/// Replace every character outside `[A-Za-z0-9]` and the CJK ideograph range
/// with `_`, then truncate to 20 characters. The result is filesystem-safe
/// and stable for a given label.
pub fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || ('\u{4e00}'..='\u{9fa5}').contains(&c) {
                c
            } else {
                '_'
            }
        })
        .take(20)
        .collect()
}

/// Deterministic archive entry name for one playback step.
///
/// Step `-1` (nothing visible yet) is the `00` "initial" frame; message `i`
/// gets a 1-based, 2-digit sequence number plus its sanitized label, so
/// entries sort lexicographically in playback order.
pub fn frame_entry_name(step: i32, label: Option<&str>) -> String {
    if step < 0 {
        return "frame_00_initial.jpg".to_string();
    }
    format!(
        "frame_{:02}_{}.jpg",
        step + 1,
        sanitize_label(label.unwrap_or_default())
    )
}

/// Export the session's current visual as one content-cropped JPEG.
///
/// Guarded by the session's `exporting` flag. The layout override and the
/// flag are reverted on every path. An unavailable drawing context aborts
/// with a capture error (unlike sequence export, there is no frame to skip
/// to).
#[tracing::instrument(skip_all)]
pub fn export_image_to_writer<W: Write>(
    session: &mut Session,
    surface: &mut dyn CaptureSurface,
    writer: &mut W,
) -> LifelineResult<()> {
    if session.exporting {
        return Err(LifelineError::validation(
            "an export is already in progress",
        ));
    }
    session.exporting = true;

    let result = run_single_capture(surface, writer);

    surface.restore_layout();
    session.exporting = false;
    result
}

/// [`export_image_to_writer`] writing to `out_path`, creating parent
/// directories as needed.
pub fn export_image(
    session: &mut Session,
    surface: &mut dyn CaptureSurface,
    out_path: impl AsRef<Path>,
) -> LifelineResult<()> {
    let out_path = out_path.as_ref();
    ensure_parent_dir(out_path)?;
    let mut file = File::create(out_path).map_err(|e| {
        LifelineError::packaging(format!("failed to create '{}': {e}", out_path.display()))
    })?;
    export_image_to_writer(session, surface, &mut file)
}

fn run_single_capture<W: Write>(
    surface: &mut dyn CaptureSurface,
    writer: &mut W,
) -> LifelineResult<()> {
    surface.settle()?;
    surface.expand_layout();
    surface.settle()?;

    let Some(frame) = capture_frame(surface)? else {
        return Err(LifelineError::capture(
            "drawing context unavailable for single-image export",
        ));
    };

    writer
        .write_all(&frame.jpeg)
        .map_err(|e| LifelineError::packaging(format!("failed to write image: {e}")))
}

/// Export one frame per playback step, from "no messages" through "all
/// messages", into a ZIP archive written to `writer`.
///
/// Sequence: switch to Dynamic mode, expand the capture layout (settling
/// after each change), then for every step update the observable progress,
/// settle, capture, and store the frame under its deterministic entry name.
/// A frame the surface reports unavailable is skipped silently; the export is
/// best-effort, not all-or-nothing. Whatever happens, the original mode and
/// step, the surface layout, and the `exporting` flag are restored before
/// this returns.
#[tracing::instrument(skip_all, fields(messages = session.diagram().messages.len()))]
pub fn export_animation_to_writer<W, F>(
    session: &mut Session,
    surface: &mut dyn CaptureSurface,
    writer: W,
    mut on_progress: F,
) -> LifelineResult<ExportReport>
where
    W: Write + Seek,
    F: FnMut(ExportProgress),
{
    if session.exporting {
        return Err(LifelineError::validation(
            "an export is already in progress",
        ));
    }
    session.exporting = true;

    let original_mode = session.mode;
    let original_step = session.current_step;

    let result = run_sequence(session, surface, writer, &mut on_progress);

    // Finalization for every path out of the sequence: restore the view
    // state, clear the layout override, drop progress, release the gate.
    surface.restore_layout();
    session.mode = original_mode;
    session.current_step = original_step;
    surface.set_view(original_mode, original_step);
    session.export_progress = None;
    session.exporting = false;

    result
}

/// [`export_animation_to_writer`] writing to `out_path`, creating parent
/// directories as needed.
pub fn export_animation<F>(
    session: &mut Session,
    surface: &mut dyn CaptureSurface,
    out_path: impl AsRef<Path>,
    on_progress: F,
) -> LifelineResult<ExportReport>
where
    F: FnMut(ExportProgress),
{
    let out_path = out_path.as_ref();
    ensure_parent_dir(out_path)?;
    let file = File::create(out_path).map_err(|e| {
        LifelineError::packaging(format!("failed to create '{}': {e}", out_path.display()))
    })?;
    export_animation_to_writer(session, surface, BufWriter::new(file), on_progress)
}

fn run_sequence<W: Write + Seek>(
    session: &mut Session,
    surface: &mut dyn CaptureSurface,
    writer: W,
    on_progress: &mut dyn FnMut(ExportProgress),
) -> LifelineResult<ExportReport> {
    let labels: Vec<String> = session
        .diagram()
        .playback_order()
        .iter()
        .map(|m| m.label.clone())
        .collect();
    let total = labels.len() + 1;

    let mut zip = zip::ZipWriter::new(writer);
    let options = zip::write::SimpleFileOptions::default();
    let mut report = ExportReport {
        frames_total: total,
        ..ExportReport::default()
    };

    // Preparing: step-through mode first, then the unclipped capture layout;
    // the surface acknowledges each change before the first capture.
    session.mode = PlaybackMode::Dynamic;
    surface.set_view(PlaybackMode::Dynamic, session.current_step);
    surface.settle()?;
    surface.expand_layout();
    surface.settle()?;

    for step in -1..labels.len() as i32 {
        session.current_step = step;
        surface.set_view(PlaybackMode::Dynamic, step);

        let progress = ExportProgress {
            current: (step + 2) as usize,
            total,
        };
        session.export_progress = Some(progress);
        on_progress(progress);

        surface.settle()?;

        match capture_frame(surface)? {
            Some(frame) => {
                let label = (step >= 0).then(|| labels[step as usize].as_str());
                let name = frame_entry_name(step, label);
                zip.start_file(name, options)
                    .map_err(|e| LifelineError::packaging(format!("archive entry failed: {e}")))?;
                zip.write_all(&frame.jpeg)
                    .map_err(|e| LifelineError::packaging(format!("archive write failed: {e}")))?;
                report.frames_captured += 1;
            }
            None => {
                tracing::warn!(step, "frame unavailable, skipping archive entry");
                report.frames_skipped += 1;
            }
        }
    }

    zip.finish()
        .map_err(|e| LifelineError::packaging(format!("archive finalization failed: {e}")))?;
    Ok(report)
}

fn ensure_parent_dir(path: &Path) -> LifelineResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            use anyhow::Context as _;
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create output directory '{}'", parent.display())
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::{model::Diagram, surface::FrameRgba};

    struct NullSurface;

    impl CaptureSurface for NullSurface {
        fn set_view(&mut self, _mode: PlaybackMode, _step: i32) {}
        fn expand_layout(&mut self) {}
        fn restore_layout(&mut self) {}
        fn rasterize(&mut self) -> LifelineResult<Option<FrameRgba>> {
            Ok(None)
        }
    }

    #[test]
    fn a_second_export_is_rejected_while_one_is_active() {
        let mut session = Session::new(Diagram::sample());
        session.exporting = true;
        let mut surface = NullSurface;

        let err = export_animation_to_writer(
            &mut session,
            &mut surface,
            Cursor::new(Vec::new()),
            |_| {},
        );
        assert!(matches!(err, Err(LifelineError::Validation(_))));
        assert!(
            session.exporting,
            "a rejected request must not clear the active gate"
        );

        let err = export_image_to_writer(&mut session, &mut surface, &mut Vec::new());
        assert!(matches!(err, Err(LifelineError::Validation(_))));
    }

    #[test]
    fn the_gate_reopens_after_an_export_completes() {
        let mut session = Session::new(Diagram::sample());
        let mut surface = NullSurface;

        let report = export_animation_to_writer(
            &mut session,
            &mut surface,
            Cursor::new(Vec::new()),
            |_| {},
        )
        .unwrap();
        assert_eq!(report.frames_captured, 0);
        assert_eq!(report.frames_skipped, 7);
        assert!(!session.exporting);

        assert!(
            export_animation_to_writer(
                &mut session,
                &mut surface,
                Cursor::new(Vec::new()),
                |_| {},
            )
            .is_ok()
        );
    }

    #[test]
    fn sanitize_replaces_outside_the_allowed_set() {
        assert_eq!(sanitize_label("Click Login"), "Click_Login");
        assert_eq!(sanitize_label("POST /auth/login"), "POST__auth_login");
        assert_eq!(sanitize_label("200 OK (Token)"), "200_OK__Token_");
    }

    #[test]
    fn sanitize_keeps_cjk_ideographs() {
        assert_eq!(sanitize_label("点击登录"), "点击登录");
        assert_eq!(sanitize_label("查询用户 (db)"), "查询用户__db_");
    }

    #[test]
    fn sanitize_truncates_to_twenty_characters() {
        let long = "a very long label that keeps going";
        assert_eq!(sanitize_label(long).chars().count(), 20);
        assert_eq!(sanitize_label(long), "a_very_long_label_th");
    }

    #[test]
    fn entry_names_sort_in_playback_order() {
        let names = vec![
            frame_entry_name(-1, None),
            frame_entry_name(0, Some("Click Login")),
            frame_entry_name(1, Some("POST /auth/login")),
            frame_entry_name(10, Some("last")),
        ];
        assert_eq!(names[0], "frame_00_initial.jpg");
        assert_eq!(names[1], "frame_01_Click_Login.jpg");
        assert_eq!(names[2], "frame_02_POST__auth_login.jpg");
        assert_eq!(names[3], "frame_11_last.jpg");

        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(sorted, names);
    }
}
