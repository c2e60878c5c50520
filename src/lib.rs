#![forbid(unsafe_code)]

pub mod capture;
pub mod error;
pub mod export;
pub mod generate;
pub mod layout;
pub mod model;
pub mod scene;
pub mod session;
pub mod surface;

pub use capture::{CapturedFrame, ContentBox, capture_frame, crop_to_content, detect_content_bounds};
pub use error::{LifelineError, LifelineResult};
pub use export::{
    ANIMATION_ARCHIVE_FILE_NAME, ExportReport, SINGLE_IMAGE_FILE_NAME, export_animation,
    export_animation_to_writer, export_image, export_image_to_writer, frame_entry_name,
    sanitize_label,
};
pub use generate::{DiagramGenerator, GeneratorConfig, ImagePayload};
pub use layout::{SceneLayout, layout_scene};
pub use model::{Actor, Diagram, Message, MessageKind};
pub use scene::{ChromeInsets, SceneOptions, SceneRenderer};
pub use session::{ExportProgress, PlaybackMode, Session};
pub use surface::{CaptureSurface, FrameRgba};
