use std::collections::HashMap;

use kurbo::Rect;

use crate::{
    model::Diagram,
    session::PlaybackMode,
};

// Scene geometry in abstract units; the rendering surface decides the pixel
// scale. Values match the visual proportions of the interactive scene.
pub const ACTOR_SPACING: f64 = 4.0;
pub const MESSAGE_SPACING: f64 = 1.4;
pub const ACTOR_BOX_WIDTH: f64 = 2.0;
pub const ACTOR_BOX_HEIGHT: f64 = 0.7;
pub const ACTOR_Y: f64 = 2.0;
pub const SELF_LOOP_WIDTH: f64 = 1.8;
pub const SELF_LOOP_HEIGHT: f64 = 0.6;
pub const ARROW_INSET: f64 = 0.2;
const LIFELINE_TAIL_PADDING: f64 = 2.0;

/// An actor box plus its lifeline.
#[derive(Clone, Debug, PartialEq)]
pub struct ActorShape {
    pub id: String,
    pub label: String,
    /// Center x of the box and of the lifeline.
    pub x: f64,
    /// Endpoint of the currently active message.
    pub active: bool,
}

/// One message row: an arrow between two lifelines, or a self-loop.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageShape {
    pub label: String,
    pub source_x: f64,
    pub target_x: f64,
    pub y: f64,
    pub visible: bool,
    pub active: bool,
    pub self_loop: bool,
}

/// Playback state of a step-indicator marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepMarkerState {
    Done,
    Current,
    Pending,
}

/// One marker of the step-indicator overlay. The overlay is interactive
/// chrome pinned to the viewport (the renderer positions it in screen
/// space): every marker carries the export-exclude tag and must not appear
/// in captured frames.
#[derive(Clone, Debug, PartialEq)]
pub struct StepMarker {
    pub index: usize,
    pub state: StepMarkerState,
    pub export_exclude: bool,
}

/// Geometry of the whole scene at one playback position.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneLayout {
    pub actors: Vec<ActorShape>,
    pub messages: Vec<MessageShape>,
    pub overlay: Vec<StepMarker>,
    /// y of the lower end of every lifeline (negative; grows with messages).
    pub lifeline_bottom: f64,
    /// Uniform scale applied so long diagrams stay inside the base framing.
    pub content_scale: f64,
    /// World-space bounds of the capturable content (overlay excluded).
    pub bounds: Rect,
}

/// Lay out `diagram` for one playback position.
///
/// Pure function of its inputs. Messages are taken in playback order; in
/// Static mode every message is visible and none is active, in Dynamic mode
/// messages `0..=step` are visible and `step` itself is active. Unknown
/// actor references resolve to lifeline position 0.
pub fn layout_scene(diagram: &Diagram, mode: PlaybackMode, step: i32) -> SceneLayout {
    let ordered = diagram.playback_order();
    let n = ordered.len();

    let lifeline_bottom = -((n as f64 + 1.0) * MESSAGE_SPACING + LIFELINE_TAIL_PADDING);
    let content_scale = {
        let content_height = 3.8 - lifeline_bottom;
        (17.8 / content_height).clamp(0.4, 0.75)
    };

    let start_x = -((diagram.actors.len().saturating_sub(1)) as f64 * ACTOR_SPACING) / 2.0;
    let mut positions: HashMap<&str, f64> = HashMap::with_capacity(diagram.actors.len());
    for (i, actor) in diagram.actors.iter().enumerate() {
        positions.insert(actor.id.as_str(), start_x + i as f64 * ACTOR_SPACING);
    }

    let active_endpoints: Option<(&str, &str)> = match mode {
        PlaybackMode::Dynamic if step >= 0 => ordered
            .get(step as usize)
            .map(|m| (m.source_id.as_str(), m.target_id.as_str())),
        _ => None,
    };

    let actors: Vec<ActorShape> = diagram
        .actors
        .iter()
        .map(|actor| ActorShape {
            id: actor.id.clone(),
            label: actor.name.clone(),
            x: positions.get(actor.id.as_str()).copied().unwrap_or(0.0),
            active: active_endpoints
                .map(|(s, t)| s == actor.id || t == actor.id)
                .unwrap_or(false),
        })
        .collect();

    let messages: Vec<MessageShape> = ordered
        .iter()
        .enumerate()
        .map(|(i, msg)| {
            let visible = match mode {
                PlaybackMode::Static => true,
                PlaybackMode::Dynamic => (i as i32) <= step,
            };
            MessageShape {
                label: msg.label.clone(),
                source_x: positions.get(msg.source_id.as_str()).copied().unwrap_or(0.0),
                target_x: positions.get(msg.target_id.as_str()).copied().unwrap_or(0.0),
                y: -((i as f64) + 1.0) * MESSAGE_SPACING,
                visible,
                active: mode == PlaybackMode::Dynamic && i as i32 == step,
                self_loop: msg.is_self_message(),
            }
        })
        .collect();

    let overlay: Vec<StepMarker> = (0..n)
        .map(|i| StepMarker {
            index: i,
            state: if i as i32 == step && mode == PlaybackMode::Dynamic {
                StepMarkerState::Current
            } else if (i as i32) < step || mode == PlaybackMode::Static {
                StepMarkerState::Done
            } else {
                StepMarkerState::Pending
            },
            export_exclude: true,
        })
        .collect();

    let bounds = content_bounds(&actors, &messages, lifeline_bottom);

    SceneLayout {
        actors,
        messages,
        overlay,
        lifeline_bottom,
        content_scale,
        bounds,
    }
}

fn content_bounds(actors: &[ActorShape], messages: &[MessageShape], lifeline_bottom: f64) -> Rect {
    let mut min_x = -ACTOR_BOX_WIDTH / 2.0;
    let mut max_x = ACTOR_BOX_WIDTH / 2.0;
    for a in actors {
        min_x = min_x.min(a.x - ACTOR_BOX_WIDTH / 2.0);
        max_x = max_x.max(a.x + ACTOR_BOX_WIDTH / 2.0);
    }
    for m in messages {
        if m.self_loop {
            // Loop rectangle plus the label pill hanging off its right edge.
            max_x = max_x.max(m.source_x + SELF_LOOP_WIDTH + 1.5);
        }
    }

    let top = ACTOR_Y + ACTOR_BOX_HEIGHT / 2.0;
    Rect::new(min_x, lifeline_bottom, max_x, top)
}
