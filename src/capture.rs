use image::ImageEncoder as _;

use crate::{
    error::{LifelineError, LifelineResult},
    surface::{CaptureSurface, FrameRgba},
};

/// Scene background color behind all content (RGB).
pub const BACKGROUND_RGB: [u8; 3] = [5, 10, 20];
/// A pixel must be more opaque than this to count as visible at all.
pub const VISIBLE_ALPHA: u8 = 5;
/// Per-channel difference from the background beyond which a pixel is content.
pub const COLOR_TOLERANCE: u8 = 40;
/// Summed per-channel difference with a neighbor beyond which a pixel sits on
/// a local edge.
pub const EDGE_THRESHOLD: u32 = 15;
/// Padding added around the detected content box, in pixels.
pub const CROP_PADDING: u32 = 30;
/// JPEG encode quality for exported frames.
pub const JPEG_QUALITY: u8 = 95;
/// Pixel density multiplier applied when rasterizing for capture.
pub const CAPTURE_PIXEL_RATIO: f64 = 2.0;

/// Minimal bounding rectangle over content pixels; `max_x`/`max_y` are
/// inclusive coordinates of the outermost content pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentBox {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

/// Scan every pixel of `frame` and return the minimal bounding rectangle of
/// the content, or `None` when no pixel qualifies.
///
/// A pixel is content when it is visible (`alpha > 5`) and either differs
/// from `bg` by more than the per-channel tolerance, or forms a local edge
/// with its right or bottom neighbor. Edge detection catches anti-aliased or
/// near-background content (thin lifelines) that color tolerance alone would
/// miss; a side effect is that the background pixel immediately left of or
/// above a content edge is also classified as content.
///
/// Pure function of the bitmap; no rendering stack involved.
pub fn detect_content_bounds(frame: &FrameRgba, bg: [u8; 3]) -> Option<ContentBox> {
    let (w, h) = (frame.width, frame.height);
    if w == 0 || h == 0 || frame.data.len() < (w as usize * h as usize * 4) {
        return None;
    }

    let px = &frame.data;
    let row_stride = w as usize * 4;

    let mut bounds: Option<ContentBox> = None;
    for y in 0..h {
        for x in 0..w {
            let i = y as usize * row_stride + x as usize * 4;
            let (r, g, b, a) = (px[i], px[i + 1], px[i + 2], px[i + 3]);
            if a <= VISIBLE_ALPHA {
                continue;
            }

            let mut is_content = r.abs_diff(bg[0]) > COLOR_TOLERANCE
                || g.abs_diff(bg[1]) > COLOR_TOLERANCE
                || b.abs_diff(bg[2]) > COLOR_TOLERANCE;

            if !is_content && x < w - 1 {
                let j = i + 4;
                is_content = neighbor_edge(r, g, b, px[j], px[j + 1], px[j + 2]);
            }
            if !is_content && y < h - 1 {
                let j = i + row_stride;
                is_content = neighbor_edge(r, g, b, px[j], px[j + 1], px[j + 2]);
            }

            if is_content {
                bounds = Some(match bounds {
                    None => ContentBox {
                        min_x: x,
                        min_y: y,
                        max_x: x,
                        max_y: y,
                    },
                    Some(bx) => ContentBox {
                        min_x: bx.min_x.min(x),
                        min_y: bx.min_y.min(y),
                        max_x: bx.max_x.max(x),
                        max_y: bx.max_y.max(y),
                    },
                });
            }
        }
    }

    bounds
}

fn neighbor_edge(r: u8, g: u8, b: u8, nr: u8, ng: u8, nb: u8) -> bool {
    let diff =
        u32::from(r.abs_diff(nr)) + u32::from(g.abs_diff(ng)) + u32::from(b.abs_diff(nb));
    diff > EDGE_THRESHOLD
}

/// The crop region derived from a content box: padded by [`CROP_PADDING`] on
/// each side and clamped to the image bounds. An absent box (all-background
/// image) yields the full image.
pub fn crop_region(frame: &FrameRgba, bounds: Option<ContentBox>) -> (u32, u32, u32, u32) {
    let (min_x, min_y, max_x, max_y) = match bounds {
        Some(b) => (b.min_x, b.min_y, b.max_x, b.max_y),
        None => (0, 0, frame.width, frame.height),
    };

    let crop_x = min_x.saturating_sub(CROP_PADDING);
    let crop_y = min_y.saturating_sub(CROP_PADDING);
    let crop_w = (max_x - min_x + CROP_PADDING * 2).min(frame.width - crop_x);
    let crop_h = (max_y - min_y + CROP_PADDING * 2).min(frame.height - crop_y);
    (crop_x, crop_y, crop_w, crop_h)
}

/// Crop `frame` to its detected content plus padding, on a canvas filled with
/// the background color.
pub fn crop_to_content(frame: &FrameRgba, bg: [u8; 3]) -> LifelineResult<FrameRgba> {
    if frame.width == 0 || frame.height == 0 {
        return Err(LifelineError::capture("cannot crop an empty frame"));
    }
    if frame.data.len() != frame.width as usize * frame.height as usize * 4 {
        return Err(LifelineError::capture(
            "frame data length does not match width*height*4",
        ));
    }

    let bounds = detect_content_bounds(frame, bg);
    let (crop_x, crop_y, crop_w, crop_h) = crop_region(frame, bounds);

    let mut out = FrameRgba::solid(crop_w, crop_h, [bg[0], bg[1], bg[2], 255]);
    out.premultiplied = frame.premultiplied;

    let src_stride = frame.width as usize * 4;
    let dst_stride = crop_w as usize * 4;
    for row in 0..crop_h as usize {
        let src_start = (crop_y as usize + row) * src_stride + crop_x as usize * 4;
        let dst_start = row * dst_stride;
        out.data[dst_start..dst_start + dst_stride]
            .copy_from_slice(&frame.data[src_start..src_start + dst_stride]);
    }

    Ok(out)
}

/// Encode `frame` as JPEG at the given quality, flattening alpha over `bg`.
pub fn encode_jpeg(frame: &FrameRgba, bg: [u8; 3], quality: u8) -> LifelineResult<Vec<u8>> {
    let mut rgb = vec![0u8; frame.width as usize * frame.height as usize * 3];
    flatten_over_background(&mut rgb, &frame.data, frame.premultiplied, bg)?;

    let mut out = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .write_image(
            &rgb,
            frame.width,
            frame.height,
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| LifelineError::capture(format!("jpeg encoding failed: {e}")))?;
    Ok(out)
}

/// One captured export frame, ready for packaging.
#[derive(Clone, Debug)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
}

/// Photograph the surface's current visual state: rasterize, crop to content,
/// JPEG-encode.
///
/// Returns `Ok(None)` when the surface reports its drawing context as
/// unavailable; sequence export skips such frames, single-image export
/// aborts.
pub fn capture_frame(surface: &mut dyn CaptureSurface) -> LifelineResult<Option<CapturedFrame>> {
    let Some(frame) = surface.rasterize()? else {
        return Ok(None);
    };

    let cropped = crop_to_content(&frame, BACKGROUND_RGB)?;
    let jpeg = encode_jpeg(&cropped, BACKGROUND_RGB, JPEG_QUALITY)?;
    Ok(Some(CapturedFrame {
        width: cropped.width,
        height: cropped.height,
        jpeg,
    }))
}

fn flatten_over_background(
    dst: &mut [u8],
    src: &[u8],
    src_is_premul: bool,
    bg: [u8; 3],
) -> LifelineResult<()> {
    if dst.len() / 3 != src.len() / 4 || !src.len().is_multiple_of(4) {
        return Err(LifelineError::capture(
            "flatten_over_background expects matching rgb8/rgba8 buffers",
        ));
    }

    let bg_r = u16::from(bg[0]);
    let bg_g = u16::from(bg[1]);
    let bg_b = u16::from(bg[2]);

    for (d, s) in dst.chunks_exact_mut(3).zip(src.chunks_exact(4)) {
        let a = u16::from(s[3]);
        if a == 255 {
            d.copy_from_slice(&s[..3]);
            continue;
        }

        let inv = 255u16 - a;
        let (r, g, b) = if src_is_premul {
            (
                u16::from(s[0]) + mul_div255(bg_r, inv),
                u16::from(s[1]) + mul_div255(bg_g, inv),
                u16::from(s[2]) + mul_div255(bg_b, inv),
            )
        } else {
            (
                mul_div255(u16::from(s[0]), a) + mul_div255(bg_r, inv),
                mul_div255(u16::from(s[1]), a) + mul_div255(bg_g, inv),
                mul_div255(u16::from(s[2]), a) + mul_div255(bg_b, inv),
            )
        };

        d[0] = r.min(255) as u8;
        d[1] = g.min(255) as u8;
        d[2] = b.min(255) as u8;
    }

    Ok(())
}

fn mul_div255(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bg_frame(w: u32, h: u32) -> FrameRgba {
        FrameRgba::solid(w, h, [BACKGROUND_RGB[0], BACKGROUND_RGB[1], BACKGROUND_RGB[2], 255])
    }

    fn paint_rect(frame: &mut FrameRgba, x0: u32, y0: u32, x1: u32, y1: u32, rgba: [u8; 4]) {
        for y in y0..y1 {
            for x in x0..x1 {
                let i = (y as usize * frame.width as usize + x as usize) * 4;
                frame.data[i..i + 4].copy_from_slice(&rgba);
            }
        }
    }

    #[test]
    fn all_background_detects_nothing() {
        let frame = bg_frame(32, 24);
        assert_eq!(detect_content_bounds(&frame, BACKGROUND_RGB), None);
    }

    #[test]
    fn solid_rectangle_at_origin_is_detected_exactly() {
        let mut frame = bg_frame(40, 30);
        paint_rect(&mut frame, 0, 0, 10, 8, [200, 200, 200, 255]);
        let bounds = detect_content_bounds(&frame, BACKGROUND_RGB).unwrap();
        assert_eq!(
            bounds,
            ContentBox {
                min_x: 0,
                min_y: 0,
                max_x: 9,
                max_y: 7
            }
        );
    }

    #[test]
    fn interior_rectangle_gains_only_the_edge_halo() {
        let mut frame = bg_frame(40, 30);
        paint_rect(&mut frame, 10, 10, 20, 18, [200, 200, 200, 255]);
        let bounds = detect_content_bounds(&frame, BACKGROUND_RGB).unwrap();
        // The background pixel just left of/above the rectangle sees the edge
        // through its right/bottom neighbor; the far sides stay exact.
        assert_eq!(
            bounds,
            ContentBox {
                min_x: 9,
                min_y: 9,
                max_x: 19,
                max_y: 17
            }
        );
    }

    #[test]
    fn transparent_pixels_are_never_content() {
        let mut frame = bg_frame(16, 16);
        paint_rect(&mut frame, 4, 4, 8, 8, [255, 255, 255, VISIBLE_ALPHA]);
        assert_eq!(detect_content_bounds(&frame, BACKGROUND_RGB), None);
    }

    #[test]
    fn near_background_content_is_caught_by_edge_detection() {
        let mut frame = bg_frame(16, 16);
        // Within the per-channel tolerance, but the summed neighbor
        // difference crosses the edge threshold.
        paint_rect(&mut frame, 6, 6, 7, 7, [15, 20, 30, 255]);
        let bounds = detect_content_bounds(&frame, BACKGROUND_RGB).unwrap();
        assert!(bounds.min_x <= 6 && bounds.max_x >= 6);
        assert!(bounds.min_y <= 6 && bounds.max_y >= 6);
    }

    #[test]
    fn crop_region_pads_and_clamps() {
        let frame = bg_frame(200, 160);
        let bounds = Some(ContentBox {
            min_x: 50,
            min_y: 40,
            max_x: 99,
            max_y: 79,
        });
        assert_eq!(crop_region(&frame, bounds), (20, 10, 109, 99));

        // Box touching the top-left corner: padding cannot go negative.
        let bounds = Some(ContentBox {
            min_x: 0,
            min_y: 0,
            max_x: 9,
            max_y: 9,
        });
        assert_eq!(crop_region(&frame, bounds), (0, 0, 69, 69));

        // Box touching the bottom-right corner: the crop stays inside the
        // image.
        let bounds = Some(ContentBox {
            min_x: 190,
            min_y: 150,
            max_x: 199,
            max_y: 159,
        });
        let (x, y, w, h) = crop_region(&frame, bounds);
        assert!(x + w <= 200 && y + h <= 160);
        assert_eq!((x, y), (160, 120));
    }

    #[test]
    fn empty_content_falls_back_to_full_image() {
        let frame = bg_frame(120, 90);
        assert_eq!(crop_region(&frame, None), (0, 0, 120, 90));

        let cropped = crop_to_content(&frame, BACKGROUND_RGB).unwrap();
        assert_eq!((cropped.width, cropped.height), (120, 90));
    }

    #[test]
    fn crop_fills_background_and_blits_content() {
        let mut frame = bg_frame(200, 160);
        paint_rect(&mut frame, 80, 60, 100, 80, [255, 0, 0, 255]);
        let cropped = crop_to_content(&frame, BACKGROUND_RGB).unwrap();

        // Detected box spans 79..=99 (1px halo on the near sides); the crop
        // is `max - min + 2 * padding` wide, anchored 30px before the box.
        assert_eq!((cropped.width, cropped.height), (80, 80));

        // Content sits CROP_PADDING + 1 halo pixel in from the crop origin.
        assert_eq!(cropped.pixel(31, 31), [255, 0, 0, 255]);
        // Padding area is pure background.
        assert_eq!(
            cropped.pixel(0, 0),
            [BACKGROUND_RGB[0], BACKGROUND_RGB[1], BACKGROUND_RGB[2], 255]
        );
    }

    #[test]
    fn jpeg_encoding_produces_a_jfif_stream() {
        let mut frame = bg_frame(64, 48);
        paint_rect(&mut frame, 10, 10, 30, 30, [0, 255, 0, 255]);
        let jpeg = encode_jpeg(&frame, BACKGROUND_RGB, JPEG_QUALITY).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn flatten_composites_straight_alpha_over_background() {
        let src = vec![255u8, 0, 0, 128];
        let mut dst = vec![0u8; 3];
        flatten_over_background(&mut dst, &src, false, [0, 0, 0]).unwrap();
        assert_eq!(dst, vec![128, 0, 0]);
    }
}
