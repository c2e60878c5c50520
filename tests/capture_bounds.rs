use lifeline::{
    ContentBox, FrameRgba,
    capture::{BACKGROUND_RGB, CROP_PADDING, crop_region},
    crop_to_content, detect_content_bounds,
};

const BG: [u8; 4] = [BACKGROUND_RGB[0], BACKGROUND_RGB[1], BACKGROUND_RGB[2], 255];

fn background(width: u32, height: u32) -> FrameRgba {
    FrameRgba::solid(width, height, BG)
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
fn detected_box_matches_a_rectangle_anchored_at_origin() {
    let mut frame = background(64, 48);
    paint_rect(&mut frame, 0, 0, 16, 12, [220, 220, 220, 255]);

    let bounds = detect_content_bounds(&frame, BACKGROUND_RGB).unwrap();
    assert_eq!(
        bounds,
        ContentBox {
            min_x: 0,
            min_y: 0,
            max_x: 15,
            max_y: 11
        }
    );
}

#[test]
fn uniform_background_regions_produce_no_false_positives() {
    let mut frame = background(64, 48);
    paint_rect(&mut frame, 30, 20, 40, 30, [220, 40, 40, 255]);

    let bounds = detect_content_bounds(&frame, BACKGROUND_RGB).unwrap();
    // Edge detection may pull in the single background pixel adjacent to the
    // rectangle's near sides, but never anything in the uniform field beyond
    // it.
    assert!(bounds.min_x >= 29 && bounds.min_y >= 19);
    assert_eq!((bounds.max_x, bounds.max_y), (39, 29));
}

#[test]
fn crop_is_the_detected_box_plus_padding_clamped_to_bounds() {
    let frame = background(300, 200);
    let bounds = Some(ContentBox {
        min_x: 100,
        min_y: 80,
        max_x: 149,
        max_y: 119,
    });
    let (x, y, w, h) = crop_region(&frame, bounds);
    assert_eq!(x, 100 - CROP_PADDING);
    assert_eq!(y, 80 - CROP_PADDING);
    assert_eq!(w, 149 - 100 + CROP_PADDING * 2);
    assert_eq!(h, 119 - 80 + CROP_PADDING * 2);
}

#[test]
fn crop_never_exceeds_image_bounds_for_edge_touching_content() {
    let mut frame = background(100, 100);
    // Content in the bottom-right corner.
    paint_rect(&mut frame, 90, 92, 100, 100, [255, 255, 255, 255]);

    let cropped = crop_to_content(&frame, BACKGROUND_RGB).unwrap();
    assert!(cropped.width <= 100 && cropped.height <= 100);

    // Content in the top-left corner.
    let mut frame = background(100, 100);
    paint_rect(&mut frame, 0, 0, 8, 8, [255, 255, 255, 255]);
    let cropped = crop_to_content(&frame, BACKGROUND_RGB).unwrap();
    assert!(cropped.width <= 100 && cropped.height <= 100);
}

#[test]
fn all_background_image_crops_to_the_full_image() {
    let frame = background(120, 90);
    let cropped = crop_to_content(&frame, BACKGROUND_RGB).unwrap();
    assert_eq!((cropped.width, cropped.height), (120, 90));
    assert_eq!(cropped.data, frame.data);
}

#[test]
fn cropped_canvas_is_backfilled_with_the_background_color() {
    let mut frame = background(400, 300);
    paint_rect(&mut frame, 180, 140, 220, 160, [90, 200, 255, 255]);

    let cropped = crop_to_content(&frame, BACKGROUND_RGB).unwrap();
    // Corners of the padded crop hold pure background.
    assert_eq!(cropped.pixel(0, 0), BG);
    assert_eq!(cropped.pixel(cropped.width - 1, cropped.height - 1), BG);
    // The content region survived the blit.
    let center = cropped.pixel(cropped.width / 2, cropped.height / 2);
    assert_eq!(center, [90, 200, 255, 255]);
}

#[test]
fn thin_near_background_lines_are_detected_via_edges() {
    // A one-pixel vertical line whose color sits inside the per-channel
    // tolerance; only the neighbor-difference rule can catch it.
    let mut frame = background(80, 60);
    paint_rect(&mut frame, 40, 10, 41, 50, [15, 22, 32, 255]);

    let bounds = detect_content_bounds(&frame, BACKGROUND_RGB).unwrap();
    assert!(bounds.min_x <= 40 && bounds.max_x >= 40);
    assert!(bounds.min_y <= 10 && bounds.max_y >= 49);
}
