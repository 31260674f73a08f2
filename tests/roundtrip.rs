//! End-to-end scenarios exercising the full decode/encode pipeline together,
//! not just a single module in isolation.

use gifweave::{DecodeOptions, EncodeOptions, Frame, Image};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn single_pixel_stream(magic: &[u8; 6]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(magic);
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.push(0x80); // GCT flag, 2 entries
    bytes.push(0);
    bytes.push(0);
    bytes.extend_from_slice(&[255, 255, 255, 255, 255, 255]);
    bytes.push(0x2C);
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.push(0);
    bytes.push(2);
    bytes.extend_from_slice(&[2, 0x44, 0x01, 0]);
    bytes.push(0x3B);
    bytes
}

#[test]
fn single_white_pixel_decodes_as_specified() {
    init_logging();
    let bytes = single_pixel_stream(b"GIF89a");
    let mut cursor = &bytes[..];
    let img = Image::decode(&mut cursor, DecodeOptions::default()).unwrap();

    assert_eq!(img.size(), (1, 1));
    assert_eq!(img.frame_count(), 1);
    assert_eq!(img.frames()[0].rgba(), &[255, 255, 255, 255]);
    assert_eq!(img.loop_count(), 1);
    assert_eq!(img.comment(), None);
}

#[test]
fn gif87a_single_pixel_decodes_identically_with_no_comment() {
    init_logging();
    let bytes = single_pixel_stream(b"GIF87a");
    let mut cursor = &bytes[..];
    let img = Image::decode(&mut cursor, DecodeOptions::default()).unwrap();

    assert_eq!(img.frames()[0].rgba(), &[255, 255, 255, 255]);
    assert_eq!(img.comment(), None);
}

#[test]
fn three_frame_animation_preserves_individual_delays() {
    init_logging();
    let size = (4u16, 4u16);
    let pixel_count = size.0 as usize * size.1 as usize;
    let frames = vec![
        Frame::new(size.0, size.1, [10, 20, 30, 255].repeat(pixel_count), 1000),
        Frame::new(size.0, size.1, [40, 50, 60, 255].repeat(pixel_count), 2000),
        Frame::new(size.0, size.1, [70, 80, 90, 255].repeat(pixel_count), 3000),
    ];
    let img = Image::new(size.0, size.1, frames, None, 1);

    let mut buf = Vec::new();
    img.encode(&mut buf, EncodeOptions::default()).unwrap();

    let mut cursor = &buf[..];
    let decoded = Image::decode(&mut cursor, DecodeOptions::default()).unwrap();
    let delays: Vec<u32> = decoded.frames().iter().map(Frame::delay_ms).collect();
    assert_eq!(delays, vec![1000, 2000, 3000]);
}

#[test]
fn netscape_loop_count_of_two_round_trips() {
    init_logging();
    let frame = Frame::new(1, 1, vec![1, 2, 3, 255], 0);
    let img = Image::new(1, 1, vec![frame], None, 2);

    let mut buf = Vec::new();
    img.encode(&mut buf, EncodeOptions::default()).unwrap();
    let mut cursor = &buf[..];
    let decoded = Image::decode(&mut cursor, DecodeOptions::default()).unwrap();
    assert_eq!(decoded.loop_count(), 2);

    // Re-encoding reproduces the same stored count (one less than loop_count).
    let mut buf2 = Vec::new();
    decoded.encode(&mut buf2, EncodeOptions::default()).unwrap();
    let mut cursor2 = &buf2[..];
    let reencoded = Image::decode(&mut cursor2, DecodeOptions::default()).unwrap();
    assert_eq!(reencoded.loop_count(), 2);
}

#[test]
fn transparent_pixels_round_trip_with_zero_alpha() {
    init_logging();
    let size = (3u16, 3u16);
    let mut rgba = [200u8, 200, 200, 255].repeat(9);
    // Punch a transparent "circle" in the middle pixel.
    rgba[4 * 4..4 * 4 + 4].copy_from_slice(&[0, 0, 0, 0]);
    let frame = Frame::new(size.0, size.1, rgba.clone(), 0);
    let img = Image::new(size.0, size.1, vec![frame], None, 1);

    let mut buf = Vec::new();
    img.encode(&mut buf, EncodeOptions::default()).unwrap();
    let mut cursor = &buf[..];
    let decoded = Image::decode(&mut cursor, DecodeOptions::default()).unwrap();

    let decoded_rgba = decoded.frames()[0].rgba();
    for (i, chunk) in decoded_rgba.chunks_exact(4).enumerate() {
        if i == 4 {
            assert_eq!(chunk[3], 0, "center pixel should be transparent");
        } else {
            assert_eq!(chunk[3], 255, "pixel {i} should be opaque");
        }
    }
}

#[test]
fn forced_clear_mid_stream_still_round_trips() {
    init_logging();
    // A long, repetitive two-color image exhausts the 12-bit LZW dictionary
    // during encode, forcing at least one mid-stream CLEAR.
    let (w, h) = (200u16, 200u16);
    let mut rgba = Vec::with_capacity(w as usize * h as usize * 4);
    for i in 0..(w as usize * h as usize) {
        if i % 2 == 0 {
            rgba.extend_from_slice(&[0, 0, 0, 255]);
        } else {
            rgba.extend_from_slice(&[255, 255, 255, 255]);
        }
    }
    let frame = Frame::new(w, h, rgba.clone(), 0);
    let img = Image::new(w, h, vec![frame], None, 1);

    let mut buf = Vec::new();
    img.encode(&mut buf, EncodeOptions::default()).unwrap();
    let mut cursor = &buf[..];
    let decoded = Image::decode(&mut cursor, DecodeOptions::default()).unwrap();
    assert_eq!(decoded.frames()[0].rgba(), rgba.as_slice());
}

#[test]
fn disposal_methods_drive_canvas_state_between_frames() {
    init_logging();
    // Two opaque 2x2 frames differing only by disposal method; frame 2
    // should show that disposal 2 cleared the rect to transparent while
    // disposal 1 would have kept the first frame's content underneath any
    // transparent pixels in the second.
    let size = (2u16, 2u16);
    let first = [255u8, 0, 0, 255].repeat(4);
    let mut second = [0u8, 0, 0, 0].repeat(4); // fully transparent frame
    second[0..4].copy_from_slice(&[0, 255, 0, 255]); // one opaque green pixel

    let frames = vec![
        Frame::new(size.0, size.1, first.clone(), 100),
        Frame::new(size.0, size.1, second.clone(), 100),
    ];
    let img = Image::new(size.0, size.1, frames, None, 1);
    let mut buf = Vec::new();
    img.encode(&mut buf, EncodeOptions::default()).unwrap();

    let mut cursor = &buf[..];
    let decoded = Image::decode(&mut cursor, DecodeOptions::default()).unwrap();
    // Disposal 0 (what the encoder emits) behaves like "keep": the
    // transparent pixels of frame 2 let frame 1's red show through.
    let composited = decoded.frames()[1].rgba();
    assert_eq!(&composited[0..4], &[0, 255, 0, 255]); // opaque pixel overwrote
    assert_eq!(&composited[4..8], &[255, 0, 0, 255]); // transparent pixel kept frame 1
}
