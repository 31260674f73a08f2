//! A byte-exact GIF89a/GIF87a codec.
//!
//! Three subsystems do the real work: a block-grammar codec ([`grammar`])
//! for the file's structure, a variable-width LZW coder ([`lzw`]) for pixel
//! data, and an animation assembler ([`animation`]) that turns a sequence of
//! image blocks into fully composited, canvas-sized frames. Encoding reduces
//! true-color pixels to a palette with an octree quantizer ([`quantize`]).
//!
//! Decode flow: byte stream → grammar codec → per-image sub-blocks → LZW
//! decoder → indexed pixels → (optional de-interlace) → palette lookup →
//! composite over previous frame state → next displayed [`Frame`].
//!
//! Encode flow: frames (RGBA) → quantizer → per-frame palette indices → LZW
//! encoder → sub-block framer → grammar codec → byte stream.

mod animation;
mod bitpack;
mod color;
mod error;
mod frame;
mod grammar;
mod lzw;
mod quantize;
mod subblock;

use std::io::{Read, Write};

use log::debug;

pub use animation::interlace_row_order;
pub use color::ColorTable;
pub use error::{Error, Result};
pub use frame::{Frame, Rgba};

use animation::FrameIterator;
use grammar::{Block, GraphicControl, ImageBlock, LogicalScreen};

/// Options controlling how [`Image::decode`] interprets a stream.
#[derive(Clone, Copy, Debug)]
pub struct DecodeOptions {
    /// `Some(true)` forces de-interlacing of every frame, `Some(false)`
    /// suppresses it regardless of the image descriptor's interlace flag.
    /// `None` (the default) follows each frame's own flag.
    pub force_deinterlace: Option<bool>,
    /// When `true` (the default), an unrecognized block-start byte aborts
    /// decoding with [`Error::MalformedBlock`]. When `false`, decoding stops
    /// as if the trailer had been reached, returning whatever frames were
    /// already parsed.
    pub strict: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self { force_deinterlace: None, strict: true }
    }
}

/// Options controlling how [`Image::encode`] quantizes and frames the output.
#[derive(Clone, Copy, Debug)]
pub struct EncodeOptions {
    /// Octree depth used by the color quantizer. Defaults to 8,
    /// the depth needed to discriminate every distinct 24-bit RGB triple.
    pub max_depth: u8,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self { max_depth: quantize::DEFAULT_MAX_DEPTH }
    }
}

/// A decoded or to-be-encoded animated GIF: canvas size, frames, and the
/// handful of file-level attributes (comment, loop count) that survive
/// round-tripping.
pub struct Image {
    width: u16,
    height: u16,
    frames: Vec<Frame>,
    comment: Option<String>,
    loop_count: u16,
    compressed_size: Option<usize>,
}

impl Image {
    /// Builds an `Image` from already-assembled frames. All frames must
    /// share the given canvas size.
    pub fn new(width: u16, height: u16, frames: Vec<Frame>, comment: Option<String>, loop_count: u16) -> Self {
        for f in &frames {
            debug_assert_eq!((f.width(), f.height()), (width, height));
        }
        Self {
            width,
            height,
            frames,
            comment,
            loop_count,
            compressed_size: None,
        }
    }

    pub fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn loop_count(&self) -> u16 {
        self.loop_count
    }

    /// Byte length of the stream this `Image` was decoded from, if known.
    pub fn compressed_size(&self) -> Option<usize> {
        self.compressed_size
    }

    /// Parses `source` and assembles every frame eagerly.
    pub fn decode(source: &mut impl Read, options: DecodeOptions) -> Result<Self> {
        let mut counted = CountingReader { inner: source, count: 0 };
        let parsed = grammar::parse(&mut counted, options.strict)?;
        let compressed_size = counted.count;

        let mut comment: Option<String> = None;
        let mut loop_count: u16 = 1;
        for block in &parsed.blocks {
            match block {
                Block::Comment(text) => {
                    if comment.is_some() {
                        debug!("multiple comment extensions present, keeping the last one");
                    }
                    comment = Some(text.clone());
                }
                Block::Application { app_id, auth_code, data }
                    if app_id == b"NETSCAPE" && auth_code == b"2.0" && data.len() >= 3 && data[0] == 0x01 =>
                {
                    let stored = u16::from_le_bytes([data[1], data[2]]);
                    loop_count = if stored == 0 { 0 } else { stored + 1 };
                }
                _ => {}
            }
        }

        let frames = FrameIterator::new(&parsed.screen, &parsed.blocks, options).collect::<Result<Vec<_>>>()?;

        let _ = parsed.version; // both magics decode identically past this point

        Ok(Self {
            width: parsed.screen.width,
            height: parsed.screen.height,
            frames,
            comment,
            loop_count,
            compressed_size: Some(compressed_size),
        })
    }

    /// Serializes this image as GIF89a to `sink`.
    pub fn encode(&self, sink: &mut impl Write, options: EncodeOptions) -> Result<()> {
        let has_transparency = self.frames.iter().any(|f| f.rgba().chunks_exact(4).any(|p| p[3] != 255));
        let max_colors = if has_transparency { 255 } else { 256 };

        let mut colors = Vec::new();
        for f in &self.frames {
            for p in f.rgba().chunks_exact(4) {
                colors.push([p[0], p[1], p[2]]);
            }
        }
        let mut quantized = quantize::quantize(&colors, max_colors, options.max_depth)?;

        let transparent_index = if has_transparency {
            let idx = quantized.palette.len() as u8;
            quantized.palette.push([0, 0, 0]);
            Some(idx)
        } else {
            None
        };

        let gct = ColorTable::new(quantized.palette.clone());
        let lzw_min = std::cmp::max(2, (gct.len() as f64).log2().ceil() as u8);

        let screen = LogicalScreen {
            width: self.width,
            height: self.height,
            color_resolution: 7,
            sort: true,
            gct: Some(gct),
            bg_color_index: 0,
            pixel_aspect: 0,
        };

        grammar::write_magic(sink)?;
        grammar::write_logical_screen(sink, &screen)?;

        if let Some(comment) = &self.comment {
            grammar::write_comment(sink, comment)?;
        }

        for frame in &self.frames {
            let gce = GraphicControl {
                disposal: 0,
                user_input: false,
                transparent_index: if has_transparency { transparent_index } else { None },
                delay_cs: (frame.delay_ms() / 10) as u16,
            };
            grammar::write_graphic_control(sink, &gce)?;

            let mut indices = Vec::with_capacity(self.width as usize * self.height as usize);
            for p in frame.rgba().chunks_exact(4) {
                if p[3] != 255 {
                    indices.push(transparent_index.expect("transparent pixel without a reserved index"));
                } else {
                    indices.push(quantized.index_of[&[p[0], p[1], p[2]]]);
                }
            }
            let lzw_data = lzw::encode(&indices, lzw_min);

            let image = ImageBlock {
                left: 0,
                top: 0,
                width: self.width,
                height: self.height,
                interlace: false,
                lct: None,
                lzw_min,
                lzw_data,
            };
            grammar::write_image(sink, &image)?;
        }

        if self.loop_count != 1 {
            let stored = if self.loop_count == 0 { 0 } else { self.loop_count - 1 };
            grammar::write_netscape_loop(sink, stored)?;
        }

        grammar::write_trailer(sink)?;
        Ok(())
    }
}

struct CountingReader<'a, R: Read> {
    inner: &'a mut R,
    count: usize,
}

impl<'a, R: Read> Read for CountingReader<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n;
        Ok(n)
    }
}
