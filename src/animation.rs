//! Lazy per-frame compositing: disposal methods, transparency, de-interlacing.

use crate::color::ColorTable;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::grammar::{Block, GraphicControl, ImageBlock, LogicalScreen};
use crate::lzw;

/// Row destinations for GIF's four-pass interlace ordering on an image of
/// the given height: row `i` as it appears in the compressed stream belongs
/// at `order[i]` in the final top-down image.
pub fn interlace_row_order(height: u16) -> Vec<u16> {
    let h = height as usize;
    let mut order = Vec::with_capacity(h);
    for r in (0..h).step_by(8) {
        order.push(r as u16);
    }
    for r in (4..h).step_by(8) {
        order.push(r as u16);
    }
    for r in (2..h).step_by(4) {
        order.push(r as u16);
    }
    for r in (1..h).step_by(2) {
        order.push(r as u16);
    }
    order
}

fn deinterlace(indices: &[u8], width: u16, height: u16) -> Vec<u8> {
    let order = interlace_row_order(height);
    let w = width as usize;
    let mut out = vec![0u8; indices.len()];
    for (stream_row, &dest_row) in order.iter().enumerate() {
        let src = &indices[stream_row * w..stream_row * w + w];
        let dst_start = dest_row as usize * w;
        out[dst_start..dst_start + w].copy_from_slice(src);
    }
    out
}

fn indices_to_rgba(indices: &[u8], table: &ColorTable, gce: &GraphicControl) -> Vec<u8> {
    let mut out = Vec::with_capacity(indices.len() * 4);
    for &idx in indices {
        let rgb = table.get(idx).unwrap_or([0, 0, 0]);
        let alpha = match gce.transparent_index {
            Some(t) if t == idx => 0,
            _ => 255,
        };
        out.extend_from_slice(&[rgb[0], rgb[1], rgb[2], alpha]);
    }
    out
}

/// Writes `src` (a `src_w`×`src_h` RGBA buffer) onto `dest` (a `canvas_w`-wide
/// RGBA buffer) at `(left, top)`. Source pixels with alpha ≠ 255 leave the
/// destination untouched.
fn blit(dest: &mut [u8], canvas_w: u16, src: &[u8], src_w: u16, src_h: u16, left: u16, top: u16) {
    for y in 0..src_h {
        for x in 0..src_w {
            let src_i = (y as usize * src_w as usize + x as usize) * 4;
            let dst_x = left + x;
            let dst_y = top + y;
            let dst_i = (dst_y as usize * canvas_w as usize + dst_x as usize) * 4;
            if src[src_i + 3] == 255 {
                dest[dst_i..dst_i + 4].copy_from_slice(&src[src_i..src_i + 4]);
            }
        }
    }
}

fn fill_rect(canvas: &mut [u8], canvas_w: u16, left: u16, top: u16, w: u16, h: u16, color: [u8; 4]) {
    for y in 0..h {
        for x in 0..w {
            let i = ((top + y) as usize * canvas_w as usize + (left + x) as usize) * 4;
            canvas[i..i + 4].copy_from_slice(&color);
        }
    }
}

use crate::DecodeOptions;

/// Produces canvas-sized, fully composited [`Frame`]s from a parsed block
/// list, one at a time, paying decompression cost only for frames actually
/// consumed.
pub struct FrameIterator<'a> {
    screen: &'a LogicalScreen,
    blocks: std::slice::Iter<'a, Block>,
    options: DecodeOptions,
    previous_state: Vec<u8>,
    pending_gce: Option<GraphicControl>,
}

impl<'a> FrameIterator<'a> {
    pub fn new(screen: &'a LogicalScreen, blocks: &'a [Block], options: DecodeOptions) -> Self {
        let background = if screen.gct.is_some() { [0, 0, 0, 0] } else { [0, 0, 0, 255] };
        let canvas_len = screen.width as usize * screen.height as usize * 4;
        let mut previous_state = Vec::with_capacity(canvas_len);
        for _ in 0..(screen.width as usize * screen.height as usize) {
            previous_state.extend_from_slice(&background);
        }
        Self {
            screen,
            blocks: blocks.iter(),
            options,
            previous_state,
            pending_gce: None,
        }
    }

    fn background(&self) -> [u8; 4] {
        if self.screen.gct.is_some() {
            [0, 0, 0, 0]
        } else {
            [0, 0, 0, 255]
        }
    }

    fn process_image(&mut self, img: &ImageBlock) -> Result<Frame> {
        let table = img
            .lct
            .as_ref()
            .or(self.screen.gct.as_ref())
            .ok_or(Error::MissingColorTable)?;
        let gce = self.pending_gce.take().unwrap_or_default();

        let mut indices = lzw::decode(&img.lzw_data, img.lzw_min)?;
        let interlaced = self.options.force_deinterlace.unwrap_or(img.interlace);
        if interlaced {
            indices = deinterlace(&indices, img.width, img.height);
        }

        let sub_rgba = indices_to_rgba(&indices, table, &gce);

        let pre_composite = self.previous_state.clone();
        blit(
            &mut self.previous_state,
            self.screen.width,
            &sub_rgba,
            img.width,
            img.height,
            img.left,
            img.top,
        );

        let frame = Frame::new(
            self.screen.width,
            self.screen.height,
            self.previous_state.clone(),
            gce.delay_cs as u32 * 10,
        );

        match gce.disposal {
            0 | 1 => {}
            2 => {
                let background = self.background();
                fill_rect(
                    &mut self.previous_state,
                    self.screen.width,
                    img.left,
                    img.top,
                    img.width,
                    img.height,
                    background,
                );
            }
            3 => self.previous_state = pre_composite,
            other => return Err(Error::UnknownDisposalMethod(other)),
        }

        Ok(frame)
    }
}

impl<'a> Iterator for FrameIterator<'a> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.blocks.next()? {
                Block::GraphicControl(gce) => {
                    self.pending_gce = Some(*gce);
                }
                Block::Image(img) => return Some(self.process_image(img)),
                Block::Comment(_) | Block::Application { .. } | Block::Unknown => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn interlace_order_is_involutive() {
        let height = 17u16;
        let order = interlace_row_order(height);
        // order is a permutation of 0..height: applying it and inverting it
        // must restore the identity sequence.
        let mut inverse = vec![0u16; height as usize];
        for (stream_row, &dest_row) in order.iter().enumerate() {
            inverse[dest_row as usize] = stream_row as u16;
        }
        let restored: Vec<u16> = inverse.iter().map(|&stream_row| order[stream_row as usize]).collect();
        let identity: Vec<u16> = (0..height).collect();
        assert_eq!(restored, identity);
    }

    #[test]
    fn full_coverage_composite_is_idempotent() {
        let mut canvas = vec![0u8; 2 * 2 * 4];
        let src = vec![10, 20, 30, 255, 40, 50, 60, 255, 70, 80, 90, 255, 100, 110, 120, 255];
        blit(&mut canvas, 2, &src, 2, 2, 0, 0);
        assert_eq!(canvas, src);
    }

    #[test]
    fn transparent_source_pixels_keep_destination() {
        let mut canvas = vec![9, 9, 9, 255, 9, 9, 9, 255, 9, 9, 9, 255, 9, 9, 9, 255];
        let src = vec![10, 20, 30, 0, 40, 50, 60, 255, 70, 80, 90, 0, 100, 110, 120, 255];
        blit(&mut canvas, 2, &src, 2, 2, 0, 0);
        assert_eq!(canvas, vec![9, 9, 9, 255, 40, 50, 60, 255, 9, 9, 9, 255, 100, 110, 120, 255]);
    }
}
