//! GIF block grammar: magic, logical screen, color tables, image and
//! extension blocks, trailer. Parsing is purely sequential (no random-access
//! seeks), so the codec works directly over pipes or sockets.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, warn};

use crate::color::ColorTable;
use crate::error::{Error, Result};
use crate::subblock;

const MAGIC_89A: &[u8; 6] = b"GIF89a";
const MAGIC_87A: &[u8; 6] = b"GIF87a";

const IMAGE_SEPARATOR: u8 = 0x2C;
const EXTENSION_INTRODUCER: u8 = 0x21;
const TRAILER: u8 = 0x3B;

const LABEL_GRAPHIC_CONTROL: u8 = 0xF9;
const LABEL_COMMENT: u8 = 0xFE;
const LABEL_APPLICATION: u8 = 0xFF;

/// Which magic the stream declared (decode only distinguishes them for
/// round-trip fidelity; the serializer always writes GIF89a).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Version {
    Gif89a,
    Gif87a,
}

/// The Logical Screen Descriptor plus its optional Global Color Table.
pub struct LogicalScreen {
    pub width: u16,
    pub height: u16,
    pub color_resolution: u8,
    pub sort: bool,
    pub gct: Option<ColorTable>,
    pub bg_color_index: u8,
    pub pixel_aspect: u8,
}

/// Transient per-image state carried by a Graphic Control Extension.
#[derive(Clone, Copy, Debug, Default)]
pub struct GraphicControl {
    pub disposal: u8,
    pub user_input: bool,
    pub transparent_index: Option<u8>,
    pub delay_cs: u16,
}

/// An Image Descriptor together with its (still LZW-compressed) pixel data.
pub struct ImageBlock {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
    pub interlace: bool,
    pub lct: Option<ColorTable>,
    pub lzw_min: u8,
    pub lzw_data: Vec<u8>,
}

/// One top-level block of the body, in file order.
pub enum Block {
    GraphicControl(GraphicControl),
    Image(ImageBlock),
    Comment(String),
    Application { app_id: [u8; 8], auth_code: [u8; 3], data: Vec<u8> },
    /// An extension whose label wasn't recognized; its payload was consumed
    /// and discarded. Not an error.
    Unknown,
}

/// A fully parsed stream, still carrying compressed image data.
pub struct Parsed {
    pub version: Version,
    pub screen: LogicalScreen,
    pub blocks: Vec<Block>,
}

fn read_color_table(input: &mut impl Read, size_field: u8) -> Result<ColorTable> {
    let count = 1usize << (size_field as usize + 1);
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let mut rgb = [0u8; 3];
        input.read_exact(&mut rgb)?;
        entries.push(rgb);
    }
    Ok(ColorTable::new(entries))
}

fn write_color_table(out: &mut impl Write, table: &ColorTable) -> Result<()> {
    for rgb in table.entries() {
        out.write_all(rgb)?;
    }
    Ok(())
}

/// Parses a full GIF stream up to and including the trailer.
///
/// When `strict` is `false`, an unrecognized block-start byte ends the body
/// as if the trailer had been reached instead of failing with
/// [`Error::MalformedBlock`].
pub fn parse(input: &mut impl Read, strict: bool) -> Result<Parsed> {
    let mut magic = [0u8; 6];
    input.read_exact(&mut magic)?;
    let version = if &magic == MAGIC_89A {
        Version::Gif89a
    } else if &magic == MAGIC_87A {
        Version::Gif87a
    } else {
        return Err(Error::InvalidMagic);
    };

    let width = input.read_u16::<LittleEndian>()?;
    let height = input.read_u16::<LittleEndian>()?;
    let packed = input.read_u8()?;
    let bg_color_index = input.read_u8()?;
    let pixel_aspect = input.read_u8()?;

    let gct_flag = packed & 0x80 != 0;
    let color_resolution = (packed >> 4) & 0x07;
    let sort = packed & 0x08 != 0;
    let gct_size = packed & 0x07;
    let gct = if gct_flag {
        Some(read_color_table(input, gct_size)?)
    } else {
        None
    };

    let screen = LogicalScreen {
        width,
        height,
        color_resolution,
        sort,
        gct,
        bg_color_index,
        pixel_aspect,
    };

    let mut blocks = Vec::new();
    loop {
        let mut introducer = [0u8; 1];
        input.read_exact(&mut introducer)?;
        match introducer[0] {
            TRAILER => break,
            IMAGE_SEPARATOR => blocks.push(Block::Image(parse_image(input)?)),
            EXTENSION_INTRODUCER => blocks.push(parse_extension(input)?),
            other if strict => {
                return Err(Error::MalformedBlock(format!("unexpected block introducer 0x{other:02X}")))
            }
            other => {
                warn!("non-strict decode: stopping at unrecognized block introducer 0x{other:02X}");
                break;
            }
        }
    }

    Ok(Parsed { version, screen, blocks })
}

fn parse_image(input: &mut impl Read) -> Result<ImageBlock> {
    let left = input.read_u16::<LittleEndian>()?;
    let top = input.read_u16::<LittleEndian>()?;
    let width = input.read_u16::<LittleEndian>()?;
    let height = input.read_u16::<LittleEndian>()?;
    let packed = input.read_u8()?;

    let lct_flag = packed & 0x80 != 0;
    let interlace = packed & 0x40 != 0;
    let lct_size = packed & 0x07;
    let lct = if lct_flag {
        Some(read_color_table(input, lct_size)?)
    } else {
        None
    };

    let lzw_min = input.read_u8()?;
    let lzw_data = subblock::unpack(input)?;

    Ok(ImageBlock {
        left,
        top,
        width,
        height,
        interlace,
        lct,
        lzw_min,
        lzw_data,
    })
}

fn parse_extension(input: &mut impl Read) -> Result<Block> {
    let label = input.read_u8()?;
    match label {
        LABEL_GRAPHIC_CONTROL => {
            let block_size = input.read_u8()?;
            if block_size != 4 {
                return Err(Error::MalformedBlock(format!(
                    "graphic control extension block_size was {block_size}, expected 4"
                )));
            }
            let packed = input.read_u8()?;
            let delay_cs = input.read_u16::<LittleEndian>()?;
            let transparent_index_byte = input.read_u8()?;
            let terminator = input.read_u8()?;
            if terminator != 0 {
                return Err(Error::MalformedBlock("graphic control extension missing terminator".into()));
            }
            let disposal = (packed >> 2) & 0x07;
            let user_input = packed & 0x02 != 0;
            let transparent_index = (packed & 0x01 != 0).then_some(transparent_index_byte);
            Ok(Block::GraphicControl(GraphicControl {
                disposal,
                user_input,
                transparent_index,
                delay_cs,
            }))
        }
        LABEL_COMMENT => {
            let bytes = subblock::unpack(input)?;
            Ok(Block::Comment(String::from_utf8_lossy(&bytes).into_owned()))
        }
        LABEL_APPLICATION => {
            let block_size = input.read_u8()?;
            if block_size != 11 {
                return Err(Error::MalformedBlock(format!(
                    "application extension block_size was {block_size}, expected 11"
                )));
            }
            let mut app_id = [0u8; 8];
            input.read_exact(&mut app_id)?;
            let mut auth_code = [0u8; 3];
            input.read_exact(&mut auth_code)?;
            let data = subblock::unpack(input)?;
            debug!("application extension {:?}/{:?}, {} payload bytes", app_id, auth_code, data.len());
            Ok(Block::Application { app_id, auth_code, data })
        }
        other => {
            warn!("unknown extension label 0x{other:02X}, discarding its sub-blocks");
            subblock::unpack(input)?;
            Ok(Block::Unknown)
        }
    }
}

/// Writes the 6-byte magic. The serializer always emits GIF89a.
pub fn write_magic(out: &mut impl Write) -> Result<()> {
    out.write_all(MAGIC_89A)?;
    Ok(())
}

pub fn write_logical_screen(out: &mut impl Write, screen: &LogicalScreen) -> Result<()> {
    out.write_u16::<LittleEndian>(screen.width)?;
    out.write_u16::<LittleEndian>(screen.height)?;

    let mut packed = 0u8;
    if let Some(gct) = &screen.gct {
        packed |= 0x80;
        packed |= (screen.color_resolution & 0x07) << 4;
        if screen.sort {
            packed |= 0x08;
        }
        packed |= gct.size_field() & 0x07;
    }
    out.write_u8(packed)?;
    out.write_u8(screen.bg_color_index)?;
    out.write_u8(screen.pixel_aspect)?;

    if let Some(gct) = &screen.gct {
        write_color_table(out, gct)?;
    }
    Ok(())
}

pub fn write_graphic_control(out: &mut impl Write, gce: &GraphicControl) -> Result<()> {
    out.write_u8(EXTENSION_INTRODUCER)?;
    out.write_u8(LABEL_GRAPHIC_CONTROL)?;
    out.write_u8(4)?;

    let mut packed = (gce.disposal & 0x07) << 2;
    if gce.user_input {
        packed |= 0x02;
    }
    if gce.transparent_index.is_some() {
        packed |= 0x01;
    }
    out.write_u8(packed)?;
    out.write_u16::<LittleEndian>(gce.delay_cs)?;
    out.write_u8(gce.transparent_index.unwrap_or(0))?;
    out.write_u8(0)?;
    Ok(())
}

pub fn write_image(out: &mut impl Write, image: &ImageBlock) -> Result<()> {
    out.write_u8(IMAGE_SEPARATOR)?;
    out.write_u16::<LittleEndian>(image.left)?;
    out.write_u16::<LittleEndian>(image.top)?;
    out.write_u16::<LittleEndian>(image.width)?;
    out.write_u16::<LittleEndian>(image.height)?;

    let mut packed = 0u8;
    if let Some(lct) = &image.lct {
        packed |= 0x80;
        packed |= lct.size_field() & 0x07;
    }
    if image.interlace {
        packed |= 0x40;
    }
    out.write_u8(packed)?;

    if let Some(lct) = &image.lct {
        write_color_table(out, lct)?;
    }

    out.write_u8(image.lzw_min)?;
    subblock::pack(&image.lzw_data, out)?;
    Ok(())
}

pub fn write_comment(out: &mut impl Write, comment: &str) -> Result<()> {
    out.write_u8(EXTENSION_INTRODUCER)?;
    out.write_u8(LABEL_COMMENT)?;
    subblock::pack(comment.as_bytes(), out)?;
    Ok(())
}

/// Emits a NETSCAPE 2.0 application extension encoding the loop count.
pub fn write_netscape_loop(out: &mut impl Write, stored_count: u16) -> Result<()> {
    out.write_u8(EXTENSION_INTRODUCER)?;
    out.write_u8(LABEL_APPLICATION)?;
    out.write_u8(11)?;
    out.write_all(b"NETSCAPE")?;
    out.write_all(b"2.0")?;
    let mut payload = vec![0x01];
    payload.extend_from_slice(&stored_count.to_le_bytes());
    subblock::pack(&payload, out)?;
    Ok(())
}

pub fn write_trailer(out: &mut impl Write) -> Result<()> {
    out.write_u8(TRAILER)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_single_pixel_stream() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"GIF89a");
        bytes.extend_from_slice(&1u16.to_le_bytes()); // width
        bytes.extend_from_slice(&1u16.to_le_bytes()); // height
        bytes.push(0x80); // GCT flag, color_res=0, size=0 -> 2 entries
        bytes.push(0); // bg index
        bytes.push(0); // pixel aspect
        bytes.extend_from_slice(&[255, 255, 255, 255, 255, 255]); // 2-entry GCT
        bytes.push(IMAGE_SEPARATOR);
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.push(0); // no LCT, not interlaced
        bytes.push(2); // lzw_min
        bytes.extend_from_slice(&[2, 0x44, 0x01, 0]); // sub-block + terminator
        bytes.push(TRAILER);

        let mut cursor = &bytes[..];
        let parsed = parse(&mut cursor, true).unwrap();
        assert_eq!(parsed.version, Version::Gif89a);
        assert_eq!(parsed.screen.width, 1);
        assert_eq!(parsed.screen.gct.as_ref().unwrap().len(), 2);
        assert_eq!(parsed.blocks.len(), 1);
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = b"NOTAGIF\x00\x00";
        let mut cursor = &bytes[..];
        assert!(matches!(parse(&mut cursor, true), Err(Error::InvalidMagic)));
    }

    #[test]
    fn unknown_extension_label_is_skipped_not_an_error() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"GIF89a");
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.push(0);
        bytes.push(0);
        bytes.push(0);
        bytes.push(EXTENSION_INTRODUCER);
        bytes.push(0x01); // plain text extension, unrecognized here
        bytes.extend_from_slice(&[3, 1, 2, 3, 0]);
        bytes.push(TRAILER);

        let mut cursor = &bytes[..];
        let parsed = parse(&mut cursor, true).unwrap();
        assert_eq!(parsed.blocks.len(), 1);
        assert!(matches!(parsed.blocks[0], Block::Unknown));
    }
}
