use byteorder::{LittleEndian, WriteBytesExt};
use bytes::{Buf, BytesMut};
use indexmap::IndexMap;
use num_enum::TryFromPrimitive;
use std::io::{Cursor, Write};
use tracing::debug;

use crate::model::data::check_remaining;
use crate::model::error::{RdpErrorKind, RdpResult};
use crate::rdp_error;

/// Capability set types of MS-RDPBCGR 2.2.7
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum CapabilitySetType {
    General = 0x0001,
    Bitmap = 0x0002,
    Order = 0x0003,
    BitmapCache = 0x0004,
    Control = 0x0005,
    Activation = 0x0007,
    Pointer = 0x0008,
    Share = 0x0009,
    ColorCache = 0x000A,
    Sound = 0x000C,
    Input = 0x000D,
    Font = 0x000E,
    Brush = 0x000F,
    GlyphCache = 0x0010,
    OffscreenCache = 0x0011,
    BitmapCacheHostSupport = 0x0012,
    BitmapCacheRev2 = 0x0013,
    VirtualChannel = 0x0014,
    DrawNineGridCache = 0x0015,
    DrawGdiPlus = 0x0016,
    Rail = 0x0017,
    Window = 0x0018,
    CompDesk = 0x0019,
    MultiFragmentUpdate = 0x001A,
    LargePointer = 0x001B,
    SurfaceCommands = 0x001C,
    BitmapCodecs = 0x001D,
    FrameAcknowledge = 0x001E,
}

/// One capability set, kept as its raw encoded body
///
/// Both the client and the server collections live in this
/// shape, the effective set is whatever the server accepted
#[derive(Clone, Debug)]
pub struct Capability {
    pub set_type: CapabilitySetType,
    pub body: Vec<u8>,
}

impl Capability {
    fn new(set_type: CapabilitySetType, body: Vec<u8>) -> Self {
        Capability { set_type, body }
    }
}

/// Ordered collection keyed by capability type
pub type CapabilitySets = IndexMap<CapabilitySetType, Capability>;

/// General capability set, fast path output and long
/// credentials on, no compression
fn general_capability() -> RdpResult<Capability> {
    let mut body = Cursor::new(Vec::new());
    // os major and minor, windows nt
    body.write_u16::<LittleEndian>(1)?;
    body.write_u16::<LittleEndian>(3)?;
    // protocol version
    body.write_u16::<LittleEndian>(0x0200)?;
    body.write_u16::<LittleEndian>(0)?;
    // compression types
    body.write_u16::<LittleEndian>(0)?;
    // extra flags: fastpath output, no bitmap compression header, long credentials
    body.write_u16::<LittleEndian>(0x0001 | 0x0400 | 0x0004)?;
    // update and remote unshare
    body.write_u16::<LittleEndian>(0)?;
    body.write_u16::<LittleEndian>(0)?;
    // compression level
    body.write_u16::<LittleEndian>(0)?;
    // refresh rect and suppress output
    body.write_u8(0)?;
    body.write_u8(0)?;
    Ok(Capability::new(CapabilitySetType::General, body.into_inner()))
}

/// Bitmap capability set announcing the session geometry
fn bitmap_capability(width: u16, height: u16, bits_per_pixel: u16) -> RdpResult<Capability> {
    let mut body = Cursor::new(Vec::new());
    body.write_u16::<LittleEndian>(bits_per_pixel)?;
    // 1, 4 and 8 bpp receive support are required to be on
    body.write_u16::<LittleEndian>(1)?;
    body.write_u16::<LittleEndian>(1)?;
    body.write_u16::<LittleEndian>(1)?;
    body.write_u16::<LittleEndian>(width)?;
    body.write_u16::<LittleEndian>(height)?;
    body.write_u16::<LittleEndian>(0)?;
    // desktop resize
    body.write_u16::<LittleEndian>(1)?;
    // bitmap compression is always supported
    body.write_u16::<LittleEndian>(1)?;
    // high color and drawing flags
    body.write_u8(0)?;
    body.write_u8(0)?;
    // multiple rectangles
    body.write_u16::<LittleEndian>(1)?;
    body.write_u16::<LittleEndian>(0)?;
    Ok(Capability::new(CapabilitySetType::Bitmap, body.into_inner()))
}

/// Order capability set with every order support byte zeroed
/// so the server falls back to plain bitmap updates
fn order_capability() -> RdpResult<Capability> {
    let mut body = Cursor::new(Vec::new());
    // terminal descriptor
    body.write_all(&[0u8; 16])?;
    body.write_u32::<LittleEndian>(0)?;
    // desktop save granularity
    body.write_u16::<LittleEndian>(1)?;
    body.write_u16::<LittleEndian>(20)?;
    body.write_u16::<LittleEndian>(0)?;
    // max order level and number of fonts
    body.write_u16::<LittleEndian>(1)?;
    body.write_u16::<LittleEndian>(0)?;
    // order flags, negotiate and zero bounds deltas are mandatory
    body.write_u16::<LittleEndian>(0x0002 | 0x0008)?;
    // no order is supported
    body.write_all(&[0u8; 32])?;
    // text flags
    body.write_u16::<LittleEndian>(0)?;
    body.write_u16::<LittleEndian>(0)?;
    body.write_u32::<LittleEndian>(0)?;
    // desktop save size
    body.write_u32::<LittleEndian>(480 * 480)?;
    body.write_u16::<LittleEndian>(0)?;
    body.write_u16::<LittleEndian>(0)?;
    // ansi code page
    body.write_u16::<LittleEndian>(0)?;
    body.write_u16::<LittleEndian>(0)?;
    Ok(Capability::new(CapabilitySetType::Order, body.into_inner()))
}

fn bitmap_cache_capability() -> RdpResult<Capability> {
    let mut body = Cursor::new(Vec::new());
    body.write_all(&[0u8; 24])?;
    for (entries, cell_size) in [(200u16, 768u16), (600, 3072), (1000, 12288)] {
        body.write_u16::<LittleEndian>(entries)?;
        body.write_u16::<LittleEndian>(cell_size)?;
    }
    Ok(Capability::new(CapabilitySetType::BitmapCache, body.into_inner()))
}

fn pointer_capability() -> RdpResult<Capability> {
    let mut body = Cursor::new(Vec::new());
    // color pointers off, cache size 20
    body.write_u16::<LittleEndian>(0)?;
    body.write_u16::<LittleEndian>(20)?;
    Ok(Capability::new(CapabilitySetType::Pointer, body.into_inner()))
}

fn input_capability(layout: u32) -> RdpResult<Capability> {
    let mut body = Cursor::new(Vec::new());
    // scancodes, mousex and unicode
    body.write_u16::<LittleEndian>(0x0001 | 0x0004 | 0x0010)?;
    body.write_u16::<LittleEndian>(0)?;
    body.write_u32::<LittleEndian>(layout)?;
    // keyboard type, sub type and function keys
    body.write_u32::<LittleEndian>(4)?;
    body.write_u32::<LittleEndian>(0)?;
    body.write_u32::<LittleEndian>(12)?;
    // ime file name
    body.write_all(&[0u8; 64])?;
    Ok(Capability::new(CapabilitySetType::Input, body.into_inner()))
}

fn brush_capability() -> RdpResult<Capability> {
    let mut body = Cursor::new(Vec::new());
    body.write_u32::<LittleEndian>(0)?;
    Ok(Capability::new(CapabilitySetType::Brush, body.into_inner()))
}

fn glyph_cache_capability() -> RdpResult<Capability> {
    let mut body = Cursor::new(Vec::new());
    for (entries, cell_size) in [
        (254u16, 4u16),
        (254, 4),
        (254, 8),
        (254, 8),
        (254, 16),
        (254, 32),
        (254, 64),
        (254, 128),
        (254, 256),
        (64, 2048),
    ] {
        body.write_u16::<LittleEndian>(entries)?;
        body.write_u16::<LittleEndian>(cell_size)?;
    }
    // frag cache
    body.write_u32::<LittleEndian>(0)?;
    // glyph support none
    body.write_u16::<LittleEndian>(0)?;
    body.write_u16::<LittleEndian>(0)?;
    Ok(Capability::new(CapabilitySetType::GlyphCache, body.into_inner()))
}

fn offscreen_cache_capability() -> RdpResult<Capability> {
    let mut body = Cursor::new(Vec::new());
    body.write_u32::<LittleEndian>(0)?;
    body.write_u16::<LittleEndian>(0)?;
    body.write_u16::<LittleEndian>(0)?;
    Ok(Capability::new(CapabilitySetType::OffscreenCache, body.into_inner()))
}

fn virtual_channel_capability() -> RdpResult<Capability> {
    let mut body = Cursor::new(Vec::new());
    // no compression, default chunk size
    body.write_u32::<LittleEndian>(0)?;
    body.write_u32::<LittleEndian>(1600)?;
    Ok(Capability::new(CapabilitySetType::VirtualChannel, body.into_inner()))
}

fn sound_capability() -> RdpResult<Capability> {
    let mut body = Cursor::new(Vec::new());
    body.write_u16::<LittleEndian>(0)?;
    body.write_u16::<LittleEndian>(0)?;
    Ok(Capability::new(CapabilitySetType::Sound, body.into_inner()))
}

fn control_capability() -> RdpResult<Capability> {
    let mut body = Cursor::new(Vec::new());
    body.write_u16::<LittleEndian>(0)?;
    body.write_u16::<LittleEndian>(0)?;
    // control and detach interest, never
    body.write_u16::<LittleEndian>(2)?;
    body.write_u16::<LittleEndian>(2)?;
    Ok(Capability::new(CapabilitySetType::Control, body.into_inner()))
}

fn activation_capability() -> RdpResult<Capability> {
    let mut body = Cursor::new(Vec::new());
    body.write_u16::<LittleEndian>(0)?;
    body.write_u16::<LittleEndian>(0)?;
    body.write_u16::<LittleEndian>(0)?;
    body.write_u16::<LittleEndian>(0)?;
    Ok(Capability::new(CapabilitySetType::Activation, body.into_inner()))
}

fn share_capability() -> RdpResult<Capability> {
    let mut body = Cursor::new(Vec::new());
    body.write_u16::<LittleEndian>(0)?;
    body.write_u16::<LittleEndian>(0)?;
    Ok(Capability::new(CapabilitySetType::Share, body.into_inner()))
}

fn font_capability() -> RdpResult<Capability> {
    let mut body = Cursor::new(Vec::new());
    body.write_u16::<LittleEndian>(1)?;
    body.write_u16::<LittleEndian>(0)?;
    Ok(Capability::new(CapabilitySetType::Font, body.into_inner()))
}

/// Everything this client advertises in its confirm active
pub fn client_capabilities(width: u16, height: u16, bits_per_pixel: u16, layout: u32) -> RdpResult<CapabilitySets> {
    let mut sets = IndexMap::new();
    for capability in [
        general_capability()?,
        bitmap_capability(width, height, bits_per_pixel)?,
        order_capability()?,
        bitmap_cache_capability()?,
        pointer_capability()?,
        input_capability(layout)?,
        brush_capability()?,
        glyph_cache_capability()?,
        offscreen_cache_capability()?,
        virtual_channel_capability()?,
        sound_capability()?,
        control_capability()?,
        activation_capability()?,
        share_capability()?,
        font_capability()?,
    ] {
        sets.insert(capability.set_type, capability);
    }
    Ok(sets)
}

/// Serialize a collection the way both active PDUs carry it
pub fn write_capability_sets(sets: &CapabilitySets) -> RdpResult<Vec<u8>> {
    let mut result = Cursor::new(Vec::new());
    for capability in sets.values() {
        result.write_u16::<LittleEndian>(capability.set_type as u16)?;
        result.write_u16::<LittleEndian>(capability.body.len() as u16 + 4)?;
        result.write_all(&capability.body)?;
    }
    Ok(result.into_inner())
}

/// Parse the capability sets of a demand active PDU
///
/// Unknown types are kept raw, the server is allowed to know
/// more sets than we do
pub fn read_capability_sets(payload: &mut BytesMut, count: usize) -> RdpResult<CapabilitySets> {
    let mut sets = IndexMap::new();
    for _ in 0..count {
        check_remaining(payload, 4, "capability set header")?;
        let raw_type = payload.get_u16_le();
        let length = payload.get_u16_le() as usize;
        if length < 4 {
            return Err(rdp_error!(RdpErrorKind::InvalidSize, "capability set too short"));
        }
        check_remaining(payload, length - 4, "capability set body")?;
        let body = payload.split_to(length - 4).to_vec();

        match CapabilitySetType::try_from(raw_type) {
            Ok(set_type) => {
                sets.insert(set_type, Capability::new(set_type, body));
            }
            Err(_) => debug!("ignoring unknown capability set {:#06x}", raw_type),
        }
    }
    Ok(sets)
}
