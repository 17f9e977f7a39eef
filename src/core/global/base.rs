use byteorder::{LittleEndian, WriteBytesExt};
use bytes::{Buf, BytesMut};
use num_enum::TryFromPrimitive;
use std::io::{Cursor, Write};

use crate::core::capability::{read_capability_sets, write_capability_sets, CapabilitySets};
use crate::core::event::{BitmapEvent, InputEvent, MouseButton, PointerEvent};
use crate::model::data::check_remaining;
use crate::model::error::{RdpErrorKind, RdpResult};
use crate::rdp_error;

/// Share control PDU types, the version nibble is stripped
/// https://docs.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpbcgr/73d01865-2eae-407f-9b2c-87e31daac471
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
pub enum PduType {
    DemandActive = 0x1,
    ConfirmActive = 0x3,
    DeactivateAll = 0x6,
    Data = 0x7,
    ServerRedirect = 0xA,
}

/// Share data PDU types
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
pub enum PduType2 {
    Update = 0x02,
    Control = 0x14,
    Pointer = 0x1B,
    Input = 0x1C,
    Synchronize = 0x1F,
    RefreshRect = 0x21,
    SuppressOutput = 0x23,
    ShutdownRequest = 0x24,
    ShutdownDenied = 0x25,
    SaveSessionInfo = 0x26,
    FontList = 0x27,
    FontMap = 0x28,
    SetKeyboardIndicators = 0x29,
    SetErrorInfo = 0x2F,
}

/// Control PDU actions
pub const CTRLACTION_REQUEST_CONTROL: u16 = 0x0001;
pub const CTRLACTION_COOPERATE: u16 = 0x0004;

/// Update PDU payloads
const UPDATETYPE_BITMAP: u16 = 0x0001;

/// Bitmap data flags
const BITMAP_COMPRESSION: u16 = 0x0001;
const NO_BITMAP_COMPRESSION_HDR: u16 = 0x0400;

/// Slow path input event types
const INPUT_EVENT_SYNC: u16 = 0x0000;
const INPUT_EVENT_SCANCODE: u16 = 0x0004;
const INPUT_EVENT_UNICODE: u16 = 0x0005;
const INPUT_EVENT_MOUSE: u16 = 0x8001;

/// Keyboard event flags
const KBDFLAGS_EXTENDED: u16 = 0x0100;
const KBDFLAGS_RELEASE: u16 = 0x8000;

/// Pointer event flags
const PTRFLAGS_WHEEL: u16 = 0x0200;
const PTRFLAGS_WHEEL_NEGATIVE: u16 = 0x0100;
const PTRFLAGS_MOVE: u16 = 0x0800;
const PTRFLAGS_DOWN: u16 = 0x8000;
const PTRFLAGS_BUTTON1: u16 = 0x1000;
const PTRFLAGS_BUTTON2: u16 = 0x2000;
const PTRFLAGS_BUTTON3: u16 = 0x4000;

/// Server pointer PDU message types
const PTR_MSG_TYPE_SYSTEM: u16 = 0x0001;
const PTR_MSG_TYPE_POSITION: u16 = 0x0003;
const SYSPTR_NULL: u32 = 0x0000_0000;

/// Fast path update codes
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
pub enum FastPathUpdateType {
    Orders = 0x0,
    Bitmap = 0x1,
    Palette = 0x2,
    Synchronize = 0x3,
    SurfaceCommands = 0x4,
    PointerHidden = 0x5,
    PointerDefault = 0x6,
    PointerPosition = 0x8,
    ColorPointer = 0x9,
    CachedPointer = 0xA,
    NewPointer = 0xB,
}

/// Fast path fragmentation states
pub const FASTPATH_FRAGMENT_SINGLE: u8 = 0x0;
pub const FASTPATH_FRAGMENT_LAST: u8 = 0x1;
pub const FASTPATH_FRAGMENT_FIRST: u8 = 0x2;
pub const FASTPATH_FRAGMENT_NEXT: u8 = 0x3;

/// Originator id of every client PDU
const CLIENT_ORIGINATOR_ID: u16 = 0x03EA;

const SHARE_CONTROL_HEADER_LENGTH: usize = 6;
const SHARE_DATA_HEADER_LENGTH: usize = 18;

/// Frame a payload with the share control header
pub fn write_share_control(pdu_type: PduType, pdu_source: u16, payload: &[u8]) -> RdpResult<Vec<u8>> {
    let mut result = Cursor::new(Vec::new());
    result.write_u16::<LittleEndian>((payload.len() + SHARE_CONTROL_HEADER_LENGTH) as u16)?;
    // protocol version one in the high nibble
    result.write_u16::<LittleEndian>(pdu_type as u16 | 0x10)?;
    result.write_u16::<LittleEndian>(pdu_source)?;
    result.write_all(payload)?;
    Ok(result.into_inner())
}

/// Read a share control header, leaving the body in place
pub fn read_share_control(payload: &mut BytesMut) -> RdpResult<PduType> {
    check_remaining(payload, SHARE_CONTROL_HEADER_LENGTH, "share control header")?;
    let _total_length = payload.get_u16_le();
    let pdu_type = payload.get_u16_le();
    let _pdu_source = payload.get_u16_le();
    Ok(PduType::try_from(pdu_type & 0xF)?)
}

/// Frame a payload with both the control and the data header
pub fn write_share_data(share_id: u32, pdu_source: u16, pdu_type2: PduType2, payload: &[u8]) -> RdpResult<Vec<u8>> {
    let mut data = Cursor::new(Vec::new());
    data.write_u32::<LittleEndian>(share_id)?;
    data.write_u8(0)?;
    // stream id low
    data.write_u8(1)?;
    data.write_u16::<LittleEndian>((payload.len() + SHARE_DATA_HEADER_LENGTH) as u16)?;
    data.write_u8(pdu_type2 as u8)?;
    // no compression
    data.write_u8(0)?;
    data.write_u16::<LittleEndian>(0)?;
    data.write_all(payload)?;
    write_share_control(PduType::Data, pdu_source, &data.into_inner())
}

/// Read a share data header once the control header is gone
pub fn read_share_data_header(payload: &mut BytesMut) -> RdpResult<PduType2> {
    check_remaining(payload, SHARE_DATA_HEADER_LENGTH - SHARE_CONTROL_HEADER_LENGTH, "share data header")?;
    let _share_id = payload.get_u32_le();
    let _padding = payload.get_u8();
    let _stream_id = payload.get_u8();
    let _uncompressed_length = payload.get_u16_le();
    let pdu_type2 = payload.get_u8();
    let _compressed_type = payload.get_u8();
    let _compressed_length = payload.get_u16_le();
    Ok(PduType2::try_from(pdu_type2)?)
}

/// Parsed server demand active PDU
pub struct DemandActive {
    pub share_id: u32,
    pub server_capabilities: CapabilitySets,
}

pub fn read_demand_active(payload: &mut BytesMut) -> RdpResult<DemandActive> {
    check_remaining(payload, 8, "demand active header")?;
    let share_id = payload.get_u32_le();
    let source_length = payload.get_u16_le() as usize;
    let _capabilities_length = payload.get_u16_le() as usize;
    check_remaining(payload, source_length, "demand active source")?;
    payload.advance(source_length);
    check_remaining(payload, 4, "demand active capability count")?;
    let count = payload.get_u16_le() as usize;
    let _padding = payload.get_u16_le();
    let server_capabilities = read_capability_sets(payload, count)?;
    // the trailing session id stays unread, some servers omit it
    Ok(DemandActive {
        share_id,
        server_capabilities,
    })
}

/// Client confirm active PDU answering a demand active
pub fn write_confirm_active(
    share_id: u32,
    pdu_source: u16,
    client_capabilities: &CapabilitySets,
) -> RdpResult<Vec<u8>> {
    let capabilities = write_capability_sets(client_capabilities)?;
    let source = b"rdp-client\0";

    let mut body = Cursor::new(Vec::new());
    body.write_u32::<LittleEndian>(share_id)?;
    body.write_u16::<LittleEndian>(CLIENT_ORIGINATOR_ID)?;
    body.write_u16::<LittleEndian>(source.len() as u16)?;
    body.write_u16::<LittleEndian>((capabilities.len() + 4) as u16)?;
    body.write_all(source)?;
    body.write_u16::<LittleEndian>(client_capabilities.len() as u16)?;
    body.write_u16::<LittleEndian>(0)?;
    body.write_all(&capabilities)?;
    write_share_control(PduType::ConfirmActive, pdu_source, &body.into_inner())
}

pub fn write_synchronize(share_id: u32, pdu_source: u16, target_user: u16) -> RdpResult<Vec<u8>> {
    let mut body = Cursor::new(Vec::new());
    // message type synchronize
    body.write_u16::<LittleEndian>(1)?;
    body.write_u16::<LittleEndian>(target_user)?;
    write_share_data(share_id, pdu_source, PduType2::Synchronize, &body.into_inner())
}

pub fn write_control(share_id: u32, pdu_source: u16, action: u16) -> RdpResult<Vec<u8>> {
    let mut body = Cursor::new(Vec::new());
    body.write_u16::<LittleEndian>(action)?;
    // grant id and control id are zero on the client side
    body.write_u16::<LittleEndian>(0)?;
    body.write_u32::<LittleEndian>(0)?;
    write_share_data(share_id, pdu_source, PduType2::Control, &body.into_inner())
}

pub fn write_font_list(share_id: u32, pdu_source: u16) -> RdpResult<Vec<u8>> {
    let mut body = Cursor::new(Vec::new());
    body.write_u16::<LittleEndian>(0)?;
    body.write_u16::<LittleEndian>(0)?;
    // first and last entry of the list
    body.write_u16::<LittleEndian>(0x0003)?;
    body.write_u16::<LittleEndian>(0x0032)?;
    write_share_data(share_id, pdu_source, PduType2::FontList, &body.into_inner())
}

fn write_input_event(event: &InputEvent, s: &mut Cursor<Vec<u8>>) -> RdpResult<()> {
    // event time is ignored by servers
    s.write_u32::<LittleEndian>(0)?;
    match event {
        InputEvent::ScanCode {
            code,
            is_release,
            is_extended,
        } => {
            s.write_u16::<LittleEndian>(INPUT_EVENT_SCANCODE)?;
            let mut flags = 0;
            if *is_release {
                flags |= KBDFLAGS_RELEASE;
            }
            if *is_extended {
                flags |= KBDFLAGS_EXTENDED;
            }
            s.write_u16::<LittleEndian>(flags)?;
            s.write_u16::<LittleEndian>(*code)?;
            s.write_u16::<LittleEndian>(0)?;
        }
        InputEvent::Unicode { code, is_release } => {
            s.write_u16::<LittleEndian>(INPUT_EVENT_UNICODE)?;
            s.write_u16::<LittleEndian>(if *is_release { KBDFLAGS_RELEASE } else { 0 })?;
            s.write_u16::<LittleEndian>(*code)?;
            s.write_u16::<LittleEndian>(0)?;
        }
        InputEvent::Mouse {
            x,
            y,
            button,
            is_pressed,
        } => {
            s.write_u16::<LittleEndian>(INPUT_EVENT_MOUSE)?;
            let mut flags = match button {
                None => PTRFLAGS_MOVE,
                Some(MouseButton::Left) => PTRFLAGS_BUTTON1,
                Some(MouseButton::Middle) => PTRFLAGS_BUTTON3,
                Some(MouseButton::Right) => PTRFLAGS_BUTTON2,
            };
            if button.is_some() && *is_pressed {
                flags |= PTRFLAGS_DOWN;
            }
            s.write_u16::<LittleEndian>(flags)?;
            s.write_u16::<LittleEndian>(*x)?;
            s.write_u16::<LittleEndian>(*y)?;
        }
        InputEvent::Wheel { x, y, delta } => {
            s.write_u16::<LittleEndian>(INPUT_EVENT_MOUSE)?;
            let mut flags = PTRFLAGS_WHEEL;
            if *delta < 0 {
                flags |= PTRFLAGS_WHEEL_NEGATIVE;
            }
            flags |= delta.unsigned_abs() & 0x00FF;
            s.write_u16::<LittleEndian>(flags)?;
            s.write_u16::<LittleEndian>(*x)?;
            s.write_u16::<LittleEndian>(*y)?;
        }
        InputEvent::Synchronize { flags } => {
            s.write_u16::<LittleEndian>(INPUT_EVENT_SYNC)?;
            s.write_u16::<LittleEndian>(0)?;
            s.write_u32::<LittleEndian>(*flags)?;
        }
    }
    Ok(())
}

/// Slow path input PDU wrapping a batch of events
pub fn write_input_pdu(
    share_id: u32,
    pdu_source: u16,
    events: &[InputEvent],
) -> RdpResult<Vec<u8>> {
    let mut body = Cursor::new(Vec::new());
    body.write_u16::<LittleEndian>(events.len() as u16)?;
    body.write_u16::<LittleEndian>(0)?;
    for event in events {
        write_input_event(event, &mut body)?;
    }
    write_share_data(share_id, pdu_source, PduType2::Input, &body.into_inner())
}

/// Fast path input body for the same batch, framed by tpkt
pub fn write_fast_path_input(events: &[InputEvent]) -> RdpResult<Vec<u8>> {
    let mut body = Cursor::new(Vec::new());
    for event in events {
        match event {
            InputEvent::ScanCode {
                code,
                is_release,
                is_extended,
            } => {
                // event header with flags in the low bits
                let mut flags = 0u8;
                if *is_release {
                    flags |= 0x01;
                }
                if *is_extended {
                    flags |= 0x02;
                }
                body.write_u8(flags | (0x0 << 5))?;
                body.write_u8(*code as u8)?;
            }
            InputEvent::Mouse { .. } | InputEvent::Wheel { .. } => {
                let mut slow = Cursor::new(Vec::new());
                write_input_event(event, &mut slow)?;
                let slow = slow.into_inner();
                body.write_u8(0x1 << 5)?;
                // reuse the slow path body after time and type
                body.write_all(&slow[6..])?;
            }
            InputEvent::Synchronize { flags } => {
                body.write_u8((*flags as u8 & 0x0F) | (0x3 << 5))?;
            }
            InputEvent::Unicode { code, is_release } => {
                let flags = if *is_release { 0x01 } else { 0x00 };
                body.write_u8(flags | (0x4 << 5))?;
                body.write_u16::<LittleEndian>(*code)?;
            }
        }
    }
    Ok(body.into_inner())
}

/// Parse the rectangles of a bitmap update payload
///
/// The update type word was already consumed by the caller
pub fn read_bitmap_update(payload: &mut BytesMut) -> RdpResult<Vec<BitmapEvent>> {
    check_remaining(payload, 2, "bitmap update count")?;
    let count = payload.get_u16_le() as usize;
    let mut rectangles = Vec::with_capacity(count);

    for _ in 0..count {
        check_remaining(payload, 18, "bitmap data header")?;
        let dest_left = payload.get_u16_le();
        let dest_top = payload.get_u16_le();
        let dest_right = payload.get_u16_le();
        let dest_bottom = payload.get_u16_le();
        let width = payload.get_u16_le();
        let height = payload.get_u16_le();
        let bits_per_pixel = payload.get_u16_le();
        let flags = payload.get_u16_le();
        let mut length = payload.get_u16_le() as usize;

        if flags & BITMAP_COMPRESSION != 0 && flags & NO_BITMAP_COMPRESSION_HDR == 0 {
            // skip the optional compression header
            check_remaining(payload, 8, "bitmap compression header")?;
            payload.advance(8);
            length = length.saturating_sub(8);
        }

        check_remaining(payload, length, "bitmap data body")?;
        let data = payload.split_to(length).to_vec();
        rectangles.push(BitmapEvent {
            dest_left,
            dest_top,
            dest_right,
            dest_bottom,
            width,
            height,
            bits_per_pixel,
            is_compress: flags & BITMAP_COMPRESSION != 0,
            data,
        });
    }
    Ok(rectangles)
}

/// Slow path update PDU, only bitmap payloads turn into events
pub fn read_update(payload: &mut BytesMut) -> RdpResult<Vec<BitmapEvent>> {
    check_remaining(payload, 2, "update type")?;
    let update_type = payload.get_u16_le();
    if update_type == UPDATETYPE_BITMAP {
        read_bitmap_update(payload)
    } else {
        Ok(Vec::new())
    }
}

/// Slow path pointer PDU
pub fn read_pointer(payload: &mut BytesMut) -> RdpResult<Option<PointerEvent>> {
    check_remaining(payload, 4, "pointer header")?;
    let message_type = payload.get_u16_le();
    let _padding = payload.get_u16_le();

    match message_type {
        PTR_MSG_TYPE_SYSTEM => {
            check_remaining(payload, 4, "system pointer")?;
            let pointer_type = payload.get_u32_le();
            Ok(Some(PointerEvent {
                x: 0,
                y: 0,
                visible: pointer_type != SYSPTR_NULL,
            }))
        }
        PTR_MSG_TYPE_POSITION => {
            check_remaining(payload, 4, "pointer position")?;
            Ok(Some(PointerEvent {
                x: payload.get_u16_le(),
                y: payload.get_u16_le(),
                visible: true,
            }))
        }
        _ => Ok(None),
    }
}

/// Error info PDU, zero means everything is fine
pub fn read_error_info(payload: &mut BytesMut) -> RdpResult<u32> {
    check_remaining(payload, 4, "error info")?;
    Ok(payload.get_u32_le())
}

/// One fast path update once fragmentation is resolved
pub struct FastPathUpdate {
    pub update_type: FastPathUpdateType,
    pub fragmentation: u8,
    pub data: BytesMut,
}

/// Split a decrypted fast path payload into its updates
pub fn read_fast_path_updates(payload: &mut BytesMut) -> RdpResult<Vec<FastPathUpdate>> {
    let mut updates = Vec::new();
    while payload.has_remaining() {
        check_remaining(payload, 3, "fast path update header")?;
        let header = payload.get_u8();
        let update_type = header & 0x0F;
        let fragmentation = (header >> 4) & 0x3;
        let compression = (header >> 6) & 0x3;
        if compression & 0x2 != 0 {
            // a compression flags byte we never asked for
            check_remaining(payload, 1, "fast path compression flags")?;
            let flags = payload.get_u8();
            if flags & 0x20 != 0 {
                return Err(rdp_error!(
                    RdpErrorKind::NotImplemented,
                    "compressed fast path update"
                ));
            }
        }
        check_remaining(payload, 2, "fast path update size")?;
        let size = payload.get_u16_le() as usize;
        check_remaining(payload, size, "fast path update body")?;
        let data = payload.split_to(size);

        match FastPathUpdateType::try_from(update_type) {
            Ok(update_type) => updates.push(FastPathUpdate {
                update_type,
                fragmentation,
                data,
            }),
            // unknown updates are skipped, not fatal
            Err(_) => continue,
        }
    }
    Ok(updates)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_share_control_round_trip() {
        let pdu = write_share_control(PduType::ConfirmActive, 1004, &[0xAA, 0xBB]).unwrap();
        assert_eq!(pdu.len(), 8);
        assert_eq!(&pdu[0..2], [0x08, 0x00]);
        assert_eq!(&pdu[2..4], [0x13, 0x00]);

        let mut payload = BytesMut::from(&pdu[..]);
        assert_eq!(read_share_control(&mut payload).unwrap(), PduType::ConfirmActive);
        assert_eq!(&payload[..], [0xAA, 0xBB]);
    }

    #[test]
    fn test_share_data_round_trip() {
        let pdu = write_share_data(0x11223344, 1004, PduType2::Synchronize, &[0x01]).unwrap();
        let mut payload = BytesMut::from(&pdu[..]);
        assert_eq!(read_share_control(&mut payload).unwrap(), PduType::Data);
        assert_eq!(read_share_data_header(&mut payload).unwrap(), PduType2::Synchronize);
        assert_eq!(&payload[..], [0x01]);
    }

    #[test]
    fn test_demand_active_confirm_active_round_trip() {
        let capabilities = crate::core::capability::client_capabilities(800, 600, 16, 0x409).unwrap();
        let raw = write_capability_sets(&capabilities).unwrap();

        let mut body = Vec::new();
        body.extend_from_slice(&0xCAFEu32.to_le_bytes());
        body.extend_from_slice(&4u16.to_le_bytes());
        body.extend_from_slice(&((raw.len() + 4) as u16).to_le_bytes());
        body.extend_from_slice(b"RDP\0");
        body.extend_from_slice(&(capabilities.len() as u16).to_le_bytes());
        body.extend_from_slice(&0u16.to_le_bytes());
        body.extend_from_slice(&raw);
        body.extend_from_slice(&0u32.to_le_bytes());

        let mut payload = BytesMut::from(&body[..]);
        let demand = read_demand_active(&mut payload).unwrap();
        assert_eq!(demand.share_id, 0xCAFE);
        assert_eq!(demand.server_capabilities.len(), capabilities.len());

        let confirm = write_confirm_active(demand.share_id, 1004, &capabilities).unwrap();
        let mut confirm = BytesMut::from(&confirm[..]);
        assert_eq!(read_share_control(&mut confirm).unwrap(), PduType::ConfirmActive);
    }

    #[test]
    fn test_input_pdu_scancode_layout() {
        let pdu = write_input_pdu(
            1,
            1004,
            &[InputEvent::ScanCode {
                code: 0x1C,
                is_release: true,
                is_extended: false,
            }],
        )
        .unwrap();

        let mut payload = BytesMut::from(&pdu[..]);
        read_share_control(&mut payload).unwrap();
        assert_eq!(read_share_data_header(&mut payload).unwrap(), PduType2::Input);
        // one event
        assert_eq!(payload.get_u16_le(), 1);
        payload.advance(2);
        // event time then scancode type
        assert_eq!(payload.get_u32_le(), 0);
        assert_eq!(payload.get_u16_le(), INPUT_EVENT_SCANCODE);
        assert_eq!(payload.get_u16_le(), KBDFLAGS_RELEASE);
        assert_eq!(payload.get_u16_le(), 0x1C);
    }

    #[test]
    fn test_wheel_event_is_a_mouse_event() {
        let pdu = write_input_pdu(1, 1004, &[InputEvent::Wheel { x: 10, y: 20, delta: -3 }]).unwrap();
        let mut payload = BytesMut::from(&pdu[..]);
        read_share_control(&mut payload).unwrap();
        read_share_data_header(&mut payload).unwrap();
        payload.advance(4);
        payload.advance(4);
        assert_eq!(payload.get_u16_le(), INPUT_EVENT_MOUSE);
        let flags = payload.get_u16_le();
        assert_ne!(flags & PTRFLAGS_WHEEL, 0);
        assert_ne!(flags & PTRFLAGS_WHEEL_NEGATIVE, 0);
        assert_eq!(flags & 0xFF, 3);
        assert_eq!(payload.get_u16_le(), 10);
        assert_eq!(payload.get_u16_le(), 20);
    }

    #[test]
    fn test_mouse_button_mapping() {
        for (button, expected) in [
            (MouseButton::Left, PTRFLAGS_BUTTON1),
            (MouseButton::Middle, PTRFLAGS_BUTTON3),
            (MouseButton::Right, PTRFLAGS_BUTTON2),
        ] {
            let pdu = write_input_pdu(
                1,
                1004,
                &[InputEvent::Mouse {
                    x: 0,
                    y: 0,
                    button: Some(button),
                    is_pressed: true,
                }],
            )
            .unwrap();
            let mut payload = BytesMut::from(&pdu[..]);
            read_share_control(&mut payload).unwrap();
            read_share_data_header(&mut payload).unwrap();
            payload.advance(8);
            assert_eq!(payload.get_u16_le(), expected | PTRFLAGS_DOWN);
        }
    }

    #[test]
    fn test_fast_path_input_scancode_encoding() {
        let body = write_fast_path_input(&[InputEvent::ScanCode {
            code: 0x1C,
            is_release: true,
            is_extended: false,
        }])
        .unwrap();
        // release flag in the event header, then the code
        assert_eq!(body, [0x01, 0x1C]);
    }

    #[test]
    fn test_fast_path_input_mouse_matches_slow_path_body() {
        let body = write_fast_path_input(&[InputEvent::Mouse {
            x: 5,
            y: 6,
            button: Some(MouseButton::Left),
            is_pressed: true,
        }])
        .unwrap();
        assert_eq!(body[0], 0x1 << 5);
        let flags = u16::from_le_bytes([body[1], body[2]]);
        assert_eq!(flags, PTRFLAGS_BUTTON1 | PTRFLAGS_DOWN);
        assert_eq!(u16::from_le_bytes([body[3], body[4]]), 5);
        assert_eq!(u16::from_le_bytes([body[5], body[6]]), 6);
    }

    #[test]
    fn test_bitmap_update_parse() {
        let mut body = Vec::new();
        body.extend_from_slice(&1u16.to_le_bytes());
        for value in [0u16, 0, 3, 3, 4, 4, 16u16] {
            body.extend_from_slice(&value.to_le_bytes());
        }
        // compressed without header flag
        body.extend_from_slice(&(BITMAP_COMPRESSION | NO_BITMAP_COMPRESSION_HDR).to_le_bytes());
        body.extend_from_slice(&2u16.to_le_bytes());
        body.extend_from_slice(&[0xDE, 0xAD]);

        let mut payload = BytesMut::from(&body[..]);
        let rectangles = read_bitmap_update(&mut payload).unwrap();
        assert_eq!(rectangles.len(), 1);
        assert_eq!(rectangles[0].width, 4);
        assert_eq!(rectangles[0].bits_per_pixel, 16);
        assert!(rectangles[0].is_compress);
        assert_eq!(rectangles[0].data, [0xDE, 0xAD]);
    }

    #[test]
    fn test_fast_path_update_split() {
        let mut body = Vec::new();
        // bitmap update, single fragment
        body.push(FastPathUpdateType::Bitmap as u8);
        body.extend_from_slice(&4u16.to_le_bytes());
        body.extend_from_slice(&[0x01, 0x00, 0x00, 0x00]);
        // pointer hidden update
        body.push(FastPathUpdateType::PointerHidden as u8);
        body.extend_from_slice(&0u16.to_le_bytes());

        let mut payload = BytesMut::from(&body[..]);
        let updates = read_fast_path_updates(&mut payload).unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].update_type, FastPathUpdateType::Bitmap);
        assert_eq!(updates[0].fragmentation, FASTPATH_FRAGMENT_SINGLE);
        assert_eq!(updates[1].update_type, FastPathUpdateType::PointerHidden);
    }

    #[test]
    fn test_pointer_parse() {
        let mut payload = BytesMut::from(&[0x03, 0x00, 0x00, 0x00, 0x0A, 0x00, 0x14, 0x00][..]);
        let pointer = read_pointer(&mut payload).unwrap().unwrap();
        assert_eq!((pointer.x, pointer.y, pointer.visible), (10, 20, true));

        let mut payload = BytesMut::from(&[0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00][..]);
        let pointer = read_pointer(&mut payload).unwrap().unwrap();
        assert!(!pointer.visible);
    }
}
