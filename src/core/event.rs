use crate::codecs::rle;
use crate::model::error::RdpResult;

/// One rectangle of screen content pushed by the server
///
/// The payload stays opaque until the caller asks for pixels,
/// decompression only happens when somebody renders
#[derive(Debug, Clone)]
pub struct BitmapEvent {
    /// Destination rectangle on screen
    pub dest_left: u16,
    pub dest_top: u16,
    pub dest_right: u16,
    pub dest_bottom: u16,
    /// Source bitmap geometry
    pub width: u16,
    pub height: u16,
    pub bits_per_pixel: u16,
    pub is_compress: bool,
    pub data: Vec<u8>,
}

impl BitmapEvent {
    /// Raw pixels of the rectangle, row major top to bottom
    ///
    /// Uncompressed payloads arrive bottom up on the wire and
    /// are flipped here so both paths agree
    pub fn decompress(self) -> RdpResult<Vec<u8>> {
        let width = self.width as usize;
        let height = self.height as usize;
        if self.is_compress {
            rle::decompress(&self.data, width, height, self.bits_per_pixel as usize)
        } else {
            let row_bytes = width * ((self.bits_per_pixel as usize + 7) / 8);
            let mut result = Vec::with_capacity(self.data.len());
            for row in self.data.chunks(row_bytes).rev() {
                result.extend_from_slice(row);
            }
            Ok(result)
        }
    }
}

/// Server driven pointer change
#[derive(Debug, Clone)]
pub struct PointerEvent {
    pub x: u16,
    pub y: u16,
    pub visible: bool,
}

/// Everything a session publishes upward
///
/// One tagged enum with a single dispatcher instead of a
/// string keyed emitter
#[derive(Debug, Clone)]
pub enum RdpEvent {
    /// Capability exchange completed, updates will follow
    Ready,
    Bitmap(BitmapEvent),
    Pointer(PointerEvent),
    /// The server left the domain cleanly, no more updates
    Disconnect,
}

/// Mouse buttons of the input interface
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl MouseButton {
    /// Conventional GUI toolkit numbering, 0 left, 1 middle,
    /// 2 right
    pub fn from_index(index: u8) -> Option<MouseButton> {
        match index {
            0 => Some(MouseButton::Left),
            1 => Some(MouseButton::Middle),
            2 => Some(MouseButton::Right),
            _ => None,
        }
    }
}

/// Everything a caller can inject downward
#[derive(Debug, Clone)]
pub enum InputEvent {
    /// Scan code key stroke
    ScanCode {
        code: u16,
        is_release: bool,
        is_extended: bool,
    },
    /// Unicode key stroke
    Unicode { code: u16, is_release: bool },
    /// Pointer move or click
    Mouse {
        x: u16,
        y: u16,
        button: Option<MouseButton>,
        is_pressed: bool,
    },
    /// Vertical wheel rotation at a position
    Wheel { x: u16, y: u16, delta: i16 },
    /// Toggle key synchronization
    Synchronize { flags: u32 },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_button_index_mapping() {
        assert_eq!(MouseButton::from_index(0), Some(MouseButton::Left));
        assert_eq!(MouseButton::from_index(1), Some(MouseButton::Middle));
        assert_eq!(MouseButton::from_index(2), Some(MouseButton::Right));
        assert_eq!(MouseButton::from_index(3), None);
    }

    #[test]
    fn test_uncompressed_bitmap_is_flipped() {
        let event = BitmapEvent {
            dest_left: 0,
            dest_top: 0,
            dest_right: 1,
            dest_bottom: 1,
            width: 2,
            height: 2,
            bits_per_pixel: 8,
            is_compress: false,
            data: vec![0xAA, 0xAA, 0xBB, 0xBB],
        };
        assert_eq!(event.decompress().unwrap(), [0xBB, 0xBB, 0xAA, 0xAA]);
    }

    #[test]
    fn test_compressed_bitmap_goes_through_rle() {
        let event = BitmapEvent {
            dest_left: 0,
            dest_top: 0,
            dest_right: 4,
            dest_bottom: 1,
            width: 4,
            height: 1,
            bits_per_pixel: 8,
            is_compress: true,
            data: vec![0x64, 0xAB],
        };
        assert_eq!(event.decompress().unwrap(), [0xAB; 4]);
    }
}
