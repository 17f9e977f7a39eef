/// RDP strings travel as UTF-16LE
///
/// Info PDU, license packets and NTLM all expect this encoding
pub trait Unicode {
    /// Encode into UTF-16LE without terminator
    ///
    /// # Example
    /// ```
    /// use rdp_client::model::unicode::Unicode;
    /// assert_eq!("da".to_unicode(), [0x64, 0x00, 0x61, 0x00]);
    /// ```
    fn to_unicode(&self) -> Vec<u8>;
}

impl Unicode for &str {
    fn to_unicode(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(self.len() * 2);
        for code in self.encode_utf16() {
            result.extend_from_slice(&code.to_le_bytes());
        }
        result
    }
}

impl Unicode for String {
    fn to_unicode(&self) -> Vec<u8> {
        self.as_str().to_unicode()
    }
}

/// Decode UTF-16LE bytes, dropping an eventual trailing NUL
pub fn from_unicode(data: &[u8]) -> String {
    let codes: Vec<u16> = data
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&c| c != 0)
        .collect();
    String::from_utf16_lossy(&codes)
}
