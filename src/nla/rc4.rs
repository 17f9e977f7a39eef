/// Plain RC4 stream cipher
///
/// Standard RDP security, NTLM sealing and the license
/// challenge all still rely on it, no matter how retired
/// the algorithm is everywhere else
pub struct Rc4 {
    state: [u8; 256],
    i: usize,
    j: usize,
}

impl Rc4 {
    pub fn new(key: &[u8]) -> Self {
        let mut state = [0u8; 256];
        for (index, value) in state.iter_mut().enumerate() {
            *value = index as u8;
        }

        let mut j = 0usize;
        for i in 0..256 {
            j = (j + state[i] as usize + key[i % key.len()] as usize) % 256;
            state.swap(i, j);
        }

        Rc4 { state, i: 0, j: 0 }
    }

    /// Combine the keystream with the message
    ///
    /// Encryption and decryption are the same operation,
    /// the keystream position advances with every call
    pub fn process(&mut self, message: &[u8]) -> Vec<u8> {
        let mut output = Vec::with_capacity(message.len());
        for byte in message {
            self.i = (self.i + 1) % 256;
            self.j = (self.j + self.state[self.i] as usize) % 256;
            self.state.swap(self.i, self.j);
            let keystream = self.state[(self.state[self.i] as usize + self.state[self.j] as usize) % 256];
            output.push(keystream ^ byte);
        }
        output
    }
}
