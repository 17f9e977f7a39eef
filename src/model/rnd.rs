use rand::Rng;

/// Generate `size` random bytes
///
/// Client randoms, NTLM challenges and license premaster
/// secrets all come from here
pub fn random(size: usize) -> Vec<u8> {
    let mut result = vec![0u8; size];
    rand::thread_rng().fill(result.as_mut_slice());
    result
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_random_size() {
        assert_eq!(random(32).len(), 32);
    }
}
