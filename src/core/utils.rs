use sha2::{
    Digest,
    Sha256,
};

const HASH_WIDTH: usize = 8;
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub trait NormalizeTranslation {
    fn normalize_translation(&self) -> String;
}

// "Hallo, Welt!" -> "hallowelt"
impl NormalizeTranslation for str {
    fn normalize_translation(&self) -> String {
        self.chars().filter(|c| c.is_alphanumeric()).flat_map(char::to_lowercase).collect()
    }
}

/// Implement the trait for `String` by forwarding the method to `str`
impl NormalizeTranslation for String {
    fn normalize_translation(&self) -> String {
        self.as_str().normalize_translation()
    }
}

/// 32-bit digest of `text` rendered as exactly eight base-36 characters.
pub fn hash8(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut value = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);

    let mut buffer = [b'0'; HASH_WIDTH];
    for slot in buffer.iter_mut().rev() {
        *slot = BASE36[(value % 36) as usize];
        value /= 36;
    }

    buffer.iter().map(|&b| b as char).collect()
}
