use rand::Rng;

pub const GLYPHS: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*()_+-=[]{}|;':\",./<>?";

pub fn random_glyph<R: Rng + ?Sized>(rng: &mut R) -> char {
    let bytes = GLYPHS.as_bytes();
    bytes[rng.gen_range(0..bytes.len())] as char
}

pub fn random_chain<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Vec<char> {
    (0..len).map(|_| random_glyph(rng)).collect()
}
