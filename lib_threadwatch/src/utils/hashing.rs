//! Stable content hashing for file names.

use md5::{Digest, Md5};

/// Lower-case hex MD5 of `input`.
///
/// Used to derive one state file per watched thread from its canonical
/// address; the digest only needs to be stable, not secret.
pub fn content_hash(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_md5_digests() {
        assert_eq!(content_hash(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(content_hash("abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn is_stable_for_equal_inputs() {
        let uri = "https://www.mediavida.com/foro/mafia/fortaleza-frontera-iv-remake-710835";
        assert_eq!(content_hash(uri), content_hash(uri));
        assert_ne!(content_hash(uri), content_hash(&format!("{uri}/2")));
    }
}
