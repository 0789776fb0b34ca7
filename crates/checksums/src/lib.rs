#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `dsp_checksums` provides the streaming SHA-256 digest `dsp-engine` uses
//! for the optional Verify step (`spec.md` §4.3): after an atomic rename,
//! the worker recomputes the destination's digest and compares it against
//! the digest accumulated while streaming the source, so a corrupted copy
//! is caught before it is trusted.
//!
//! # Examples
//!
//! ```
//! use dsp_checksums::Sha256Stream;
//!
//! let mut hasher = Sha256Stream::new();
//! hasher.update(b"hello");
//! let digest = hasher.finalize();
//! assert_eq!(digest, Sha256Stream::digest(b"hello"));
//! ```

use digest::Digest;

/// Streaming SHA-256 hasher.
#[derive(Clone, Debug, Default)]
pub struct Sha256Stream {
    inner: sha2::Sha256,
}

impl Sha256Stream {
    /// Creates a hasher with an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: sha2::Sha256::new(),
        }
    }

    /// Feeds additional bytes into the digest state.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalizes the digest and returns the 256-bit SHA-256 output.
    #[must_use]
    pub fn finalize(self) -> [u8; 32] {
        self.inner.finalize().into()
    }

    /// Computes the SHA-256 digest of `data` in one shot.
    #[must_use]
    pub fn digest(data: &[u8]) -> [u8; 32] {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.finalize()
    }
}

/// Renders a digest as lowercase hex, matching the form persisted in
/// journal/summary artifacts.
#[must_use]
pub fn to_hex(digest: &[u8; 32]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(64);
    for byte in digest {
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_matches_one_shot() {
        let mut hasher = Sha256Stream::new();
        hasher.update(b"hel");
        hasher.update(b"lo");
        assert_eq!(hasher.finalize(), Sha256Stream::digest(b"hello"));
    }

    #[test]
    fn matches_known_vector() {
        let digest = Sha256Stream::digest(b"abc");
        assert_eq!(
            to_hex(&digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn empty_input_matches_known_vector() {
        let digest = Sha256Stream::digest(b"");
        assert_eq!(
            to_hex(&digest),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
