//! Incremental UTF-8 decoding for consumers of streamed render output.
//!
//! Sinks may receive byte chunks split at arbitrary offsets (a transport can
//! re-chunk what the serializer wrote). `ChunkDecoder` carries an incomplete
//! multi-byte suffix from one chunk to the next and replaces invalid
//! sequences with U+FFFD so decoding always makes progress.

#[derive(Clone, Debug, Default)]
pub struct ChunkDecoder {
    carry: Vec<u8>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes held back because they may start a multi-byte sequence.
    pub fn pending(&self) -> &[u8] {
        &self.carry
    }

    /// Decode `bytes` onto `out`, holding back a trailing partial sequence.
    pub fn push(&mut self, out: &mut String, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut rest = bytes;

        // The carry is at most 3 bytes; complete it from the head of this
        // chunk before decoding the remainder in place.
        while !self.carry.is_empty() && !rest.is_empty() {
            let want = sequence_len(self.carry[0]);
            if want == 0 {
                out.push('\u{FFFD}');
                self.carry.clear();
                break;
            }
            let missing = want.saturating_sub(self.carry.len());
            if rest.len() < missing {
                self.carry.extend_from_slice(rest);
                return;
            }
            let mut joined = [0u8; 4];
            let held = self.carry.len();
            joined[..held].copy_from_slice(&self.carry);
            joined[held..held + missing].copy_from_slice(&rest[..missing]);
            self.carry.clear();
            self.decode_into(out, &joined[..held + missing]);
            rest = &rest[missing..];
        }

        if !rest.is_empty() {
            self.decode_into(out, rest);
        }
    }

    /// Flush anything still held back, lossily.
    pub fn finish(&mut self, out: &mut String) {
        if self.carry.is_empty() {
            return;
        }
        out.push_str(&String::from_utf8_lossy(&self.carry));
        self.carry.clear();
    }

    fn decode_into(&mut self, out: &mut String, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            let err = match std::str::from_utf8(bytes) {
                Ok(text) => {
                    out.push_str(text);
                    return;
                }
                Err(err) => err,
            };
            let (valid, tail) = bytes.split_at(err.valid_up_to());
            // `valid` is exactly the prefix the decoder accepted.
            if let Ok(text) = std::str::from_utf8(valid) {
                out.push_str(text);
            }
            match err.error_len() {
                Some(bad) => {
                    out.push('\u{FFFD}');
                    bytes = &tail[bad..];
                }
                None => {
                    self.carry.extend_from_slice(tail);
                    return;
                }
            }
        }
    }
}

fn sequence_len(first: u8) -> usize {
    match first {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::ChunkDecoder;

    #[test]
    fn two_byte_char_split_across_chunks() {
        let mut out = String::new();
        let mut decoder = ChunkDecoder::new();

        decoder.push(&mut out, &[0xC3]);
        assert_eq!(out, "");
        assert_eq!(decoder.pending(), &[0xC3]);

        decoder.push(&mut out, &[0x97]);
        assert_eq!(out, "\u{D7}");
        assert!(decoder.pending().is_empty());
    }

    #[test]
    fn carry_completes_then_rest_decodes() {
        let mut out = String::new();
        let mut decoder = ChunkDecoder::new();

        // U+1F600 is F0 9F 98 80.
        decoder.push(&mut out, &[0xF0, 0x9F]);
        decoder.push(&mut out, &[0x98, 0x80, b'<', b'p', b'>']);
        assert_eq!(out, "\u{1F600}<p>");
        assert!(decoder.pending().is_empty());
    }

    #[test]
    fn trailing_partial_is_held_again() {
        let mut out = String::new();
        let mut decoder = ChunkDecoder::new();

        // U+20AC is E2 82 AC.
        decoder.push(&mut out, &[0xE2]);
        decoder.push(&mut out, &[0x82, 0xAC, 0xE2]);
        assert_eq!(out, "\u{20AC}");
        assert_eq!(decoder.pending(), &[0xE2]);
    }

    #[test]
    fn invalid_bytes_become_replacement_chars() {
        let mut out = String::new();
        let mut decoder = ChunkDecoder::new();
        decoder.push(&mut out, &[0xFF, b'a']);
        assert_eq!(out, "\u{FFFD}a");
    }

    #[test]
    fn finish_flushes_incomplete_suffix() {
        let mut out = String::new();
        let mut decoder = ChunkDecoder::new();
        decoder.push(&mut out, &[0xE2, 0x82]);
        decoder.finish(&mut out);
        assert_eq!(out, "\u{FFFD}");
        assert!(decoder.pending().is_empty());
    }
}
