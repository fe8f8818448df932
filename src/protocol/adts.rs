//! ADTS frame headers
//!
//! Every encoded payload goes on the wire behind a fixed 7-byte MPEG-4 ADTS
//! header (no CRC). The stream is the bare concatenation of
//! `[header][payload]` access units; readers find frame boundaries from the
//! 13-bit frame length carried in the header.
//!
//! ```text
//! byte0 = 0xFF
//! byte1 = 0xF1                      MPEG-4, layer 0, no CRC
//! byte2 = (profile-1)<<6 | rate_index<<2 | channels>>2
//! byte3 = (channels&3)<<6 | (frame_len>>11)&0x3
//! byte4 = (frame_len>>3) & 0xFF
//! byte5 = (frame_len&7)<<5 | 0x1F
//! byte6 = 0xFC
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::CodecError;

/// Size of a header without CRC
pub const HEADER_LEN: usize = 7;

/// AAC LC
pub const AAC_LC_PROFILE: u8 = 2;

/// Largest value the 13-bit frame length field can hold
pub const MAX_FRAME_LEN: usize = 0x1FFF;

/// Index used for any sample rate without an explicit mapping (44100 Hz)
pub const FALLBACK_RATE_INDEX: u8 = 4;

/// Sampling frequencies by ADTS index, for decoding headers
const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Header index for a capture sample rate.
///
/// Only 22050, 44100 and 48000 are mapped. Every other rate, including ones
/// ADTS could describe, advertises 44100 Hz. Callers streaming at such a rate
/// get headers that disagree with the encoded audio.
pub fn sample_rate_index(sample_rate: u32) -> u8 {
    match sample_rate {
        22050 => 7,
        44100 => 4,
        48000 => 3,
        _ => FALLBACK_RATE_INDEX,
    }
}

/// Whether `sample_rate` has its own header index
pub fn is_listed_sample_rate(sample_rate: u32) -> bool {
    matches!(sample_rate, 22050 | 44100 | 48000)
}

/// Sampling frequency for a header index
pub fn sample_rate_for_index(index: u8) -> Option<u32> {
    SAMPLE_RATES.get(index as usize).copied()
}

/// Decoded view of a 7-byte header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    pub profile: u8,
    pub sample_rate_index: u8,
    pub channels: u8,
    /// Header plus payload
    pub frame_len: usize,
}

impl AdtsHeader {
    /// Header for a payload of `payload_len` bytes
    pub fn for_payload(
        payload_len: usize,
        sample_rate_index: u8,
        channels: u8,
    ) -> Result<Self, CodecError> {
        let frame_len = payload_len + HEADER_LEN;
        if frame_len > MAX_FRAME_LEN {
            return Err(CodecError::InvalidFrameSize(payload_len));
        }
        Ok(Self {
            profile: AAC_LC_PROFILE,
            sample_rate_index,
            channels,
            frame_len,
        })
    }

    pub fn payload_len(&self) -> usize {
        self.frame_len.saturating_sub(HEADER_LEN)
    }

    pub fn sample_rate(&self) -> Option<u32> {
        sample_rate_for_index(self.sample_rate_index)
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let frame_len = self.frame_len;
        let channels = self.channels;
        [
            0xFF,
            0xF1,
            ((self.profile.saturating_sub(1) & 0x3) << 6)
                | ((self.sample_rate_index & 0xF) << 2)
                | (channels >> 2),
            ((channels & 3) << 6) | ((frame_len >> 11) & 0x3) as u8,
            ((frame_len >> 3) & 0xFF) as u8,
            (((frame_len & 7) << 5) as u8) | 0x1F,
            0xFC,
        ]
    }

    /// Decode a header from the first seven bytes of `bytes`
    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::InvalidHeader("truncated header"));
        }
        if bytes[0] != 0xFF || bytes[1] & 0xF0 != 0xF0 {
            return Err(CodecError::InvalidHeader("missing syncword"));
        }
        if bytes[1] & 0x01 == 0 {
            return Err(CodecError::InvalidHeader("CRC-protected frames are not supported"));
        }

        let profile = (bytes[2] >> 6) + 1;
        let sample_rate_index = (bytes[2] >> 2) & 0xF;
        let channels = ((bytes[2] & 0x1) << 2) | (bytes[3] >> 6);
        let frame_len = (((bytes[3] & 0x3) as usize) << 11)
            | ((bytes[4] as usize) << 3)
            | ((bytes[5] >> 5) as usize);

        if frame_len < HEADER_LEN {
            return Err(CodecError::InvalidHeader("frame shorter than its header"));
        }

        Ok(Self {
            profile,
            sample_rate_index,
            channels,
            frame_len,
        })
    }
}

/// Build the 7-byte header for one payload
pub fn build_header(
    payload_len: usize,
    sample_rate_index: u8,
    channels: u8,
) -> Result<[u8; HEADER_LEN], CodecError> {
    Ok(AdtsHeader::for_payload(payload_len, sample_rate_index, channels)?.to_bytes())
}

/// Frames payloads for one session's fixed stream parameters
#[derive(Debug, Clone, Copy)]
pub struct AdtsFramer {
    sample_rate_index: u8,
    channels: u8,
}

impl AdtsFramer {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate_index: sample_rate_index(sample_rate),
            channels: channels as u8,
        }
    }

    pub fn sample_rate_index(&self) -> u8 {
        self.sample_rate_index
    }

    /// Header followed by payload, as one contiguous access unit
    pub fn frame(&self, payload: &[u8]) -> Result<Bytes, CodecError> {
        let header = build_header(payload.len(), self.sample_rate_index, self.channels)?;
        let mut unit = BytesMut::with_capacity(HEADER_LEN + payload.len());
        unit.put_slice(&header);
        unit.put_slice(payload);
        Ok(unit.freeze())
    }
}

/// Splits a byte stream back into access units.
///
/// Bytes are fed in arbitrary chunks; complete frames come out of
/// [`AdtsReader::next_frame`].
#[derive(Default)]
pub struct AdtsReader {
    pending: BytesMut,
}

impl AdtsReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// Next complete access unit, header included
    pub fn next_frame(&mut self) -> Result<Option<(AdtsHeader, Bytes)>, CodecError> {
        if self.pending.len() < HEADER_LEN {
            return Ok(None);
        }
        let header = AdtsHeader::parse(&self.pending)?;
        if self.pending.len() < header.frame_len {
            return Ok(None);
        }
        let unit = self.pending.split_to(header.frame_len).freeze();
        Ok(Some((header, unit)))
    }

    /// Bytes buffered but not yet returned as a frame
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_header_bytes() {
        // 44.1 kHz stereo, 100-byte payload
        let header = build_header(100, 4, 2).unwrap();
        assert_eq!(header, [0xFF, 0xF1, 0x50, 0x80, 0x0D, 0x7F, 0xFC]);
    }

    #[test]
    fn test_sample_rate_table() {
        assert_eq!(sample_rate_index(22050), 7);
        assert_eq!(sample_rate_index(44100), 4);
        assert_eq!(sample_rate_index(48000), 3);
    }

    #[test]
    fn test_unlisted_rate_falls_back_to_44100_index() {
        assert_eq!(sample_rate_index(32000), 4);
        assert_eq!(sample_rate_index(8000), 4);
        assert!(!is_listed_sample_rate(32000));
        assert_eq!(sample_rate_for_index(sample_rate_index(32000)), Some(44100));
    }

    #[test]
    fn test_oversized_payload_rejected() {
        assert!(build_header(MAX_FRAME_LEN - HEADER_LEN, 4, 2).is_ok());
        assert!(matches!(
            build_header(MAX_FRAME_LEN - HEADER_LEN + 1, 4, 2),
            Err(CodecError::InvalidFrameSize(_))
        ));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(AdtsHeader::parse(&[0x00; 7]).is_err());
        assert!(AdtsHeader::parse(&[0xFF, 0xF1, 0x50]).is_err());
    }

    #[test]
    fn test_hand_built_header_out_of_range_fields() {
        let header = AdtsHeader {
            profile: 0,
            sample_rate_index: 4,
            channels: 2,
            frame_len: 3,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes[2] >> 6, 0);
        assert_eq!(header.payload_len(), 0);

        // Profile field is two bits wide
        let wide = AdtsHeader {
            profile: 6,
            ..header
        };
        assert_eq!(wide.to_bytes()[2] >> 6, 1);
    }

    #[test]
    fn test_framer_prepends_header() {
        let framer = AdtsFramer::new(48000, 1);
        let unit = framer.frame(&[0xAA; 10]).unwrap();
        assert_eq!(unit.len(), 17);
        let header = AdtsHeader::parse(&unit).unwrap();
        assert_eq!(header.sample_rate(), Some(48000));
        assert_eq!(header.channels, 1);
        assert_eq!(header.frame_len, 17);
        assert_eq!(&unit[7..], &[0xAA; 10]);
    }

    #[test]
    fn test_reader_splits_chunked_stream() {
        let framer = AdtsFramer::new(44100, 2);
        let mut wire = Vec::new();
        wire.extend_from_slice(&framer.frame(&[1; 5]).unwrap());
        wire.extend_from_slice(&framer.frame(&[2; 300]).unwrap());
        wire.extend_from_slice(&framer.frame(&[]).unwrap());

        let mut reader = AdtsReader::new();
        let mut payloads = Vec::new();
        for chunk in wire.chunks(11) {
            reader.push(chunk);
            while let Some((header, unit)) = reader.next_frame().unwrap() {
                payloads.push(unit.slice(HEADER_LEN..header.frame_len).to_vec());
            }
        }

        assert_eq!(payloads, vec![vec![1; 5], vec![2; 300], vec![]]);
        assert_eq!(reader.buffered(), 0);
    }

    proptest! {
        #[test]
        fn header_round_trip(
            payload_len in 0usize..=(MAX_FRAME_LEN - HEADER_LEN),
            rate in prop::sample::select(vec![22050u32, 44100, 48000]),
            channels in 1u8..=2,
        ) {
            let index = sample_rate_index(rate);
            let bytes = build_header(payload_len, index, channels).unwrap();
            let header = AdtsHeader::parse(&bytes).unwrap();
            prop_assert_eq!(header.sample_rate_index, index);
            prop_assert_eq!(header.channels, channels);
            prop_assert_eq!(header.frame_len, payload_len + HEADER_LEN);
            prop_assert_eq!(header.profile, AAC_LC_PROFILE);
            prop_assert_eq!(header.sample_rate(), Some(rate));
        }
    }
}
