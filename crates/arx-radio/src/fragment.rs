//! Fragmentation of over-sized frames
//!
//! Frames larger than the link's maximum payload are split into fragments
//! that are transmitted, and retried, one at a time.
//!
//! # Fragment Format
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬─────────────────┬───────────┐
//! │Marker (1)│ Index (1)│ Count (1)│   Payload       │ CRC32 (4) │
//! └──────────┴──────────┴──────────┴─────────────────┴───────────┘
//! ```
//!
//! The marker is always `0x08`. Fragments carry no message identifier, so
//! the receiver relies on strict in-order delivery with no interleaving.
//! Reassembly is the far end's job.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::codec::{checksum, CRC_SIZE, FLAG_FRAGMENTED};
use crate::config::FRAGMENT_OVERHEAD;
use crate::error::{EncodingError, RadioError, Result};

/// First byte of every fragment
pub const FRAGMENT_MARKER: u8 = FLAG_FRAGMENTED;

/// Marker, index and count bytes
pub const FRAGMENT_HEADER_SIZE: usize = 3;

/// Maximum number of fragments per frame
pub const MAX_FRAGMENTS: usize = u8::MAX as usize;

/// A single slice of a larger frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Position of this fragment (0-based)
    pub index: u8,
    /// Total fragments in the frame
    pub count: u8,
    /// Fragment payload
    pub payload: Bytes,
}

impl Fragment {
    /// Encode fragment with marker and trailing CRC32
    pub fn encode(&self) -> Bytes {
        let mut buf =
            BytesMut::with_capacity(FRAGMENT_HEADER_SIZE + self.payload.len() + CRC_SIZE);

        buf.put_u8(FRAGMENT_MARKER);
        buf.put_u8(self.index);
        buf.put_u8(self.count);
        buf.put_slice(&self.payload);

        let crc = checksum(&buf);
        buf.put_u32(crc);

        buf.freeze()
    }

    /// Decode a fragment, validating marker and checksum
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < FRAGMENT_HEADER_SIZE + CRC_SIZE {
            return Err(RadioError::MalformedFrame(
                "Fragment too short".to_string(),
            ));
        }

        let (body, trailer) = data.split_at(data.len() - CRC_SIZE);
        let expected = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let actual = checksum(body);
        if expected != actual {
            return Err(RadioError::ChecksumMismatch { expected, actual });
        }

        if body[0] != FRAGMENT_MARKER {
            return Err(RadioError::MalformedFrame(format!(
                "Fragment marker 0x{:02x}, expected 0x{:02x}",
                body[0], FRAGMENT_MARKER
            )));
        }

        let index = body[1];
        let count = body[2];
        if index >= count {
            return Err(RadioError::MalformedFrame(format!(
                "Fragment index {} out of range for count {}",
                index, count
            )));
        }

        Ok(Self {
            index,
            count,
            payload: Bytes::copy_from_slice(&body[FRAGMENT_HEADER_SIZE..]),
        })
    }
}

/// Splits frames that exceed the link's maximum payload
#[derive(Debug, Clone, Copy)]
pub struct Fragmenter {
    max_payload: usize,
}

impl Fragmenter {
    /// Create a fragmenter for a link maximum payload
    ///
    /// `max_payload` must exceed [`FRAGMENT_OVERHEAD`]; the transport
    /// validates this through its configuration.
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }

    /// Payload bytes carried by each fragment
    pub fn body_size(&self) -> usize {
        self.max_payload.saturating_sub(FRAGMENT_OVERHEAD).max(1)
    }

    /// Check if a frame must be fragmented
    pub fn needs_fragmentation(&self, frame_len: usize) -> bool {
        frame_len > self.max_payload
    }

    /// Number of fragments for a frame of the given size
    pub fn fragment_count(&self, frame_len: usize) -> usize {
        frame_len.div_ceil(self.body_size())
    }

    /// Split a frame into fragments in index order
    pub fn split(&self, frame: &[u8]) -> Result<Vec<Fragment>> {
        let total = self.fragment_count(frame.len());
        if total > MAX_FRAGMENTS {
            return Err(EncodingError::TooManyFragments {
                size: frame.len(),
                count: total,
            }
            .into());
        }

        let fragments: Vec<Fragment> = frame
            .chunks(self.body_size())
            .enumerate()
            .map(|(index, chunk)| Fragment {
                index: index as u8,
                count: total as u8,
                payload: Bytes::copy_from_slice(chunk),
            })
            .collect();

        debug!(
            size = frame.len(),
            fragments = fragments.len(),
            body_size = self.body_size(),
            "Split frame into fragments"
        );

        Ok(fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_encode_decode() {
        let fragment = Fragment {
            index: 2,
            count: 5,
            payload: Bytes::from(vec![1, 2, 3, 4, 5]),
        };

        let encoded = fragment.encode();
        assert_eq!(encoded[0], 0x08);
        assert_eq!(encoded.len(), FRAGMENT_HEADER_SIZE + 5 + CRC_SIZE);

        let decoded = Fragment::decode(&encoded).unwrap();
        assert_eq!(decoded, fragment);
    }

    #[test]
    fn test_fragment_count_matches_ceiling() {
        let fragmenter = Fragmenter::new(51);
        assert_eq!(fragmenter.body_size(), 41);

        for size in [1usize, 40, 41, 42, 82, 83, 500] {
            let frame: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let fragments = fragmenter.split(&frame).unwrap();
            assert_eq!(fragments.len(), size.div_ceil(41), "size {}", size);

            let rebuilt: Vec<u8> = fragments
                .iter()
                .flat_map(|f| f.payload.iter().copied())
                .collect();
            assert_eq!(rebuilt, frame);
        }
    }

    #[test]
    fn test_fragments_fit_max_payload() {
        let fragmenter = Fragmenter::new(64);
        let frame = vec![0xAB; 1000];
        for fragment in fragmenter.split(&frame).unwrap() {
            assert!(fragment.encode().len() <= 64);
        }
    }

    #[test]
    fn test_indices_are_sequential() {
        let fragmenter = Fragmenter::new(20);
        let fragments = fragmenter.split(&[7u8; 35]).unwrap();
        assert_eq!(fragments.len(), 4);
        for (i, fragment) in fragments.iter().enumerate() {
            assert_eq!(fragment.index as usize, i);
            assert_eq!(fragment.count, 4);
        }
        assert_eq!(fragments[3].payload.len(), 5);
    }

    #[test]
    fn test_too_many_fragments() {
        let fragmenter = Fragmenter::new(11);
        let err = fragmenter.split(&[0u8; 256]).unwrap_err();
        assert!(matches!(
            err,
            RadioError::Encoding(EncodingError::TooManyFragments { count: 256, .. })
        ));
    }

    #[test]
    fn test_needs_fragmentation() {
        let fragmenter = Fragmenter::new(51);
        assert!(!fragmenter.needs_fragmentation(51));
        assert!(fragmenter.needs_fragmentation(52));
    }

    #[test]
    fn test_decode_rejects_corruption() {
        let fragment = Fragment {
            index: 0,
            count: 1,
            payload: Bytes::from_static(b"abc"),
        };
        let mut encoded = fragment.encode().to_vec();
        encoded[4] ^= 0x01;
        assert!(matches!(
            Fragment::decode(&encoded),
            Err(RadioError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_wrong_marker() {
        let mut body = vec![0x09, 0, 1, b'x'];
        let crc = checksum(&body);
        body.extend_from_slice(&crc.to_be_bytes());
        assert!(matches!(
            Fragment::decode(&body),
            Err(RadioError::MalformedFrame(_))
        ));
    }
}
