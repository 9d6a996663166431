//! Input payload compression. Consecutive frames of input rarely differ, so each pending
//! frame is XORed against the reference (the last acked frame, or the frame before it in
//! the window), which yields long runs of zero bits that run-length encode well.

/// Encodes all pending input frames against `reference`. Every frame must have the byte
/// size of the reference.
pub(crate) fn encode<'a>(
    reference: &[u8],
    pending: impl Iterator<Item = &'a Vec<u8>>,
) -> Vec<u8> {
    let mut delta = Vec::new();
    let mut previous = reference;
    for frame_bytes in pending {
        assert_eq!(frame_bytes.len(), reference.len());
        for (old, new) in previous.iter().zip(frame_bytes.iter()) {
            delta.push(old ^ new);
        }
        previous = frame_bytes;
    }
    bitfield_rle::encode(delta)
}

/// Decodes a payload produced by [`encode`], returning one byte buffer per frame.
pub(crate) fn decode(
    reference: &[u8],
    data: &[u8],
) -> Result<Vec<Vec<u8>>, Box<dyn std::error::Error + Send + Sync>> {
    let delta = bitfield_rle::decode(data)?;
    if reference.is_empty() || delta.len() % reference.len() != 0 {
        return Err("compressed input payload does not align to the input size".into());
    }

    let count = delta.len() / reference.len();
    let mut output: Vec<Vec<u8>> = Vec::with_capacity(count);
    for frame in 0..count {
        let previous = match frame {
            0 => reference,
            _ => &output[frame - 1],
        };
        let mut buffer = vec![0u8; reference.len()];
        for i in 0..reference.len() {
            buffer[i] = previous[i] ^ delta[frame * reference.len() + i];
        }
        output.push(buffer);
    }

    Ok(output)
}

// #########
// # TESTS #
// #########

#[cfg(test)]
mod compression_tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let reference = vec![0, 0, 0, 1];
        let pending = vec![
            vec![0, 0, 1, 0],
            vec![0, 0, 1, 1],
            vec![0, 1, 0, 0],
            vec![0, 1, 0, 1],
            vec![0, 1, 1, 0],
        ];

        let encoded = encode(&reference, pending.iter());
        let decoded = decode(&reference, &encoded).unwrap();
        assert_eq!(pending, decoded);
    }

    #[test]
    fn test_identical_frames_compress_well() {
        let reference = vec![0xab; 32];
        let pending = vec![vec![0xab; 32]; 16];
        let encoded = encode(&reference, pending.iter());
        assert!(encoded.len() < 32);
        assert_eq!(decode(&reference, &encoded).unwrap(), pending);
    }

    #[test]
    fn test_misaligned_payload_is_rejected() {
        let reference = vec![0, 0, 0, 1];
        let encoded = bitfield_rle::encode(vec![1, 2, 3]);
        assert!(decode(&reference, &encoded).is_err());
    }
}
