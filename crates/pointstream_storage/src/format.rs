//! Reference decoders for the interleaved binary payload format.
//!
//! Source records are little-endian and tightly packed in declared attribute order. Decoding
//! widens them into the 4-byte-aligned native-endian layout of [`DecodedLayout`] and measures
//! the tight bounding box and mean of the decoded positions as it goes.

use crate::{
    AttributeKind, DecodeError, DecodeInput, DecodeOutput, DecodedLayout, PointDecoder, Version,
};

use pointstream_core::Aabb3;

use glam::DVec3;

/// Decoder for the standard interleaved binary payload.
///
/// Positions are stored quantized to u32 steps of the dataset scale for format versions after
/// 1.3; older datasets store raw f32 shifted by the dataset offset. Either way the decoded
/// position attribute is an f32 triplet.
#[derive(Default)]
pub struct StandardBinaryDecoder {
    // Decode contexts are pooled; the scratch buffer survives between payloads.
    scratch: Vec<u8>,
}

impl StandardBinaryDecoder {
    fn decode_into_scratch(
        &mut self,
        bytes: &[u8],
        input: &DecodeInput,
        decoded: &DecodedLayout,
    ) -> Result<(Aabb3, DVec3), DecodeError> {
        let stride = input.layout.source_stride();
        if bytes.len() % stride != 0 {
            return Err(DecodeError::Truncated {
                len: bytes.len(),
                stride,
            });
        }
        let num_points = bytes.len() / stride;

        self.scratch.clear();
        self.scratch.resize(num_points * decoded.stride(), 0);

        let mut tight = Aabb3::EMPTY;
        let mut mean = DVec3::ZERO;
        let quantized = input.version > Version::new(1, 3);

        let mut in_offset = 0;
        for attr in input.layout.attributes() {
            let out = decoded
                .get(attr.kind)
                .ok_or_else(|| DecodeError::Malformed(format!("{:?} lost in decode", attr.kind)))?;
            let out_offset = out.offset;

            match attr.kind {
                AttributeKind::Position => {
                    for j in 0..num_points {
                        let src = in_offset + j * stride;
                        let p = if quantized {
                            DVec3::new(
                                f64::from(read_u32_le(bytes, src)) * input.scale,
                                f64::from(read_u32_le(bytes, src + 4)) * input.scale,
                                f64::from(read_u32_le(bytes, src + 8)) * input.scale,
                            )
                        } else {
                            DVec3::new(
                                f64::from(read_f32_le(bytes, src)) + input.offset.x,
                                f64::from(read_f32_le(bytes, src + 4)) + input.offset.y,
                                f64::from(read_f32_le(bytes, src + 8)) + input.offset.z,
                            )
                        };

                        let dst = j * decoded.stride() + out_offset;
                        write_f32x3(&mut self.scratch, dst, p);

                        mean += p / num_points as f64;
                        tight.expand_by_point(p);
                    }
                }
                AttributeKind::Color => {
                    // Source alpha, if present, is dropped; decoded alpha is opaque.
                    for j in 0..num_points {
                        let src = in_offset + j * stride;
                        let dst = j * decoded.stride() + out_offset;
                        self.scratch[dst..dst + 3].copy_from_slice(&bytes[src..src + 3]);
                        self.scratch[dst + 3] = 255;
                    }
                }
                AttributeKind::Intensity => {
                    for j in 0..num_points {
                        let src = in_offset + j * stride;
                        let v = f32::from(u16::from_le_bytes([bytes[src], bytes[src + 1]]));
                        let dst = j * decoded.stride() + out_offset;
                        self.scratch[dst..dst + 4].copy_from_slice(&v.to_ne_bytes());
                    }
                }
                AttributeKind::Classification => {
                    for j in 0..num_points {
                        let v = f32::from(bytes[in_offset + j * stride]);
                        let dst = j * decoded.stride() + out_offset;
                        self.scratch[dst..dst + 4].copy_from_slice(&v.to_ne_bytes());
                    }
                }
                AttributeKind::Normal => {
                    for j in 0..num_points {
                        let src = in_offset + j * stride;
                        let dst = j * decoded.stride() + out_offset;
                        for c in 0..3 {
                            let v = read_f32_le(bytes, src + 4 * c);
                            self.scratch[dst + 4 * c..dst + 4 * c + 4]
                                .copy_from_slice(&v.to_ne_bytes());
                        }
                    }
                }
            }

            in_offset += attr.byte_size();
        }

        Ok((tight, mean))
    }
}

impl PointDecoder for StandardBinaryDecoder {
    fn decode(&mut self, bytes: &[u8], input: &DecodeInput) -> Result<DecodeOutput, DecodeError> {
        let decoded = input.layout.decoded();
        let (tight_bounds, mean) = self.decode_into_scratch(bytes, input, &decoded)?;

        Ok(DecodeOutput {
            data: self.scratch.clone(),
            tight_bounds,
            mean,
            estimated_spacing: Some(input.spacing),
        })
    }
}

#[inline]
fn read_u32_le(bytes: &[u8], i: usize) -> u32 {
    u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]])
}

#[inline]
fn read_f32_le(bytes: &[u8], i: usize) -> f32 {
    f32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]])
}

#[inline]
fn write_f32x3(out: &mut [u8], i: usize, p: DVec3) {
    out[i..i + 4].copy_from_slice(&(p.x as f32).to_ne_bytes());
    out[i + 4..i + 8].copy_from_slice(&(p.y as f32).to_ne_bytes());
    out[i + 8..i + 12].copy_from_slice(&(p.z as f32).to_ne_bytes());
}

/// Swap a big-endian wire word into host order.
// TODO: confirm against the Greyhound protocol docs; this mirrors the long-standing client
// behavior, which only byte-swaps rather than checking host endianness.
#[inline]
pub fn network_to_native(v: u32) -> u32 {
    ((v & 0x0000_00ff) << 24) | ((v & 0x0000_ff00) << 8) | ((v >> 8) & 0x0000_ff00) | ((v >> 24) & 0x0000_00ff)
}

/// Decoder for Greyhound-served payloads: the standard binary body followed by a 4-byte point
/// count footer. The footer is read as a network-order word and then byte-swapped to host
/// order, so the count the server emits is effectively little-endian on the wire.
#[derive(Default)]
pub struct GreyhoundBinaryDecoder {
    inner: StandardBinaryDecoder,
}

impl PointDecoder for GreyhoundBinaryDecoder {
    fn decode(&mut self, bytes: &[u8], input: &DecodeInput) -> Result<DecodeOutput, DecodeError> {
        if bytes.len() < 4 {
            return Err(DecodeError::Truncated {
                len: bytes.len(),
                stride: input.layout.source_stride(),
            });
        }
        let (body, footer) = bytes.split_at(bytes.len() - 4);
        let footer_count =
            u64::from(network_to_native(u32::from_be_bytes([
                footer[0], footer[1], footer[2], footer[3],
            ])));

        let body_count = (body.len() / input.layout.source_stride()) as u64;
        if footer_count != body_count {
            return Err(DecodeError::FooterMismatch {
                footer: footer_count,
                body: body_count,
            });
        }

        self.inner.decode(body, input)
    }
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PointBuffer, PointLayout};

    use pretty_assertions::assert_eq;

    fn input(names: &[&str], version: Version) -> DecodeInput {
        DecodeInput {
            layout: PointLayout::from_names(names).unwrap(),
            bounds: Aabb3::new(DVec3::ZERO, DVec3::splat(8.0)),
            offset: DVec3::new(100.0, 200.0, 300.0),
            scale: 0.001,
            version,
            spacing: 1.0,
        }
    }

    fn quantize(p: [f64; 3], scale: f64) -> [u8; 12] {
        let mut bytes = [0u8; 12];
        for (c, v) in p.iter().enumerate() {
            let q = (v / scale).round() as u32;
            bytes[4 * c..4 * c + 4].copy_from_slice(&q.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn quantized_positions_decode_within_one_step() {
        let input = input(&["POSITION_CARTESIAN"], Version::new(1, 7));
        let mut payload = Vec::new();
        let originals = [[0.0, 0.0, 0.0], [1.5, 2.25, 3.125], [7.999, 0.001, 4.0]];
        for p in &originals {
            payload.extend_from_slice(&quantize(*p, input.scale));
        }

        let mut decoder = StandardBinaryDecoder::default();
        let out = decoder.decode(&payload, &input).unwrap();
        let buffer = PointBuffer::new(out.data, input.layout.decoded());

        assert_eq!(buffer.num_points(), 3);
        for (i, p) in originals.iter().enumerate() {
            let decoded = buffer.position(i);
            for c in 0..3 {
                assert!((f64::from(decoded[c]) - p[c]).abs() <= input.scale);
            }
        }

        // The tight box hugs the decoded points, well inside the node cube.
        assert!(out.tight_bounds.min.x.abs() <= input.scale);
        assert!((out.tight_bounds.max.x - 7.999).abs() <= input.scale + 1e-3);
        assert!((out.mean.z - (3.125 + 4.0) / 3.0).abs() < 0.01);
    }

    #[test]
    fn legacy_float_positions_add_the_dataset_offset() {
        let input = input(&["POSITION_CARTESIAN"], Version::new(1, 3));
        let mut payload = Vec::new();
        for v in &[1.0f32, 2.0, 3.0] {
            payload.extend_from_slice(&v.to_le_bytes());
        }

        let mut decoder = StandardBinaryDecoder::default();
        let out = decoder.decode(&payload, &input).unwrap();
        let buffer = PointBuffer::new(out.data, input.layout.decoded());

        assert_eq!(buffer.position(0), [101.0, 202.0, 303.0]);
    }

    #[test]
    fn scalar_attributes_widen_to_f32() {
        let input = input(
            &["POSITION_CARTESIAN", "COLOR_PACKED", "INTENSITY", "CLASSIFICATION"],
            Version::new(1, 7),
        );
        let mut payload = Vec::new();
        payload.extend_from_slice(&quantize([1.0, 1.0, 1.0], input.scale));
        payload.extend_from_slice(&[10, 20, 30, 7]); // rgba; alpha ignored
        payload.extend_from_slice(&5000u16.to_le_bytes());
        payload.push(2);

        let mut decoder = StandardBinaryDecoder::default();
        let out = decoder.decode(&payload, &input).unwrap();
        let decoded = input.layout.decoded();
        let buffer = PointBuffer::new(out.data, decoded);

        let color = buffer.layout().get(AttributeKind::Color).copied().unwrap();
        assert_eq!(buffer.element_bytes(0, &color), &[10, 20, 30, 255]);

        let intensity = buffer.layout().get(AttributeKind::Intensity).copied().unwrap();
        assert_eq!(buffer.element_bytes(0, &intensity), &5000.0f32.to_ne_bytes());

        let class = buffer
            .layout()
            .get(AttributeKind::Classification)
            .copied()
            .unwrap();
        assert_eq!(buffer.element_bytes(0, &class), &2.0f32.to_ne_bytes());
    }

    #[test]
    fn ragged_payload_is_rejected() {
        let input = input(&["POSITION_CARTESIAN"], Version::new(1, 7));
        let mut decoder = StandardBinaryDecoder::default();

        assert_eq!(
            decoder.decode(&[0u8; 13], &input).unwrap_err(),
            DecodeError::Truncated { len: 13, stride: 12 }
        );
    }

    #[test]
    fn byte_swap_is_an_involution() {
        assert_eq!(network_to_native(0x1122_3344), 0x4433_2211);
        for v in [0u32, 1, 0xdead_beef, u32::MAX] {
            assert_eq!(network_to_native(network_to_native(v)), v);
        }
    }

    #[test]
    fn greyhound_footer_must_match_body() {
        let input = input(&["POSITION_CARTESIAN"], Version::new(1, 7));
        // The count footer is little-endian on the wire; the byte-swapped network read nets
        // out to exactly this encoding.
        let mut payload = Vec::from(quantize([1.0, 2.0, 3.0], input.scale));
        payload.extend_from_slice(&1u32.to_le_bytes());

        let mut decoder = GreyhoundBinaryDecoder::default();
        let out = decoder.decode(&payload, &input).unwrap();
        assert_eq!(out.data.len(), 12);

        let mut bad = Vec::from(quantize([1.0, 2.0, 3.0], input.scale));
        bad.extend_from_slice(&2u32.to_le_bytes());
        assert_eq!(
            decoder.decode(&bad, &input).unwrap_err(),
            DecodeError::FooterMismatch { footer: 2, body: 1 }
        );
    }
}
