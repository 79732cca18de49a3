use crate::{AttributeKind, DecodedAttribute, DecodedLayout};

/// Decoded point records, stored attribute-by-attribute within a fixed per-point stride.
///
/// Once built, the data is immutable; consumers reinterpret raw bytes through the layout.
#[derive(Clone, Debug)]
pub struct PointBuffer {
    data: Vec<u8>,
    layout: DecodedLayout,
    num_points: usize,
}

impl PointBuffer {
    /// Wrap decoded bytes. `data.len()` must be a whole number of `layout.stride()`-sized records.
    pub fn new(data: Vec<u8>, layout: DecodedLayout) -> Self {
        let stride = layout.stride();
        debug_assert!(stride > 0);
        debug_assert_eq!(data.len() % stride, 0);
        let num_points = data.len() / stride;

        Self {
            data,
            layout,
            num_points,
        }
    }

    #[inline]
    pub fn num_points(&self) -> usize {
        self.num_points
    }

    #[inline]
    pub fn layout(&self) -> &DecodedLayout {
        &self.layout
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The node-local position of point `i`. Decoded buffers are native-endian; only wire
    /// payloads carry a fixed byte order.
    pub fn position(&self, i: usize) -> [f32; 3] {
        let attr = match self.layout.get(AttributeKind::Position) {
            Some(attr) => *attr,
            None => return [0.0; 3],
        };
        let bytes = self.element_bytes(i, &attr);

        bytemuck::pod_read_unaligned(&bytes[..12])
    }

    /// The raw bytes of attribute `attr` for point `i`.
    #[inline]
    pub fn element_bytes(&self, i: usize, attr: &DecodedAttribute) -> &[u8] {
        debug_assert!(i < self.num_points);
        let start = i * self.layout.stride() + attr.offset;
        &self.data[start..start + attr.attribute.byte_size()]
    }
}
