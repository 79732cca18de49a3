use thiserror::Error;

/// Element type of one attribute component in an interleaved buffer.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ElementType {
    U8,
    U16,
    U32,
    F32,
    F64,
}

impl ElementType {
    #[inline]
    pub fn byte_size(self) -> usize {
        match self {
            ElementType::U8 => 1,
            ElementType::U16 => 2,
            ElementType::U32 => 4,
            ElementType::F32 => 4,
            ElementType::F64 => 8,
        }
    }
}

/// The closed set of point attributes the engine understands.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AttributeKind {
    Position,
    Color,
    Intensity,
    Classification,
    Normal,
}

/// One attribute of a point record: its kind, component type, and component count.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PointAttribute {
    pub kind: AttributeKind,
    pub element: ElementType,
    pub elements: usize,
}

impl PointAttribute {
    /// Cartesian position quantized to u32 steps (legacy datasets store raw f32).
    pub const POSITION: Self = Self::new(AttributeKind::Position, ElementType::U32, 3);
    /// Packed RGBA color, one byte per channel.
    pub const COLOR_PACKED: Self = Self::new(AttributeKind::Color, ElementType::U8, 4);
    pub const INTENSITY: Self = Self::new(AttributeKind::Intensity, ElementType::U16, 1);
    pub const CLASSIFICATION: Self = Self::new(AttributeKind::Classification, ElementType::U8, 1);
    pub const NORMAL: Self = Self::new(AttributeKind::Normal, ElementType::F32, 3);

    pub const fn new(kind: AttributeKind, element: ElementType, elements: usize) -> Self {
        Self {
            kind,
            element,
            elements,
        }
    }

    #[inline]
    pub fn byte_size(&self) -> usize {
        self.element.byte_size() * self.elements
    }

    /// The shape this attribute takes after decoding: positions become f32 triplets, narrow
    /// scalar attributes are widened to f32 so consumers read one type per kind.
    pub fn decoded(&self) -> PointAttribute {
        match self.kind {
            AttributeKind::Position => Self::new(AttributeKind::Position, ElementType::F32, 3),
            AttributeKind::Color => Self::new(AttributeKind::Color, ElementType::U8, 4),
            AttributeKind::Intensity => Self::new(AttributeKind::Intensity, ElementType::F32, 1),
            AttributeKind::Classification => {
                Self::new(AttributeKind::Classification, ElementType::F32, 1)
            }
            AttributeKind::Normal => Self::new(AttributeKind::Normal, ElementType::F32, 3),
        }
    }
}

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LayoutError {
    #[error("unknown point attribute name: {0}")]
    UnknownAttribute(String),
    #[error("a point layout needs at least one attribute")]
    Empty,
    #[error("duplicate point attribute: {0:?}")]
    Duplicate(AttributeKind),
}

/// The ordered attribute schema of a dataset's source records.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PointLayout {
    attributes: Vec<PointAttribute>,
}

impl PointLayout {
    pub fn new(attributes: Vec<PointAttribute>) -> Result<Self, LayoutError> {
        if attributes.is_empty() {
            return Err(LayoutError::Empty);
        }
        for (i, a) in attributes.iter().enumerate() {
            if attributes[..i].iter().any(|b| b.kind == a.kind) {
                return Err(LayoutError::Duplicate(a.kind));
            }
        }

        Ok(Self { attributes })
    }

    /// Parse the attribute name list of a dataset descriptor.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, LayoutError> {
        let attributes = names
            .iter()
            .map(|name| match name.as_ref() {
                "POSITION_CARTESIAN" => Ok(PointAttribute::POSITION),
                "COLOR_PACKED" | "RGBA_PACKED" => Ok(PointAttribute::COLOR_PACKED),
                "INTENSITY" => Ok(PointAttribute::INTENSITY),
                "CLASSIFICATION" => Ok(PointAttribute::CLASSIFICATION),
                "NORMAL" | "NORMAL_FLOATS" => Ok(PointAttribute::NORMAL),
                other => Err(LayoutError::UnknownAttribute(other.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(attributes)
    }

    /// The layout LAS-derived datasets declare without an explicit attribute list.
    pub fn las_default() -> Self {
        Self {
            attributes: vec![
                PointAttribute::POSITION,
                PointAttribute::INTENSITY,
                PointAttribute::CLASSIFICATION,
                PointAttribute::COLOR_PACKED,
            ],
        }
    }

    #[inline]
    pub fn attributes(&self) -> &[PointAttribute] {
        &self.attributes
    }

    /// Bytes per point record in the source payload.
    pub fn source_stride(&self) -> usize {
        self.attributes.iter().map(|a| a.byte_size()).sum()
    }

    /// The interleaved layout of decoded records: every attribute starts on a 4-byte boundary and
    /// the stride is rounded up to a multiple of 4.
    pub fn decoded(&self) -> DecodedLayout {
        let mut attributes = Vec::with_capacity(self.attributes.len());
        let mut offset = 0;
        for a in &self.attributes {
            let decoded = a.decoded();
            attributes.push(DecodedAttribute {
                attribute: decoded,
                offset,
            });
            offset += round_up4(decoded.byte_size());
        }

        DecodedLayout {
            attributes,
            stride: round_up4(offset),
        }
    }
}

#[inline]
fn round_up4(n: usize) -> usize {
    (n + 3) & !3
}

/// One attribute's slot in a decoded interleaved record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DecodedAttribute {
    pub attribute: PointAttribute,
    pub offset: usize,
}

/// Byte layout of decoded point records.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecodedLayout {
    attributes: Vec<DecodedAttribute>,
    stride: usize,
}

impl DecodedLayout {
    #[inline]
    pub fn attributes(&self) -> &[DecodedAttribute] {
        &self.attributes
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn get(&self, kind: AttributeKind) -> Option<&DecodedAttribute> {
        self.attributes.iter().find(|a| a.attribute.kind == kind)
    }
}
