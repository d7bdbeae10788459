//! Element type descriptors and the safe-casting relation.
//!
//! A [`TypeDescr`] is what the loop machinery sees of an operand's element
//! type: the [`DType`] (size, alignment, kind) plus the byte order in which
//! the elements are stored. Operands whose byte order is not native are
//! always routed through the buffered strategy and swapped per element.

use std::fmt;

/// Element types understood by the engine.
///
/// The declaration order is the canonical registration order used by the
/// built-in ufuncs (smallest safe type first), see [`DType::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    Complex64,
    Complex128,
    /// Opaque 8-byte handle into a host object space.
    Object,
}

/// Broad classification of a [`DType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Bool,
    SignedInt,
    UnsignedInt,
    Float,
    Complex,
    Object,
}

impl DType {
    /// All element types in canonical order.
    pub const ALL: [DType; 14] = [
        DType::Bool,
        DType::Int8,
        DType::UInt8,
        DType::Int16,
        DType::UInt16,
        DType::Int32,
        DType::UInt32,
        DType::Int64,
        DType::UInt64,
        DType::Float32,
        DType::Float64,
        DType::Complex64,
        DType::Complex128,
        DType::Object,
    ];

    /// Size of one element in bytes.
    #[inline]
    pub const fn itemsize(self) -> usize {
        match self {
            DType::Bool | DType::Int8 | DType::UInt8 => 1,
            DType::Int16 | DType::UInt16 => 2,
            DType::Int32 | DType::UInt32 | DType::Float32 => 4,
            DType::Int64 | DType::UInt64 | DType::Float64 | DType::Complex64 | DType::Object => 8,
            DType::Complex128 => 16,
        }
    }

    /// Required alignment of one element in bytes.
    #[inline]
    pub const fn alignment(self) -> usize {
        match self {
            DType::Complex64 => 4,
            DType::Complex128 => 8,
            other => other.itemsize(),
        }
    }

    /// Width of the unit that is reversed when swapping byte order.
    ///
    /// Complex numbers swap each component separately.
    #[inline]
    pub const fn swap_unit(self) -> usize {
        match self {
            DType::Complex64 | DType::Complex128 => self.itemsize() / 2,
            other => other.itemsize(),
        }
    }

    #[inline]
    pub const fn kind(self) -> Kind {
        match self {
            DType::Bool => Kind::Bool,
            DType::Int8 | DType::Int16 | DType::Int32 | DType::Int64 => Kind::SignedInt,
            DType::UInt8 | DType::UInt16 | DType::UInt32 | DType::UInt64 => Kind::UnsignedInt,
            DType::Float32 | DType::Float64 => Kind::Float,
            DType::Complex64 | DType::Complex128 => Kind::Complex,
            DType::Object => Kind::Object,
        }
    }

    #[inline]
    pub const fn is_object(self) -> bool {
        matches!(self, DType::Object)
    }

    /// Short name, e.g. `"float64"`.
    pub const fn name(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::Int8 => "int8",
            DType::UInt8 => "uint8",
            DType::Int16 => "int16",
            DType::UInt16 => "uint16",
            DType::Int32 => "int32",
            DType::UInt32 => "uint32",
            DType::Int64 => "int64",
            DType::UInt64 => "uint64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Complex64 => "complex64",
            DType::Complex128 => "complex128",
            DType::Object => "object",
        }
    }

    /// One-character type code used in printable loop signatures (`"dd->d"`).
    pub const fn char_code(self) -> char {
        match self {
            DType::Bool => '?',
            DType::Int8 => 'b',
            DType::UInt8 => 'B',
            DType::Int16 => 'h',
            DType::UInt16 => 'H',
            DType::Int32 => 'i',
            DType::UInt32 => 'I',
            DType::Int64 => 'q',
            DType::UInt64 => 'Q',
            DType::Float32 => 'f',
            DType::Float64 => 'd',
            DType::Complex64 => 'F',
            DType::Complex128 => 'D',
            DType::Object => 'O',
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Byte order of stored elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    #[cfg(target_endian = "little")]
    pub const NATIVE: ByteOrder = ByteOrder::Little;
    #[cfg(target_endian = "big")]
    pub const NATIVE: ByteOrder = ByteOrder::Big;

    /// The non-native order.
    pub const SWAPPED: ByteOrder = match ByteOrder::NATIVE {
        ByteOrder::Little => ByteOrder::Big,
        ByteOrder::Big => ByteOrder::Little,
    };

    #[inline]
    pub fn is_native(self) -> bool {
        self == ByteOrder::NATIVE
    }
}

/// Element type descriptor of an operand: dtype plus storage byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeDescr {
    pub dtype: DType,
    pub byte_order: ByteOrder,
}

impl TypeDescr {
    /// Descriptor in native byte order.
    #[inline]
    pub const fn native(dtype: DType) -> Self {
        Self {
            dtype,
            byte_order: ByteOrder::NATIVE,
        }
    }

    #[inline]
    pub const fn with_byte_order(dtype: DType, byte_order: ByteOrder) -> Self {
        Self { dtype, byte_order }
    }

    #[inline]
    pub const fn itemsize(&self) -> usize {
        self.dtype.itemsize()
    }

    #[inline]
    pub const fn alignment(&self) -> usize {
        self.dtype.alignment()
    }

    #[inline]
    pub const fn kind(&self) -> Kind {
        self.dtype.kind()
    }

    /// True if elements must be byte-swapped before native code can read them.
    #[inline]
    pub fn needs_swap(&self) -> bool {
        self.dtype.swap_unit() > 1 && !self.byte_order.is_native()
    }
}

impl From<DType> for TypeDescr {
    fn from(dtype: DType) -> Self {
        TypeDescr::native(dtype)
    }
}

/// Returns true if every value of `from` is representable in `to`.
///
/// Bool casts to any numeric type. Integers cast to wider integers of the
/// same signedness and unsigned integers to strictly wider signed ones.
/// Integers cast to a float when strictly narrower than it, or when the
/// float is `Float64`; complex targets apply the same rule to their
/// component width. Nothing casts to `Bool`, and `Object` only to itself.
pub fn can_cast(from: DType, to: DType) -> bool {
    if from == to {
        return true;
    }
    let fsize = from.itemsize();
    let tsize = to.itemsize();
    match (from.kind(), to.kind()) {
        (Kind::Object, _) | (_, Kind::Object) | (_, Kind::Bool) => false,
        (Kind::Bool, _) => true,
        (Kind::UnsignedInt, Kind::UnsignedInt) | (Kind::SignedInt, Kind::SignedInt) => {
            tsize >= fsize
        }
        (Kind::UnsignedInt, Kind::SignedInt) => tsize > fsize,
        (Kind::SignedInt, Kind::UnsignedInt) => false,
        (Kind::UnsignedInt | Kind::SignedInt, Kind::Float) => fsize < tsize || tsize == 8,
        (Kind::UnsignedInt | Kind::SignedInt, Kind::Complex) => {
            let component = tsize / 2;
            fsize < component || component == 8
        }
        (Kind::Float, Kind::Float) => tsize >= fsize,
        (Kind::Float, Kind::Complex) => tsize / 2 >= fsize,
        (Kind::Complex, Kind::Complex) => tsize >= fsize,
        _ => false,
    }
}
