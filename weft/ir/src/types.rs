/// Bit-accurate type of an operand. The full numeric tower (inference,
/// casts, arithmetic resolution) lives in the external type-system module;
/// synthesis only needs widths and formats to size registers and ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DType {
    /// Total width in bits.
    pub width: u64,
    /// Two's complement when set.
    pub signed: bool,
    /// Fractional bits for fixed-point formats. Zero for integers.
    pub frac: u64,
}

impl DType {
    pub fn uint(width: u64) -> Self {
        DType {
            width,
            signed: false,
            frac: 0,
        }
    }

    pub fn int(width: u64) -> Self {
        DType {
            width,
            signed: true,
            frac: 0,
        }
    }

    pub fn fixed(width: u64, frac: u64) -> Self {
        DType {
            width,
            signed: true,
            frac,
        }
    }

    /// A single wire.
    pub fn bit() -> Self {
        Self::uint(1)
    }

    pub fn is_bit(&self) -> bool {
        self.width == 1 && !self.signed && self.frac == 0
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.frac != 0 {
            write!(f, "fixed<{},{}>", self.width, self.frac)
        } else if self.signed {
            write!(f, "int<{}>", self.width)
        } else {
            write!(f, "uint<{}>", self.width)
        }
    }
}
