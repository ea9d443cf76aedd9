//! Signal bits, bit vectors and constant values.

use std::fmt;
use std::ops::Index;

use derive_more::{From, Into};
use fxhash::FxHashMap;
use itertools::Itertools;

use super::WireId;

/// The value of a single constant bit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum State {
    /// Logic zero.
    S0,
    /// Logic one.
    S1,
    /// Undefined.
    Sx,
    /// High impedance.
    Sz,
}

impl State {
    /// The character used for this state in binary strings.
    pub fn as_char(self) -> char {
        match self {
            State::S0 => '0',
            State::S1 => '1',
            State::Sx => 'x',
            State::Sz => 'z',
        }
    }

    /// Parse a state from its binary string character.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(State::S0),
            '1' => Some(State::S1),
            'x' | 'X' => Some(State::Sx),
            'z' | 'Z' => Some(State::Sz),
            _ => None,
        }
    }
}

impl From<bool> for State {
    fn from(value: bool) -> Self {
        if value {
            State::S1
        } else {
            State::S0
        }
    }
}

/// A single bit of wiring: a bit of a wire or a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SigBit {
    /// A constant driver.
    Const(State),
    /// Bit `offset` of a wire.
    Wire {
        /// The wire.
        wire: WireId,
        /// The bit offset inside the wire, LSB is 0.
        offset: u32,
    },
}

impl SigBit {
    /// Bit `offset` of `wire`.
    pub fn wire(wire: WireId, offset: usize) -> Self {
        SigBit::Wire {
            wire,
            offset: offset as u32,
        }
    }

    /// Returns the wire of this bit, if it is not a constant.
    pub fn wire_id(&self) -> Option<WireId> {
        match self {
            SigBit::Wire { wire, .. } => Some(*wire),
            SigBit::Const(_) => None,
        }
    }

    /// Whether the bit is a constant.
    pub fn is_const(&self) -> bool {
        matches!(self, SigBit::Const(_))
    }
}

impl From<State> for SigBit {
    fn from(state: State) -> Self {
        SigBit::Const(state)
    }
}

impl fmt::Display for SigBit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigBit::Const(s) => write!(f, "1'{}", s.as_char()),
            SigBit::Wire { wire, offset } => write!(f, "{wire}[{offset}]"),
        }
    }
}

/// A maximal run of bits inside a [`SigSpec`] that come from the same source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigChunk {
    /// Consecutive constant bits.
    Const(Vec<State>),
    /// A contiguous slice of a wire.
    Wire {
        /// The wire.
        wire: WireId,
        /// First bit of the slice.
        offset: usize,
        /// Number of bits in the slice.
        width: usize,
    },
}

impl SigChunk {
    /// The wire of the chunk, if it is not constant.
    pub fn wire(&self) -> Option<WireId> {
        match self {
            SigChunk::Wire { wire, .. } => Some(*wire),
            SigChunk::Const(_) => None,
        }
    }
}

/// An ordered vector of signal bits, least significant bit first.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct SigSpec(Vec<SigBit>);

impl SigSpec {
    /// The empty signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// All the bits of a wire of the given width.
    pub fn from_wire(wire: WireId, width: usize) -> Self {
        (0..width).map(|i| SigBit::wire(wire, i)).collect()
    }

    /// A constant signal of `width` copies of `state`.
    pub fn repeat(state: State, width: usize) -> Self {
        Self(vec![SigBit::Const(state); width])
    }

    /// Number of bits.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the signal has no bits.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The bits of the signal.
    #[inline]
    pub fn bits(&self) -> &[SigBit] {
        &self.0
    }

    /// Iterate over the bits of the signal.
    pub fn iter(&self) -> impl Iterator<Item = SigBit> + '_ {
        self.0.iter().copied()
    }

    /// The `len` bits starting at `offset`.
    ///
    /// # Panics
    ///
    /// If the range is out of bounds.
    pub fn extract(&self, offset: usize, len: usize) -> SigSpec {
        Self(self.0[offset..offset + len].to_vec())
    }

    /// All the bits from `offset` to the end.
    ///
    /// # Panics
    ///
    /// If `offset` is past the end of the signal.
    pub fn extract_end(&self, offset: usize) -> SigSpec {
        Self(self.0[offset..].to_vec())
    }

    /// Append the bits of `other` after the most significant bit.
    pub fn append(&mut self, other: &SigSpec) {
        self.0.extend_from_slice(&other.0);
    }

    /// Append a single bit.
    pub fn push(&mut self, bit: SigBit) {
        self.0.push(bit);
    }

    /// Remove the most significant bit.
    pub fn pop(&mut self) -> Option<SigBit> {
        self.0.pop()
    }

    /// Substitute every occurrence of `pattern[i]` by `with[i]`.
    ///
    /// # Panics
    ///
    /// If `pattern` and `with` have different widths.
    pub fn replace(&mut self, pattern: &SigSpec, with: &SigSpec) {
        assert_eq!(
            pattern.len(),
            with.len(),
            "replacement pattern and value must have the same width"
        );
        let map: FxHashMap<SigBit, SigBit> = pattern.iter().zip(with.iter()).collect();
        for bit in self.0.iter_mut() {
            if let Some(&new) = map.get(bit) {
                *bit = new;
            }
        }
    }

    /// Resize the signal to `width` bits.
    ///
    /// Extra bits are dropped from the top. Missing bits are filled with the
    /// current most significant bit when `signed`, and with zeros otherwise.
    pub fn extend_u0(&mut self, width: usize, signed: bool) {
        if self.0.len() > width {
            self.0.truncate(width);
            return;
        }
        let fill = match self.0.last() {
            Some(&msb) if signed => msb,
            _ => SigBit::Const(State::S0),
        };
        self.0.resize(width, fill);
    }

    /// Split the signal into maximal runs of constant bits or of contiguous
    /// bits of the same wire.
    pub fn chunks(&self) -> Vec<SigChunk> {
        let mut chunks: Vec<SigChunk> = Vec::new();
        for bit in self.iter() {
            match (chunks.last_mut(), bit) {
                (Some(SigChunk::Const(states)), SigBit::Const(s)) => states.push(s),
                (
                    Some(SigChunk::Wire {
                        wire,
                        offset,
                        width,
                    }),
                    SigBit::Wire {
                        wire: w,
                        offset: o,
                    },
                ) if *wire == w && *offset + *width == o as usize => *width += 1,
                (_, SigBit::Const(s)) => chunks.push(SigChunk::Const(vec![s])),
                (_, SigBit::Wire { wire, offset }) => chunks.push(SigChunk::Wire {
                    wire,
                    offset: offset as usize,
                    width: 1,
                }),
            }
        }
        chunks
    }

    /// The distinct wires referenced by the signal, in order of appearance.
    pub fn wires(&self) -> impl Iterator<Item = WireId> + '_ {
        self.iter().filter_map(|b| b.wire_id()).unique()
    }

    /// Whether every bit is a constant.
    pub fn is_fully_const(&self) -> bool {
        self.iter().all(|b| b.is_const())
    }

    /// The constant value of the signal, if every bit is constant.
    pub fn as_const(&self) -> Option<Const> {
        self.iter()
            .map(|b| match b {
                SigBit::Const(s) => Some(s),
                SigBit::Wire { .. } => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(Const::from)
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}'{}", self.len(), self.to_binary_string())
    }
}

impl Index<usize> for SigSpec {
    type Output = SigBit;

    fn index(&self, index: usize) -> &SigBit {
        &self.0[index]
    }
}

impl FromIterator<SigBit> for SigSpec {
    fn from_iter<T: IntoIterator<Item = SigBit>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<SigBit> for SigSpec {
    fn from(bit: SigBit) -> Self {
        Self(vec![bit])
    }
}

impl From<&Const> for SigSpec {
    fn from(value: &Const) -> Self {
        value.bits().iter().map(|&s| SigBit::Const(s)).collect()
    }
}

impl From<Const> for SigSpec {
    fn from(value: Const) -> Self {
        Self::from(&value)
    }
}

impl fmt::Display for SigSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // MSB first, like a Verilog concatenation.
        write!(f, "{{{}}}", self.0.iter().rev().join(", "))
    }
}

/// A constant value, such as a cell parameter or a wire attribute.
///
/// Bits are stored least significant first. Text values (e.g. `src`
/// attributes) are stored as the bits of their bytes and remember that they
/// were text, so they can be written back as strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Const {
    bits: Vec<State>,
    text: bool,
}

impl Const {
    /// An integer value truncated to `width` bits, two's complement.
    pub fn from_int(value: i64, width: usize) -> Self {
        (0..width)
            .map(|i| {
                let bit = if i < 64 { (value >> i) & 1 } else { value >> 63 };
                State::from(bit & 1 == 1)
            })
            .collect::<Vec<_>>()
            .into()
    }

    /// A single bit boolean value.
    pub fn from_bool(value: bool) -> Self {
        vec![State::from(value)].into()
    }

    /// A text value, eight bits per byte, first character most significant.
    pub fn from_text(text: &str) -> Self {
        let bits = text
            .bytes()
            .rev()
            .flat_map(|byte| (0..8).map(move |i| State::from((byte >> i) & 1 == 1)))
            .collect();
        Self { bits, text: true }
    }

    /// The text of a value created with [`Const::from_text`].
    pub fn as_text(&self) -> Option<String> {
        if !self.text {
            return None;
        }
        let bytes: Vec<u8> = self
            .bits
            .chunks(8)
            .rev()
            .map(|byte| {
                byte.iter()
                    .enumerate()
                    .filter(|&(_, &s)| s == State::S1)
                    .fold(0u8, |acc, (i, _)| acc | (1 << i))
            })
            .collect();
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// The bits of the value.
    pub fn bits(&self) -> &[State] {
        &self.bits
    }

    /// Number of bits.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Whether the value has no bits.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// True if any bit is set.
    pub fn as_bool(&self) -> bool {
        self.bits.contains(&State::S1)
    }

    /// The unsigned integer value of the low 63 bits. Undefined bits read as 0.
    pub fn as_int(&self) -> i64 {
        self.bits
            .iter()
            .take(63)
            .enumerate()
            .filter(|&(_, &s)| s == State::S1)
            .fold(0, |acc, (i, _)| acc | (1 << i))
    }

    /// Whether every bit is undefined. The empty value is fully undefined.
    pub fn is_fully_undef(&self) -> bool {
        self.bits.iter().all(|&s| s == State::Sx)
    }

    /// Whether every bit is zero.
    pub fn is_fully_zero(&self) -> bool {
        self.bits.iter().all(|&s| s == State::S0)
    }

    /// The value as a binary string, most significant bit first.
    pub fn to_binary_string(&self) -> String {
        self.bits.iter().rev().map(|s| s.as_char()).collect()
    }

    /// Parse a binary string, most significant bit first.
    pub fn from_binary_string(s: &str) -> Option<Self> {
        s.chars()
            .rev()
            .map(State::from_char)
            .collect::<Option<Vec<_>>>()
            .map(Self::from)
    }
}

impl From<Vec<State>> for Const {
    fn from(bits: Vec<State>) -> Self {
        Self { bits, text: false }
    }
}

impl From<bool> for Const {
    fn from(value: bool) -> Self {
        Self::from_bool(value)
    }
}
