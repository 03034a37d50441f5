//! MSB-first bit sequences for command and response frames.

/// Represents a bounded, MSB-first sequence of bits as seen on a single wire.
///
/// The first bit on the wire is the most significant bit of [value](Self::value).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitSeq {
    bits: u64,
    len: u8,
}

impl BitSeq {
    /// Maximum number of bits a [BitSeq] can hold.
    pub const CAPACITY: usize = 64;

    /// Creates a new, empty [BitSeq].
    pub const fn new() -> Self {
        Self { bits: 0, len: 0 }
    }

    /// Creates a [BitSeq] from the `len` least significant bits of `value`.
    pub const fn from_u64(value: u64, len: usize) -> Self {
        let len = if len > Self::CAPACITY {
            Self::CAPACITY
        } else {
            len
        };

        Self {
            bits: value & Self::mask(len),
            len: len as u8,
        }
    }

    const fn mask(len: usize) -> u64 {
        if len >= Self::CAPACITY {
            u64::MAX
        } else {
            (1u64 << len) - 1
        }
    }

    /// Gets the number of bits in the sequence.
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    /// Gets whether the sequence is empty.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Gets whether the sequence is at capacity.
    pub const fn is_full(&self) -> bool {
        self.len() == Self::CAPACITY
    }

    /// Gets the sequence as an integer, first bit most significant.
    pub const fn value(&self) -> u64 {
        self.bits
    }

    /// Appends a bit to the end of the sequence.
    ///
    /// Returns `false` without modifying the sequence if it is full.
    pub fn push(&mut self, bit: bool) -> bool {
        if self.is_full() {
            false
        } else {
            self.bits = (self.bits << 1) | bit as u64;
            self.len += 1;
            true
        }
    }

    /// Gets the bit at `index`, counted from the first bit on the wire.
    pub const fn bit(&self, index: usize) -> Option<bool> {
        if index < self.len() {
            Some((self.bits >> (self.len() - 1 - index)) & 1 != 0)
        } else {
            None
        }
    }

    /// Inverts the bit at `index`, counted from the first bit on the wire.
    pub fn flip(&mut self, index: usize) {
        if index < self.len() {
            self.bits ^= 1u64 << (self.len() - 1 - index);
        }
    }

    /// Iterates over the bits in wire order.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len()).filter_map(|i| self.bit(i))
    }
}

impl Extend<bool> for BitSeq {
    fn extend<T: IntoIterator<Item = bool>>(&mut self, iter: T) {
        for bit in iter {
            if !self.push(bit) {
                break;
            }
        }
    }
}

impl FromIterator<bool> for BitSeq {
    fn from_iter<T: IntoIterator<Item = bool>>(iter: T) -> Self {
        let mut seq = Self::new();
        seq.extend(iter);
        seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_order() {
        let seq = BitSeq::from_u64(0b1011, 4);

        assert_eq!(seq.len(), 4);
        assert_eq!(seq.bit(0), Some(true));
        assert_eq!(seq.bit(1), Some(false));
        assert_eq!(seq.bit(3), Some(true));
        assert_eq!(seq.bit(4), None);

        let rebuilt: BitSeq = seq.iter().collect();
        assert_eq!(rebuilt, seq);
    }

    #[test]
    fn test_push_stops_at_capacity() {
        let mut seq = BitSeq::from_u64(u64::MAX, 64);

        assert!(seq.is_full());
        assert!(!seq.push(false));
        assert_eq!(seq.value(), u64::MAX);
    }

    #[test]
    fn test_flip() {
        let mut seq = BitSeq::from_u64(0, 48);
        seq.flip(0);
        seq.flip(47);

        assert_eq!(seq.value(), (1 << 47) | 1);
    }
}
