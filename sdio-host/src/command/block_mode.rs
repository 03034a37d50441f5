/// Represents the block mode setting of CMD53.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlockMode {
    /// The count field is a byte count.
    Byte  = 0,
    /// The count field is a block count.
    Block = 1,
}

impl BlockMode {
    /// Creates a new [BlockMode].
    pub const fn new() -> Self {
        Self::Byte
    }

    /// Converts a bool into a [BlockMode].
    pub const fn from_bool(val: bool) -> Self {
        match val {
            false => Self::Byte,
            true => Self::Block,
        }
    }

    /// Converts a [BlockMode] into a bool.
    pub const fn into_bool(self) -> bool {
        matches!(self, Self::Block)
    }
}

impl Default for BlockMode {
    fn default() -> Self {
        Self::new()
    }
}

impl From<bool> for BlockMode {
    fn from(val: bool) -> Self {
        Self::from_bool(val)
    }
}

impl From<BlockMode> for bool {
    fn from(val: BlockMode) -> Self {
        val.into_bool()
    }
}
