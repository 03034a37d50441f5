/// Represents the read-write SDIO command flag.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RwFlag {
    /// Indicates the command reads from the card.
    Read  = 0,
    /// Indicates the command writes to the card.
    Write = 1,
}

impl RwFlag {
    /// Creates a new [RwFlag].
    pub const fn new() -> Self {
        Self::Read
    }

    /// Converts the [RwFlag] into a bool.
    pub const fn into_bool(self) -> bool {
        matches!(self, Self::Write)
    }

    /// Converts a bool into a [RwFlag].
    pub const fn from_bool(val: bool) -> Self {
        match val {
            false => Self::Read,
            true => Self::Write,
        }
    }
}

impl Default for RwFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl From<bool> for RwFlag {
    fn from(val: bool) -> Self {
        Self::from_bool(val)
    }
}

impl From<RwFlag> for bool {
    fn from(val: RwFlag) -> Self {
        val.into_bool()
    }
}

/// Represents the read-after-write SDIO command flag.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RawFlag {
    /// Indicates the command will only write to the register.
    WriteOnly      = 0,
    /// Indicates the response carries the register value read back after the write.
    ReadAfterWrite = 1,
}

impl RawFlag {
    /// Creates a new [RawFlag].
    pub const fn new() -> Self {
        Self::WriteOnly
    }

    /// Converts the [RawFlag] into a bool.
    pub const fn into_bool(self) -> bool {
        matches!(self, Self::ReadAfterWrite)
    }

    /// Converts a bool into a [RawFlag].
    pub const fn from_bool(val: bool) -> Self {
        match val {
            false => Self::WriteOnly,
            true => Self::ReadAfterWrite,
        }
    }
}

impl Default for RawFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl From<bool> for RawFlag {
    fn from(val: bool) -> Self {
        Self::from_bool(val)
    }
}

impl From<RawFlag> for bool {
    fn from(val: RawFlag) -> Self {
        val.into_bool()
    }
}
