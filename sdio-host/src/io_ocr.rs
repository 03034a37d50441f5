bitfield::bitfield! {
    /// Represents the I/O OCR register values for supported voltage windows.
    #[derive(Clone, Copy, Default, Eq, PartialEq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct IoOcr(u32);
    impl Debug;

    /// Represents support for the 3.5-3.6 voltage window.
    pub v35, set_v35: 23;
    /// Represents support for the 3.4-3.5 voltage window.
    pub v34, set_v34: 22;
    /// Represents support for the 3.3-3.4 voltage window.
    pub v33, set_v33: 21;
    /// Represents support for the 3.2-3.3 voltage window.
    pub v32, set_v32: 20;
    /// Represents support for the 3.1-3.2 voltage window.
    pub v31, set_v31: 19;
    /// Represents support for the 3.0-3.1 voltage window.
    pub v30, set_v30: 18;
    /// Represents support for the 2.9-3.0 voltage window.
    pub v29, set_v29: 17;
    /// Represents support for the 2.8-2.9 voltage window.
    pub v28, set_v28: 16;
    /// Represents support for the 2.7-2.8 voltage window.
    pub v27, set_v27: 15;
    /// Represents support for the 2.6-2.7 voltage window.
    pub v26, set_v26: 14;
    /// Represents support for the 2.5-2.6 voltage window.
    pub v25, set_v25: 13;
    /// Represents support for the 2.4-2.5 voltage window.
    pub v24, set_v24: 12;
    /// Represents support for the 2.3-2.4 voltage window.
    pub v23, set_v23: 11;
    /// Represents support for the 2.2-2.3 voltage window.
    pub v22, set_v22: 10;
    /// Represents support for the 2.1-2.2 voltage window.
    pub v21, set_v21: 9;
    /// Represents support for the 2.0-2.1 voltage window.
    pub v20, set_v20: 8;
}

impl IoOcr {
    /// Represents the bitmask of the I/O OCR register.
    pub const MASK: u32 = 0x00ff_ff00;

    /// Creates a new [IoOcr] with no voltage windows.
    pub const fn new() -> Self {
        Self(0)
    }

    /// Converts a [`u32`] into a [IoOcr].
    pub const fn from_u32(val: u32) -> Self {
        Self(val & Self::MASK)
    }

    /// Converts a [IoOcr] into a [`u32`].
    pub const fn into_u32(self) -> u32 {
        self.0
    }

    /// Gets whether no voltage window is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Gets the voltage windows supported by both registers.
    pub const fn intersect(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }
}

impl From<u32> for IoOcr {
    fn from(val: u32) -> Self {
        Self::from_u32(val)
    }
}

impl From<IoOcr> for u32 {
    fn from(val: IoOcr) -> Self {
        val.into_u32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voltage_windows() {
        let host = IoOcr::from_u32(0x00ff_8000);
        assert!(host.v27() && host.v35() && !host.v26());

        let card = IoOcr::from_u32(0x0030_0000);
        assert_eq!(card.intersect(host).into_u32(), 0x0030_0000);

        let low = IoOcr::from_u32(0x0000_0100);
        assert!(low.v20());
        assert!(low.intersect(host).is_empty());

        assert_eq!(IoOcr::from_u32(0xffff_ffff).into_u32(), IoOcr::MASK);
    }
}
