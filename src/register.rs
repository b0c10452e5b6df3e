/// BL0940 register address map.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Register {
    /// RMS current, unsigned 24-bit
    IRms = 0x04,
    /// RMS voltage, unsigned 24-bit
    VRms = 0x06,
    /// Active power, signed 24-bit
    Watt = 0x08,
    /// Energy pulse count, signed 24-bit
    CfCnt = 0x0A,
    /// Voltage/current phase angle
    Corner = 0x0C,
    /// Internal temperature sensor
    Tps1 = 0x0E,
    /// Mode configuration
    Mode = 0x18,
    /// Soft reset, write 0x5A5A5A to trigger
    SoftReset = 0x19,
    /// User write protection
    UsrWrprot = 0x1A,
}

/// MODE register bit selecting 60 Hz mains (cleared for 50 Hz).
pub const MODE_AC_FREQ_SEL: u32 = 1 << 9;

/// MODE register bit selecting the 800 ms RMS refresh (cleared for 400 ms).
pub const MODE_RMS_UPDATE_SEL: u32 = 1 << 8;
