//! Frame-level encoding for the BL0940 half-duplex SPI register protocol.
//!
//! Every exchange is a fixed 6-byte frame: a command byte, a register address,
//! a 24-bit big-endian payload and a one-byte checksum. Reads send only the
//! command and address, then clock the payload and checksum back out with
//! filler bytes after the device has had time to turn the line around.

/// Command byte opening a register read frame.
pub const READ_COMMAND: u8 = 0x58;

/// Command byte opening a register write frame.
pub const WRITE_COMMAND: u8 = 0xA8;

/// Value written to [`Register::SoftReset`](crate::Register::SoftReset) to
/// trigger a soft reset.
pub const SOFT_RESET_MAGIC: u32 = 0x5A5A5A;

/// Settle time between sending a read header and clocking the response out.
/// The link reverses direction without a handshake; the device needs this long
/// to drive its response.
pub const READ_SETTLE_US: u32 = 1200;

/// Backoff between read attempts after a checksum mismatch.
pub const RETRY_BACKOFF_US: u32 = 500;

/// Total read attempts before a checksum mismatch is surfaced.
pub const READ_ATTEMPTS: u8 = 3;

/// Bytes clocked out to read the four response bytes of a read frame. MOSI is
/// held high while the device drives MISO.
pub const READ_FILLER: [u8; 4] = [0xFF; 4];

/// Frame checksum: one's complement of the truncated 8-bit sum of the command,
/// address and payload bytes. The same formula seals a write frame and
/// verifies a read response.
pub fn checksum(command: u8, address: u8, payload: &[u8; 3]) -> u8 {
    let sum = payload
        .iter()
        .fold(command.wrapping_add(address), |acc, byte| {
            acc.wrapping_add(*byte)
        });
    !sum
}

/// Encodes a complete 6-byte write frame for `value` (low 24 bits).
pub fn write_frame(address: u8, value: u32) -> [u8; 6] {
    let [_, d_h, d_m, d_l] = value.to_be_bytes();
    let checksum = checksum(WRITE_COMMAND, address, &[d_h, d_m, d_l]);
    [WRITE_COMMAND, address, d_h, d_m, d_l, checksum]
}

/// Verifies a 4-byte read response against the checksum the device computed
/// over the read command, address and payload. Returns the assembled 24-bit
/// value, or `None` on mismatch so the caller can retry.
pub fn decode_read(address: u8, response: &[u8; 4]) -> Option<u32> {
    let [d_h, d_m, d_l, received] = *response;
    if checksum(READ_COMMAND, address, &[d_h, d_m, d_l]) != received {
        return None;
    }
    Some(u32::from_be_bytes([0, d_h, d_m, d_l]))
}
