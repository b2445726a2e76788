//! Wire protocol constants for the Wii U GameCube controller adapter.
//!
//! The adapter multiplexes four controller ports over a single HID-style
//! interrupt pipe. All values verified against hardware captures; third-party
//! clones (e.g. the 4-port Mayflash adapter in "PC mode") speak the same
//! protocol.

// ── USB identifiers ──

/// Nintendo vendor ID.
pub const ADAPTER_VID: u16 = 0x057e;

/// "Wii U GameCube Controller Adapter" product ID.
pub const ADAPTER_PID: u16 = 0x0337;

/// The single data interface the adapter exposes.
pub const ADAPTER_INTERFACE: u8 = 0;

// ── Payload framing ──

/// Size of one input frame: 1 tag byte + 4 channels × 9 bytes.
pub const INPUT_PAYLOAD_SIZE: usize = 37;

/// First byte of every valid input frame (HID report descriptor type).
/// Only checked on the USB-direct transport; the bridged transport strips it.
pub const INPUT_FRAME_TAG: u8 = 0x21;

/// Size of the one-shot init payload that starts the input stream.
pub const OUTPUT_INIT_PAYLOAD_SIZE: usize = 1;

/// Init command byte — tells the adapter to begin streaming frames.
pub const CMD_INIT: u8 = 0x13;

/// Size of a rumble command: 1 command byte + 4 per-channel motor bytes.
pub const OUTPUT_RUMBLE_PAYLOAD_SIZE: usize = 5;

/// Rumble command byte.
pub const CMD_RUMBLE: u8 = 0x11;

// ── Channel layout ──

/// Number of controller ports the adapter multiplexes.
pub const NUM_CHANNELS: usize = 4;

/// Bytes per channel block within an input frame.
pub const CHANNEL_BLOCK_SIZE: usize = 9;

/// Offset of channel `chan`'s block within an input frame.
pub const fn channel_offset(chan: usize) -> usize {
    1 + CHANNEL_BLOCK_SIZE * chan
}

// ── Vendor control transfer (pre-claim kick) ──
//
// Required by Nyko-brand (and perhaps other) adapters to begin streaming.
// Returns a pipe error on Mayflash adapters; failure is non-fatal.

/// `bmRequestType` — host-to-device, class, interface.
pub const CTRL_REQUEST_TYPE: u8 = 0x21;

/// `bRequest` for the streaming kick.
pub const CTRL_REQUEST: u8 = 11;

/// `wValue` for the streaming kick.
pub const CTRL_VALUE: u16 = 0x0001;

/// Timeout for the vendor control transfer in milliseconds.
pub const CTRL_TIMEOUT_MS: u64 = 1000;

// ── Timing ──

/// Timeout per interrupt transfer in milliseconds. Short, so worker stop
/// flags are re-checked promptly.
pub const TRANSFER_TIMEOUT_MS: u64 = 16;

/// Scan interval when hotplug notification is unavailable, in milliseconds.
pub const SCAN_INTERVAL_MS: u64 = 500;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_holds_all_channel_blocks() {
        // tag byte + four 9-byte blocks fill the frame exactly
        assert_eq!(1 + NUM_CHANNELS * CHANNEL_BLOCK_SIZE, INPUT_PAYLOAD_SIZE);
        assert_eq!(
            channel_offset(NUM_CHANNELS - 1) + CHANNEL_BLOCK_SIZE,
            INPUT_PAYLOAD_SIZE
        );
    }

    #[test]
    fn channel_offsets_do_not_overlap() {
        for chan in 0..NUM_CHANNELS - 1 {
            assert_eq!(
                channel_offset(chan) + CHANNEL_BLOCK_SIZE,
                channel_offset(chan + 1),
                "blocks for channels {chan} and {} must be adjacent",
                chan + 1
            );
        }
    }

    #[test]
    fn command_bytes_distinct() {
        assert_ne!(CMD_INIT, CMD_RUMBLE);
        assert_ne!(CMD_INIT, INPUT_FRAME_TAG);
        assert_ne!(CMD_RUMBLE, INPUT_FRAME_TAG);
    }

    #[test]
    fn rumble_payload_covers_all_channels() {
        assert_eq!(OUTPUT_RUMBLE_PAYLOAD_SIZE, 1 + NUM_CHANNELS);
    }

    #[test]
    fn init_payload_is_a_single_command_byte() {
        assert_eq!(OUTPUT_INIT_PAYLOAD_SIZE, 1);
    }

    #[test]
    fn transfer_timeout_shorter_than_scan_interval() {
        assert!(TRANSFER_TIMEOUT_MS < SCAN_INTERVAL_MS);
    }
}
