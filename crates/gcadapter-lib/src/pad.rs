//! Payload codec — decodes raw adapter frames into per-channel pad state and
//! encodes rumble commands. Pure byte manipulation; no I/O, no threads.

use crate::protocol::{
    channel_offset, CMD_RUMBLE, INPUT_FRAME_TAG, INPUT_PAYLOAD_SIZE, NUM_CHANNELS,
    OUTPUT_RUMBLE_PAYLOAD_SIZE,
};

// ── Button bitmask ──
//
// Bit assignments match the GameCube pad status word so consumers can pass
// the mask straight through to an emulated serial interface.

pub const PAD_BUTTON_LEFT: u16 = 0x0001;
pub const PAD_BUTTON_RIGHT: u16 = 0x0002;
pub const PAD_BUTTON_DOWN: u16 = 0x0004;
pub const PAD_BUTTON_UP: u16 = 0x0008;
pub const PAD_TRIGGER_Z: u16 = 0x0010;
pub const PAD_TRIGGER_R: u16 = 0x0020;
pub const PAD_TRIGGER_L: u16 = 0x0040;
pub const PAD_BUTTON_A: u16 = 0x0100;
pub const PAD_BUTTON_B: u16 = 0x0200;
pub const PAD_BUTTON_X: u16 = 0x0400;
pub const PAD_BUTTON_Y: u16 = 0x0800;
pub const PAD_BUTTON_START: u16 = 0x1000;

/// Origin recalibration request — set on the first decode after a controller
/// appears on a channel, prompting the consumer to recapture neutral position.
pub const PAD_GET_ORIGIN: u16 = 0x2000;

/// Synthetic "no real device" flag — distinguishes a disconnected channel
/// from a connected controller reporting all-zero input.
pub const PAD_ERR_STATUS: u16 = 0x8000;

/// Decoded state of one controller port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PadStatus {
    pub button: u16,
    pub stick_x: u8,
    pub stick_y: u8,
    pub substick_x: u8,
    pub substick_y: u8,
    pub trigger_left: u8,
    pub trigger_right: u8,
}

/// Classification of the controller plugged into a channel, from the high
/// nibble of the channel block's first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ControllerType {
    #[default]
    None = 0,
    Wired = 1,
    Wireless = 2,
}

impl ControllerType {
    /// Classify a raw type nibble. Values beyond the three recognized ones
    /// fold into `Wired`: present and rumble-eligible.
    pub fn from_nibble(nibble: u8) -> Self {
        match nibble {
            0 => ControllerType::None,
            2 => ControllerType::Wireless,
            _ => ControllerType::Wired,
        }
    }

    /// Rebuild from the canonical `repr(u8)` value (atomic storage).
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => ControllerType::Wired,
            2 => ControllerType::Wireless,
            _ => ControllerType::None,
        }
    }
}

/// Whether a raw read constitutes a decodable frame.
///
/// The tag byte is only meaningful on the USB-direct transport; bridged
/// transports deliver untagged frames, so callers there pass
/// `require_tag = false`.
pub fn frame_valid(frame: &[u8], len: usize, require_tag: bool) -> bool {
    len == INPUT_PAYLOAD_SIZE && (!require_tag || frame[0] == INPUT_FRAME_TAG)
}

/// Result of decoding one channel out of a frame.
#[derive(Debug, Clone, Copy)]
pub struct ChannelDecode {
    pub pad: PadStatus,
    pub controller_type: ControllerType,
}

/// Decode channel `chan` from a valid 37-byte frame.
///
/// `prev` is the channel's classification from the previous decode: a
/// transition out of `None` sets [`PAD_GET_ORIGIN`] on this result. When the
/// channel decodes to `None` and `strict` is false, the result carries
/// [`PAD_ERR_STATUS`] instead of zeroed input so consumers can tell
/// "no device" apart from "device at rest". Strict mode (determinism-sensitive
/// hosts) returns a plain empty status instead.
pub fn decode_channel(
    frame: &[u8; INPUT_PAYLOAD_SIZE],
    chan: usize,
    prev: ControllerType,
    strict: bool,
) -> ChannelDecode {
    debug_assert!(chan < NUM_CHANNELS);
    let block = &frame[channel_offset(chan)..channel_offset(chan) + 9];

    let controller_type = ControllerType::from_nibble(block[0] >> 4);
    let mut pad = PadStatus::default();

    if controller_type == ControllerType::None {
        if !strict {
            pad.button = PAD_ERR_STATUS;
        }
        return ChannelDecode {
            pad,
            controller_type,
        };
    }

    let b1 = block[1];
    let b2 = block[2];

    if b1 & (1 << 0) != 0 {
        pad.button |= PAD_BUTTON_A;
    }
    if b1 & (1 << 1) != 0 {
        pad.button |= PAD_BUTTON_B;
    }
    if b1 & (1 << 2) != 0 {
        pad.button |= PAD_BUTTON_X;
    }
    if b1 & (1 << 3) != 0 {
        pad.button |= PAD_BUTTON_Y;
    }
    if b1 & (1 << 4) != 0 {
        pad.button |= PAD_BUTTON_LEFT;
    }
    if b1 & (1 << 5) != 0 {
        pad.button |= PAD_BUTTON_RIGHT;
    }
    if b1 & (1 << 6) != 0 {
        pad.button |= PAD_BUTTON_DOWN;
    }
    if b1 & (1 << 7) != 0 {
        pad.button |= PAD_BUTTON_UP;
    }
    if b2 & (1 << 0) != 0 {
        pad.button |= PAD_BUTTON_START;
    }
    if b2 & (1 << 1) != 0 {
        pad.button |= PAD_TRIGGER_Z;
    }
    if b2 & (1 << 2) != 0 {
        pad.button |= PAD_TRIGGER_R;
    }
    if b2 & (1 << 3) != 0 {
        pad.button |= PAD_TRIGGER_L;
    }

    if prev == ControllerType::None {
        pad.button |= PAD_GET_ORIGIN;
    }

    pad.stick_x = block[3];
    pad.stick_y = block[4];
    pad.substick_x = block[5];
    pad.substick_y = block[6];
    pad.trigger_left = block[7];
    pad.trigger_right = block[8];

    ChannelDecode {
        pad,
        controller_type,
    }
}

/// Build a rumble command from the last commanded motor byte of each channel.
pub fn rumble_command(
    levels: &[u8; NUM_CHANNELS],
) -> [u8; OUTPUT_RUMBLE_PAYLOAD_SIZE] {
    [CMD_RUMBLE, levels[0], levels[1], levels[2], levels[3]]
}

/// The "stop all motors" command.
pub const RUMBLE_STOP: [u8; OUTPUT_RUMBLE_PAYLOAD_SIZE] = [CMD_RUMBLE, 0, 0, 0, 0];
