//! Control frame encoder
//!
//! **Frame layout** (7 bytes, one frame per hand):
//!
//! | byte | meaning |
//! |------|---------|
//! | 0 | [`OP_CODE`] |
//! | 1 | thumb |
//! | 2 | thumb rotation |
//! | 3 | index |
//! | 4 | middle |
//! | 5 | ring |
//! | 6 | little (`Pinky` alias) |
//!
//! Channel values come from the hand's profile: every channel starts at its
//! release value and each pressed finger overwrites its channel with the press
//! value. On the extended-register instrument the `Thumb1`/`Thumb2` names do not
//! use the generic table; they load channels 0–1 from the instrument's
//! register override pairs.
//!
//! **Register smoothing:** the thumb mechanism cannot move directly between its
//! two non-neutral registers. [`FrameEncoder`] remembers the last register per
//! hand and emits a release frame for that hand before a frame that jumps
//! between them.

use crate::config::{HandsConfig, InstrumentProfile, RegisterOverrides, FINGER_CHANNELS};
use crate::fingering::{FingeringEntry, Hand, InstrumentKind};
use crate::sequence::SequenceFrame;
use crate::Result;
use base64::Engine as _;
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

/// Leading operation code of every control frame
pub const OP_CODE: u8 = 0x01;

/// Total frame length: op code + six channels
pub const FRAME_LEN: usize = 1 + FINGER_CHANNELS;

/// Channel value used when a profile is shorter than six entries
const FULLY_RELEASED: u8 = 255;

const REGISTER_A_NAME: &str = "Thumb1";
const REGISTER_B_NAME: &str = "Thumb2";

/// Canonical finger names, matched exactly first
const FINGER_TABLE: &[(&str, usize)] = &[
    ("Thumb", 0),
    ("Thumb rotation", 1),
    ("Index", 2),
    ("Middle", 3),
    ("Ring", 4),
    ("Little", 5),
    ("Pinky", 5),
    (REGISTER_A_NAME, 0),
    (REGISTER_B_NAME, 1),
];

/// Normalized (trimmed, lower-case) names, matched second
const NORMALIZED_TABLE: &[(&str, usize)] = &[
    ("thumb", 0),
    ("thumb rotation", 1),
    ("thumbrotation", 1),
    ("index", 2),
    ("middle", 3),
    ("ring", 4),
    ("little", 5),
    ("pinky", 5),
    ("thumb1", 0),
    ("thumb2", 1),
];

/// One hand's 7-byte control payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlFrame([u8; FRAME_LEN]);

impl ControlFrame {
    pub fn from_bytes(bytes: [u8; FRAME_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }

    /// Value of logical finger channel `index` (0 = thumb … 5 = little)
    pub fn channel(&self, index: usize) -> u8 {
        self.0[index + 1]
    }

    pub fn op_code(&self) -> u8 {
        self.0[0]
    }

    fn released(release: &[u8]) -> Self {
        let mut bytes = [FULLY_RELEASED; FRAME_LEN];
        bytes[0] = OP_CODE;
        for (i, slot) in bytes[1..].iter_mut().enumerate() {
            if let Some(value) = release.get(i) {
                *slot = *value;
            }
        }
        Self(bytes)
    }

    fn set_channel(&mut self, index: usize, value: u8) {
        self.0[index + 1] = value;
    }
}

impl TryFrom<&[u8]> for ControlFrame {
    type Error = crate::Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        let array: [u8; FRAME_LEN] = bytes.try_into().map_err(|_| {
            crate::Error::Sequence(format!(
                "control frame must be {} bytes, got {}",
                FRAME_LEN,
                bytes.len()
            ))
        })?;
        if array[0] != OP_CODE {
            return Err(crate::Error::Sequence(format!(
                "control frame op code 0x{:02X}, expected 0x{:02X}",
                array[0], OP_CODE
            )));
        }
        Ok(Self(array))
    }
}

// Written as a plain byte array; read back from either a byte array or a
// base64 string, the encoding older sequence files used.
impl Serialize for ControlFrame {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.as_slice().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ControlFrame {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct FrameVisitor;

        impl<'de> Visitor<'de> for FrameVisitor {
            type Value = ControlFrame;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "a {}-byte array or base64 string", FRAME_LEN)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<ControlFrame, E> {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(v)
                    .map_err(E::custom)?;
                ControlFrame::try_from(bytes.as_slice()).map_err(E::custom)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<ControlFrame, A::Error> {
                let mut bytes = Vec::with_capacity(FRAME_LEN);
                while let Some(b) = seq.next_element::<u8>()? {
                    bytes.push(b);
                }
                ControlFrame::try_from(bytes.as_slice()).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_any(FrameVisitor)
    }
}

/// Resolve a finger name to its channel index
///
/// Exact canonical names first, then a trimmed, case-insensitive match.
/// Unknown names resolve to `None`; callers treat that as a no-op so new or
/// misspelled finger names degrade to "not pressed" instead of failing.
pub fn finger_channel(name: &str) -> Option<usize> {
    if let Some((_, index)) = FINGER_TABLE.iter().find(|(n, _)| *n == name) {
        return Some(*index);
    }
    let normalized = name.trim().to_lowercase();
    NORMALIZED_TABLE
        .iter()
        .find(|(n, _)| *n == normalized)
        .map(|(_, index)| *index)
}

/// Special thumb register named by a finger set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThumbRegister {
    #[default]
    None,
    /// `Thumb1`
    RegisterA,
    /// `Thumb2`
    RegisterB,
}

impl ThumbRegister {
    /// First special register named in `fingers`, if any
    pub fn detect(fingers: &[String]) -> Self {
        fingers
            .iter()
            .find_map(|f| match f.as_str() {
                REGISTER_A_NAME => Some(ThumbRegister::RegisterA),
                REGISTER_B_NAME => Some(ThumbRegister::RegisterB),
                _ => None,
            })
            .unwrap_or(ThumbRegister::None)
    }
}

/// Whether moving from `last` to `current` needs an intermediate release frame
///
/// Only a direct jump between the two non-neutral registers does.
pub fn needs_release_step(last: ThumbRegister, current: ThumbRegister) -> bool {
    matches!(
        (last, current),
        (ThumbRegister::RegisterA, ThumbRegister::RegisterB)
            | (ThumbRegister::RegisterB, ThumbRegister::RegisterA)
    )
}

/// Build one hand's frame for a set of pressed fingers
pub fn build_frame(
    fingers: &[String],
    press: &[u8],
    release: &[u8],
    overrides: Option<&RegisterOverrides>,
    instrument: InstrumentKind,
) -> ControlFrame {
    let mut frame = ControlFrame::released(release);

    let extended = instrument.has_extended_register();
    if extended {
        let pair = match (ThumbRegister::detect(fingers), overrides) {
            (ThumbRegister::RegisterA, Some(o)) => Some(o.register_a),
            (ThumbRegister::RegisterB, Some(o)) => Some(o.register_b),
            _ => None,
        };
        if let Some([thumb, rotation]) = pair {
            frame.set_channel(0, thumb);
            frame.set_channel(1, rotation);
        }
    }

    for name in fingers {
        if extended && (name == REGISTER_A_NAME || name == REGISTER_B_NAME) {
            continue;
        }
        match finger_channel(name) {
            Some(index) => {
                if let Some(value) = press.get(index) {
                    frame.set_channel(index, *value);
                }
            }
            None => debug!("Ignoring unknown finger name '{}'", name),
        }
    }

    frame
}

/// Frame with every channel at its release value
pub fn build_release_frame(release: &[u8]) -> ControlFrame {
    ControlFrame::released(release)
}

/// Session-scoped encoder: binds instrument, profile and hand addressing and
/// tracks the last thumb register per hand
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    instrument: InstrumentKind,
    profile: InstrumentProfile,
    device_ids: [String; 2],
    last_register: [ThumbRegister; 2],
}

impl FrameEncoder {
    pub fn new(instrument: InstrumentKind, profile: InstrumentProfile, hands: &HandsConfig) -> Result<Self> {
        let left = crate::config::format_device_id(hands.left.device_id()?);
        let right = crate::config::format_device_id(hands.right.device_id()?);
        Ok(Self {
            instrument,
            profile,
            device_ids: [left, right],
            last_register: [ThumbRegister::None; 2],
        })
    }

    pub fn instrument(&self) -> InstrumentKind {
        self.instrument
    }

    pub fn last_register(&self, hand: Hand) -> ThumbRegister {
        self.last_register[hand.slot()]
    }

    fn wrap(&self, hand: Hand, data: ControlFrame) -> SequenceFrame {
        SequenceFrame {
            hand,
            id: self.device_ids[hand.slot()].clone(),
            data,
        }
    }

    /// Frames that move both hands to `entry`'s fingering
    ///
    /// On the extended-register instrument a hand jumping between `Thumb1` and
    /// `Thumb2` gets its release frame first. Frames for one hand are always
    /// adjacent and in send order.
    pub fn encode_note(&mut self, entry: &FingeringEntry) -> Vec<SequenceFrame> {
        let mut frames = Vec::with_capacity(4);
        for hand in Hand::BOTH {
            let fingers = entry.fingers(hand);
            let profile = self.profile.hand(hand);

            if self.instrument.has_extended_register() {
                let current = ThumbRegister::detect(fingers);
                let last = self.last_register[hand.slot()];
                if needs_release_step(last, current) {
                    debug!(
                        "Register step on {} hand for {}: {:?} -> {:?}",
                        hand, entry.note, last, current
                    );
                    frames.push(self.wrap(hand, build_release_frame(&profile.release)));
                }
                self.last_register[hand.slot()] = current;
            }

            let frame = build_frame(
                fingers,
                &profile.press,
                &profile.release,
                self.profile.register_overrides.as_ref(),
                self.instrument,
            );
            frames.push(self.wrap(hand, frame));
        }
        frames
    }

    /// Release frames for both hands; the mechanism is neutral afterwards
    pub fn release_all(&mut self) -> Vec<SequenceFrame> {
        self.last_register = [ThumbRegister::None; 2];
        Hand::BOTH
            .iter()
            .map(|&hand| self.release_frame(hand))
            .collect()
    }

    /// Release frame for one hand, without touching the register state
    pub fn release_frame(&self, hand: Hand) -> SequenceFrame {
        self.wrap(hand, build_release_frame(&self.profile.hand(hand).release))
    }
}
