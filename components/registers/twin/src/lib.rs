//! Flat GPU register file and write-trigger classification.
//!
//! The register file itself knows nothing about fill engines, transfer
//! engines, or command processors — it only classifies a write as one of
//! [`WriteEffect`]'s variants. The top-level core (`gs-twin`) owns the
//! actual side-effecting collaborators and dispatches on the returned effect.
//! The layout is a flat array with named offsets, consumed from the device
//! side rather than a host driver's.

use thiserror::Error;

/// Word-addressed offsets into the register file. Matches the MMIO layout
/// exposed at the fixed base address the command processor decodes against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Register {
    FbWidth = 0x00,
    FbHeight = 0x01,
    FbStride = 0x02,
    FbBaseAddr = 0x03,
    ActiveFb = 0x04,
    ScissorX0 = 0x05,
    ScissorY0 = 0x06,
    ScissorX1 = 0x07,
    ScissorY1 = 0x08,
    FillColor = 0x09,
    FillDstAddr = 0x0A,
    FillByteCount = 0x0B,
    FillTrigger = 0x0C,
    TransferSrcAddr = 0x0D,
    TransferDstAddr = 0x0E,
    TransferSrcFormat = 0x0F,
    TransferDstFormat = 0x10,
    TransferWidth = 0x11,
    TransferHeight = 0x12,
    TransferTrigger = 0x13,
    CmdBufAddr = 0x14,
    CmdBufLen = 0x15,
    CmdSubmitTrigger = 0x16,
    Tex0Config = 0x17,
    Tex0BaseAddr = 0x18,
    Tex1Config = 0x19,
    Tex1BaseAddr = 0x1A,
    Tex2Config = 0x1B,
    Tex2BaseAddr = 0x1C,
    DepthBaseAddr = 0x1D,
}

impl Register {
    pub const COUNT: usize = 0x1E;

    /// Decode a word offset into a named register, if mapped.
    pub fn from_offset(offset: u32) -> Option<Register> {
        use Register::*;
        Some(match offset {
            0x00 => FbWidth,
            0x01 => FbHeight,
            0x02 => FbStride,
            0x03 => FbBaseAddr,
            0x04 => ActiveFb,
            0x05 => ScissorX0,
            0x06 => ScissorY0,
            0x07 => ScissorX1,
            0x08 => ScissorY1,
            0x09 => FillColor,
            0x0A => FillDstAddr,
            0x0B => FillByteCount,
            0x0C => FillTrigger,
            0x0D => TransferSrcAddr,
            0x0E => TransferDstAddr,
            0x0F => TransferSrcFormat,
            0x10 => TransferDstFormat,
            0x11 => TransferWidth,
            0x12 => TransferHeight,
            0x13 => TransferTrigger,
            0x14 => CmdBufAddr,
            0x15 => CmdBufLen,
            0x16 => CmdSubmitTrigger,
            0x17 => Tex0Config,
            0x18 => Tex0BaseAddr,
            0x19 => Tex1Config,
            0x1A => Tex1BaseAddr,
            0x1B => Tex2Config,
            0x1C => Tex2BaseAddr,
            0x1D => DepthBaseAddr,
            _ => return None,
        })
    }
}

/// The side effect a register write should trigger, classified by the
/// register file and dispatched by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteEffect {
    /// A plain storage write with no side effect.
    None,
    /// `FillTrigger` was written: run the fill engine.
    FillTriggered,
    /// `TransferTrigger` was written: run the transfer engine.
    TransferTriggered,
    /// `ActiveFb` was written: swap the scanout buffer and wait for vblank.
    DisplaySwapTriggered,
    /// `CmdSubmitTrigger` was written: the command processor should start
    /// consuming the guest command buffer.
    CommandSubmitTriggered,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegisterError {
    #[error("register write to unmapped offset {0:#x}")]
    Unmapped(u32),
}

/// The flat register array backing the MMIO surface.
#[derive(Clone, Debug)]
pub struct RegisterFile {
    values: [u32; Register::COUNT],
}

impl Default for RegisterFile {
    fn default() -> Self {
        RegisterFile { values: [0; Register::COUNT] }
    }
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, reg: Register) -> u32 {
        self.values[reg as u32 as usize]
    }

    /// Read by raw word offset, logging and returning 0 for unmapped offsets.
    pub fn read_offset(&self, offset: u32) -> u32 {
        match Register::from_offset(offset) {
            Some(reg) => self.read(reg),
            None => {
                log::warn!("register read from unmapped offset {offset:#x}");
                0
            }
        }
    }

    pub fn write(&mut self, reg: Register, value: u32) -> WriteEffect {
        self.values[reg as u32 as usize] = value;
        match reg {
            Register::FillTrigger => WriteEffect::FillTriggered,
            Register::TransferTrigger => WriteEffect::TransferTriggered,
            Register::ActiveFb => WriteEffect::DisplaySwapTriggered,
            Register::CmdSubmitTrigger => WriteEffect::CommandSubmitTriggered,
            _ => WriteEffect::None,
        }
    }

    /// Write by raw word offset, per the command processor's packet format.
    pub fn write_offset(&mut self, offset: u32, value: u32) -> Result<WriteEffect, RegisterError> {
        match Register::from_offset(offset) {
            Some(reg) => Ok(self.write(reg, value)),
            None => {
                log::warn!("register write to unmapped offset {offset:#x}");
                Err(RegisterError::Unmapped(offset))
            }
        }
    }
}

/// Bitfield layout of the per-unit texture config register: enable bit,
/// wrap modes, and base dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureUnitConfig {
    pub enabled: bool,
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WrapMode {
    ClampToEdge,
    Repeat,
}

impl TextureUnitConfig {
    /// Layout: bit0 enable, bit1 wrap_u, bit2 wrap_v, bits[12:4] width,
    /// bits[22:13] height (each a 10-bit unsigned texel dimension, minus one).
    pub fn decode(word: u32) -> Self {
        let wrap = |bit: u32| if bit != 0 { WrapMode::Repeat } else { WrapMode::ClampToEdge };
        TextureUnitConfig {
            enabled: bits::field(word, 0, 1) != 0,
            wrap_u: wrap(bits::field(word, 1, 1)),
            wrap_v: wrap(bits::field(word, 2, 1)),
            width: bits::field(word, 4, 9) + 1,
            height: bits::field(word, 13, 9) + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_fill_trigger_classified() {
        let mut rf = RegisterFile::new();
        assert_eq!(rf.write(Register::FillColor, 0xFF00FF00), WriteEffect::None);
        assert_eq!(rf.write(Register::FillTrigger, 1), WriteEffect::FillTriggered);
        assert_eq!(rf.read(Register::FillColor), 0xFF00FF00);
    }

    #[test]
    fn unmapped_offset_errors() {
        let mut rf = RegisterFile::new();
        assert!(rf.write_offset(0xFF, 0).is_err());
    }

    #[test]
    fn texture_config_decode() {
        let word = 0b1 | (1 << 1) | (0 << 2) | (63 << 4) | (31 << 13);
        let cfg = TextureUnitConfig::decode(word);
        assert!(cfg.enabled);
        assert_eq!(cfg.wrap_u, WrapMode::Repeat);
        assert_eq!(cfg.wrap_v, WrapMode::ClampToEdge);
        assert_eq!(cfg.width, 64);
        assert_eq!(cfg.height, 32);
    }
}
