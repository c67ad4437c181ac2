//! MMIO surface and command processor: guest-visible register access and
//! the packet format a guest command buffer uses to drive bursts of
//! register writes.
use gpu_registers::{RegisterFile, WriteEffect};
use thiserror::Error;

/// Base address the register file is mapped at.
pub const MMIO_BASE: u32 = 0x1EF0_0000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpiError {
    #[error("MMIO address {0:#x} is below the register file's base {MMIO_BASE:#x}")]
    BelowBase(u32),
    #[error("MMIO address {0:#x} is not word-aligned")]
    Misaligned(u32),
    #[error("MMIO address {0:#x} has no backing register")]
    UnmappedRegister(u32),
}

fn offset_for(addr: u32) -> Result<u32, SpiError> {
    let rel = addr.checked_sub(MMIO_BASE).ok_or(SpiError::BelowBase(addr))?;
    if rel % 4 != 0 {
        return Err(SpiError::Misaligned(addr));
    }
    Ok(rel / 4)
}

/// Read a register through its guest-visible MMIO address.
pub fn mmio_read(regs: &RegisterFile, addr: u32) -> Result<u32, SpiError> {
    Ok(regs.read_offset(offset_for(addr)?))
}

/// Write a register through its guest-visible MMIO address.
pub fn mmio_write(regs: &mut RegisterFile, addr: u32, value: u32) -> Result<WriteEffect, SpiError> {
    let offset = offset_for(addr)?;
    regs.write_offset(offset, value).map_err(|_| SpiError::UnmappedRegister(addr))
}

/// A command buffer packet header: which register a burst targets, a
/// per-byte-lane write mask, how many parameter words follow, and whether
/// each parameter targets the next consecutive register instead of the
/// same one repeatedly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketHeader {
    pub register_index: u32,
    pub parameter_mask: u8,
    pub burst_len: u32,
    pub consecutive_writes: bool,
}

impl PacketHeader {
    /// Layout: `register_index:16 | parameter_mask:4 | burst_len:10 | consecutive:1`.
    pub fn decode(word: u32) -> Self {
        PacketHeader {
            register_index: bits::field(word, 0, 16),
            parameter_mask: bits::field(word, 16, 4) as u8,
            burst_len: bits::field(word, 20, 10).max(1),
            consecutive_writes: bits::field(word, 31, 1) != 0,
        }
    }
}

/// Apply a 4-bit per-byte-lane mask: only the masked bytes of `new`
/// replace the corresponding bytes of `old`.
fn apply_lane_mask(old: u32, new: u32, mask: u8) -> u32 {
    let mut result = old;
    for lane in 0..4u32 {
        if mask & (1 << lane) != 0 {
            let shift = lane * 8;
            result = (result & !(0xFFu32 << shift)) | (new & (0xFFu32 << shift));
        }
    }
    result
}

/// Decode and apply every packet in `command_buffer` against `regs`,
/// returning the write effects observed in order, for the caller to
/// dispatch to the fill/transfer/display/command-submit collaborators.
pub fn execute_command_buffer(regs: &mut RegisterFile, command_buffer: &[u32]) -> Vec<WriteEffect> {
    let mut effects = Vec::new();
    let mut i = 0usize;
    while i < command_buffer.len() {
        let header = PacketHeader::decode(command_buffer[i]);
        i += 1;
        let mut reg_index = header.register_index;

        for _ in 0..header.burst_len {
            let Some(&param) = command_buffer.get(i) else {
                log::warn!("command buffer truncated mid-burst at word {i}");
                break;
            };
            i += 1;

            let old = regs.read_offset(reg_index);
            let masked = apply_lane_mask(old, param, header.parameter_mask);
            match regs.write_offset(reg_index, masked) {
                Ok(effect) => effects.push(effect),
                Err(err) => log::warn!("command processor: {err}"),
            }

            if header.consecutive_writes {
                reg_index += 1;
            }
        }
    }
    effects
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpu_registers::Register;

    #[test]
    fn mmio_roundtrip() {
        let mut regs = RegisterFile::new();
        mmio_write(&mut regs, MMIO_BASE + 4 * Register::FbWidth as u32, 640).unwrap();
        assert_eq!(mmio_read(&regs, MMIO_BASE + 4 * Register::FbWidth as u32).unwrap(), 640);
    }

    #[test]
    fn below_base_address_errors() {
        let regs = RegisterFile::new();
        assert_eq!(mmio_read(&regs, 0x1000).unwrap_err(), SpiError::BelowBase(0x1000));
    }

    #[test]
    fn consecutive_burst_advances_register_index() {
        let mut regs = RegisterFile::new();
        let header = PacketHeader {
            register_index: Register::FbWidth as u32,
            parameter_mask: 0b1111,
            burst_len: 2,
            consecutive_writes: true,
        };
        let header_word = (header.register_index) | ((header.parameter_mask as u32) << 16) | (header.burst_len << 20) | (1 << 31);
        let buf = [header_word, 320, 240];
        execute_command_buffer(&mut regs, &buf);
        assert_eq!(regs.read(Register::FbWidth), 320);
        assert_eq!(regs.read(Register::FbHeight), 240);
    }

    #[test]
    fn repeated_writes_to_same_register_without_consecutive_flag() {
        let mut regs = RegisterFile::new();
        let header_word = (Register::FillColor as u32) | (0b1111 << 16) | (2 << 20);
        let buf = [header_word, 0x11111111, 0x22222222];
        execute_command_buffer(&mut regs, &buf);
        assert_eq!(regs.read(Register::FillColor), 0x22222222);
    }

    #[test]
    fn byte_lane_mask_preserves_unmasked_bytes() {
        let mut regs = RegisterFile::new();
        regs.write(Register::FillColor, 0xAABBCCDD);
        let header_word = (Register::FillColor as u32) | (0b0001 << 16) | (1 << 20);
        let buf = [header_word, 0x11223344];
        execute_command_buffer(&mut regs, &buf);
        assert_eq!(regs.read(Register::FillColor), 0xAABBCC44);
    }
}
