//! Builds guest command buffers the same way a driver would: one packet
//! header per register write, optionally bursting consecutive writes.
use gpu_registers::Register;

#[derive(Default)]
pub struct CommandBufferBuilder {
    words: Vec<u32>,
}

impl CommandBufferBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a single full-word write to `reg`.
    pub fn write_register(mut self, reg: Register, value: u32) -> Self {
        let header = (reg as u32) | (0b1111 << 16) | (1 << 20);
        self.words.push(header);
        self.words.push(value);
        self
    }

    /// Append a burst of consecutive-register writes starting at `reg`.
    pub fn write_burst(mut self, reg: Register, values: &[u32]) -> Self {
        let header = (reg as u32) | (0b1111 << 16) | ((values.len() as u32) << 20) | (1 << 31);
        self.words.push(header);
        self.words.extend_from_slice(values);
        self
    }

    pub fn build(self) -> Vec<u32> {
        self.words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_write_encodes_non_consecutive_one_word_burst() {
        let buf = CommandBufferBuilder::new().write_register(Register::FbWidth, 640).build();
        assert_eq!(buf, vec![(Register::FbWidth as u32) | (0b1111 << 16) | (1 << 20), 640]);
    }

    #[test]
    fn burst_write_sets_consecutive_bit_and_length() {
        let buf = CommandBufferBuilder::new().write_burst(Register::FbWidth, &[320, 240]).build();
        assert_eq!(buf[0], (Register::FbWidth as u32) | (0b1111 << 16) | (2 << 20) | (1 << 31));
        assert_eq!(&buf[1..], &[320, 240]);
    }
}
