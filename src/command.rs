pub trait OpCode {
    fn op_code(&self) -> u8;
}

/// ROM commands, understood by every device on the bus
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Only valid with a single device: it answers with its ROM code
    ReadRom = 0x33,
    /// Followed by a ROM code, selects exactly that device
    MatchRom = 0x55,
    /// Selects every device at once
    SkipRom = 0xCC,
    /// Starts the binary tree walk over all ROM codes
    SearchRom = 0xF0,
    /// Like [`Command::SearchRom`], but only devices with a raised alarm take part
    AlarmSearch = 0xEC,
}

impl OpCode for Command {
    fn op_code(&self) -> u8 {
        *self as _
    }
}
