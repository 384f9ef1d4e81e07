use core::fmt::{Debug, Display, Formatter, Result as FmtResult};

/// Error type
#[derive(Debug, PartialEq)]
pub enum Error<E: Sized + Debug> {
    /// No presence pulse after a reset
    NoPresence,
    /// CRC over received data is not zero: (computed, received)
    CrcMismatch(u8, u8),
    /// Scratchpad read back after a write differs from what was written
    VerifyMismatch,
    /// Resolution outside of 9..=12 bits or not known
    InvalidResolution,
    /// (expected, found)
    FamilyCodeMismatch(u8, u8),
    /// Device did not signal completion in time
    Timeout,
    PortError(E),
}

impl<E: Sized + Debug> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::PortError(e)
    }
}

impl<E: Sized + Debug> Display for Error<E> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Error::NoPresence => f.write_str("no device responded to reset"),
            Error::CrcMismatch(computed, received) => write!(
                f,
                "crc mismatch: computed {computed:#04x}, received {received:#04x}"
            ),
            Error::VerifyMismatch => f.write_str("scratchpad verification failed"),
            Error::InvalidResolution => f.write_str("invalid resolution"),
            Error::FamilyCodeMismatch(expected, found) => write!(
                f,
                "family code mismatch: expected {expected:#04x}, found {found:#04x}"
            ),
            Error::Timeout => f.write_str("device did not finish in time"),
            Error::PortError(e) => write!(f, "pin error: {e:?}"),
        }
    }
}
