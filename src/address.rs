use crate::{crc, Error};
use core::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    ops::{Deref, DerefMut},
    str::FromStr,
};

/// 64 bit ROM code of a device: family code, 48 bit serial number and CRC.
///
/// Bytes are kept in transmission order, so `self[0]` is the family code and
/// `self[7]` the CRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Address {
    raw: [u8; Self::BYTES as usize],
}

impl Default for Address {
    fn default() -> Self {
        Self::from([0; Self::BYTES as usize])
    }
}

impl From<[u8; Self::BYTES as usize]> for Address {
    fn from(raw: [u8; Self::BYTES as usize]) -> Self {
        Address { raw }
    }
}

impl From<Address> for [u8; Address::BYTES as usize] {
    fn from(addr: Address) -> [u8; Address::BYTES as usize] {
        addr.raw
    }
}

impl Deref for Address {
    type Target = [u8; Self::BYTES as usize];

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

impl DerefMut for Address {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.raw
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        self.deref() as _
    }
}

impl AsMut<[u8]> for Address {
    fn as_mut(&mut self) -> &mut [u8] {
        self.deref_mut() as _
    }
}

impl Address {
    /// The length of device address in bytes
    pub const BYTES: u8 = 8;

    /// The length of device address in bits
    pub const BITS: u8 = Self::BYTES * 8;

    /// Builds an address from its integer form, least significant byte first on the wire.
    pub fn from_u64(code: u64) -> Self {
        Self::from(code.to_le_bytes())
    }

    pub fn to_u64(&self) -> u64 {
        u64::from_le_bytes(self.raw)
    }

    pub fn family_code(&self) -> u8 {
        self[0]
    }

    pub fn serial_number(&self) -> &[u8] {
        &self[1..7]
    }

    pub fn crc(&self) -> u8 {
        self[7]
    }

    pub fn is_zero(&self) -> bool {
        self.raw == [0; Self::BYTES as usize]
    }

    pub fn is_crc_valid(&self) -> bool {
        crc::check_crc8(self.as_ref())
    }

    pub fn ensure_correct_crc8<E: Debug>(&self) -> Result<(), Error<E>> {
        let computed = crc::crc8_bytes(0, &self[..7]);
        if computed != self.crc() {
            Err(Error::CrcMismatch(computed, self.crc()))
        } else {
            Ok(())
        }
    }

    pub(crate) fn bit(&self, bit: u8) -> bool {
        self.raw[(bit / 8) as usize] & (0x01 << (bit % 8)) != 0x00
    }

    pub(crate) fn write_bit(&mut self, bit: u8, value: bool) {
        let mask = 0x01 << (bit % 8);
        if value {
            self.raw[(bit / 8) as usize] |= mask;
        } else {
            self.raw[(bit / 8) as usize] &= !mask;
        }
    }
}

/// Error type
#[derive(Debug, PartialEq, Eq)]
pub enum AddressError {
    NotEnough,
    TooMany,
    Invalid,
}

fn hex_to_u8(c: char) -> Option<u8> {
    c.to_digit(16).map(|d| d as u8)
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut addr = Address::default();
        let mut chars = s.chars().filter(|c| !c.is_whitespace() && *c != ':');

        for i in 0..Self::BYTES as usize {
            match (chars.next(), chars.next()) {
                (Some(h), Some(l)) => match (hex_to_u8(h), hex_to_u8(l)) {
                    (Some(h), Some(l)) => {
                        addr[i] = (h << 4) | l;
                    }
                    _ => return Err(AddressError::Invalid),
                },
                _ => return Err(AddressError::NotEnough),
            }
        }

        if chars.next().is_some() {
            return Err(AddressError::TooMany);
        }
        Ok(addr)
    }
}

/// 16 uppercase hex digits, family code first
impl Display for Address {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        for byte in self.raw.iter() {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}
