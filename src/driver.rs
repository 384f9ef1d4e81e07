use crate::{Address, Command, Error, IoWire, OpCode, Timing};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use log::{debug, warn};

/// Bit-banged 1-Wire bus master owning the data line.
///
/// All operations run in program order on the calling thread. A transaction
/// (reset, addressing, command, data) must not be interleaved with another
/// transaction on the same bus; the owner of the `Driver` serialises access.
pub struct Driver<W: IoWire> {
    io_wire: W,
    timing: &'static Timing,
    use_crc: bool,
}

impl<E: Debug, W: IoWire<Error = E>> Driver<W> {
    pub fn new(io_wire: W) -> Self {
        Self::with_timing(io_wire, &Timing::STANDARD)
    }

    /// Waits longer than `u32::MAX` nanoseconds are cut to that value
    pub fn with_timing(io_wire: W, timing: &'static Timing) -> Self {
        Driver {
            io_wire,
            timing,
            use_crc: false,
        }
    }

    /// Gives the data line back
    pub fn release(self) -> W {
        self.io_wire
    }

    /// Enables the CRC check of ROM codes read with [`Driver::read_rom`]
    pub fn use_crc(&mut self, use_crc: bool) {
        self.use_crc = use_crc;
        debug!("use_crc {}", use_crc);
    }

    pub fn crc_enabled(&self) -> bool {
        self.use_crc
    }

    pub fn timing(&self) -> &Timing {
        self.timing
    }

    pub fn reset_write_read(
        &mut self,
        delay: &mut impl DelayNs,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Error<E>> {
        self.reset(delay)?;
        self.write_bytes(delay, write)?;
        self.read_bytes(delay, read)?;
        Ok(())
    }

    /// Resets the bus and addresses either one device or, with `None`, every device
    pub fn reset_address(
        &mut self,
        delay: &mut impl DelayNs,
        addr: Option<&Address>,
    ) -> Result<(), Error<E>> {
        self.reset(delay)?;
        match addr {
            Some(addr) => self.select(delay, addr)?,
            None => self.skip(delay)?,
        }
        Ok(())
    }

    pub fn skip(&mut self, delay: &mut impl DelayNs) -> Result<(), E> {
        self.write_command(delay, Command::SkipRom)
    }

    pub fn select(&mut self, delay: &mut impl DelayNs, addr: &Address) -> Result<(), E> {
        self.write_command(delay, Command::MatchRom)?;
        self.write_rom_code(delay, addr)
    }

    /// Reads the ROM code of the only device on the bus.
    ///
    /// With more than one device present the answers collide and the result
    /// is garbage, which the CRC check catches when enabled.
    pub fn read_rom(&mut self, delay: &mut impl DelayNs) -> Result<Address, Error<E>> {
        let mut address = Address::default();
        self.reset_write_read(delay, &[Command::ReadRom.op_code()], address.as_mut())?;
        if self.use_crc {
            if let Err(e) = address.ensure_correct_crc8() {
                warn!("read_rom: crc check failed for {}", address);
                return Err(e);
            }
        }
        debug!("read_rom: {}", address);
        Ok(address)
    }

    /// Performs a reset and listens for a presence pulse
    /// Returns Err(NoPresence) if no device answered
    pub fn reset(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<E>> {
        if self.reset_presence(delay)? {
            Ok(())
        } else {
            Err(Error::NoPresence)
        }
    }

    /// Performs a reset, returns whether a presence pulse was seen.
    ///
    /// The line is sampled twice: it has to be low while the slaves answer and
    /// high again once the reset sequence is over.
    pub fn reset_presence(&mut self, delay: &mut impl DelayNs) -> Result<bool, E> {
        let t = self.timing;
        self.io_wire.release()?;
        tick_delay(delay, t.g);
        self.io_wire.pull_low()?;
        tick_delay(delay, t.h);
        self.io_wire.release()?;
        tick_delay(delay, t.i);

        let level1 = self.io_wire.is_high()?;
        tick_delay(delay, t.j);
        let level2 = self.io_wire.is_high()?;

        let present = !level1 && level2;
        debug!(
            "reset: level1 {}, level2 {}, present {}",
            level1 as u8, level2 as u8, present
        );
        Ok(present)
    }

    pub fn read_bytes(&mut self, delay: &mut impl DelayNs, dst: &mut [u8]) -> Result<(), E> {
        for d in dst {
            *d = self.read_byte(delay)?;
        }
        Ok(())
    }

    pub fn read_byte(&mut self, delay: &mut impl DelayNs) -> Result<u8, E> {
        let mut byte = 0_u8;
        for _ in 0..8 {
            byte >>= 1;
            if self.read_bit(delay)? {
                byte |= 0x80;
            }
        }
        Ok(byte)
    }

    pub fn read_bit(&mut self, delay: &mut impl DelayNs) -> Result<bool, E> {
        let t = self.timing;
        self.io_wire.pull_low()?;
        tick_delay(delay, t.a);
        self.io_wire.release()?;
        tick_delay(delay, t.e);
        let val = self.io_wire.is_high()?;
        tick_delay(delay, t.f);
        Ok(val)
    }

    pub fn write_command(&mut self, delay: &mut impl DelayNs, cmd: impl OpCode) -> Result<(), E> {
        self.write_byte(delay, cmd.op_code())
    }

    pub fn write_bytes(&mut self, delay: &mut impl DelayNs, bytes: &[u8]) -> Result<(), E> {
        for b in bytes {
            self.write_byte(delay, *b)?;
        }
        Ok(())
    }

    /// Sends all eight bytes of `addr`, family code first
    pub fn write_rom_code(&mut self, delay: &mut impl DelayNs, addr: &Address) -> Result<(), E> {
        self.write_bytes(delay, addr.as_ref())
    }

    pub fn write_byte(&mut self, delay: &mut impl DelayNs, byte: u8) -> Result<(), E> {
        let mut byte = byte;
        for _ in 0..8 {
            self.write_bit(delay, (byte & 0x01) == 0x01)?;
            byte >>= 1;
        }
        Ok(())
    }

    pub fn write_bit(&mut self, delay: &mut impl DelayNs, high: bool) -> Result<(), E> {
        let t = self.timing;
        self.io_wire.pull_low()?;
        tick_delay(delay, if high { t.a } else { t.c });
        self.io_wire.release()?;
        tick_delay(delay, if high { t.b } else { t.d });
        Ok(())
    }
}

#[inline(always)]
fn tick_delay(delay: &mut impl DelayNs, ticks: u32) {
    if ticks > 0 {
        delay.delay_ns(Timing::ticks_to_ns(ticks));
    }
}
