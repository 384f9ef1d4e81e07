use crate::{crc, Address, Command, Driver, Error, IoWire};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use log::{debug, warn};

/// Cursor of a ROM search, one device per step.
///
/// Bit positions are 1-based, 0 meaning "none". Once the last device has been
/// reported the cursor is exhausted: the next step reports no device and puts
/// the cursor back into its initial state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSearch {
    rom_code: Address,
    last_discrepancy: u8,
    last_family_discrepancy: u8,
    last_device: bool,
}

impl DeviceSearch {
    pub fn new() -> DeviceSearch {
        DeviceSearch::default()
    }

    /// Positions the cursor so that the next step finds the first device of `family`,
    /// if there is one. The device found may still be of a higher family code.
    pub fn for_family(family: u8) -> DeviceSearch {
        let mut search = DeviceSearch::new();
        search.rom_code[0] = family;
        search.last_discrepancy = Address::BITS;
        search
    }

    /// Makes the next step jump past all remaining devices of the current family
    pub fn skip_family(&mut self) {
        self.last_discrepancy = self.last_family_discrepancy;
        self.last_family_discrepancy = 0;
        if self.last_discrepancy == 0 {
            self.last_device = true;
        }
    }

    /// ROM code of the last device found
    pub fn rom_code(&self) -> &Address {
        &self.rom_code
    }

    pub fn last_discrepancy(&self) -> u8 {
        self.last_discrepancy
    }

    pub fn last_family_discrepancy(&self) -> u8 {
        self.last_family_discrepancy
    }

    pub fn is_exhausted(&self) -> bool {
        self.last_device
    }

    fn restart(&mut self) {
        self.last_discrepancy = 0;
        self.last_family_discrepancy = 0;
        self.last_device = false;
    }

    pub fn into_iter<'a, W: IoWire, D: DelayNs>(
        self,
        wire: &'a mut Driver<W>,
        delay: &'a mut D,
    ) -> DeviceSearchIter<'a, W, D> {
        DeviceSearchIter {
            search: Some(self),
            wire,
            delay,
        }
    }
}

pub struct DeviceSearchIter<'a, W: IoWire, Delay: DelayNs> {
    search: Option<DeviceSearch>,
    wire: &'a mut Driver<W>,
    delay: &'a mut Delay,
}

impl<W: IoWire, Delay: DelayNs> Iterator for DeviceSearchIter<'_, W, Delay> {
    type Item = Result<Address, Error<W::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut search = self.search.take()?;
        let result = self
            .wire
            .search_next(&mut search, &mut *self.delay)
            .transpose()?;
        self.search = Some(search);
        Some(result)
    }
}

impl<E: Debug, W: IoWire<Error = E>> Driver<W> {
    /// Restarts the enumeration and returns the first device
    pub fn search_first(
        &mut self,
        search: &mut DeviceSearch,
        delay: &mut impl DelayNs,
    ) -> Result<Option<Address>, Error<E>> {
        search.rom_code = Address::default();
        search.restart();
        self.search(search, delay, Command::SearchRom)
    }

    pub fn search_next(
        &mut self,
        search: &mut DeviceSearch,
        delay: &mut impl DelayNs,
    ) -> Result<Option<Address>, Error<E>> {
        self.search(search, delay, Command::SearchRom)
    }

    pub fn search_first_alarmed(
        &mut self,
        search: &mut DeviceSearch,
        delay: &mut impl DelayNs,
    ) -> Result<Option<Address>, Error<E>> {
        search.rom_code = Address::default();
        search.restart();
        self.search(search, delay, Command::AlarmSearch)
    }

    pub fn search_next_alarmed(
        &mut self,
        search: &mut DeviceSearch,
        delay: &mut impl DelayNs,
    ) -> Result<Option<Address>, Error<E>> {
        self.search(search, delay, Command::AlarmSearch)
    }

    /// Checks whether the device with ROM code `rom` is on the bus
    pub fn verify_rom(&mut self, delay: &mut impl DelayNs, rom: &Address) -> Result<bool, Error<E>> {
        let mut search = DeviceSearch {
            rom_code: *rom,
            last_discrepancy: Address::BITS,
            ..DeviceSearch::default()
        };
        let found = self.search_next(&mut search, delay)?;
        Ok(found.as_ref() == Some(rom))
    }

    /// One step of the search algorithm of Maxim application note 187
    pub(crate) fn search(
        &mut self,
        rom: &mut DeviceSearch,
        delay: &mut impl DelayNs,
        cmd: Command,
    ) -> Result<Option<Address>, Error<E>> {
        if rom.last_device {
            rom.restart();
            return Ok(None);
        }

        if !self.reset_presence(delay)? {
            debug!("search: no presence");
            rom.restart();
            return Ok(None);
        }

        self.write_command(delay, cmd)?;

        let mut last_zero = 0u8;
        let mut crc8 = 0u8;
        for i in 0..Address::BITS {
            let id_bit_number = i + 1;
            let id_bit = self.read_bit(delay)?; // normal bit
            let cmp_id_bit = self.read_bit(delay)?; // complementary bit

            if id_bit && cmp_id_bit {
                debug!("search: no response at bit {}", id_bit_number);
                rom.restart();
                return Ok(None);
            }

            let direction = if id_bit != cmp_id_bit {
                id_bit
            } else {
                // discrepancy
                let direction = if id_bit_number < rom.last_discrepancy {
                    rom.rom_code.bit(i)
                } else {
                    id_bit_number == rom.last_discrepancy
                };
                if !direction {
                    last_zero = id_bit_number;
                    if last_zero <= 8 {
                        rom.last_family_discrepancy = last_zero;
                    }
                }
                direction
            };

            rom.rom_code.write_bit(i, direction);
            self.write_bit(delay, direction)?;

            if i % 8 == 7 {
                crc8 = crc::crc8(crc8, rom.rom_code[(i / 8) as usize]);
            }
        }

        if crc8 != 0 {
            warn!("search: crc failed for {}", rom.rom_code);
            rom.restart();
            return Ok(None);
        }
        if rom.rom_code.is_zero() {
            debug!("search: all-zero rom code");
            rom.restart();
            return Ok(None);
        }

        rom.last_discrepancy = last_zero;
        rom.last_device = last_zero == 0;
        debug!(
            "search: found {}, last discrepancy {}",
            rom.rom_code, rom.last_discrepancy
        );
        Ok(Some(rom.rom_code))
    }
}
