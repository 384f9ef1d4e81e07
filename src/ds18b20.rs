use byteorder::{ByteOrder, LittleEndian};
use embedded_hal::delay::DelayNs;
use log::{debug, warn};

use crate::{crc, Address, Device, Driver, Error, IoWire, OpCode, Sensor};
use core::fmt::Debug;

#[derive(Clone, Copy, Debug)]
#[repr(u8)]
pub enum Command {
    Convert = 0x44,
    WriteScratchpad = 0x4e,
    ReadScratchpad = 0xBE,
    CopyScratchpad = 0x48,
    RecallE2 = 0xB8,
    ReadPowerSupply = 0xB4,
}

impl OpCode for Command {
    fn op_code(&self) -> u8 {
        *self as _
    }
}

/// Datasheet time for storing the scratchpad into EEPROM
const COPY_SCRATCHPAD_MS: u32 = 10;

/// Read slots polled while the device reloads its EEPROM
const RECALL_POLL_SLOTS: usize = 1000;

/// Temperature LSB masks for 9, 10, 11 and 12 bits, the device leaves the
/// bits below the resolution undefined.
const TEMP_LSB_MASK: [u8; 4] = [!0x07, !0x03, !0x01, !0x00];

/// Conversion resolution, stored as the configuration register value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Resolution {
    Bits9 = 0b0001_1111,
    Bits10 = 0b0011_1111,
    Bits11 = 0b0101_1111,
    Bits12 = 0b0111_1111,
}

impl Resolution {
    pub const ALL: [Resolution; 4] = [
        Resolution::Bits9,
        Resolution::Bits10,
        Resolution::Bits11,
        Resolution::Bits12,
    ];

    /// `None` outside of 9..=12
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            9 => Some(Resolution::Bits9),
            10 => Some(Resolution::Bits10),
            11 => Some(Resolution::Bits11),
            12 => Some(Resolution::Bits12),
            _ => None,
        }
    }

    /// Decodes the two resolution bits of a configuration register
    pub fn from_config_byte(config: u8) -> Self {
        Self::ALL[((config >> 5) & 0x03) as usize]
    }

    pub fn bits(self) -> u8 {
        9 + (self as u8 >> 5)
    }

    pub fn config_byte(self) -> u8 {
        self as u8
    }

    /// Maximum conversion time, 750ms halved for every bit below 12
    pub fn conversion_time_us(self) -> u32 {
        750_000 >> (12 - self.bits())
    }

    /// Conversion time rounded up to whole milliseconds
    pub fn time_ms(self) -> u32 {
        self.conversion_time_us().div_ceil(1000)
    }

    fn lsb_mask(self) -> u8 {
        TEMP_LSB_MASK[(self.bits() - 9) as usize]
    }
}

/// Raw temperature in 1/16 degrees with the undefined low bits cleared
pub fn raw_temperature(lsb: u8, msb: u8, resolution: Resolution) -> i16 {
    LittleEndian::read_i16(&[lsb & resolution.lsb_mask(), msb])
}

/// Temperature in degrees Celsius
pub fn decode_temperature(lsb: u8, msb: u8, resolution: Resolution) -> f32 {
    raw_temperature(lsb, msb, resolution) as f32 / 16_f32
}

/// Device memory as returned by the read scratchpad command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Scratchpad {
    raw: [u8; Scratchpad::BYTES],
}

impl Scratchpad {
    pub const BYTES: usize = 9;
    pub const TEMPERATURE_LSB: usize = 0;
    pub const TEMPERATURE_MSB: usize = 1;
    pub const TRIGGER_HIGH: usize = 2;
    pub const TRIGGER_LOW: usize = 3;
    pub const CONFIGURATION: usize = 4;
    pub const CRC: usize = 8;

    pub fn temperature_bytes(&self) -> (u8, u8) {
        (
            self.raw[Self::TEMPERATURE_LSB],
            self.raw[Self::TEMPERATURE_MSB],
        )
    }

    pub fn temperature(&self) -> f32 {
        let (lsb, msb) = self.temperature_bytes();
        decode_temperature(lsb, msb, self.resolution())
    }

    pub fn trigger_high(&self) -> i8 {
        self.raw[Self::TRIGGER_HIGH] as i8
    }

    pub fn trigger_low(&self) -> i8 {
        self.raw[Self::TRIGGER_LOW] as i8
    }

    pub fn configuration(&self) -> u8 {
        self.raw[Self::CONFIGURATION]
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::from_config_byte(self.configuration())
    }

    pub fn crc(&self) -> u8 {
        self.raw[Self::CRC]
    }

    pub fn is_crc_valid(&self) -> bool {
        crc::check_crc8(&self.raw)
    }

    pub fn set_trigger_high(&mut self, value: i8) {
        self.raw[Self::TRIGGER_HIGH] = value as u8;
    }

    pub fn set_trigger_low(&mut self, value: i8) {
        self.raw[Self::TRIGGER_LOW] = value as u8;
    }

    pub fn set_configuration(&mut self, config: u8) {
        self.raw[Self::CONFIGURATION] = config;
    }

    /// Trigger high, trigger low and configuration, the only bytes the
    /// device accepts with the write scratchpad command
    pub fn writable(&self) -> &[u8] {
        &self.raw[Self::TRIGGER_HIGH..=Self::CONFIGURATION]
    }

    pub fn ensure_correct_crc8<E: Debug>(&self) -> Result<(), Error<E>> {
        let computed = crc::crc8_bytes(0, &self.raw[..Self::CRC]);
        if computed != self.crc() {
            Err(Error::CrcMismatch(computed, self.crc()))
        } else {
            Ok(())
        }
    }
}

impl From<[u8; Scratchpad::BYTES]> for Scratchpad {
    fn from(raw: [u8; Scratchpad::BYTES]) -> Self {
        Scratchpad { raw }
    }
}

impl AsRef<[u8]> for Scratchpad {
    fn as_ref(&self) -> &[u8] {
        &self.raw
    }
}

impl AsMut<[u8]> for Scratchpad {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.raw
    }
}

/// DS18B20 temperature sensor.
///
/// The handle does not own the bus, every transaction borrows the [`Driver`]
/// and a delay, so any number of sensors can share one bus.
#[derive(Debug, Clone, Copy)]
pub struct Ds18b20 {
    address: Address,
    solo: bool,
    use_crc: bool,
    resolution: Option<Resolution>,
}

impl From<Ds18b20> for Address {
    fn from(device: Ds18b20) -> Self {
        device.address
    }
}

impl Ds18b20 {
    /// Binds to the device with the given ROM code and reads its resolution
    pub fn new<W: IoWire>(
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
        address: Address,
    ) -> Result<Self, Error<W::Error>> {
        Self::ensure_family::<W::Error>(&address)?;
        Self::init(driver, delay, address, false)
    }

    /// Binds to the only device on the bus, addressing it with skip ROM
    pub fn new_solo<W: IoWire>(
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<Self, Error<W::Error>> {
        Self::init(driver, delay, Address::default(), true)
    }

    fn init<W: IoWire>(
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
        address: Address,
        solo: bool,
    ) -> Result<Self, Error<W::Error>> {
        let mut device = Ds18b20 {
            address,
            solo,
            use_crc: false,
            resolution: None,
        };
        device.sync_resolution(driver, delay)?;
        Ok(device)
    }

    /// Enables the CRC check of every scratchpad read
    pub fn use_crc(&mut self, use_crc: bool) {
        self.use_crc = use_crc;
        debug!("{}: use_crc {}", self.address, use_crc);
    }

    pub fn is_solo(&self) -> bool {
        self.solo
    }

    /// Last resolution read from or written to the device
    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    fn address_device<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<W::Error>> {
        let address = if self.solo { None } else { Some(&self.address) };
        driver.reset_address(delay, address).map_err(|e| {
            if matches!(e, Error::NoPresence) {
                warn!("{}: device not responding", self.address);
            }
            e
        })
    }

    /// Reads the first `count` scratchpad bytes, or all of them with CRC enabled
    fn read_scratchpad_bytes<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
        count: usize,
    ) -> Result<Scratchpad, Error<W::Error>> {
        let count = if self.use_crc {
            Scratchpad::BYTES
        } else {
            count.min(Scratchpad::BYTES)
        };
        self.address_device(driver, delay)?;
        driver.write_command(delay, Command::ReadScratchpad)?;

        let mut scratchpad = Scratchpad::default();
        driver.read_bytes(delay, &mut scratchpad.as_mut()[..count])?;
        if self.use_crc {
            if let Err(e) = scratchpad.ensure_correct_crc8() {
                warn!("{}: scratchpad crc check failed", self.address);
                return Err(e);
            }
        }
        Ok(scratchpad)
    }

    pub fn read_scratchpad<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<Scratchpad, Error<W::Error>> {
        self.read_scratchpad_bytes(driver, delay, Scratchpad::BYTES)
    }

    /// Writes trigger high, trigger low and configuration in one transaction.
    ///
    /// With `verify` the scratchpad is read back and compared, a difference is
    /// reported as [`Error::VerifyMismatch`].
    pub fn write_scratchpad<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
        scratchpad: &Scratchpad,
        verify: bool,
    ) -> Result<(), Error<W::Error>> {
        self.address_device(driver, delay)?;
        driver.write_command(delay, Command::WriteScratchpad)?;
        driver.write_bytes(delay, scratchpad.writable())?;

        if verify {
            let readback =
                self.read_scratchpad_bytes(driver, delay, Scratchpad::CONFIGURATION + 1)?;
            if readback.writable() != scratchpad.writable() {
                warn!(
                    "{}: scratchpad verification failed, wrote {:02X?}, read {:02X?}",
                    self.address,
                    scratchpad.writable(),
                    readback.writable()
                );
                return Err(Error::VerifyMismatch);
            }
        }
        Ok(())
    }

    /// Patches the writable part of the scratchpad with a verified write.
    /// On failure the cached resolution is re-read since the write may have
    /// partially succeeded.
    fn update_scratchpad<W: IoWire>(
        &mut self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
        patch: impl FnOnce(&mut Scratchpad),
    ) -> Result<(), Error<W::Error>> {
        let result = match self.read_scratchpad_bytes(driver, delay, Scratchpad::CONFIGURATION + 1)
        {
            Ok(mut scratchpad) => {
                patch(&mut scratchpad);
                self.write_scratchpad(driver, delay, &scratchpad, true)
                    .map(|_| scratchpad.resolution())
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(resolution) => {
                self.resolution = Some(resolution);
                Ok(())
            }
            Err(e) => {
                warn!("{}: scratchpad update failed, re-reading resolution", self.address);
                self.resolution = self.read_resolution(driver, delay).ok();
                Err(e)
            }
        }
    }

    /// Reads the resolution from the device without touching the cache
    pub fn read_resolution<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<Resolution, Error<W::Error>> {
        let scratchpad = self.read_scratchpad_bytes(driver, delay, Scratchpad::CONFIGURATION + 1)?;
        Ok(scratchpad.resolution())
    }

    /// Refreshes the cached resolution from the device
    pub fn sync_resolution<W: IoWire>(
        &mut self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<Resolution, Error<W::Error>> {
        self.resolution = None;
        let resolution = self.read_resolution(driver, delay)?;
        debug!("{}: resolution {} bits", self.address, resolution.bits());
        self.resolution = Some(resolution);
        Ok(resolution)
    }

    pub fn set_resolution<W: IoWire>(
        &mut self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
        resolution: Resolution,
    ) -> Result<(), Error<W::Error>> {
        self.update_scratchpad(driver, delay, |scratchpad| {
            scratchpad.set_configuration(resolution.config_byte())
        })
    }

    /// Sets the alarm triggers, keeping the current configuration
    pub fn set_alarm_thresholds<W: IoWire>(
        &mut self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
        high: i8,
        low: i8,
    ) -> Result<(), Error<W::Error>> {
        self.update_scratchpad(driver, delay, |scratchpad| {
            scratchpad.set_trigger_high(high);
            scratchpad.set_trigger_low(low);
        })
    }

    /// Stores triggers and configuration into the EEPROM
    pub fn copy_scratchpad<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<W::Error>> {
        self.address_device(driver, delay)?;
        driver.write_command(delay, Command::CopyScratchpad)?;
        delay.delay_ms(COPY_SCRATCHPAD_MS);
        Ok(())
    }

    /// Reloads triggers and configuration from the EEPROM
    pub fn recall_eeprom<W: IoWire>(
        &mut self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<W::Error>> {
        self.address_device(driver, delay)?;
        driver.write_command(delay, Command::RecallE2)?;
        // the device reads as 0 until the recall is done
        let mut done = false;
        for _ in 0..RECALL_POLL_SLOTS {
            if driver.read_bit(delay)? {
                done = true;
                break;
            }
        }
        if !done {
            warn!("{}: eeprom recall did not finish", self.address);
            self.resolution = None;
            return Err(Error::Timeout);
        }
        self.sync_resolution(driver, delay)?;
        Ok(())
    }

    /// Returns `true` for an externally powered device
    pub fn read_power_supply<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<bool, Error<W::Error>> {
        self.address_device(driver, delay)?;
        driver.write_command(delay, Command::ReadPowerSupply)?;
        Ok(driver.read_bit(delay)?)
    }

    /// Starts a conversion, does not wait for it
    pub fn convert<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<W::Error>> {
        self.address_device(driver, delay)?;
        driver.write_command(delay, Command::Convert)?;
        Ok(())
    }

    /// Conversion time for the cached resolution, the 12 bit time if unknown
    pub fn conversion_time_ms(&self) -> u32 {
        self.resolution.unwrap_or(Resolution::Bits12).time_ms()
    }

    pub fn wait_for_conversion(&self, delay: &mut impl DelayNs) {
        let ms = self.conversion_time_ms();
        debug!("{}: waiting {}ms for conversion", self.address, ms);
        delay.delay_ms(ms);
    }

    /// Reads the last converted temperature, masked to the cached resolution
    pub fn read_temp_raw<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<i16, Error<W::Error>> {
        let resolution = self
            .resolution
            .ok_or(Error::<W::Error>::InvalidResolution)?;
        let scratchpad = self.read_scratchpad_bytes(driver, delay, 2)?;
        let (lsb, msb) = scratchpad.temperature_bytes();
        Ok(raw_temperature(lsb, msb, resolution))
    }

    /// Reads the last converted temperature in degrees Celsius
    pub fn read_temp<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<f32, Error<W::Error>> {
        let temperature = self.read_temp_raw(driver, delay)? as f32 / 16_f32;
        debug!("{}: temperature {}", self.address, temperature);
        Ok(temperature)
    }

    pub fn convert_and_read_temp<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<f32, Error<W::Error>> {
        self.convert(driver, delay)?;
        self.wait_for_conversion(delay);
        self.read_temp(driver, delay)
    }
}

/// Starts a conversion on every device of the bus and waits the 12 bit
/// conversion time
pub fn convert_all<W: IoWire>(
    driver: &mut Driver<W>,
    delay: &mut impl DelayNs,
) -> Result<(), Error<W::Error>> {
    driver.reset_address(delay, None)?;
    driver.write_command(delay, Command::Convert)?;
    delay.delay_ms(Resolution::Bits12.time_ms());
    Ok(())
}

impl Device for Ds18b20 {
    const FAMILY_CODE: u8 = 0x28;

    fn address(&self) -> &Address {
        &self.address
    }
}

impl Sensor for Ds18b20 {
    fn start_measurement<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<u32, Error<W::Error>> {
        self.convert(driver, delay)?;
        Ok(self.conversion_time_ms())
    }

    fn read_measurement<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<f32, Error<W::Error>> {
        self.read_temp(driver, delay)
    }

    fn read_measurement_raw<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<i16, Error<W::Error>> {
        self.read_temp_raw(driver, delay)
    }
}

/// Splits a raw reading in 1/16 degrees, as returned by
/// [`Ds18b20::read_temp_raw`], into whole degrees and ten-thousandths.
/// Both parts carry the sign, the value is `integer + fraction / 10000`.
pub fn split_temp(raw: i16) -> (i16, i16) {
    let abs = raw.unsigned_abs();
    let integer = (abs >> 4) as i16;
    let fraction = (abs & 0xF) as i16 * 625;
    if raw < 0 {
        (-integer, -fraction)
    } else {
        (integer, fraction)
    }
}
