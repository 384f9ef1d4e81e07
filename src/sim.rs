//! Slot level simulation of a bus with DS18B20-like slaves.
//!
//! The wire and the delay share one virtual clock: the delay advances it, the
//! wire timestamps every edge the master produces and decodes the slots from
//! the low pulse lengths, the way a real slave does.

use crate::{crc, Driver, IoWire};
use core::{cell::RefCell, convert::Infallible};
use embedded_hal::delay::DelayNs;
use std::rc::Rc;

const RESET_MIN_NS: u64 = 480_000;
const WRITE_ONE_MAX_NS: u64 = 15_000;
const PRESENCE_WAIT_NS: u64 = 15_000;
const PRESENCE_NS: u64 = 120_000;
const HOLD_LOW_NS: u64 = 25_000;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    RomCommand,
    MatchRom,
    FunctionCommand,
    WriteScratchpad,
}

#[derive(Debug, Clone, PartialEq)]
enum Mode {
    Idle,
    Receive {
        phase: Phase,
        bytes: Vec<u8>,
        byte: u8,
        bits: u8,
    },
    Transmit {
        data: Vec<u8>,
        bit: usize,
    },
    Search {
        bit: usize,
        step: u8,
    },
}

impl Mode {
    fn receive(phase: Phase) -> Self {
        Mode::Receive {
            phase,
            bytes: Vec::new(),
            byte: 0,
            bits: 0,
        }
    }

    fn transmit(data: &[u8]) -> Self {
        Mode::Transmit {
            data: data.to_vec(),
            bit: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimDevice {
    pub rom: [u8; 8],
    pub scratchpad: [u8; 9],
    pub eeprom: [u8; 3],
    /// Value in 1/16 degrees stored by the next conversion
    pub temperature: i16,
    /// Flips the lowest bit of the low trigger on every scratchpad write
    pub corrupt_writes: bool,
    /// Flips the lowest bit of the temperature LSB when sending the scratchpad
    pub corrupt_reads: bool,
    pub conversions: usize,
    alarm: bool,
    mode: Mode,
}

impl SimDevice {
    pub fn with_family(family: u8, serial: [u8; 6]) -> Self {
        let mut rom = [family, 0, 0, 0, 0, 0, 0, 0];
        rom[1..7].copy_from_slice(&serial);
        rom[7] = crc::crc8_bytes(0, &rom[..7]);

        let mut device = SimDevice {
            rom,
            // power-on state: 85 degrees, triggers 75/70, 12 bit
            scratchpad: [0x50, 0x05, 0x4B, 0x46, 0x7F, 0xFF, 0x0C, 0x10, 0x00],
            eeprom: [0x4B, 0x46, 0x7F],
            temperature: 0x0550,
            corrupt_writes: false,
            corrupt_reads: false,
            conversions: 0,
            alarm: false,
            mode: Mode::Idle,
        };
        device.update_crc();
        device
    }

    pub fn ds18b20(serial: [u8; 6]) -> Self {
        Self::with_family(0x28, serial)
    }

    /// Was this device addressed and waits for a function command?
    pub fn is_selected(&self) -> bool {
        matches!(
            self.mode,
            Mode::Receive {
                phase: Phase::FunctionCommand,
                ..
            }
        )
    }

    fn update_crc(&mut self) {
        self.scratchpad[8] = crc::crc8_bytes(0, &self.scratchpad[..8]);
    }

    fn resolution_bits(&self) -> u8 {
        ((self.scratchpad[4] >> 5) & 0x03) + 9
    }

    fn convert(&mut self) {
        // bits below the resolution are left undefined, make them visible
        let undefined = (1u16 << (12 - self.resolution_bits())) - 1;
        let raw = (self.temperature as u16 & !undefined) | undefined;
        self.scratchpad[..2].copy_from_slice(&raw.to_le_bytes());
        self.update_crc();

        let degrees = self.temperature >> 4;
        let high = self.scratchpad[2] as i8 as i16;
        let low = self.scratchpad[3] as i8 as i16;
        self.alarm = degrees >= high || degrees <= low;
        self.conversions += 1;
    }

    fn on_reset(&mut self) {
        self.mode = Mode::receive(Phase::RomCommand);
    }

    /// Handles one time slot, returns whether the device pulls the line low.
    fn on_slot(&mut self, master_bit: bool) -> bool {
        let mut next = None;
        let mut byte_done = false;
        let pull = match &mut self.mode {
            Mode::Idle => false,
            Mode::Transmit { data, bit } => {
                let value = data.get(*bit / 8).map_or(true, |b| (*b >> (*bit % 8)) & 1 == 1);
                *bit += 1;
                !value
            }
            Mode::Search { bit, step } => {
                let own = (self.rom[*bit / 8] >> (*bit % 8)) & 1 == 1;
                match step {
                    0 => {
                        *step = 1;
                        !own
                    }
                    1 => {
                        *step = 2;
                        own
                    }
                    _ => {
                        *bit += 1;
                        *step = 0;
                        if master_bit != own || *bit == 64 {
                            next = Some(Mode::Idle);
                        }
                        false
                    }
                }
            }
            Mode::Receive {
                bytes, byte, bits, ..
            } => {
                if master_bit {
                    *byte |= 1 << *bits;
                }
                *bits += 1;
                if *bits == 8 {
                    bytes.push(*byte);
                    *byte = 0;
                    *bits = 0;
                    byte_done = true;
                }
                false
            }
        };
        if byte_done {
            next = self.on_byte();
        }
        if let Some(mode) = next {
            self.mode = mode;
        }
        pull
    }

    fn on_byte(&mut self) -> Option<Mode> {
        let (phase, bytes) = match &self.mode {
            Mode::Receive { phase, bytes, .. } => (*phase, bytes.clone()),
            _ => return None,
        };
        match phase {
            Phase::RomCommand => Some(match bytes[0] {
                0x33 => Mode::transmit(&self.rom),
                0x55 => Mode::receive(Phase::MatchRom),
                0xCC => Mode::receive(Phase::FunctionCommand),
                0xF0 => Mode::Search { bit: 0, step: 0 },
                0xEC if self.alarm => Mode::Search { bit: 0, step: 0 },
                _ => Mode::Idle,
            }),
            Phase::MatchRom if bytes.len() < 8 => None,
            Phase::MatchRom => Some(if bytes[..] == self.rom[..] {
                Mode::receive(Phase::FunctionCommand)
            } else {
                Mode::Idle
            }),
            Phase::FunctionCommand => Some(self.on_function(bytes[0])),
            Phase::WriteScratchpad if bytes.len() < 3 => None,
            Phase::WriteScratchpad => {
                self.scratchpad[2..5].copy_from_slice(&bytes);
                if self.corrupt_writes {
                    self.scratchpad[3] ^= 0x01;
                }
                self.update_crc();
                Some(Mode::Idle)
            }
        }
    }

    fn on_function(&mut self, command: u8) -> Mode {
        match command {
            0x44 => {
                self.convert();
                Mode::transmit(&[])
            }
            0xBE => {
                let mut data = self.scratchpad;
                if self.corrupt_reads {
                    data[0] ^= 0x01;
                }
                Mode::transmit(&data)
            }
            0x4E => Mode::receive(Phase::WriteScratchpad),
            0x48 => {
                self.eeprom.copy_from_slice(&self.scratchpad[2..5]);
                Mode::transmit(&[])
            }
            0xB8 => {
                self.scratchpad[2..5].copy_from_slice(&self.eeprom);
                self.update_crc();
                Mode::transmit(&[])
            }
            // externally powered: reads as ones
            0xB4 => Mode::transmit(&[]),
            _ => Mode::Idle,
        }
    }
}

struct SimBus {
    now: u64,
    low_since: Option<u64>,
    presence: (u64, u64),
    hold_low_until: u64,
    devices: Vec<SimDevice>,
    slept_ms: Vec<u32>,
}

impl SimBus {
    fn level(&self) -> bool {
        let presence = self.presence.0 <= self.now && self.now < self.presence.1;
        self.low_since.is_none() && !presence && self.now >= self.hold_low_until
    }

    fn on_release(&mut self, low_for: u64) {
        if low_for >= RESET_MIN_NS {
            for device in self.devices.iter_mut() {
                device.on_reset();
            }
            if !self.devices.is_empty() {
                let start = self.now + PRESENCE_WAIT_NS;
                self.presence = (start, start + PRESENCE_NS);
            }
            self.hold_low_until = 0;
            return;
        }

        let master_bit = low_for < WRITE_ONE_MAX_NS;
        let mut pull = false;
        for device in self.devices.iter_mut() {
            pull |= device.on_slot(master_bit);
        }
        if pull {
            self.hold_low_until = self.now + HOLD_LOW_NS;
        }
    }
}

/// Shared handle to a simulated bus
#[derive(Clone)]
pub struct Sim {
    bus: Rc<RefCell<SimBus>>,
}

impl Sim {
    pub fn new(devices: impl IntoIterator<Item = SimDevice>) -> Self {
        Sim {
            bus: Rc::new(RefCell::new(SimBus {
                now: 0,
                low_since: None,
                presence: (0, 0),
                hold_low_until: 0,
                devices: devices.into_iter().collect(),
                slept_ms: Vec::new(),
            })),
        }
    }

    pub fn driver(&self) -> Driver<SimWire> {
        Driver::new(SimWire(self.clone()))
    }

    pub fn delay(&self) -> SimDelay {
        SimDelay(self.clone())
    }

    pub fn with_device<R>(&self, index: usize, f: impl FnOnce(&mut SimDevice) -> R) -> R {
        f(&mut self.bus.borrow_mut().devices[index])
    }

    /// Removes every device from the bus
    pub fn detach_all(&self) {
        self.bus.borrow_mut().devices.clear();
    }

    /// Millisecond waits requested so far
    pub fn slept_ms(&self) -> Vec<u32> {
        self.bus.borrow().slept_ms.clone()
    }
}

pub struct SimWire(Sim);

impl IoWire for SimWire {
    type Error = Infallible;

    fn pull_low(&mut self) -> Result<(), Self::Error> {
        let mut bus = self.0.bus.borrow_mut();
        if bus.low_since.is_none() {
            bus.low_since = Some(bus.now);
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), Self::Error> {
        let mut bus = self.0.bus.borrow_mut();
        if let Some(since) = bus.low_since.take() {
            let low_for = bus.now - since;
            bus.on_release(low_for);
        }
        Ok(())
    }

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.bus.borrow().level())
    }
}

pub struct SimDelay(Sim);

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.bus.borrow_mut().now += ns as u64;
    }

    fn delay_ms(&mut self, ms: u32) {
        let mut bus = self.0.bus.borrow_mut();
        bus.now += ms as u64 * 1_000_000;
        bus.slept_ms.push(ms);
    }
}
