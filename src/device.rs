use crate::{Address, DeviceSearch, Driver, Error, IoWire};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;

/// Generic device interface
pub trait Device: Sized {
    /// Device family code
    const FAMILY_CODE: u8;

    /// Get device address
    fn address(&self) -> &Address;

    /// Rejects addresses of other device families
    fn ensure_family<E: Sized + Debug>(address: &Address) -> Result<(), Error<E>> {
        if address.family_code() != Self::FAMILY_CODE {
            Err(Error::FamilyCodeMismatch(
                Self::FAMILY_CODE,
                address.family_code(),
            ))
        } else {
            Ok(())
        }
    }

    /// Address of the first device of this family on the bus
    fn search_first<W: IoWire>(
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<Option<Address>, Error<W::Error>> {
        let mut search = DeviceSearch::for_family(Self::FAMILY_CODE);
        Ok(driver
            .search_next(&mut search, delay)?
            .filter(|address| address.family_code() == Self::FAMILY_CODE))
    }

    /// Address of the only device on the bus
    fn get_single<W: IoWire>(
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<Address, Error<W::Error>> {
        let address = driver.read_rom(delay)?;
        Self::ensure_family::<W::Error>(&address)?;
        Ok(address)
    }
}
