use embedded_hal::digital::{Error, ErrorType, InputPin, OutputPin};

/// Access to the single data line of the bus.
///
/// The line is open-drain with an external pull-up: the master either pulls
/// it low or releases it and lets the pull-up (or a slave) decide the level.
pub trait IoWire {
    type Error: Error;

    /// Pulls the line low
    fn pull_low(&mut self) -> Result<(), Self::Error>;

    /// Stops driving the line
    ///
    /// *NOTE* the line only reads high if no slave holds it low
    fn release(&mut self) -> Result<(), Self::Error>;

    /// Samples the electrical level of the line
    fn is_high(&mut self) -> Result<bool, Self::Error>;

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

/// Open-drain pin used for both directions
impl<IO> IoWire for (IO,)
where
    IO: ErrorType + OutputPin + InputPin,
{
    type Error = IO::Error;

    fn pull_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_low()
    }

    fn release(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }
}

/// Separate sense and drive pins
impl<E, I, O> IoWire for (I, O)
where
    E: Error,
    I: ErrorType<Error = E> + InputPin,
    O: ErrorType<Error = E> + OutputPin,
{
    type Error = E;

    fn pull_low(&mut self) -> Result<(), Self::Error> {
        self.1.set_low()
    }

    fn release(&mut self) -> Result<(), Self::Error> {
        self.1.set_high()
    }

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }
}

/// Pin behind an inverting stage, e.g. a transistor pulling the line down
pub struct Inverted<P>(pub P);

impl<P: ErrorType> ErrorType for Inverted<P> {
    type Error = P::Error;
}

impl<I: InputPin> InputPin for Inverted<I> {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_low()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }
}

impl<O: OutputPin> OutputPin for Inverted<O> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set_low()
    }
}
