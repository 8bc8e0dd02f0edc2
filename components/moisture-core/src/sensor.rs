#![allow(async_fn_in_trait)]

pub mod moisture;

/// One analog input channel, sampled on demand.
///
/// embedded-hal 1.0 has no ADC abstraction, so each board binds its own ADC
/// driver to this trait.
pub trait AnalogInput {
    type Error;

    async fn read_raw(&mut self) -> Result<u16, Self::Error>;
}

impl<T: AnalogInput + ?Sized> AnalogInput for &mut T {
    type Error = T::Error;

    async fn read_raw(&mut self) -> Result<u16, Self::Error> {
        T::read_raw(self).await
    }
}
