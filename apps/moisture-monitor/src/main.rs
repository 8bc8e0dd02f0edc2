#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::{
    adc::{self, Adc},
    bind_interrupts,
    gpio::{Input, Level, Output, Pull},
    peripherals::UART0,
    uart::{self, BufferedUart},
};
use embassy_time::Delay;
use moisture_core::report::Config;
use moisture_core::sensor::AnalogInput;
use moisture_core::sensor::moisture::Wetness;
use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(struct Irqs {
    ADC_IRQ_FIFO => adc::InterruptHandler;
    UART0_IRQ => uart::BufferedInterruptHandler<UART0>;
});

struct ProbeAdc<'d> {
    adc: Adc<'d, adc::Async>,
    channel: adc::Channel<'d>,
}

impl AnalogInput for ProbeAdc<'_> {
    type Error = adc::Error;

    async fn read_raw(&mut self) -> Result<u16, Self::Error> {
        // 12 bit sample, the calibration expects 10 bit
        Ok(self.adc.read(&mut self.channel).await? >> 2)
    }
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_rp::init(Default::default());
    let mut led = Output::new(p.PIN_25, Level::Low);
    let power = Output::new(p.PIN_27, Level::Low);
    let switch_dry = Input::new(p.PIN_2, Pull::Down);
    let switch_wet = Input::new(p.PIN_3, Pull::Down);

    let probe = ProbeAdc {
        adc: Adc::new(p.ADC, Irqs, adc::Config::default()),
        channel: adc::Channel::new_pin(p.PIN_26, Pull::None),
    };

    let mut uart_config = uart::Config::default();
    uart_config.baudrate = 9600;
    let mut uart_tx_buffer = [0u8; 256];
    let mut uart_rx_buffer = [0u8; 16];
    let uart = BufferedUart::new(p.UART0, p.PIN_0, p.PIN_1, Irqs, &mut uart_tx_buffer, &mut uart_rx_buffer, uart_config);

    let config = Config::default();
    info!("Moisture monitor start: {:?}", config);

    let mut runner = match moisture_core::report::new(config, probe, power, Delay, uart, Delay) {
        Ok(runner) => runner,
        Err(e) => {
            error!("Moisture sensor setup failed: {:?}", e);
            return;
        }
    };

    loop {
        let too_dry = match runner.cycle().await {
            Some(report) => {
                let wetness = Wetness::from_switches(switch_dry.is_high(), switch_wet.is_high());
                let too_dry = report.is_too_dry(wetness);
                if too_dry {
                    debug!("Moisture {}% is below {:?} threshold {}%", report.percent, wetness, wetness.threshold());
                }
                too_dry
            }
            None => false,
        };
        led.set_level(too_dry.into());
    }
}
