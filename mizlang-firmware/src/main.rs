//! MizLang - Instruction Bridge Firmware
//!
//! Main firmware binary for RP2040-based boards. Exposes a small
//! instruction set over UART0 (GPIO0 TX, GPIO1 RX, 115200 baud) using the
//! MizLang framed protocol.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::peripherals::UART0;
use embassy_rp::uart::{BufferedInterruptHandler, Config as UartConfig, Uart};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use mizlang_core::LinkConfig;

mod instructions;
mod tasks;

/// Link parameters validated from link.toml at build time
static LINK_CONFIG_BYTES: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/link_config.bin"));

bind_interrupts!(struct Irqs {
    UART0_IRQ => BufferedInterruptHandler<UART0>;
});

// Static cells for UART buffers (must live forever)
static TX_BUF: StaticCell<[u8; 256]> = StaticCell::new();
static RX_BUF: StaticCell<[u8; 256]> = StaticCell::new();

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("MizLang firmware starting...");

    let p = embassy_rp::init(Default::default());
    info!("Peripherals initialized");

    let link = load_link_config();

    let uart_config = UartConfig::default(); // 115200 baud default

    let tx_buf = TX_BUF.init([0u8; 256]);
    let rx_buf = RX_BUF.init([0u8; 256]);

    let uart = Uart::new_blocking(p.UART0, p.PIN_0, p.PIN_1, uart_config);
    let uart = uart.into_buffered(Irqs, tx_buf, rx_buf);
    let (tx, rx) = uart.split();

    info!("UART initialized for bridge link");

    spawner.spawn(tasks::bridge_task(rx, tx, link)).unwrap();

    info!("All tasks spawned, firmware running");

    loop {
        embassy_time::Timer::after_secs(60).await;
        trace!("Main loop heartbeat");
    }
}

/// Decode the embedded link parameters, falling back to defaults
fn load_link_config() -> LinkConfig {
    match LinkConfig::from_bytes(LINK_CONFIG_BYTES) {
        Ok(link) => {
            info!(
                "Link config: {} handshake retries, stall limit {}",
                link.handshake_retries, link.write_stall_limit
            );
            link
        }
        Err(e) => {
            warn!("Embedded link config unreadable ({}), using defaults", e);
            LinkConfig::DEFAULT
        }
    }
}
