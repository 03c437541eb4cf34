//! Bridge task
//!
//! Owns the UART halves and polls the instruction bridge on a fixed tick.
//! When the link faults the bridge is torn down and rebuilt from its parts,
//! which restarts the handshake. Counters survive the rebuild.

use defmt::*;
use embassy_rp::uart::{BufferedUartRx, BufferedUartTx};
use embassy_time::{Duration, Ticker, Timer};

use mizlang_core::{BridgeConfig, BridgeError, DispatchOutcome, LinkConfig};
use mizlang_hal::IoPort;

use crate::instructions::{
    register_all, OutboundInstructions, Stats, UartBridge, UartHandshake, HANDSHAKE_MAGIC,
};

/// Poll interval in milliseconds
pub const POLL_INTERVAL_MS: u64 = 5;

/// Upper bound on polls per tick
const MAX_POLLS_PER_TICK: usize = 8;

/// Ticks between STATS frames (about one second)
const STATS_INTERVAL_TICKS: u32 = 200;

/// Pause before rebuilding a faulted link
const RECONNECT_DELAY_MS: u64 = 500;

/// Bridge task - runs the link forever, reconnecting on faults
#[embassy_executor::task]
pub async fn bridge_task(rx: BufferedUartRx, tx: BufferedUartTx, link: LinkConfig) {
    info!(
        "Bridge task started (retries={}, stall_limit={})",
        link.handshake_retries, link.write_stall_limit
    );

    let mut rx = IoPort::new(rx);
    let mut tx = IoPort::new(tx);
    let mut stats = Stats::default();
    let mut ticker = Ticker::every(Duration::from_millis(POLL_INTERVAL_MS));

    loop {
        let config = BridgeConfig::new(UartHandshake::new(HANDSHAKE_MAGIC)).with_link(link);
        let mut bridge = UartBridge::new(rx, tx, config, stats);
        let outbound = unwrap!(register_all(&mut bridge));
        debug!("{} instructions registered", bridge.table().len());

        run_link(&mut bridge, &outbound, &mut ticker).await;

        let (next_rx, next_tx, mut data) = bridge.into_parts();
        rx = next_rx;
        tx = next_tx;
        data.reconnects = data.reconnects.wrapping_add(1);
        stats = data;

        warn!("Link down, reconnecting (attempt {})", stats.reconnects);
        Timer::after(Duration::from_millis(RECONNECT_DELAY_MS)).await;
        ticker.reset();
    }
}

/// Poll `bridge` until the link faults
async fn run_link(
    bridge: &mut UartBridge,
    outbound: &OutboundInstructions,
    ticker: &mut Ticker,
) {
    let mut announced = false;
    let mut ticks: u32 = 0;

    loop {
        ticker.next().await;

        for _ in 0..MAX_POLLS_PER_TICK {
            match bridge.poll() {
                Ok(DispatchOutcome::Idle | DispatchOutcome::Handshaking) => break,
                Ok(DispatchOutcome::NoFrameYet) => {}
                Ok(DispatchOutcome::Dispatched(opcode)) => {
                    trace!("Dispatched {=u8:#x}", opcode);
                    let stats = bridge.data_mut();
                    stats.dispatched = stats.dispatched.wrapping_add(1);
                }
                Ok(DispatchOutcome::FrameDropped(_)) => {
                    let stats = bridge.data_mut();
                    stats.dropped = stats.dropped.wrapping_add(1);
                }
                Err(e) if e.is_link_fatal() => {
                    error!("Link fault: {}", e);
                    return;
                }
                Err(BridgeError::Io(e)) => {
                    warn!("UART error: {}", e);
                    break;
                }
                Err(_) => {
                    let stats = bridge.data_mut();
                    stats.handler_errors = stats.handler_errors.wrapping_add(1);
                }
            }
        }

        if !bridge.state().is_ready() {
            continue;
        }

        if !announced {
            info!("Link ready");
            let version = env!("CARGO_PKG_VERSION").as_bytes();
            if !send_ok(bridge.send(&outbound.hello, version)) {
                return;
            }
            announced = true;
        }

        ticks = ticks.wrapping_add(1);
        if ticks % STATS_INTERVAL_TICKS == 0 {
            let stats = *bridge.data();
            if !send_ok(bridge.send(&outbound.stats, &stats)) {
                return;
            }
        }
    }
}

/// Log a send result; returns false if the link is gone
fn send_ok(result: Result<(), BridgeError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) if e.is_link_fatal() => {
            error!("Link fault while sending: {}", e);
            false
        }
        Err(e) => {
            warn!("Send failed: {}", e);
            true
        }
    }
}
