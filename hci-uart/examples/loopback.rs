//! Loopback example: an H4 session over an in-memory channel.
//!
//! This example shows how to:
//! - Register a protocol and open a session on a port
//! - Bind the protocol through the numeric control commands
//! - Send a command frame through the upper device
//! - Feed inbound bytes and watch reassembled frames arrive
//!
//! Run with: cargo run --example loopback

use std::sync::Arc;

use log::info;

use hci_uart::channel::RecordingChannel;
use hci_uart::dispatch::LocalDispatcher;
use hci_uart::ioctl::{HCIUARTGETDEVICE, HCIUARTSETPROTO};
use hci_uart::protocol::{H4, HCI_UART_H4};
use hci_uart::{Config, Frame, FrameType, Port, Registry};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();

    let registry = Arc::new(Registry::new());
    registry.register(HCI_UART_H4, Arc::new(H4::new()))?;

    let channel = Arc::new(RecordingChannel::new());
    let dispatcher = Arc::new(LocalDispatcher::new());
    let port = Port::new(channel.clone());

    let session = port.open_session(registry.clone(), dispatcher.clone(), Config::default())?;
    port.ioctl(HCIUARTSETPROTO, HCI_UART_H4)?;
    let device_id = port.ioctl(HCIUARTGETDEVICE, 0)? as u16;
    dispatcher.open_device(device_id)?;
    info!("bound H4, upper device {}", device_id);

    // HCI_Reset, with the channel taking two bytes per write
    channel.script_accepts(&[2]);
    dispatcher.submit(device_id, Frame::new(FrameType::Command, vec![0x03, 0x0c, 0x00]))?;
    info!("held after short write: {} bytes", session.held_len());
    port.write_wakeup();
    info!("wire bytes: {:02x?}", channel.written());

    // Command Complete for HCI_Reset, split across two reads
    port.receive(&[0x04, 0x0e, 0x04]);
    port.receive(&[0x01, 0x03, 0x0c, 0x00]);
    for frame in dispatcher.received(device_id) {
        info!("received {:?}: {:02x?}", frame.category(), frame.remaining());
    }

    if let Some(stats) = session.stats() {
        info!("=== Device Statistics ===");
        info!("byte_tx: {}, byte_rx: {}", stats.byte_tx, stats.byte_rx);
        info!("cmd_tx: {}, acl_tx: {}, sco_tx: {}", stats.cmd_tx, stats.acl_tx, stats.sco_tx);
    }

    port.close();
    info!("session closed, devices left: {:?}", dispatcher.device_ids());
    Ok(())
}
