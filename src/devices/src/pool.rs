use std::{collections::HashMap, time::Duration};

use protocol::modbus::Client;
use tokio_serial::{SerialPort as _, SerialStream};
use tracing::{info, warn};
use types::Device;

/// One live serial connection per physical port. The pool is owned by the
/// engine task and only that task opens, hands out, or closes connections.
#[derive(Debug)]
pub struct PortPool {
    conns: HashMap<String, Client<SerialStream>>,
    timeout: Duration,
}

impl PortPool {
    pub fn new(timeout: Duration) -> Self {
        PortPool {
            conns: HashMap::new(),
            timeout,
        }
    }

    /// Opens one connection per distinct port among the enabled devices,
    /// configured from the first device on each port. A port that fails to
    /// open is logged and left out; its devices fail per-poll instead of
    /// taking the process down.
    pub fn initialize(&mut self, devices: &[Device]) {
        for device in first_per_port(devices) {
            match open_serial(device) {
                Ok(stream) => {
                    info!("connected to port {}", device.port);
                    self.conns
                        .insert(device.port.clone(), Client::new(stream, self.timeout));
                }
                Err(e) => {
                    warn!("failed to open port {}: {e}", device.port);
                }
            }
        }
    }

    /// Full teardown and rebuild. Serial parameter changes on any device
    /// invalidate its port's connection, so no incremental diffing.
    pub fn reinitialize(&mut self, devices: &[Device]) {
        self.shutdown();
        self.initialize(devices);
    }

    /// Dropping a `SerialStream` closes the descriptor; close failures have
    /// nowhere to go and are ignored, as they were in every predecessor.
    pub fn shutdown(&mut self) {
        self.conns.clear();
    }

    pub fn get_mut(&mut self, port: &str) -> Option<&mut Client<SerialStream>> {
        self.conns.get_mut(port)
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }
}

/// The first enabled device on each distinct port, in configuration order;
/// its serial parameters govern the shared connection.
fn first_per_port(devices: &[Device]) -> Vec<&Device> {
    let mut firsts: Vec<&Device> = Vec::new();
    for device in devices.iter().filter(|d| d.enabled) {
        if !firsts.iter().any(|d| d.port == device.port) {
            firsts.push(device);
        }
    }
    firsts
}

fn open_serial(device: &Device) -> tokio_serial::Result<SerialStream> {
    let builder = tokio_serial::new(&device.port, device.baud_rate);
    let mut stream = SerialStream::open(&builder)?;

    stream.set_data_bits(match device.data_bits {
        types::DataBits::Five => tokio_serial::DataBits::Five,
        types::DataBits::Six => tokio_serial::DataBits::Six,
        types::DataBits::Seven => tokio_serial::DataBits::Seven,
        types::DataBits::Eight => tokio_serial::DataBits::Eight,
    })?;

    stream.set_stop_bits(match device.stop_bits {
        types::StopBits::One => tokio_serial::StopBits::One,
        types::StopBits::Two => tokio_serial::StopBits::Two,
    })?;

    stream.set_parity(match device.parity {
        types::Parity::None => tokio_serial::Parity::None,
        types::Parity::Odd => tokio_serial::Parity::Odd,
        types::Parity::Even => tokio_serial::Parity::Even,
    })?;

    Ok(stream)
}
