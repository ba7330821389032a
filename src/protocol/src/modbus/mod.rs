//! Modbus RTU master, scoped to register reads. The slave id travels with
//! every request instead of living on the connection: the bus address is a
//! shared-port setting and must never be assumed to persist between devices.

use std::{fmt, io};

use async_trait::async_trait;

pub mod client;
pub(crate) mod codec;
pub mod frame;

pub use client::Client;
pub use frame::{Request, Response};

pub type Result<T> = std::result::Result<T, ModbusError>;

/// `Transport` means the connection itself is gone; everything else leaves
/// the connection usable for the next request.
#[derive(Debug, thiserror::Error)]
pub enum ModbusError {
    #[error("transport: {0}")]
    Transport(#[from] io::Error),
    #[error("{0}")]
    Protocol(#[from] ProtocolError),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("device exception: {0}")]
    Exception(Exception),
    #[error("response timeout")]
    Timeout,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("slave id mismatch: requested {requested}, answered {answered}")]
    SlaveMismatch { requested: u8, answered: u8 },
    #[error("function code mismatch: requested {requested:#04x}, answered {answered:#04x}")]
    FunctionMismatch { requested: u8, answered: u8 },
}

/// A Modbus function code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionCode {
    /// Modbus Function Code: `03` (`0x03`).
    ReadHoldingRegisters,
    /// Modbus Function Code: `04` (`0x04`).
    ReadInputRegisters,
}

impl FunctionCode {
    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            FunctionCode::ReadHoldingRegisters => 0x03,
            FunctionCode::ReadInputRegisters => 0x04,
        }
    }
}

/// A Modbus exception code carried in an exception response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    ServerDeviceFailure,
    Acknowledge,
    ServerDeviceBusy,
    MemoryParityError,
    GatewayPathUnavailable,
    GatewayTargetDevice,
    Custom(u8),
}

impl From<u8> for Exception {
    fn from(code: u8) -> Self {
        match code {
            0x01 => Exception::IllegalFunction,
            0x02 => Exception::IllegalDataAddress,
            0x03 => Exception::IllegalDataValue,
            0x04 => Exception::ServerDeviceFailure,
            0x05 => Exception::Acknowledge,
            0x06 => Exception::ServerDeviceBusy,
            0x08 => Exception::MemoryParityError,
            0x0A => Exception::GatewayPathUnavailable,
            0x0B => Exception::GatewayTargetDevice,
            code => Exception::Custom(code),
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exception::IllegalFunction => write!(f, "illegal function"),
            Exception::IllegalDataAddress => write!(f, "illegal data address"),
            Exception::IllegalDataValue => write!(f, "illegal data value"),
            Exception::ServerDeviceFailure => write!(f, "server device failure"),
            Exception::Acknowledge => write!(f, "acknowledge"),
            Exception::ServerDeviceBusy => write!(f, "server device busy"),
            Exception::MemoryParityError => write!(f, "memory parity error"),
            Exception::GatewayPathUnavailable => write!(f, "gateway path unavailable"),
            Exception::GatewayTargetDevice => write!(f, "gateway target device failed to respond"),
            Exception::Custom(code) => write!(f, "exception code {code:#04x}"),
        }
    }
}

/// Asynchronous Modbus register reader. The seam the poller works against;
/// `Client` implements it over a real transport, tests script it.
#[async_trait]
pub trait Reader: Send {
    /// Read multiple holding registers (0x03).
    async fn read_holding_registers(&mut self, slave: u8, addr: u16, cnt: u16) -> Result<Vec<u16>>;

    /// Read multiple input registers (0x04).
    async fn read_input_registers(&mut self, slave: u8, addr: u16, cnt: u16) -> Result<Vec<u16>>;
}
