use super::{Exception, FunctionCode};

/// A request from the master to one slave on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Starting address and quantity of holding registers to read.
    ReadHoldingRegisters(u16, u16),
    /// Starting address and quantity of input registers to read.
    ReadInputRegisters(u16, u16),
}

impl Request {
    pub const fn function_code(&self) -> FunctionCode {
        match self {
            Request::ReadHoldingRegisters(_, _) => FunctionCode::ReadHoldingRegisters,
            Request::ReadInputRegisters(_, _) => FunctionCode::ReadInputRegisters,
        }
    }
}

/// A successful response: the register words, in big-endian word order as
/// they arrived on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    ReadHoldingRegisters(Vec<u16>),
    ReadInputRegisters(Vec<u16>),
}

impl Response {
    pub const fn function_code(&self) -> FunctionCode {
        match self {
            Response::ReadHoldingRegisters(_) => FunctionCode::ReadHoldingRegisters,
            Response::ReadInputRegisters(_) => FunctionCode::ReadInputRegisters,
        }
    }

    pub fn into_words(self) -> Vec<u16> {
        match self {
            Response::ReadHoldingRegisters(words) | Response::ReadInputRegisters(words) => words,
        }
    }
}

/// An exception response echoes the function code with the high bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionResponse {
    pub function: u8,
    pub exception: Exception,
}

/// Request ADU: slave address plus PDU; the codec appends the CRC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestAdu {
    pub slave: u8,
    pub pdu: Request,
}

/// Response ADU as decoded off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseAdu {
    pub slave: u8,
    pub pdu: std::result::Result<Response, ExceptionResponse>,
}
