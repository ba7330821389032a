use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt as _, StreamExt as _};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    time,
};
use tokio_util::codec::Framed;
use tracing::trace;

use super::{
    codec::ClientCodec,
    frame::{Request, RequestAdu},
    ModbusError, ProtocolError, Reader, Result,
};

/// Modbus RTU master over an arbitrary async transport, typically a serial
/// port. One request is in flight at a time; the response window is bounded
/// by `timeout`.
#[derive(Debug)]
pub struct Client<T> {
    framed: Framed<T, ClientCodec>,
    timeout: Duration,
}

impl<T> Client<T>
where
    T: AsyncRead + AsyncWrite + Send + Unpin,
{
    pub fn new(transport: T, timeout: Duration) -> Self {
        Client {
            framed: Framed::new(transport, ClientCodec),
            timeout,
        }
    }

    async fn call(&mut self, slave: u8, req: Request) -> Result<Vec<u16>> {
        trace!("slave {slave}: {req:?}");
        let req_function = req.function_code().value();

        // Stale bytes from an aborted exchange must not be read back as this
        // request's response.
        self.framed.read_buffer_mut().clear();

        self.framed.send(RequestAdu { slave, pdu: req }).await?;

        let adu = match time::timeout(self.timeout, self.framed.next()).await {
            Err(_) => return Err(ModbusError::Timeout),
            Ok(None) => {
                return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe).into());
            }
            // A frame the codec rejects (bad CRC, odd byte count) is line
            // noise, not a dead connection.
            Ok(Some(Err(e))) if e.kind() == std::io::ErrorKind::InvalidData => {
                return Err(ModbusError::Malformed(e.to_string()));
            }
            Ok(Some(res)) => res?,
        };

        if adu.slave != slave {
            return Err(ProtocolError::SlaveMismatch {
                requested: slave,
                answered: adu.slave,
            }
            .into());
        }

        match adu.pdu {
            Ok(response) => {
                let rsp_function = response.function_code().value();
                if rsp_function != req_function {
                    return Err(ProtocolError::FunctionMismatch {
                        requested: req_function,
                        answered: rsp_function,
                    }
                    .into());
                }
                Ok(response.into_words())
            }
            Err(exception) => Err(ModbusError::Exception(exception.exception)),
        }
    }
}

#[async_trait]
impl<T> Reader for Client<T>
where
    T: AsyncRead + AsyncWrite + Send + Unpin,
{
    async fn read_holding_registers(&mut self, slave: u8, addr: u16, cnt: u16) -> Result<Vec<u16>> {
        self.call(slave, Request::ReadHoldingRegisters(addr, cnt)).await
    }

    async fn read_input_registers(&mut self, slave: u8, addr: u16, cnt: u16) -> Result<Vec<u16>> {
        self.call(slave, Request::ReadInputRegisters(addr, cnt)).await
    }
}
