use std::time::Duration;

use futures::{SinkExt as _, StreamExt as _};
use tokio::io::AsyncWriteExt as _;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, trace};

use crate::modbus::{self, ModbusRtuCodec, ModbusTcpCodec, ResponseKind, WireCodec};
use crate::registers::Bank;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("lookup of `{1}` failed")]
    LookupHost(#[source] std::io::Error, String),
    #[error("could not connect to `{1}` over TCP")]
    Connect(#[source] std::io::Error, String),
    #[error("the connection is not open")]
    NotConnected,
    #[error("could not send out the request")]
    Send(#[source] std::io::Error),
    #[error("could not read data from the stream")]
    Receive(#[source] std::io::Error),
    #[error("the connection was closed by the peer")]
    Closed,
    #[error("no response arrived within {0:?}")]
    Timeout(Duration),
    #[error("device responded with modbus exception code {0}")]
    Exception(u8),
    #[error("response does not answer the request that was sent")]
    UnexpectedResponse,
    #[error("could not shut down the connection")]
    Shutdown(#[source] std::io::Error),
}

/// The request/response primitives the device session is built on.
///
/// The session never opens sockets itself; anything that can move register
/// ranges back and forth can stand in here, including the in-memory fakes the
/// tests use.
pub trait Transport {
    fn connect(&mut self) -> impl Future<Output = Result<(), Error>>;
    fn read_registers(
        &mut self,
        unit_id: u8,
        bank: Bank,
        address: u16,
        count: u16,
    ) -> impl Future<Output = Result<Vec<u16>, Error>>;
    fn write_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        values: Vec<u16>,
    ) -> impl Future<Output = Result<(), Error>>;
    fn close(&mut self) -> impl Future<Output = Result<(), Error>>;
}

/// Wire framing spoken by the gateway on the other end of the socket.
///
/// The CTS602 gateways come in two flavours: plain Modbus TCP, and serial RTU
/// frames tunneled verbatim through a TCP socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Tcp,
    Rtu,
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub framing: Framing,
    /// If the response isn't received in this amount of time, consider the
    /// request failed. Retrying is the caller's decision.
    pub response_timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16, framing: Framing) -> Self {
        Self { host: host.into(), port, framing, response_timeout: Duration::from_secs(1) }
    }
}

/// A single half-duplex Modbus channel over one TCP socket.
///
/// The CTS602 protocol has no multiplexing: exactly one request may be
/// outstanding, so a round trip is a plain send followed by an await for the
/// matching transaction, and anything stale left over from a timed-out
/// request is skipped by its identifier.
pub struct TcpConnection {
    config: ConnectionConfig,
    io: Option<Framed<TcpStream, WireCodec>>,
    transaction_id_generator: u16,
}

impl TcpConnection {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config, io: None, transaction_id_generator: 0 }
    }

    fn new_transaction_id(&mut self) -> u16 {
        self.transaction_id_generator = self.transaction_id_generator.wrapping_add(1);
        self.transaction_id_generator
    }

    async fn round_trip(
        &mut self,
        unit_id: u8,
        operation: modbus::Operation,
    ) -> Result<modbus::Response, Error> {
        let transaction_id = self.new_transaction_id();
        let io = self.io.as_mut().ok_or(Error::NotConnected)?;
        let request = modbus::Request { unit_id, transaction_id, operation };
        io.send(&request).await.map_err(Error::Send)?;
        let timeout = self.config.response_timeout;
        loop {
            let response = tokio::time::timeout(timeout, io.next())
                .await
                .map_err(|_| Error::Timeout(timeout))?
                .ok_or(Error::Closed)?
                .map_err(Error::Receive)?;
            if response.transaction_id != transaction_id {
                debug!(
                    message = "a response we were not expecting",
                    transaction = response.transaction_id
                );
                continue;
            }
            if let Some(code) = response.exception_code() {
                return Err(Error::Exception(code));
            }
            return Ok(response);
        }
    }
}

impl Transport for TcpConnection {
    async fn connect(&mut self) -> Result<(), Error> {
        let address = format!("{}:{}", self.config.host, self.config.port);
        info!(message = "connecting...", address);
        let addresses = tokio::net::lookup_host(&address)
            .await
            .map_err(|e| Error::LookupHost(e, address.clone()))?
            .collect::<Vec<_>>();
        debug!(message = "resolved", ?addresses);
        let socket = TcpStream::connect(&*addresses)
            .await
            .map_err(|e| Error::Connect(e, address))?;
        let nodelay_result = socket.set_nodelay(true);
        trace!(message = "setting nodelay", is_error = ?nodelay_result.err());
        info!(message = "connected");
        let codec = match self.config.framing {
            Framing::Tcp => WireCodec::Tcp(ModbusTcpCodec {}),
            Framing::Rtu => WireCodec::Rtu(ModbusRtuCodec::new()),
        };
        self.io = Some(Framed::new(socket, codec));
        Ok(())
    }

    async fn read_registers(
        &mut self,
        unit_id: u8,
        bank: Bank,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, Error> {
        let operation = modbus::Operation::ReadRegisters { bank, address, count };
        let response = self.round_trip(unit_id, operation).await?;
        match response.kind {
            ResponseKind::ReadRegisters { values } => Ok(values),
            _ => Err(Error::UnexpectedResponse),
        }
    }

    async fn write_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        values: Vec<u16>,
    ) -> Result<(), Error> {
        let operation = modbus::Operation::WriteRegisters { address, values };
        let response = self.round_trip(unit_id, operation).await?;
        match response.kind {
            ResponseKind::WriteRegisters { .. } => Ok(()),
            _ => Err(Error::UnexpectedResponse),
        }
    }

    async fn close(&mut self) -> Result<(), Error> {
        if let Some(io) = self.io.take() {
            let mut socket = io.into_inner();
            socket.shutdown().await.map_err(Error::Shutdown)?;
        }
        Ok(())
    }
}
