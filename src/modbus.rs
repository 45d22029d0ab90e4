use tokio_util::bytes::Buf;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

use crate::registers::Bank;

#[derive(Debug, Clone)]
pub struct Request {
    pub unit_id: u8,
    pub transaction_id: u16,
    pub operation: Operation,
}

#[derive(Debug, Clone)]
pub enum Operation {
    ReadRegisters { bank: Bank, address: u16, count: u16 },
    WriteRegisters { address: u16, values: Vec<u16> },
}

impl Operation {
    pub fn function_code(&self) -> u8 {
        match self {
            Operation::ReadRegisters { bank: Bank::Holding, .. } => 3,
            Operation::ReadRegisters { bank: Bank::Input, .. } => 4,
            Operation::WriteRegisters { .. } => 16,
        }
    }
}

#[derive(Debug)]
pub struct Response {
    pub unit_id: u8,
    pub transaction_id: u16,
    pub kind: ResponseKind,
}

impl Response {
    pub fn exception_code(&self) -> Option<u8> {
        match &self.kind {
            ResponseKind::ErrorCode(c) => Some(*c),
            ResponseKind::ReadRegisters { values: _ } => None,
            ResponseKind::WriteRegisters { .. } => None,
        }
    }
}

#[derive(Debug)]
pub enum ResponseKind {
    ErrorCode(u8),
    ReadRegisters { values: Vec<u16> },
    WriteRegisters { address: u16, words: u16 },
}

pub trait Codec:
    for<'a> Encoder<&'a Request, Error = std::io::Error>
    + Decoder<Item = Response, Error = std::io::Error>
{
}

fn registers_from_be(data: &[u8]) -> Vec<u16> {
    data.chunks_exact(2).map(|pair| u16::from_be_bytes([pair[0], pair[1]])).collect()
}

fn extend_pdu(dst: &mut tokio_util::bytes::BytesMut, operation: &Operation) {
    dst.extend([operation.function_code()]);
    match operation {
        Operation::ReadRegisters { bank: _, address, count } => {
            dst.extend(address.to_be_bytes());
            dst.extend(count.to_be_bytes());
        }
        Operation::WriteRegisters { address, values } => {
            dst.extend(address.to_be_bytes());
            dst.extend((values.len() as u16).to_be_bytes());
            dst.extend([(values.len() * 2) as u8]);
            for value in values {
                dst.extend(value.to_be_bytes());
            }
        }
    }
}

pub struct ModbusTcpCodec {}

impl Encoder<&Request> for ModbusTcpCodec {
    type Error = std::io::Error;
    fn encode(
        &mut self,
        req: &Request,
        dst: &mut tokio_util::bytes::BytesMut,
    ) -> Result<(), Self::Error> {
        let pdu_length: u16 = match &req.operation {
            Operation::ReadRegisters { .. } => 5,
            Operation::WriteRegisters { values, .. } => 6 + 2 * values.len() as u16,
        };
        dst.extend(req.transaction_id.to_be_bytes());
        dst.extend([0, 0]);
        dst.extend((pdu_length + 1).to_be_bytes());
        dst.extend([req.unit_id]);
        extend_pdu(dst, &req.operation);
        trace!(message="sending encoded", buffer=?dst);
        Ok(())
    }
}

impl Decoder for ModbusTcpCodec {
    type Item = Response;
    type Error = std::io::Error;
    fn decode(
        &mut self,
        src: &mut tokio_util::bytes::BytesMut,
    ) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            trace!(message="attempt at decoding", buffer=?src);
            if src.len() < 9 {
                return Ok(None);
            }
            let Some((tr_id_buffer, remainder)) = src.split_first_chunk::<2>() else {
                return Ok(None);
            };
            let transaction_id = u16::from_be_bytes(*tr_id_buffer);
            let Some((proto_buffer, remainder)) = remainder.split_first_chunk::<2>() else {
                return Ok(None);
            };
            if u16::from_be_bytes(*proto_buffer) != 0 {
                src.advance(1);
                continue;
            }
            let Some((length_buffer, remainder)) = remainder.split_first_chunk::<2>() else {
                return Ok(None);
            };
            let required_length = u16::from_be_bytes(*length_buffer);
            let Some((data, _)) = remainder.split_at_checked(required_length.into()) else {
                return Ok(None);
            };
            let [unit_id, function_code, code, ..] = data else {
                src.advance(1);
                continue;
            };
            let (unit_id, function_code, code) = (*unit_id, *function_code, *code);
            let kind = if function_code > 0x80 {
                ResponseKind::ErrorCode(code)
            } else {
                match function_code {
                    3 | 4 => {
                        // `code` holds the payload byte count here, but the MBAP
                        // header already carries a length and it is the one the
                        // frame was split by. No reason to consult this byte.
                        let [_, _, _, values @ ..] = data else { unreachable!() };
                        ResponseKind::ReadRegisters { values: registers_from_be(values) }
                    }
                    16 => {
                        let [_, _, a0, a1, w0, w1, ..] = data else {
                            src.advance(1);
                            continue;
                        };
                        ResponseKind::WriteRegisters {
                            address: u16::from_be_bytes([*a0, *a1]),
                            words: u16::from_be_bytes([*w0, *w1]),
                        }
                    }
                    _ => {
                        src.advance(1);
                        continue;
                    }
                }
            };
            src.advance(6 + usize::from(required_length));
            return Ok(Some(Response { unit_id, transaction_id, kind }));
        }
    }
}

impl Codec for ModbusTcpCodec {}

/// Modbus RTU framing, as spoken by the serial CTS602 gateways and their
/// RTU-over-TCP bridges.
///
/// RTU frames carry no transaction identifier. The link is half-duplex with a
/// single outstanding request, so the codec stamps decoded responses with the
/// identifier of the most recently encoded request.
pub struct ModbusRtuCodec {
    last_transaction_id: u16,
}

impl ModbusRtuCodec {
    pub fn new() -> Self {
        Self { last_transaction_id: 0 }
    }
}

impl Default for ModbusRtuCodec {
    fn default() -> Self {
        Self::new()
    }
}

pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for byte in data {
        crc ^= u16::from(*byte);
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0xA001 } else { crc >> 1 };
        }
    }
    crc
}

impl Encoder<&Request> for ModbusRtuCodec {
    type Error = std::io::Error;
    fn encode(
        &mut self,
        req: &Request,
        dst: &mut tokio_util::bytes::BytesMut,
    ) -> Result<(), Self::Error> {
        self.last_transaction_id = req.transaction_id;
        let start = dst.len();
        dst.extend([req.unit_id]);
        extend_pdu(dst, &req.operation);
        let crc = crc16(&dst[start..]);
        dst.extend(crc.to_le_bytes());
        trace!(message="sending encoded", buffer=?dst);
        Ok(())
    }
}

impl Decoder for ModbusRtuCodec {
    type Item = Response;
    type Error = std::io::Error;
    fn decode(
        &mut self,
        src: &mut tokio_util::bytes::BytesMut,
    ) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.len() < 5 {
                return Ok(None);
            }
            let unit_id = src[0];
            let function_code = src[1];
            let frame_length = if function_code > 0x80 {
                5
            } else {
                match function_code {
                    3 | 4 => 3 + usize::from(src[2]) + 2,
                    16 => 8,
                    _ => {
                        src.advance(1);
                        continue;
                    }
                }
            };
            if src.len() < frame_length {
                return Ok(None);
            }
            let (frame, crc_bytes) = src[..frame_length].split_at(frame_length - 2);
            let received_crc = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
            if crc16(frame) != received_crc {
                warn!(message = "crc mismatch, resynchronizing", unit_id, function_code);
                src.advance(1);
                continue;
            }
            let kind = if function_code > 0x80 {
                ResponseKind::ErrorCode(frame[2])
            } else {
                match function_code {
                    3 | 4 => ResponseKind::ReadRegisters { values: registers_from_be(&frame[3..]) },
                    16 => ResponseKind::WriteRegisters {
                        address: u16::from_be_bytes([frame[2], frame[3]]),
                        words: u16::from_be_bytes([frame[4], frame[5]]),
                    },
                    _ => unreachable!(),
                }
            };
            src.advance(frame_length);
            return Ok(Some(Response {
                unit_id,
                transaction_id: self.last_transaction_id,
                kind,
            }));
        }
    }
}

impl Codec for ModbusRtuCodec {}

/// One codec type per connection so that `Framed` stays non-generic over the
/// wire format the gateway happens to speak.
pub enum WireCodec {
    Tcp(ModbusTcpCodec),
    Rtu(ModbusRtuCodec),
}

impl Encoder<&Request> for WireCodec {
    type Error = std::io::Error;
    fn encode(
        &mut self,
        req: &Request,
        dst: &mut tokio_util::bytes::BytesMut,
    ) -> Result<(), Self::Error> {
        match self {
            WireCodec::Tcp(codec) => codec.encode(req, dst),
            WireCodec::Rtu(codec) => codec.encode(req, dst),
        }
    }
}

impl Decoder for WireCodec {
    type Item = Response;
    type Error = std::io::Error;
    fn decode(
        &mut self,
        src: &mut tokio_util::bytes::BytesMut,
    ) -> Result<Option<Self::Item>, Self::Error> {
        match self {
            WireCodec::Tcp(codec) => codec.decode(src),
            WireCodec::Rtu(codec) => codec.decode(src),
        }
    }
}

impl Codec for WireCodec {}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::bytes::BytesMut;

    fn read_request(bank: Bank, address: u16, count: u16) -> Request {
        Request {
            unit_id: 1,
            transaction_id: 7,
            operation: Operation::ReadRegisters { bank, address, count },
        }
    }

    #[test]
    fn tcp_read_request_frame() {
        let mut codec = ModbusTcpCodec {};
        let mut buffer = BytesMut::new();
        codec.encode(&read_request(Bank::Input, 0, 1), &mut buffer).unwrap();
        assert_eq!(&buffer[..], &[0, 7, 0, 0, 0, 6, 1, 4, 0, 0, 0, 1]);
    }

    #[test]
    fn tcp_write_request_frame() {
        let mut codec = ModbusTcpCodec {};
        let mut buffer = BytesMut::new();
        let request = Request {
            unit_id: 1,
            transaction_id: 2,
            operation: Operation::WriteRegisters { address: 1003, values: vec![4] },
        };
        codec.encode(&request, &mut buffer).unwrap();
        assert_eq!(&buffer[..], &[0, 2, 0, 0, 0, 9, 1, 16, 0x03, 0xEB, 0, 1, 2, 0, 4]);
    }

    #[test]
    fn tcp_response_decodes_registers() {
        let mut codec = ModbusTcpCodec {};
        let mut buffer = BytesMut::from(&[0, 7, 0, 0, 0, 5, 1, 4, 2, 0x08, 0x34][..]);
        let response = codec.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(response.transaction_id, 7);
        match response.kind {
            ResponseKind::ReadRegisters { values } => assert_eq!(values, vec![0x0834]),
            other => panic!("unexpected response {other:?}"),
        }
        assert!(buffer.is_empty());
    }

    #[test]
    fn tcp_response_decodes_exception() {
        let mut codec = ModbusTcpCodec {};
        let mut buffer = BytesMut::from(&[0, 9, 0, 0, 0, 3, 1, 0x84, 2][..]);
        let response = codec.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(response.exception_code(), Some(2));
    }

    #[test]
    fn tcp_partial_frame_waits_for_more() {
        let mut codec = ModbusTcpCodec {};
        let mut buffer = BytesMut::from(&[0, 7, 0, 0, 0, 5, 1, 4][..]);
        assert!(codec.decode(&mut buffer).unwrap().is_none());
    }

    #[test]
    fn rtu_read_request_frame() {
        let mut codec = ModbusRtuCodec::new();
        let mut buffer = BytesMut::new();
        codec.encode(&read_request(Bank::Input, 0, 1), &mut buffer).unwrap();
        assert_eq!(&buffer[..], &[1, 4, 0, 0, 0, 1, 0x31, 0xCA]);
    }

    #[test]
    fn rtu_write_request_frame() {
        let mut codec = ModbusRtuCodec::new();
        let mut buffer = BytesMut::new();
        let request = Request {
            unit_id: 1,
            transaction_id: 3,
            operation: Operation::WriteRegisters { address: 1003, values: vec![4] },
        };
        codec.encode(&request, &mut buffer).unwrap();
        assert_eq!(&buffer[..], &[1, 16, 0x03, 0xEB, 0, 1, 2, 0, 4, 0x83, 0x88]);
    }

    #[test]
    fn rtu_response_carries_last_transaction_id() {
        let mut codec = ModbusRtuCodec::new();
        let mut scratch = BytesMut::new();
        codec.encode(&read_request(Bank::Input, 512, 1), &mut scratch).unwrap();

        let mut buffer = BytesMut::from(&[1, 4, 2, 0x00, 0x2C, 0xB8, 0xED][..]);
        let response = codec.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(response.transaction_id, 7);
        match response.kind {
            ResponseKind::ReadRegisters { values } => assert_eq!(values, vec![44]),
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn rtu_write_ack_frame() {
        let mut codec = ModbusRtuCodec::new();
        let mut buffer = BytesMut::from(&[1, 16, 0x03, 0xEB, 0, 1, 0x71, 0xB9][..]);
        let response = codec.decode(&mut buffer).unwrap().unwrap();
        match response.kind {
            ResponseKind::WriteRegisters { address, words } => {
                assert_eq!((address, words), (1003, 1));
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn rtu_exception_frame() {
        let mut codec = ModbusRtuCodec::new();
        let mut buffer = BytesMut::from(&[1, 0x84, 2, 0xC2, 0xC1][..]);
        let response = codec.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(response.exception_code(), Some(2));
    }

    #[test]
    fn rtu_resynchronizes_past_garbage_prefix() {
        let mut codec = ModbusRtuCodec::new();
        let mut buffer = BytesMut::from(&[0xFF, 1, 4, 2, 0x00, 0x2C, 0xB8, 0xED][..]);
        let response = codec.decode(&mut buffer).unwrap().unwrap();
        match response.kind {
            ResponseKind::ReadRegisters { values } => assert_eq!(values, vec![44]),
            other => panic!("unexpected response {other:?}"),
        }
    }
}
