//! Modbus/TCP framing.
//!
//! Only the function codes the register client needs: bit and word reads
//! (FC01-FC04), single coil and register writes (FC05, FC06) and multi
//! register writes (FC16). A frame is the 7-byte MBAP header followed by the
//! PDU:
//!
//! ```text
//! | transaction id (2) | protocol id = 0 (2) | length (2) | unit id (1) | PDU ... |
//! ```
//!
//! `length` counts the unit id plus the PDU.

use thiserror::Error;

pub const MBAP_HEADER_LEN: usize = 7;

/// Largest PDU allowed by the Modbus application protocol.
pub const MAX_PDU_LEN: usize = 253;

pub const READ_COILS: u8 = 0x01;
pub const READ_DISCRETE_INPUTS: u8 = 0x02;
pub const READ_HOLDING_REGISTERS: u8 = 0x03;
pub const READ_INPUT_REGISTERS: u8 = 0x04;
pub const WRITE_SINGLE_COIL: u8 = 0x05;
pub const WRITE_SINGLE_REGISTER: u8 = 0x06;
pub const WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

const EXCEPTION_BIT: u8 = 0x80;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModbusError {
    #[error("exception {code:#04x} ({}) for function {function:#04x}", exception_name(.code))]
    Exception { function: u8, code: u8 },

    #[error("expected function {expected:#04x}, got {got:#04x}")]
    UnexpectedFunction { expected: u8, got: u8 },

    #[error("malformed frame: {0}")]
    Malformed(String),
}

fn exception_name(code: &u8) -> &'static str {
    match *code {
        0x01 => "illegal function",
        0x02 => "illegal data address",
        0x03 => "illegal data value",
        0x04 => "server device failure",
        0x05 => "acknowledge",
        0x06 => "server device busy",
        0x0A => "gateway path unavailable",
        0x0B => "gateway target failed to respond",
        _ => "unknown",
    }
}

/// One request PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// FC01 or FC02.
    ReadBits { function: u8, address: u16, count: u16 },
    /// FC03 or FC04.
    ReadWords { function: u8, address: u16, count: u16 },
    WriteCoil { address: u16, value: bool },
    WriteRegister { address: u16, value: u16 },
    WriteRegisters { address: u16, values: Vec<u16> },
}

impl Request {
    pub fn function(&self) -> u8 {
        match self {
            Request::ReadBits { function, .. } | Request::ReadWords { function, .. } => *function,
            Request::WriteCoil { .. } => WRITE_SINGLE_COIL,
            Request::WriteRegister { .. } => WRITE_SINGLE_REGISTER,
            Request::WriteRegisters { .. } => WRITE_MULTIPLE_REGISTERS,
        }
    }

    pub fn encode_pdu(&self) -> Vec<u8> {
        let mut pdu = vec![self.function()];
        match self {
            Request::ReadBits { address, count, .. } | Request::ReadWords { address, count, .. } => {
                pdu.extend_from_slice(&address.to_be_bytes());
                pdu.extend_from_slice(&count.to_be_bytes());
            }
            Request::WriteCoil { address, value } => {
                pdu.extend_from_slice(&address.to_be_bytes());
                let word: u16 = if *value { 0xFF00 } else { 0x0000 };
                pdu.extend_from_slice(&word.to_be_bytes());
            }
            Request::WriteRegister { address, value } => {
                pdu.extend_from_slice(&address.to_be_bytes());
                pdu.extend_from_slice(&value.to_be_bytes());
            }
            Request::WriteRegisters { address, values } => {
                pdu.extend_from_slice(&address.to_be_bytes());
                pdu.extend_from_slice(&(values.len() as u16).to_be_bytes());
                pdu.push((values.len() * 2) as u8);
                for value in values {
                    pdu.extend_from_slice(&value.to_be_bytes());
                }
            }
        }
        pdu
    }

    /// Full ADU: MBAP header plus PDU.
    pub fn encode_frame(&self, transaction_id: u16, unit_id: u8) -> Vec<u8> {
        let pdu = self.encode_pdu();
        let mut frame = Vec::with_capacity(MBAP_HEADER_LEN + pdu.len());
        frame.extend_from_slice(&transaction_id.to_be_bytes());
        frame.extend_from_slice(&0u16.to_be_bytes());
        frame.extend_from_slice(&((pdu.len() + 1) as u16).to_be_bytes());
        frame.push(unit_id);
        frame.extend_from_slice(&pdu);
        frame
    }

    /// Decode the response PDU to this request.
    pub fn decode_response(&self, pdu: &[u8]) -> Result<Response, ModbusError> {
        let function = self.function();
        let Some(&got) = pdu.first() else {
            return Err(ModbusError::Malformed("empty response".to_string()));
        };
        if got == function | EXCEPTION_BIT {
            let code = pdu.get(1).copied().unwrap_or(0);
            return Err(ModbusError::Exception { function, code });
        }
        if got != function {
            return Err(ModbusError::UnexpectedFunction {
                expected: function,
                got,
            });
        }

        match self {
            Request::ReadBits { count, .. } => {
                let data = counted_payload(pdu)?;
                let count = usize::from(*count);
                if data.len() * 8 < count {
                    return Err(ModbusError::Malformed(format!(
                        "{} bytes cannot hold {} bits",
                        data.len(),
                        count
                    )));
                }
                Ok(Response::Bits(
                    (0..count).map(|i| data[i / 8] & (1 << (i % 8)) != 0).collect(),
                ))
            }
            Request::ReadWords { count, .. } => {
                let data = counted_payload(pdu)?;
                if data.len() != usize::from(*count) * 2 {
                    return Err(ModbusError::Malformed(format!(
                        "expected {} registers, got {} bytes",
                        count,
                        data.len()
                    )));
                }
                Ok(Response::Words(
                    data.chunks_exact(2)
                        .map(|w| u16::from_be_bytes([w[0], w[1]]))
                        .collect(),
                ))
            }
            _ => {
                if pdu.len() != 5 {
                    return Err(ModbusError::Malformed(format!(
                        "write echo is {} bytes",
                        pdu.len()
                    )));
                }
                Ok(Response::Written)
            }
        }
    }
}

fn counted_payload(pdu: &[u8]) -> Result<&[u8], ModbusError> {
    let byte_count = pdu
        .get(1)
        .map(|&n| usize::from(n))
        .ok_or_else(|| ModbusError::Malformed("missing byte count".to_string()))?;
    pdu.get(2..2 + byte_count).ok_or_else(|| {
        ModbusError::Malformed(format!(
            "byte count {} exceeds payload of {}",
            byte_count,
            pdu.len().saturating_sub(2)
        ))
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Bits(Vec<bool>),
    Words(Vec<u16>),
    Written,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    /// Unit id plus PDU length.
    pub length: u16,
    pub unit_id: u8,
}

impl MbapHeader {
    pub fn parse(bytes: &[u8; MBAP_HEADER_LEN]) -> Result<Self, ModbusError> {
        let header = Self {
            transaction_id: u16::from_be_bytes([bytes[0], bytes[1]]),
            protocol_id: u16::from_be_bytes([bytes[2], bytes[3]]),
            length: u16::from_be_bytes([bytes[4], bytes[5]]),
            unit_id: bytes[6],
        };
        if header.protocol_id != 0 {
            return Err(ModbusError::Malformed(format!(
                "protocol id {} is not Modbus",
                header.protocol_id
            )));
        }
        if header.length < 2 || usize::from(header.length) > MAX_PDU_LEN + 1 {
            return Err(ModbusError::Malformed(format!(
                "length field {} out of bounds",
                header.length
            )));
        }
        Ok(header)
    }

    pub fn pdu_len(&self) -> usize {
        usize::from(self.length) - 1
    }
}

/// f32 as two registers, high word first.
pub fn f32_to_words(value: f32) -> [u16; 2] {
    let bits = value.to_bits();
    [(bits >> 16) as u16, bits as u16]
}

pub fn words_to_f32(words: [u16; 2]) -> f32 {
    f32::from_bits((u32::from(words[0]) << 16) | u32::from(words[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_holding_frame_layout() {
        let request = Request::ReadWords {
            function: READ_HOLDING_REGISTERS,
            address: 0x006B,
            count: 3,
        };
        assert_eq!(
            request.encode_frame(0x0001, 0x11),
            vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x11, 0x03, 0x00, 0x6B, 0x00, 0x03]
        );
    }

    #[test]
    fn write_coil_uses_ff00_for_on() {
        let on = Request::WriteCoil { address: 0x00AC, value: true };
        assert_eq!(on.encode_pdu(), vec![0x05, 0x00, 0xAC, 0xFF, 0x00]);
        let off = Request::WriteCoil { address: 0x00AC, value: false };
        assert_eq!(off.encode_pdu(), vec![0x05, 0x00, 0xAC, 0x00, 0x00]);
    }

    #[test]
    fn write_registers_carries_byte_count() {
        let request = Request::WriteRegisters {
            address: 1,
            values: vec![0x000A, 0x0102],
        };
        assert_eq!(
            request.encode_pdu(),
            vec![0x10, 0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02]
        );
    }

    #[test]
    fn bits_are_lsb_first() {
        let request = Request::ReadBits {
            function: READ_COILS,
            address: 0x13,
            count: 10,
        };
        let response = request.decode_response(&[0x01, 0x02, 0xCD, 0x01]).unwrap();
        assert_eq!(
            response,
            Response::Bits(vec![true, false, true, true, false, false, true, true, true, false])
        );
    }

    #[test]
    fn exception_response() {
        let request = Request::ReadWords {
            function: READ_INPUT_REGISTERS,
            address: 0,
            count: 1,
        };
        let err = request.decode_response(&[0x84, 0x02]).unwrap_err();
        assert_eq!(err, ModbusError::Exception { function: 0x04, code: 0x02 });
        assert!(err.to_string().contains("illegal data address"));
    }

    #[test]
    fn short_register_payload_is_malformed() {
        let request = Request::ReadWords {
            function: READ_HOLDING_REGISTERS,
            address: 0,
            count: 2,
        };
        assert!(matches!(
            request.decode_response(&[0x03, 0x04, 0x00, 0x01]),
            Err(ModbusError::Malformed(_))
        ));
        assert!(matches!(
            request.decode_response(&[0x06, 0x00]),
            Err(ModbusError::UnexpectedFunction { .. })
        ));
    }

    #[test]
    fn header_rejects_foreign_protocol() {
        assert!(MbapHeader::parse(&[0, 1, 0, 1, 0, 3, 1]).is_err());
        let header = MbapHeader::parse(&[0, 1, 0, 0, 0, 3, 1]).unwrap();
        assert_eq!(header.pdu_len(), 2);
    }

    #[test]
    fn float_word_order() {
        assert_eq!(f32_to_words(1.0), [0x3F80, 0x0000]);
        assert_eq!(words_to_f32([0x4248, 0x0000]), 50.0);
    }
}
