//! Real register-family client: Modbus/TCP to the process controller.
//!
//! Native addresses are register *names*; the hardware config's register
//! table resolves each name to a data-model table and address.

use super::modbus::{
    f32_to_words, words_to_f32, MbapHeader, ModbusError, Request, Response, MBAP_HEADER_LEN,
    READ_COILS, READ_DISCRETE_INPUTS, READ_HOLDING_REGISTERS, READ_INPUT_REGISTERS,
};
use crate::config::{PlcConfig, RegisterDef, RegisterKind};
use async_trait::async_trait;
use mcs_core::{HardwareClient, HardwareError, HardwareErrorKind, TagValue, Transport};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

fn error(kind: HardwareErrorKind, message: impl Into<String>) -> HardwareError {
    HardwareError::new(Transport::Register, kind, message)
}

impl From<ModbusError> for HardwareError {
    fn from(err: ModbusError) -> Self {
        error(HardwareErrorKind::Protocol, err.to_string())
    }
}

pub struct PlcClient {
    config: PlcConfig,
    stream: Mutex<Option<TcpStream>>,
    connected: AtomicBool,
    transaction_id: AtomicU16,
}

impl PlcClient {
    pub fn new(config: PlcConfig) -> Self {
        Self {
            config,
            stream: Mutex::new(None),
            connected: AtomicBool::new(false),
            transaction_id: AtomicU16::new(0),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    fn register(&self, name: &str) -> Result<RegisterDef, HardwareError> {
        self.config.registers.get(name).copied().ok_or_else(|| {
            error(
                HardwareErrorKind::InvalidAddress,
                format!("register {} is not in the register table", name),
            )
        })
    }

    /// One request/response exchange. An I/O failure, a timeout or a frame
    /// that cannot be trusted drops the socket; the client reports
    /// disconnected until the next `connect`.
    async fn transact(&self, request: Request) -> Result<Response, HardwareError> {
        let mut slot = self.stream.lock().await;
        let stream = slot
            .as_mut()
            .ok_or_else(|| HardwareError::not_connected(Transport::Register))?;

        let transaction_id = self.transaction_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let frame = request.encode_frame(transaction_id, self.config.unit_id);

        let exchange = async {
            stream.write_all(&frame).await?;
            let mut header = [0u8; MBAP_HEADER_LEN];
            stream.read_exact(&mut header).await?;
            Ok::<_, std::io::Error>(header)
        };

        let header = match timeout(self.config.timeout(), exchange).await {
            Ok(Ok(header)) => header,
            Ok(Err(e)) => {
                self.drop_stream(&mut slot);
                return Err(error(HardwareErrorKind::Io, e.to_string()));
            }
            Err(_) => {
                self.drop_stream(&mut slot);
                return Err(error(
                    HardwareErrorKind::Timeout,
                    format!("no response from {} within {:?}", self.endpoint(), self.config.timeout()),
                ));
            }
        };

        let header = match MbapHeader::parse(&header) {
            Ok(header) => header,
            Err(e) => {
                self.drop_stream(&mut slot);
                return Err(e.into());
            }
        };
        let mut pdu = vec![0u8; header.pdu_len()];
        let Some(stream) = slot.as_mut() else {
            return Err(HardwareError::not_connected(Transport::Register));
        };
        match timeout(self.config.timeout(), stream.read_exact(&mut pdu)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                self.drop_stream(&mut slot);
                return Err(error(HardwareErrorKind::Io, e.to_string()));
            }
            Err(_) => {
                self.drop_stream(&mut slot);
                return Err(error(HardwareErrorKind::Timeout, "truncated response"));
            }
        }

        if header.transaction_id != transaction_id {
            self.drop_stream(&mut slot);
            return Err(error(
                HardwareErrorKind::Protocol,
                format!(
                    "transaction id mismatch: sent {}, got {}",
                    transaction_id, header.transaction_id
                ),
            ));
        }
        if header.unit_id != self.config.unit_id {
            self.drop_stream(&mut slot);
            return Err(error(
                HardwareErrorKind::Protocol,
                format!("response from unit {}", header.unit_id),
            ));
        }

        Ok(request.decode_response(&pdu)?)
    }

    fn drop_stream(&self, slot: &mut Option<TcpStream>) {
        *slot = None;
        self.connected.store(false, Ordering::SeqCst);
        tracing::warn!("Register controller link {} dropped", self.endpoint());
    }
}

fn single_bit(response: Response) -> Result<TagValue, HardwareError> {
    match response {
        Response::Bits(bits) if !bits.is_empty() => Ok(TagValue::Bool(bits[0])),
        other => Err(error(HardwareErrorKind::Protocol, format!("unexpected response {:?}", other))),
    }
}

fn expect_words(response: Response, count: usize) -> Result<Vec<u16>, HardwareError> {
    match response {
        Response::Words(words) if words.len() == count => Ok(words),
        other => Err(error(HardwareErrorKind::Protocol, format!("unexpected response {:?}", other))),
    }
}

fn to_word(name: &str, value: &TagValue) -> Result<u16, HardwareError> {
    let number = match value {
        TagValue::Bool(b) => Some(f64::from(u8::from(*b))),
        other => other.as_f64(),
    };
    number
        .filter(|n| n.fract() == 0.0 && (0.0..=f64::from(u16::MAX)).contains(n))
        .map(|n| n as u16)
        .ok_or_else(|| {
            error(
                HardwareErrorKind::Protocol,
                format!("register {} takes an integer 0..=65535, got {}", name, value),
            )
        })
}

#[async_trait]
impl HardwareClient for PlcClient {
    fn transport(&self) -> Transport {
        Transport::Register
    }

    async fn connect(&self) -> Result<(), HardwareError> {
        let endpoint = self.endpoint();
        let stream = timeout(self.config.timeout(), TcpStream::connect(endpoint.as_str()))
            .await
            .map_err(|_| {
                error(
                    HardwareErrorKind::Timeout,
                    format!("connection to {} timed out", endpoint),
                )
            })?
            .map_err(|e| {
                error(
                    HardwareErrorKind::Connection,
                    format!("failed to connect to {}: {}", endpoint, e),
                )
            })?;
        stream
            .set_nodelay(true)
            .map_err(|e| error(HardwareErrorKind::Io, e.to_string()))?;

        *self.stream.lock().await = Some(stream);
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!(
            "Connected to register controller at {} (unit {})",
            endpoint,
            self.config.unit_id
        );
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), HardwareError> {
        let stream = self.stream.lock().await.take();
        self.connected.store(false, Ordering::SeqCst);
        if let Some(mut stream) = stream {
            stream
                .shutdown()
                .await
                .map_err(|e| error(HardwareErrorKind::Io, e.to_string()))?;
            tracing::info!("Disconnected from register controller at {}", self.endpoint());
        }
        Ok(())
    }

    async fn read_address(&self, address: &str) -> Result<TagValue, HardwareError> {
        let register = self.register(address)?;
        let (function, count) = match register.kind {
            RegisterKind::Coil => (READ_COILS, 1),
            RegisterKind::DiscreteInput => (READ_DISCRETE_INPUTS, 1),
            RegisterKind::Holding => (READ_HOLDING_REGISTERS, 1),
            RegisterKind::Input => (READ_INPUT_REGISTERS, 1),
            RegisterKind::HoldingFloat => (READ_HOLDING_REGISTERS, 2),
        };

        let value = match register.kind {
            RegisterKind::Coil | RegisterKind::DiscreteInput => {
                let request = Request::ReadBits {
                    function,
                    address: register.address,
                    count,
                };
                single_bit(self.transact(request).await?)?
            }
            RegisterKind::Holding | RegisterKind::Input => {
                let request = Request::ReadWords {
                    function,
                    address: register.address,
                    count,
                };
                let words = expect_words(self.transact(request).await?, 1)?;
                TagValue::Int(i64::from(words[0]))
            }
            RegisterKind::HoldingFloat => {
                let request = Request::ReadWords {
                    function,
                    address: register.address,
                    count,
                };
                let words = expect_words(self.transact(request).await?, 2)?;
                TagValue::Float(f64::from(words_to_f32([words[0], words[1]])))
            }
        };

        tracing::trace!("Register {} read {}", address, value);
        Ok(value)
    }

    async fn write_address(&self, address: &str, value: &TagValue) -> Result<(), HardwareError> {
        let register = self.register(address)?;
        let request = match register.kind {
            RegisterKind::Coil => Request::WriteCoil {
                address: register.address,
                value: value.as_bool().ok_or_else(|| {
                    error(
                        HardwareErrorKind::Protocol,
                        format!("coil {} takes a boolean, got {}", address, value),
                    )
                })?,
            },
            RegisterKind::Holding => Request::WriteRegister {
                address: register.address,
                value: to_word(address, value)?,
            },
            RegisterKind::HoldingFloat => {
                let number = value.as_f64().ok_or_else(|| {
                    error(
                        HardwareErrorKind::Protocol,
                        format!("register {} takes a number, got {}", address, value),
                    )
                })?;
                Request::WriteRegisters {
                    address: register.address,
                    values: f32_to_words(number as f32).to_vec(),
                }
            }
            RegisterKind::DiscreteInput | RegisterKind::Input => {
                return Err(error(
                    HardwareErrorKind::ReadOnly,
                    format!("register {} is read-only", address),
                ))
            }
        };

        self.transact(request).await?;
        tracing::debug!("Register {} <- {}", address, value);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
