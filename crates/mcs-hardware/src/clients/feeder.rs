//! Real variable-family client: command session to the feeder controller.
//!
//! The controller exposes its P variables over a line-oriented TCP session.
//! Every command is one line and gets exactly one line back:
//!
//! ```text
//! > P6            read
//! < P6=200        (a bare "200" is accepted too)
//! > P6=450        write
//! < OK
//! > P99
//! < ERR unknown variable
//! ```

use crate::config::FeederLinkConfig;
use async_trait::async_trait;
use mcs_core::{HardwareClient, HardwareError, HardwareErrorKind, TagValue, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

fn error(kind: HardwareErrorKind, message: impl Into<String>) -> HardwareError {
    HardwareError::new(Transport::Variable, kind, message)
}

fn check_name(name: &str) -> Result<(), HardwareError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(error(
            HardwareErrorKind::InvalidAddress,
            format!("'{}' is not a controller variable name", name),
        ))
    }
}

fn parse_number(name: &str, text: &str) -> Result<TagValue, HardwareError> {
    if let Ok(value) = text.parse::<i64>() {
        return Ok(TagValue::Int(value));
    }
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(TagValue::Float(value)),
        _ => Err(error(
            HardwareErrorKind::Protocol,
            format!("variable {} returned non-numeric '{}'", name, text),
        )),
    }
}

pub struct FeederClient {
    config: FeederLinkConfig,
    session: Mutex<Option<BufReader<TcpStream>>>,
    connected: AtomicBool,
}

impl FeederClient {
    pub fn new(config: FeederLinkConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Send one command line and return the trimmed reply line.
    async fn exchange(&self, command: &str) -> Result<String, HardwareError> {
        let mut slot = self.session.lock().await;
        let session = slot
            .as_mut()
            .ok_or_else(|| HardwareError::not_connected(Transport::Variable))?;

        tracing::debug!("Feeder command: {}", command);
        let line = format!("{}\n", command);
        let exchange = async {
            session.get_mut().write_all(line.as_bytes()).await?;
            session.get_mut().flush().await?;
            let mut reply = String::new();
            let read = session.read_line(&mut reply).await?;
            Ok::<_, std::io::Error>((read, reply))
        };

        let (read, reply) = match timeout(self.config.timeout(), exchange).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                self.drop_session(&mut slot);
                return Err(error(HardwareErrorKind::Io, e.to_string()));
            }
            Err(_) => {
                self.drop_session(&mut slot);
                return Err(error(
                    HardwareErrorKind::Timeout,
                    format!("no reply to '{}' within {:?}", command, self.config.timeout()),
                ));
            }
        };

        if read == 0 {
            self.drop_session(&mut slot);
            return Err(error(
                HardwareErrorKind::Connection,
                format!("feeder controller at {} closed the session", self.endpoint()),
            ));
        }

        let reply = reply.trim().to_string();
        if let Some(message) = reply.strip_prefix("ERR") {
            return Err(error(HardwareErrorKind::Protocol, message.trim().to_string()));
        }
        Ok(reply)
    }

    fn drop_session(&self, slot: &mut Option<BufReader<TcpStream>>) {
        *slot = None;
        self.connected.store(false, Ordering::SeqCst);
        tracing::warn!("Feeder controller session {} dropped", self.endpoint());
    }
}

#[async_trait]
impl HardwareClient for FeederClient {
    fn transport(&self) -> Transport {
        Transport::Variable
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

        *self.session.lock().await = Some(BufReader::new(stream));
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!("Connected to feeder controller at {}", endpoint);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), HardwareError> {
        let session = self.session.lock().await.take();
        self.connected.store(false, Ordering::SeqCst);
        if let Some(session) = session {
            session
                .into_inner()
                .shutdown()
                .await
                .map_err(|e| error(HardwareErrorKind::Io, e.to_string()))?;
            tracing::info!("Disconnected from feeder controller at {}", self.endpoint());
        }
        Ok(())
    }

    async fn read_address(&self, address: &str) -> Result<TagValue, HardwareError> {
        check_name(address)?;
        let reply = self.exchange(address).await?;
        let text = match reply.split_once('=') {
            Some((name, value)) if name.trim() == address => value.trim(),
            Some((name, _)) => {
                return Err(error(
                    HardwareErrorKind::Protocol,
                    format!("asked for {}, controller answered {}", address, name.trim()),
                ))
            }
            None => reply.as_str(),
        };
        parse_number(address, text)
    }

    async fn write_address(&self, address: &str, value: &TagValue) -> Result<(), HardwareError> {
        check_name(address)?;
        let text = match value {
            TagValue::Int(v) => v.to_string(),
            TagValue::Float(v) if v.is_finite() => v.to_string(),
            TagValue::Bool(b) => u8::from(*b).to_string(),
            other => {
                return Err(error(
                    HardwareErrorKind::Protocol,
                    format!("variable {} takes a number, got {}", address, other.type_name()),
                ))
            }
        };
        self.exchange(&format!("{}={}", address, text)).await?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
