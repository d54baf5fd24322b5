//! Shared fixtures: a tag document and in-process fake controllers.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

pub const TAGS: &str = r#"
tag_groups:
  gas_control:
    main_flow:
      setpoint: { type: float, access: read-write, range: [0.0, 100.0], unit: slm, mapped: true, plc_tag: GAS_FLOW_SP }
      measured: { type: float, access: read, range: [0.0, 100.0], mapped: true, plc_tag: MainFlowRate }
    feeder_flow:
      setpoint: { type: float, access: read-write, range: [0.0, 10.0], unit: slm, mapped: true, plc_tag: FEEDER_FLOW_SP }
  valve_control:
    main_gas: { type: bool, access: read-write, mapped: true, plc_tag: MainSwitch }
    feeder_gas: { type: bool, access: read-write, mapped: true, plc_tag: FeederSwitch }
    vent_vacuum: { type: bool, access: read-write, mapped: true, plc_tag: VentSwitch }
  vacuum_control:
    pump:
      enable: { type: bool, access: read-write }
  nozzle_control:
    enable: { type: bool, access: read-write, mapped: true, plc_tag: NozzleSelect }
  shutter_control:
    position: { type: string, access: read-write, options: [closed, partial, open] }
  feeder:
    speed:
      setpoint: { type: int, access: read-write, range: [200, 1200], mapped: true, ssh: { variables: [P6] } }
    control:
      start: { type: int, access: read-write, range: [1, 4], mapped: true, ssh: { variables: [P12, P10] } }
    hopper: { type: int, access: read, mapped: true, ssh: { freq_var: P106, start_var: P110, time_var: P112 } }
  motion_control:
    coordinated_move:
      xy_move:
        parameters:
          x_position: { type: float, access: read-write, range: [0.0, 500.0], mapped: true, plc_tag: AMC.Ax1Position }
          y_position: { type: float, access: read-write, range: [0.0, 500.0], mapped: true, plc_tag: AMC.Ax2Position }
          velocity: { type: float, access: read-write, range: [0.0, 100.0] }
        trigger: { type: bool, access: read-write, mapped: true, plc_tag: XYMove.Trigger }
        in_progress: { type: bool, access: read, mapped: true, plc_tag: XAxis.InProgress }
  status:
    state: { type: string, options: [IDLE, RUNNING, FAULT] }
    notes: "operator notes are not tags"
"#;

pub fn tags() -> serde_yaml::Value {
    serde_yaml::from_str(TAGS).unwrap()
}

/// A port nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

// =============================================================================
// Fake Modbus/TCP controller
// =============================================================================

#[derive(Default)]
pub struct PlcImage {
    pub coils: HashMap<u16, bool>,
    pub holding: HashMap<u16, u16>,
    pub input: HashMap<u16, u16>,
    pub requests: usize,
    /// Answer the next request with a non-Modbus protocol id.
    pub bad_protocol_next: bool,
    /// Answer the next request with the wrong transaction id.
    pub bad_transaction_next: bool,
}

/// Modbus/TCP server answering FC01-06 and FC16 from a shared image.
/// Reads at address 9999 answer with exception 0x02.
#[derive(Clone)]
pub struct FakePlc {
    pub addr: SocketAddr,
    pub image: Arc<Mutex<PlcImage>>,
}

impl FakePlc {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let image = Arc::new(Mutex::new(PlcImage::default()));
        let shared = image.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_plc(stream, shared.clone()));
            }
        });
        Self { addr, image }
    }

    pub fn holding(&self, address: u16) -> Option<u16> {
        self.image.lock().unwrap().holding.get(&address).copied()
    }

    pub fn coil(&self, address: u16) -> Option<bool> {
        self.image.lock().unwrap().coils.get(&address).copied()
    }
}

async fn serve_plc(mut stream: TcpStream, image: Arc<Mutex<PlcImage>>) {
    loop {
        let mut header = [0u8; 7];
        if stream.read_exact(&mut header).await.is_err() {
            return;
        }
        let length = u16::from_be_bytes([header[4], header[5]]) as usize;
        let mut pdu = vec![0u8; length - 1];
        if stream.read_exact(&mut pdu).await.is_err() {
            return;
        }

        let (reply, bad_protocol, bad_transaction) = {
            let mut image = image.lock().unwrap();
            let bad_protocol = std::mem::take(&mut image.bad_protocol_next);
            let bad_transaction = std::mem::take(&mut image.bad_transaction_next);
            (answer(&pdu, &mut image), bad_protocol, bad_transaction)
        };
        let mut frame = header[..4].to_vec();
        if bad_protocol {
            frame[2..4].copy_from_slice(&1u16.to_be_bytes());
        }
        if bad_transaction {
            let id = u16::from_be_bytes([frame[0], frame[1]]).wrapping_add(1);
            frame[0..2].copy_from_slice(&id.to_be_bytes());
        }
        frame.extend_from_slice(&((reply.len() + 1) as u16).to_be_bytes());
        frame.push(header[6]);
        frame.extend_from_slice(&reply);
        if stream.write_all(&frame).await.is_err() {
            return;
        }
    }
}

fn answer(pdu: &[u8], image: &mut PlcImage) -> Vec<u8> {
    image.requests += 1;
    let function = pdu[0];
    let address = u16::from_be_bytes([pdu[1], pdu[2]]);
    let field = u16::from_be_bytes([pdu[3], pdu[4]]);

    if address == 9999 {
        return vec![function | 0x80, 0x02];
    }

    match function {
        0x01 | 0x02 => {
            let bits: Vec<bool> = (0..field)
                .map(|i| image.coils.get(&(address + i)).copied().unwrap_or(false))
                .collect();
            let mut bytes = vec![0u8; bits.len().div_ceil(8)];
            for (i, bit) in bits.iter().enumerate() {
                if *bit {
                    bytes[i / 8] |= 1 << (i % 8);
                }
            }
            let mut reply = vec![function, bytes.len() as u8];
            reply.extend(bytes);
            reply
        }
        0x03 | 0x04 => {
            let table = if function == 0x03 { &image.holding } else { &image.input };
            let mut reply = vec![function, (field * 2) as u8];
            for i in 0..field {
                let word = table.get(&(address + i)).copied().unwrap_or(0);
                reply.extend_from_slice(&word.to_be_bytes());
            }
            reply
        }
        0x05 => {
            image.coils.insert(address, field == 0xFF00);
            pdu[..5].to_vec()
        }
        0x06 => {
            image.holding.insert(address, field);
            pdu[..5].to_vec()
        }
        0x10 => {
            for i in 0..field {
                let at = 6 + usize::from(i) * 2;
                image
                    .holding
                    .insert(address + i, u16::from_be_bytes([pdu[at], pdu[at + 1]]));
            }
            pdu[..5].to_vec()
        }
        _ => vec![function | 0x80, 0x01],
    }
}

// =============================================================================
// Fake feeder controller
// =============================================================================

/// Line server: `NAME` reads, `NAME=VALUE` writes. `HANG` never answers.
#[derive(Clone)]
pub struct FakeFeeder {
    pub addr: SocketAddr,
    pub variables: Arc<Mutex<HashMap<String, String>>>,
}

impl FakeFeeder {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let variables = Arc::new(Mutex::new(HashMap::from([
            ("P6".to_string(), "200".to_string()),
            ("P10".to_string(), "4".to_string()),
            ("P12".to_string(), "999".to_string()),
        ])));
        let shared = variables.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_feeder(stream, shared.clone()));
            }
        });
        Self { addr, variables }
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.variables.lock().unwrap().get(name).cloned()
    }
}

async fn serve_feeder(stream: TcpStream, variables: Arc<Mutex<HashMap<String, String>>>) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let command = line.trim().to_string();
        if command == "HANG" {
            continue;
        }
        let reply = {
            let mut variables = variables.lock().unwrap();
            match command.split_once('=') {
                Some((name, value)) => {
                    variables.insert(name.to_string(), value.to_string());
                    "OK".to_string()
                }
                None => match variables.get(&command) {
                    Some(value) => format!("{}={}", command, value),
                    None => "ERR unknown variable".to_string(),
                },
            }
        };
        let stream = lines.get_mut().get_mut();
        if stream.write_all(format!("{}\n", reply).as_bytes()).await.is_err() {
            return;
        }
    }
}
