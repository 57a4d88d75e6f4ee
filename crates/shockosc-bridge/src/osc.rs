//! OSC transport over UDP.
//!
//! VRChat sends avatar parameters to the listen port and accepts parameter
//! writes and chatbox input on the send port. One socket serves both
//! directions: [`OscReceiver`] decodes inbound datagrams, [`OscSender`]
//! encodes and sends outbound messages without awaiting.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use rosc::{decoder, encoder, OscMessage, OscPacket, OscType};
use tokio::net::UdpSocket;
use tracing::{trace, warn};

use shocker_kernel::{InboundMessage, InputValue, ParameterSink, ParameterSource, ParameterValue};

/// Address for chatbox input.
pub const CHATBOX_INPUT: &str = "/chatbox/input";

/// Large enough for any datagram VRChat sends.
const RECV_BUFFER_SIZE: usize = 8192;

/// Bind the listen address and build both halves of the transport.
pub async fn bind(listen_addr: &str, send_addr: &str) -> Result<(OscReceiver, Arc<OscSender>)> {
    let socket = UdpSocket::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to bind OSC socket on {}", listen_addr))?;
    let target: SocketAddr = send_addr
        .parse()
        .with_context(|| format!("Invalid OSC send address {}", send_addr))?;

    let socket = Arc::new(socket);
    let receiver = OscReceiver {
        socket: socket.clone(),
        buffer: vec![0u8; RECV_BUFFER_SIZE],
    };
    Ok((receiver, Arc::new(OscSender { socket, target })))
}

/// Inbound half: yields decoded parameter messages.
#[derive(Debug)]
pub struct OscReceiver {
    socket: Arc<UdpSocket>,
    buffer: Vec<u8>,
}

impl OscReceiver {
    /// Local address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl ParameterSource for OscReceiver {
    async fn recv(&mut self) -> Result<Vec<InboundMessage>> {
        let (len, from) = self
            .socket
            .recv_from(&mut self.buffer)
            .await
            .context("OSC socket receive failed")?;
        trace!(len, from = %from, "OSC datagram");
        Ok(decode_datagram(&self.buffer[..len]))
    }
}

/// Decode one datagram into inbound messages. Bundles are flattened;
/// undecodable datagrams yield nothing.
pub fn decode_datagram(bytes: &[u8]) -> Vec<InboundMessage> {
    let packet = match decoder::decode_udp(bytes) {
        Ok((_, packet)) => packet,
        Err(e) => {
            warn!(error = ?e, len = bytes.len(), "Dropping undecodable OSC datagram");
            return Vec::new();
        }
    };

    let mut messages = Vec::new();
    flatten(packet, &mut messages);
    messages
}

fn flatten(packet: OscPacket, out: &mut Vec<InboundMessage>) {
    match packet {
        OscPacket::Message(message) => {
            if let Some(inbound) = convert(message) {
                out.push(inbound);
            }
        }
        OscPacket::Bundle(bundle) => {
            for content in bundle.content {
                flatten(content, out);
            }
        }
    }
}

fn convert(message: OscMessage) -> Option<InboundMessage> {
    let value = match message.args.into_iter().next()? {
        OscType::Bool(v) => InputValue::Bool(v),
        OscType::Int(v) => InputValue::Int(v),
        OscType::Float(v) => InputValue::Float(v),
        OscType::Double(v) => InputValue::Float(v as f32),
        OscType::String(v) => InputValue::Text(v),
        other => {
            trace!(address = %message.addr, arg = ?other, "Unsupported OSC argument");
            return None;
        }
    };
    Some(InboundMessage::new(message.addr, value))
}

/// Outbound half: parameter writes and chatbox messages.
#[derive(Debug)]
pub struct OscSender {
    socket: Arc<UdpSocket>,
    target: SocketAddr,
}

impl OscSender {
    fn send(&self, addr: &str, args: Vec<OscType>) -> Result<()> {
        let bytes = encode(addr, args)?;
        self.socket
            .try_send_to(&bytes, self.target)
            .with_context(|| format!("Failed to send OSC message to {}", addr))?;
        Ok(())
    }
}

/// Encode a single OSC message.
pub fn encode(addr: &str, args: Vec<OscType>) -> Result<Vec<u8>> {
    let packet = OscPacket::Message(OscMessage {
        addr: addr.to_string(),
        args,
    });
    encoder::encode(&packet).map_err(|e| anyhow::anyhow!("OSC encoding failed: {:?}", e))
}

impl ParameterSink for OscSender {
    fn send_parameter(&self, address: &str, value: ParameterValue) -> Result<()> {
        let arg = match value {
            ParameterValue::Bool(v) => OscType::Bool(v),
            ParameterValue::Float(v) => OscType::Float(v),
        };
        self.send(address, vec![arg])
    }

    /// Sent immediately, without the typing indicator or notification sound.
    fn send_chatbox(&self, text: &str) -> Result<()> {
        self.send(
            CHATBOX_INPUT,
            vec![
                OscType::String(text.to_string()),
                OscType::Bool(true),
                OscType::Bool(false),
            ],
        )
    }
}
