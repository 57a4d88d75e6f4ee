//! In-memory collaborators for tests and dry runs.

use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::control::{ParameterSink, ParameterValue};
use crate::listener::ParameterSource;
use crate::messages::InboundMessage;

/// Parameter sink that records everything sent to it.
#[derive(Debug, Default)]
pub struct RecordingSink {
    parameters: Mutex<Vec<(String, ParameterValue)>>,
    chatbox: Mutex<Vec<String>>,
}

impl RecordingSink {
    /// All parameters sent so far, in order.
    pub fn parameters(&self) -> Vec<(String, ParameterValue)> {
        self.parameters
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Values sent to one address, in order.
    pub fn values_for(&self, address: &str) -> Vec<ParameterValue> {
        self.parameters()
            .into_iter()
            .filter(|(a, _)| a == address)
            .map(|(_, v)| v)
            .collect()
    }

    /// Chatbox messages sent so far, in order.
    pub fn chatbox(&self) -> Vec<String> {
        self.chatbox.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Forget everything recorded.
    pub fn clear(&self) {
        if let Ok(mut p) = self.parameters.lock() {
            p.clear();
        }
        if let Ok(mut c) = self.chatbox.lock() {
            c.clear();
        }
    }
}

impl ParameterSink for RecordingSink {
    fn send_parameter(&self, address: &str, value: ParameterValue) -> anyhow::Result<()> {
        self.parameters
            .lock()
            .map_err(|_| anyhow::anyhow!("recording sink poisoned"))?
            .push((address.to_string(), value));
        Ok(())
    }

    fn send_chatbox(&self, text: &str) -> anyhow::Result<()> {
        self.chatbox
            .lock()
            .map_err(|_| anyhow::anyhow!("recording sink poisoned"))?
            .push(text.to_string());
        Ok(())
    }
}

/// Parameter source fed from a channel. Closing the sender acts as a
/// transport failure.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<InboundMessage>,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it.
    pub fn new(capacity: usize) -> (mpsc::Sender<InboundMessage>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }
}

impl ParameterSource for ChannelSource {
    async fn recv(&mut self) -> anyhow::Result<Vec<InboundMessage>> {
        match self.rx.recv().await {
            Some(message) => Ok(vec![message]),
            None => anyhow::bail!("parameter channel closed"),
        }
    }
}
