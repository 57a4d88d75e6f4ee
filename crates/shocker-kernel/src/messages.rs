//! Inbound message types from the platform transport.

/// Avatar change notification (payload: avatar id).
pub const AVATAR_CHANGE: &str = "/avatar/change";

/// Platform AFK flag.
pub const AFK: &str = "/avatar/parameters/AFK";

/// Platform self-mute flag.
pub const MUTE_SELF: &str = "/avatar/parameters/MuteSelf";

/// Typed value carried by an inbound parameter message.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Text(String),
}

impl InputValue {
    /// Interpret the value as a flag. Anything that is not clearly true is false.
    pub fn is_true(&self) -> bool {
        match self {
            InputValue::Bool(b) => *b,
            InputValue::Int(i) => *i != 0,
            InputValue::Float(f) => *f >= 0.5,
            InputValue::Text(_) => false,
        }
    }

    /// Interpret the value as a float, if it is numeric.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            InputValue::Float(f) => Some(*f),
            InputValue::Int(i) => Some(*i as f32),
            InputValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            InputValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            InputValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A single addressed parameter update.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub address: String,
    pub value: InputValue,
}

impl InboundMessage {
    pub fn new(address: impl Into<String>, value: InputValue) -> Self {
        Self {
            address: address.into(),
            value,
        }
    }
}
