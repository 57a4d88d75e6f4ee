//! ShockOsc bridge: connects the shocker kernel to VRChat over OSC and to
//! the OpenShock API over HTTP.

pub mod avatar_config;
pub mod openshock;
pub mod osc;
