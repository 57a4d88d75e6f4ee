//! Address routing: splits shocker parameter addresses into (name, action).
//!
//! Shocker parameters live under `/avatar/parameters/<prefix>/`. The suffix is
//! either a bare shocker name (the generic trigger flag) or `<Name>_<Action>`,
//! where the trailing token must be one of the known actions. Names may
//! themselves contain underscores, so only a whitelisted trailing token splits.

use std::fmt;
use std::str::FromStr;

/// Root of all avatar parameter addresses.
pub const AVATAR_PARAMETERS: &str = "/avatar/parameters/";

/// Per-shocker parameter action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// No suffix: the generic manual trigger flag
    Trigger,
    Stretch,
    IsGrabbed,
    IsPosed,
    Angle,
    Squish,
    Cooldown,
    Active,
    Intensity,
}

impl Action {
    /// Suffix token for this action (empty for the generic flag).
    pub fn token(&self) -> &'static str {
        match self {
            Action::Trigger => "",
            Action::Stretch => "Stretch",
            Action::IsGrabbed => "IsGrabbed",
            Action::IsPosed => "IsPosed",
            Action::Angle => "Angle",
            Action::Squish => "Squish",
            Action::Cooldown => "Cooldown",
            Action::Active => "Active",
            Action::Intensity => "Intensity",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Trigger => f.write_str("Trigger"),
            other => f.write_str(other.token()),
        }
    }
}

impl FromStr for Action {
    type Err = ();

    /// Parse a whitelisted suffix token. The empty token is not accepted here.
    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "Stretch" => Ok(Action::Stretch),
            "IsGrabbed" => Ok(Action::IsGrabbed),
            "IsPosed" => Ok(Action::IsPosed),
            "Angle" => Ok(Action::Angle),
            "Squish" => Ok(Action::Squish),
            "Cooldown" => Ok(Action::Cooldown),
            "Active" => Ok(Action::Active),
            "Intensity" => Ok(Action::Intensity),
            _ => Err(()),
        }
    }
}

/// A routed shocker parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub shocker: String,
    pub action: Action,
}

/// Split a parameter suffix (the part after the prefix) into a route.
pub fn split_suffix(suffix: &str) -> Route {
    if let Some((name, token)) = suffix.rsplit_once('_') {
        if let Ok(action) = token.parse::<Action>() {
            return Route {
                shocker: name.to_string(),
                action,
            };
        }
    }

    Route {
        shocker: suffix.to_string(),
        action: Action::Trigger,
    }
}

/// Parses addresses under a fixed parameter prefix.
#[derive(Debug, Clone)]
pub struct AddressRouter {
    /// Full address prefix including the trailing slash
    address_prefix: String,
}

impl AddressRouter {
    /// Create a router for `/avatar/parameters/<parameter_prefix>/`.
    pub fn new(parameter_prefix: &str) -> Self {
        Self {
            address_prefix: format!("{}{}/", AVATAR_PARAMETERS, parameter_prefix),
        }
    }

    /// Full address prefix, e.g. `/avatar/parameters/ShockOsc/`.
    pub fn address_prefix(&self) -> &str {
        &self.address_prefix
    }

    /// Route an address, or `None` if it is not under the prefix.
    pub fn route(&self, address: &str) -> Option<Route> {
        let suffix = address.strip_prefix(&self.address_prefix)?;
        if suffix.is_empty() {
            return None;
        }
        Some(split_suffix(suffix))
    }

    /// Outbound address for a shocker's feedback parameter.
    pub fn address_for(&self, shocker: &str, action: Action) -> String {
        match action {
            Action::Trigger => format!("{}{}", self.address_prefix, shocker),
            other => format!("{}{}_{}", self.address_prefix, shocker, other.token()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlisted_token_keeps_whole_suffix() {
        assert_eq!(
            split_suffix("Foo_Bar"),
            Route {
                shocker: "Foo_Bar".to_string(),
                action: Action::Trigger,
            }
        );
    }

    #[test]
    fn test_whitelisted_token_splits() {
        assert_eq!(
            split_suffix("Foo_Stretch"),
            Route {
                shocker: "Foo".to_string(),
                action: Action::Stretch,
            }
        );
        // Only the last underscore counts
        assert_eq!(
            split_suffix("Left_Arm_IsGrabbed"),
            Route {
                shocker: "Left_Arm".to_string(),
                action: Action::IsGrabbed,
            }
        );
    }

    #[test]
    fn test_bare_name_is_trigger() {
        let route = split_suffix("Arm");
        assert_eq!(route.shocker, "Arm");
        assert_eq!(route.action, Action::Trigger);
    }

    #[test]
    fn test_router_prefix_handling() {
        let router = AddressRouter::new("ShockOsc");

        let route = router.route("/avatar/parameters/ShockOsc/Arm_Cooldown").unwrap();
        assert_eq!(route.shocker, "Arm");
        assert_eq!(route.action, Action::Cooldown);

        assert!(router.route("/avatar/parameters/AFK").is_none());
        assert!(router.route("/avatar/parameters/ShockOsc/").is_none());
    }

    #[test]
    fn test_address_for_feedback() {
        let router = AddressRouter::new("ShockOsc");
        assert_eq!(
            router.address_for("Arm", Action::Active),
            "/avatar/parameters/ShockOsc/Arm_Active"
        );
        assert_eq!(
            router.address_for("Arm", Action::Trigger),
            "/avatar/parameters/ShockOsc/Arm"
        );
    }
}
