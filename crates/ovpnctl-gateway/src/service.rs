//! Service manager adapter
//!
//! The daemon runs as three units that are always driven together, in a
//! fixed order, stopping at the first one that fails.

use crate::error::{GatewayError, GatewayResult};
use crate::shell::Shell;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Units making up the gateway, in the order they are driven
pub const UNITS: [&str; 3] = ["openvpn", "openvpn@server", "openvpn-iptables"];

/// One service manager action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    /// Start units
    Start,
    /// Stop units
    Stop,
    /// Restart units
    Restart,
    /// Reload unit configuration
    Reload,
    /// Enable at boot
    Enable,
    /// Disable at boot
    Disable,
    /// Query: all units running
    IsActive,
    /// Query: all units enabled
    IsEnabled,
}

impl ServiceAction {
    /// Every action, in display order
    pub const ALL: [ServiceAction; 8] = [
        ServiceAction::Start,
        ServiceAction::Stop,
        ServiceAction::Restart,
        ServiceAction::Reload,
        ServiceAction::Enable,
        ServiceAction::Disable,
        ServiceAction::IsActive,
        ServiceAction::IsEnabled,
    ];

    /// Name accepted on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
            ServiceAction::Reload => "reload",
            ServiceAction::Enable => "enable",
            ServiceAction::Disable => "disable",
            ServiceAction::IsActive => "isactive",
            ServiceAction::IsEnabled => "isenabled",
        }
    }

    /// Whether the action only reports state
    pub fn is_query(&self) -> bool {
        matches!(self, ServiceAction::IsActive | ServiceAction::IsEnabled)
    }

    /// systemctl verb
    pub fn verb(&self) -> &'static str {
        match self {
            ServiceAction::IsActive => "is-active",
            ServiceAction::IsEnabled => "is-enabled",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceAction {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| GatewayError::Validation(format!("Invalid ctl option: {}", s)))
    }
}

/// Service manager
pub trait ServiceController {
    /// Whether the service manager is present on this host
    fn available(&self) -> bool;

    /// Apply `action` to one unit; `true` when it succeeded
    fn apply(&self, action: ServiceAction, unit: &str) -> bool;
}

impl<T: ServiceController + ?Sized> ServiceController for &T {
    fn available(&self) -> bool {
        (**self).available()
    }

    fn apply(&self, action: ServiceAction, unit: &str) -> bool {
        (**self).apply(action, unit)
    }
}

/// Apply `action` to every gateway unit in order, stopping at the first failure
pub fn ctl<S: ServiceController + ?Sized>(services: &S, action: ServiceAction) -> GatewayResult<bool> {
    if !services.available() {
        return Err(GatewayError::Service(format!(
            "Reason: systemd unavailable on your distro. The {} service cannot be managed automatically; \
             try it yourself using a command like 'service {} {}'",
            UNITS[0], UNITS[0], action.verb()
        )));
    }

    for unit in UNITS {
        if !services.apply(action, unit) {
            tracing::warn!("systemctl {} {} failed", action.verb(), unit);
            return Ok(false);
        }
    }
    tracing::info!("systemctl {} applied to {} units", action.verb(), UNITS.len());
    Ok(true)
}

/// systemd via `systemctl`
#[derive(Debug, Clone)]
pub struct Systemd {
    systemctl: Option<PathBuf>,
    shell: Shell,
}

impl Systemd {
    /// Locate `systemctl` on the search path; calls are killed after `timeout`
    pub fn locate(timeout: Duration) -> Self {
        Self {
            systemctl: which::which("systemctl").ok(),
            shell: Shell::with_timeout(timeout),
        }
    }
}

impl ServiceController for Systemd {
    fn available(&self) -> bool {
        self.systemctl.is_some()
    }

    fn apply(&self, action: ServiceAction, unit: &str) -> bool {
        let Some(systemctl) = &self.systemctl else {
            return false;
        };
        let args = [action.verb(), unit];
        // A hung query must not read as a positive answer
        let result = if action.is_query() {
            self.shell.run_strict(systemctl.as_os_str(), &args)
        } else {
            self.shell.run(systemctl.as_os_str(), &args)
        };
        match result {
            Ok(output) => output.success(),
            Err(e) => {
                tracing::warn!("{}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Recorder {
        fail_on: Option<&'static str>,
        calls: RefCell<Vec<String>>,
    }

    impl ServiceController for Recorder {
        fn available(&self) -> bool {
            true
        }

        fn apply(&self, action: ServiceAction, unit: &str) -> bool {
            self.calls.borrow_mut().push(format!("{} {}", action.verb(), unit));
            self.fail_on != Some(unit)
        }
    }

    struct Absent;

    impl ServiceController for Absent {
        fn available(&self) -> bool {
            false
        }

        fn apply(&self, _: ServiceAction, _: &str) -> bool {
            false
        }
    }

    #[test]
    fn test_action_names() {
        assert_eq!("isenabled".parse::<ServiceAction>().unwrap(), ServiceAction::IsEnabled);
        assert_eq!(ServiceAction::IsActive.verb(), "is-active");
        assert!(ServiceAction::IsEnabled.is_query());
        assert!(!ServiceAction::Restart.is_query());
        assert!("bounce".parse::<ServiceAction>().unwrap_err().is_usage());
    }

    #[test]
    fn test_ctl_drives_units_in_order() {
        let services = Recorder {
            fail_on: None,
            calls: RefCell::new(Vec::new()),
        };
        assert!(ctl(&services, ServiceAction::Restart).unwrap());
        assert_eq!(
            *services.calls.borrow(),
            vec!["restart openvpn", "restart openvpn@server", "restart openvpn-iptables"]
        );
    }

    #[test]
    fn test_ctl_stops_at_first_failure() {
        let services = Recorder {
            fail_on: Some("openvpn@server"),
            calls: RefCell::new(Vec::new()),
        };
        assert!(!ctl(&services, ServiceAction::Enable).unwrap());
        assert_eq!(services.calls.borrow().len(), 2);
    }

    #[test]
    fn test_ctl_without_service_manager() {
        let err = ctl(&Absent, ServiceAction::Start).unwrap_err();
        assert!(matches!(err, GatewayError::Service(_)));
    }
}
