//! Common unit type that wraps Service and Target

use super::{InstallSection, Service, Target, UnitSection};

/// A unit is either a supervised service or an aggregate target
#[derive(Debug, Clone)]
pub enum Unit {
    Service(Service),
    Target(Target),
}

impl Unit {
    /// Get the unit name
    pub fn name(&self) -> &str {
        match self {
            Unit::Service(s) => &s.name,
            Unit::Target(t) => &t.name,
        }
    }

    /// Get the [Unit] section (common to both types)
    pub fn unit_section(&self) -> &UnitSection {
        match self {
            Unit::Service(s) => &s.unit,
            Unit::Target(t) => &t.unit,
        }
    }

    /// Get the [Install] section
    pub fn install_section(&self) -> Option<&InstallSection> {
        match self {
            Unit::Service(s) => Some(&s.install),
            Unit::Target(_) => None,
        }
    }

    /// Check if this is a service
    pub fn is_service(&self) -> bool {
        matches!(self, Unit::Service(_))
    }

    /// Check if this is a target
    pub fn is_target(&self) -> bool {
        matches!(self, Unit::Target(_))
    }

    /// Get the unit type as a string (service, target)
    pub fn unit_type(&self) -> &'static str {
        match self {
            Unit::Service(_) => "service",
            Unit::Target(_) => "target",
        }
    }

    /// Get as service if it is one
    pub fn as_service(&self) -> Option<&Service> {
        match self {
            Unit::Service(s) => Some(s),
            _ => None,
        }
    }

    /// Get as target if it is one
    pub fn as_target(&self) -> Option<&Target> {
        match self {
            Unit::Target(t) => Some(t),
            _ => None,
        }
    }

    /// Get units from .wants directory (for targets)
    pub fn wants_dir(&self) -> &[String] {
        match self {
            Unit::Target(t) => &t.wants_dir,
            Unit::Service(_) => &[],
        }
    }
}
