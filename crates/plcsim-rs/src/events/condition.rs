// crates/plcsim-rs/src/events/condition.rs

use crate::PlcError;

/// The alarm types attached to simulated sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmKind {
    HighLevel,
    LowLevel,
    OffNormal,
    Trip,
}

impl AlarmKind {
    pub const fn browse_name(self) -> &'static str {
        match self {
            Self::HighLevel => "HighAlarm",
            Self::LowLevel => "LowAlarm",
            Self::OffNormal => "OffNormalAlarm",
            Self::Trip => "TripAlarm",
        }
    }

    /// Conditions created for a source, chosen by the suffix of its path.
    pub fn for_source(path: &str) -> &'static [AlarmKind] {
        if path.ends_with("Tank") {
            &[Self::HighLevel, Self::LowLevel]
        } else if path.ends_with("Motor") {
            &[Self::OffNormal, Self::Trip]
        } else {
            &[]
        }
    }
}

/// Live state of one alarm condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionState {
    pub kind: AlarmKind,
    pub enabled: bool,
    pub active: bool,
    pub acked: bool,
    pub confirmed: bool,
    pub severity: u16,
    pub message: String,
    /// Whether the condition is still of interest to clients (reported on refresh).
    pub retain: bool,
}

impl ConditionState {
    pub fn new(kind: AlarmKind) -> Self {
        Self {
            kind,
            enabled: true,
            active: false,
            acked: true,
            confirmed: true,
            severity: 0,
            message: String::new(),
            retain: false,
        }
    }

    fn ensure_enabled(&self) -> Result<(), PlcError> {
        if self.enabled {
            Ok(())
        } else {
            Err(PlcError::ConditionDisabled)
        }
    }

    fn update_retain(&mut self) {
        self.retain = self.enabled && (self.active || !self.acked || !self.confirmed);
    }

    pub fn activate(&mut self, severity: u16, message: impl Into<String>) -> Result<(), PlcError> {
        self.ensure_enabled()?;
        self.active = true;
        self.acked = false;
        self.confirmed = false;
        self.severity = severity;
        self.message = message.into();
        self.update_retain();
        Ok(())
    }

    pub fn deactivate(&mut self, message: impl Into<String>) -> Result<(), PlcError> {
        self.ensure_enabled()?;
        self.active = false;
        self.message = message.into();
        self.update_retain();
        Ok(())
    }

    /// Flips the active state.
    pub fn toggle(&mut self, severity: u16) -> Result<(), PlcError> {
        let name = self.kind.browse_name();
        if self.active {
            self.deactivate(format!("{name} returned to normal"))
        } else {
            self.activate(severity, format!("{name} is active"))
        }
    }

    pub fn acknowledge(&mut self, comment: &str) -> Result<(), PlcError> {
        self.ensure_enabled()?;
        if self.acked {
            return Err(PlcError::InvalidState);
        }
        self.acked = true;
        self.message = if comment.is_empty() {
            "Condition acknowledged".into()
        } else {
            comment.to_owned()
        };
        self.update_retain();
        Ok(())
    }

    pub fn confirm(&mut self, comment: &str) -> Result<(), PlcError> {
        self.ensure_enabled()?;
        if self.confirmed || !self.acked {
            return Err(PlcError::InvalidState);
        }
        self.confirmed = true;
        self.message = if comment.is_empty() {
            "Condition confirmed".into()
        } else {
            comment.to_owned()
        };
        self.update_retain();
        Ok(())
    }

    pub fn enable(&mut self) -> Result<(), PlcError> {
        if self.enabled {
            return Err(PlcError::InvalidState);
        }
        self.enabled = true;
        self.update_retain();
        Ok(())
    }

    pub fn disable(&mut self) -> Result<(), PlcError> {
        if !self.enabled {
            return Err(PlcError::InvalidState);
        }
        self.enabled = false;
        self.update_retain();
        Ok(())
    }
}
