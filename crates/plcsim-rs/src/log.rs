// crates/plcsim-rs/src/log.rs

/// Trait for structs that provide metadata for logging
pub trait LogMetadata {
    fn meta(&self) -> String;
}

/// Identifies the manager and component a log line originates from.
#[derive(Debug, Clone, Copy)]
pub struct LogContext {
    pub manager: &'static str,
    pub component: &'static str,
    pub namespace: u16,
}

impl LogContext {
    pub const fn new(manager: &'static str, component: &'static str, namespace: u16) -> Self {
        Self {
            manager,
            component,
            namespace,
        }
    }

    /// Same manager and namespace, different component.
    pub const fn with_component(self, component: &'static str) -> Self {
        Self { component, ..self }
    }
}

impl LogMetadata for LogContext {
    fn meta(&self) -> String {
        format!(
            "manager={}, component={}, ns={}",
            self.manager, self.component, self.namespace
        )
    }
}

// =============================================
// Logging Macros (namespaced under crate::log)
// =============================================

// ===== sim_info! =====
macro_rules! sim_info {
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = {
            use $crate::log::LogMetadata as _;
            $ctx.meta()
        };
        ::log::info!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
    ($fmt:literal $(, $($arg:tt)+)?) => {{
        ::log::info!($fmt $(, $($arg)+)?);
    }};
}

// ===== sim_warn! =====
macro_rules! sim_warn {
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = {
            use $crate::log::LogMetadata as _;
            $ctx.meta()
        };
        ::log::warn!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
    ($fmt:literal $(, $($arg:tt)+)?) => {{
        ::log::warn!($fmt $(, $($arg)+)?);
    }};
}

// ===== sim_error! =====
macro_rules! sim_error {
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = {
            use $crate::log::LogMetadata as _;
            $ctx.meta()
        };
        ::log::error!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
    ($fmt:literal $(, $($arg:tt)+)?) => {{
        ::log::error!($fmt $(, $($arg)+)?);
    }};
}

// ===== sim_debug! =====
macro_rules! sim_debug {
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = {
            use $crate::log::LogMetadata as _;
            $ctx.meta()
        };
        ::log::debug!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
    ($fmt:literal $(, $($arg:tt)+)?) => {{
        ::log::debug!($fmt $(, $($arg)+)?);
    }};
}

// ===== sim_trace! =====
macro_rules! sim_trace {
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = {
            use $crate::log::LogMetadata as _;
            $ctx.meta()
        };
        ::log::trace!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
    ($fmt:literal $(, $($arg:tt)+)?) => {{
        ::log::trace!($fmt $(, $($arg)+)?);
    }};
}

// Re-export macros for use in other files
pub(crate) use sim_debug;
pub(crate) use sim_error;
pub(crate) use sim_info;
pub(crate) use sim_trace;
pub(crate) use sim_warn;
