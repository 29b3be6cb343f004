//! Structured logging utilities.
//!
//! Provides context-aware logging with the device id and the emitting
//! component included in every log message.

use std::fmt;

/// Logging context for one device and, optionally, one of its components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogContext {
    pub device_id: String,
    pub component: Option<String>,
}

impl LogContext {
    pub fn new(device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            component: None,
        }
    }

    pub fn with_component(&self, component: &str) -> Self {
        Self {
            device_id: self.device_id.clone(),
            component: Some(component.to_string()),
        }
    }
}

impl Default for LogContext {
    fn default() -> Self {
        Self::new("local")
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.component {
            Some(component) => write!(f, "[device={}] [component={}]", self.device_id, component),
            None => write!(f, "[device={}]", self.device_id),
        }
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log_with_context {
    ($level:expr, $ctx:expr, $event:expr) => {
        log::log!($level, "{} {}", $ctx, $event);
    };
    ($level:expr, $ctx:expr, $event:expr, $($key:ident = $value:expr),+) => {
        log::log!(
            $level,
            "{} {} {}",
            $ctx,
            $event,
            format_args!(concat!($(stringify!($key), "={:?} "),+), $($value),+)
        );
    };
}

/// Log an info message with context: `log_info!(ctx, "EVENT", key = value)`.
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::__log_with_context!(log::Level::Info, $ctx, $event $(, $key = $value)*)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::__log_with_context!(log::Level::Warn, $ctx, $event $(, $key = $value)*)
    };
}

#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::__log_with_context!(log::Level::Error, $ctx, $event $(, $key = $value)*)
    };
}

#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::__log_with_context!(log::Level::Debug, $ctx, $event $(, $key = $value)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context_display() {
        let ctx = LogContext::new("plant-01");
        assert_eq!(format!("{}", ctx), "[device=plant-01]");

        let alert_ctx = ctx.with_component("alert");
        assert_eq!(
            format!("{}", alert_ctx),
            "[device=plant-01] [component=alert]"
        );
    }

    #[test]
    fn test_with_component_keeps_device() {
        let ctx = LogContext::new("plant-02").with_component("protocol");
        let nested = ctx.with_component("queue");
        assert_eq!(nested.device_id, "plant-02");
        assert_eq!(nested.component.as_deref(), Some("queue"));
    }

    #[test]
    fn test_macros_expand() {
        let ctx = LogContext::new("plant-03").with_component("test");
        crate::log_info!(ctx, "EVENT_ONLY");
        crate::log_debug!(ctx, "WITH_FIELDS", count = 3, name = "fern");
        crate::log_warn!(ctx, "TRAILING_COMMA", ok = true,);
    }
}
