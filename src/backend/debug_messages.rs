//! Backend diagnostic channel
//!
//! Messages raised by the graphics driver or validation layer are classified
//! by source, type and severity. Pure notifications are dropped; everything
//! else is logged and kept in a small ring for the debug UI.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Number of messages retained for display
const RECENT_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSource {
    Api,
    WindowSystem,
    ShaderCompiler,
    ThirdParty,
    Application,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Error,
    DeprecatedBehavior,
    UndefinedBehavior,
    Portability,
    Performance,
    Marker,
    PushGroup,
    PopGroup,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    High,
    Medium,
    Low,
    Notification,
}

impl fmt::Display for MessageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageSource::Api => "api",
            MessageSource::WindowSystem => "window system",
            MessageSource::ShaderCompiler => "shader compiler",
            MessageSource::ThirdParty => "third party",
            MessageSource::Application => "application",
            MessageSource::Other => "other",
        };
        f.write_str(s)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageType::Error => "error",
            MessageType::DeprecatedBehavior => "deprecated behavior",
            MessageType::UndefinedBehavior => "undefined behavior",
            MessageType::Portability => "portability",
            MessageType::Performance => "performance",
            MessageType::Marker => "marker",
            MessageType::PushGroup => "push group",
            MessageType::PopGroup => "pop group",
            MessageType::Other => "other",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Notification => "notification",
        };
        f.write_str(s)
    }
}

/// A single driver/validation message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugMessage {
    pub source: MessageSource,
    pub kind: MessageType,
    pub severity: Severity,
    pub text: String,
}

impl DebugMessage {
    pub fn new(source: MessageSource, kind: MessageType, severity: Severity, text: impl Into<String>) -> Self {
        Self {
            source,
            kind,
            severity,
            text: text.into(),
        }
    }

    /// Notifications are informational only and never reported
    pub fn is_reportable(&self) -> bool {
        self.severity != Severity::Notification
    }
}

/// Log a message with its classification. Returns whether it was logged.
pub fn report(message: &DebugMessage) -> bool {
    if !message.is_reportable() {
        return false;
    }

    let level = match message.severity {
        Severity::High => log::Level::Error,
        _ => log::Level::Warn,
    };
    log::log!(
        level,
        "{} - source: {} - type: {} - severity: {}",
        message.text,
        message.source,
        message.kind,
        message.severity
    );
    true
}

/// Shared sink for backend messages. Cloning shares the same storage.
#[derive(Debug, Clone, Default)]
pub struct DebugMessageLog {
    recent: Arc<Mutex<VecDeque<DebugMessage>>>,
}

impl DebugMessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a message and keep it if it was not filtered out
    pub fn push(&self, message: DebugMessage) {
        if !report(&message) {
            return;
        }
        let mut recent = self.recent.lock();
        if recent.len() == RECENT_CAPACITY {
            recent.pop_front();
        }
        recent.push_back(message);
    }

    /// Snapshot of the retained messages, oldest first
    pub fn recent(&self) -> Vec<DebugMessage> {
        self.recent.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.recent.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_is_dropped() {
        let log = DebugMessageLog::new();
        log.push(DebugMessage::new(
            MessageSource::Api,
            MessageType::Other,
            Severity::Notification,
            "buffer detailed info",
        ));
        assert!(log.recent().is_empty());
    }

    #[test]
    fn test_warnings_and_errors_are_kept() {
        let log = DebugMessageLog::new();
        log.push(DebugMessage::new(
            MessageSource::Api,
            MessageType::Performance,
            Severity::Medium,
            "pipeline recompiled",
        ));
        log.push(DebugMessage::new(
            MessageSource::ShaderCompiler,
            MessageType::Error,
            Severity::High,
            "validation failed",
        ));
        let recent = log.recent();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].kind, MessageType::Error);
    }

    #[test]
    fn test_ring_is_bounded() {
        let log = DebugMessageLog::new();
        for i in 0..RECENT_CAPACITY + 5 {
            log.push(DebugMessage::new(
                MessageSource::Application,
                MessageType::Marker,
                Severity::Low,
                format!("message {i}"),
            ));
        }
        let recent = log.recent();
        assert_eq!(recent.len(), RECENT_CAPACITY);
        assert_eq!(recent[0].text, "message 5");
    }

    #[test]
    fn test_labels() {
        assert_eq!(MessageSource::WindowSystem.to_string(), "window system");
        assert_eq!(MessageType::DeprecatedBehavior.to_string(), "deprecated behavior");
        assert_eq!(Severity::High.to_string(), "high");
    }
}
