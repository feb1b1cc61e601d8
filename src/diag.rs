use std::fmt;

/// Severity of a buffered diagnostic event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
    /// Output was produced with a best-effort default and needs a human to fix it
    ManualEdit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub component: &'static str,
    /// Profile the event belongs to, when known
    pub profile: Option<String>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.profile {
            Some(profile) => write!(f, "[{}] {}: {}", self.component, profile, self.message),
            None => write!(f, "[{}] {}", self.component, self.message),
        }
    }
}

/// Buffered diagnostics sink shared by every stage of a run
///
/// Events are collected in order and emitted together by [`Diagnostics::flush`],
/// so a run that aborts still reports everything it saw before the abort.
#[derive(Debug, Default)]
pub struct Diagnostics {
    events: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, component: &'static str, profile: Option<&str>, message: impl Into<String>) {
        self.push(Severity::Warning, component, profile, message.into());
    }

    pub fn error(&mut self, component: &'static str, profile: Option<&str>, message: impl Into<String>) {
        self.push(Severity::Error, component, profile, message.into());
    }

    pub fn manual_edit(
        &mut self,
        component: &'static str,
        profile: Option<&str>,
        message: impl Into<String>,
    ) {
        self.push(Severity::ManualEdit, component, profile, message.into());
    }

    fn push(&mut self, severity: Severity, component: &'static str, profile: Option<&str>, message: String) {
        log::debug!("{:?} from {}: {}", severity, component, message);
        self.events.push(Diagnostic {
            severity,
            component,
            profile: profile.map(str::to_string),
            message,
        });
    }

    pub fn events(&self) -> &[Diagnostic] {
        &self.events
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.events.iter().filter(|e| e.severity == severity).count()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Emit every buffered event through the logger, grouped by severity, and clear the buffer
    pub fn flush(&mut self) {
        for event in self.of_severity(Severity::ManualEdit) {
            log::warn!("MANUAL EDIT REQUIRED {}", event);
        }
        for event in self.of_severity(Severity::Warning) {
            log::warn!("{}", event);
        }
        for event in self.of_severity(Severity::Error) {
            log::error!("{}", event);
        }
        self.events.clear();
    }

    fn of_severity(&self, severity: Severity) -> impl Iterator<Item = &Diagnostic> {
        self.events.iter().filter(move |e| e.severity == severity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_keep_insertion_order() {
        let mut diag = Diagnostics::new();
        diag.warn("log", None, "first");
        diag.manual_edit("generate", Some("foo"), "second");
        diag.error("check", Some("foo"), "third");

        let messages: Vec<&str> = diag.events().iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
        assert_eq!(diag.count(Severity::ManualEdit), 1);
    }

    #[test]
    fn flush_clears_buffer() {
        let mut diag = Diagnostics::new();
        diag.warn("log", None, "dropped line");
        diag.flush();
        assert!(diag.is_empty());
    }

    #[test]
    fn display_includes_profile_context() {
        let event = Diagnostic {
            severity: Severity::Warning,
            component: "profile",
            profile: Some("usr.bin.foo".to_string()),
            message: "raw rule kept".to_string(),
        };
        assert_eq!(event.to_string(), "[profile] usr.bin.foo: raw rule kept");
    }
}
