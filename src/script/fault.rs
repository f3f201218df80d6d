use strum_macros::Display;
use thiserror::Error;

/// Classification of script failures, named the way diagnostics report them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FaultKind {
    SyntaxError,
    NameError,
    TypeError,
    ValueError,
    ZeroDivisionError,
    IndexError,
    AttributeError,
    ImportError,
    RecursionError,
}

/// One reconstructed call frame. Frames are stored outermost call first,
/// matching the order a rendered traceback lists them in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    pub file: String,
    pub line: u32,
    pub function: String,
}

/// A compile or runtime failure raised by the embedded runtime.
///
/// Compile faults carry no frames; runtime faults carry the call frames
/// that were live when they were raised.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", self.render())]
pub struct ScriptFault {
    pub kind: FaultKind,
    pub message: String,
    pub trace: Vec<TraceFrame>,
}

impl ScriptFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            trace: Vec::new(),
        }
    }

    pub fn with_trace(mut self, trace: Vec<TraceFrame>) -> Self {
        self.trace = trace;
        self
    }

    /// Renders the diagnostic: a traceback header and one line per frame
    /// when frames were captured, then the `Kind: detail` tail. No
    /// trailing newline.
    pub fn render(&self) -> String {
        let mut message = String::new();
        if !self.trace.is_empty() {
            message.push_str("Traceback (most recent call last):\n");
            for frame in &self.trace {
                message.push_str(&format!(
                    "  File \"{}\", line {}, in {}\n",
                    frame.file, frame.line, frame.function
                ));
            }
        }
        message.push_str(&format!("{}: {}", self.kind, self.message));
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_without_trace() {
        let fault = ScriptFault::new(FaultKind::SyntaxError, "invalid syntax");
        assert_eq!(fault.render(), "SyntaxError: invalid syntax");
    }

    #[test]
    fn test_render_with_frames_outermost_first() {
        let fault = ScriptFault::new(FaultKind::ZeroDivisionError, "division by zero").with_trace(vec![
            TraceFrame {
                file: "<stdin>".to_string(),
                line: 1,
                function: "<module>".to_string(),
            },
            TraceFrame {
                file: "<stdin>".to_string(),
                line: 1,
                function: "boom".to_string(),
            },
        ]);
        assert_eq!(
            fault.render(),
            "Traceback (most recent call last):\n  File \"<stdin>\", line 1, in <module>\n  File \"<stdin>\", line 1, in boom\nZeroDivisionError: division by zero"
        );
    }

    #[test]
    fn test_display_matches_render() {
        let fault = ScriptFault::new(FaultKind::NameError, "name 'x' is not defined");
        assert_eq!(format!("{}", fault), fault.render());
    }

    #[test]
    fn test_kind_names_serialize_as_variant_names() {
        assert_eq!(FaultKind::ZeroDivisionError.to_string(), "ZeroDivisionError");
        assert_eq!(FaultKind::ImportError.to_string(), "ImportError");
    }
}
