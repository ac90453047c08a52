//! Location and exception extraction from an error block.
//!
//! [`TracebackParser`] walks the block once and asks a [`FrameRecognizer`]
//! which lines are stack frames. The default [`FileLineRecognizer`]
//! understands frames of the form
//!
//! ```text
//!   File "/var/www/app/x.py", line 12, in run
//! ```
//!
//! Frames are ranked first-party, then shared, then anything else; the last
//! frame seen of the best class wins. The first unindented non-frame line
//! after a frame names the exception.

use differ_core::NO_METHOD_LISTED;
use differ_core::config::TracebackConfig;

use crate::error::ScannerError;

/// Precedence class of a stack frame, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FrameClass {
    /// Code owned by a product under the first-party root
    FirstParty,
    /// Shared library code under the first-party root
    Shared,
    /// Everything else (interpreter, site packages)
    Other,
}

/// Fields pulled out of the winning frame line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLocation {
    pub file: String,
    pub line_number: Option<u32>,
    pub method: String,
}

/// Recognizes stack frames for one traceback layout.
pub trait FrameRecognizer: Send + Sync {
    /// Recognizer name, used in logs
    fn name(&self) -> &str;

    /// Classifies `line`, or `None` when it is not a frame.
    fn classify(&self, line: &str) -> Option<FrameClass>;

    /// Splits a frame line into its location fields.
    fn locate(&self, frame: &str) -> Option<FrameLocation>;

    /// Indented lines continue the traceback.
    fn is_continuation(&self, line: &str) -> bool {
        line.starts_with(' ')
    }

    /// Exception name carried by the exception line.
    fn exception_name(&self, line: &str) -> String {
        line.split(':').next().unwrap_or(line).trim().to_owned()
    }

    /// Product owning a location, if the layout knows.
    fn product(&self, _location: &str) -> Option<String> {
        None
    }
}

/// Frames of the form `File "<path>", line <n>, in <method>`.
#[derive(Debug, Clone)]
pub struct FileLineRecognizer {
    first_party_root: String,
    shared_root: String,
}

impl FileLineRecognizer {
    pub fn new(first_party_root: impl Into<String>, shared_root: impl Into<String>) -> Self {
        Self {
            first_party_root: first_party_root.into(),
            shared_root: shared_root.into(),
        }
    }

    pub fn from_config(config: &TracebackConfig) -> Self {
        Self::new(config.first_party_root.clone(), config.shared_root.clone())
    }
}

impl FrameRecognizer for FileLineRecognizer {
    fn name(&self) -> &str {
        "file-line"
    }

    fn classify(&self, line: &str) -> Option<FrameClass> {
        if !line.trim_start().starts_with("File ") {
            return None;
        }
        if !line.contains(&self.first_party_root) {
            return Some(FrameClass::Other);
        }
        if !self.shared_root.is_empty() && line.contains(&self.shared_root) {
            Some(FrameClass::Shared)
        } else {
            Some(FrameClass::FirstParty)
        }
    }

    fn locate(&self, frame: &str) -> Option<FrameLocation> {
        let tokens: Vec<&str> = frame.split_whitespace().collect();
        if tokens.len() < 4 {
            return None;
        }
        Some(FrameLocation {
            file: tokens[1]
                .trim_matches(|c| c == '\'' || c == '"' || c == ',')
                .to_owned(),
            line_number: tokens[3].trim_matches(',').parse().ok(),
            method: tokens
                .get(5)
                .map_or_else(|| NO_METHOD_LISTED.to_owned(), |m| (*m).to_owned()),
        })
    }

    fn product(&self, location: &str) -> Option<String> {
        if let Some(rest) = location.strip_prefix(self.first_party_root.as_str()) {
            return rest
                .split('/')
                .next()
                .filter(|segment| !segment.is_empty())
                .map(str::to_owned);
        }
        if location.starts_with("/usr") {
            return Some("ops".to_owned());
        }
        None
    }
}

/// Fields extracted from one block. All absent when no frame was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedBlock {
    pub location: Option<String>,
    pub line_number: Option<u32>,
    pub method: Option<String>,
    pub exception: Option<String>,
}

/// Applies a [`FrameRecognizer`] to whole blocks.
pub struct TracebackParser {
    recognizer: Box<dyn FrameRecognizer>,
}

impl TracebackParser {
    pub fn new(recognizer: Box<dyn FrameRecognizer>) -> Self {
        Self { recognizer }
    }

    pub fn from_config(config: &TracebackConfig) -> Result<Self, ScannerError> {
        if config.first_party_root.is_empty() {
            return Err(ScannerError::Config {
                field: "traceback.first_party_root".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        Ok(Self::new(Box::new(FileLineRecognizer::from_config(config))))
    }

    pub fn recognizer(&self) -> &dyn FrameRecognizer {
        self.recognizer.as_ref()
    }

    /// Never fails; missing pieces are left as `None`.
    pub fn parse(&self, block: &str) -> ParsedBlock {
        let mut first_party: Option<&str> = None;
        let mut shared: Option<&str> = None;
        let mut other: Option<&str> = None;
        let mut exception: Option<&str> = None;

        for line in block.lines() {
            match self.recognizer.classify(line) {
                Some(FrameClass::FirstParty) => first_party = Some(line),
                Some(FrameClass::Shared) => shared = Some(line),
                Some(FrameClass::Other) => other = Some(line),
                None => {
                    let seen_frame = first_party.is_some() || shared.is_some() || other.is_some();
                    if seen_frame
                        && !line.trim().is_empty()
                        && !self.recognizer.is_continuation(line)
                    {
                        exception = Some(line);
                        break;
                    }
                }
            }
        }

        let mut parsed = ParsedBlock {
            exception: exception.map(|line| self.recognizer.exception_name(line)),
            ..ParsedBlock::default()
        };

        if let Some(frame) = first_party.or(shared).or(other) {
            match self.recognizer.locate(frame) {
                Some(location) => {
                    parsed.location = Some(location.file);
                    parsed.line_number = location.line_number;
                    parsed.method = Some(location.method);
                }
                None => tracing::debug!(
                    recognizer = self.recognizer.name(),
                    frame,
                    "frame line too short to locate"
                ),
            }
        }

        parsed
    }
}

impl std::fmt::Debug for TracebackParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracebackParser")
            .field("recognizer", &self.recognizer.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> TracebackParser {
        TracebackParser::from_config(&TracebackConfig::default()).unwrap()
    }

    #[test]
    fn first_party_frame_wins() {
        let block = "\
Traceback (most recent call last):
  File \"/usr/lib/python2.7/site.py\", line 3, in boot
  File \"/var/www/app/x.py\", line 12, in run
  File \"/usr/lib/python2.7/json.py\", line 40, in loads
ValueError: bad value
";
        let parsed = parser().parse(block);
        assert_eq!(parsed.location.as_deref(), Some("/var/www/app/x.py"));
        assert_eq!(parsed.line_number, Some(12));
        assert_eq!(parsed.method.as_deref(), Some("run"));
        assert_eq!(parsed.exception.as_deref(), Some("ValueError"));
    }

    #[test]
    fn shared_beats_other() {
        let block = "\
  File '/var/www/example/fileserver/client.py', line 50, in _connect
  File '/usr/lib/python2.7/socket.py', line 571, in create_connection
IOError: connection refused
";
        let parsed = parser().parse(block);
        assert_eq!(
            parsed.location.as_deref(),
            Some("/var/www/example/fileserver/client.py")
        );
        assert_eq!(parsed.line_number, Some(50));
        assert_eq!(parsed.method.as_deref(), Some("_connect"));
    }

    #[test]
    fn last_frame_of_class_wins() {
        let block = "\
  File \"/var/www/app/a.py\", line 1, in outer
  File \"/var/www/app/b.py\", line 2, in inner
KeyError: 'x'
";
        let parsed = parser().parse(block);
        assert_eq!(parsed.location.as_deref(), Some("/var/www/app/b.py"));
        assert_eq!(parsed.exception.as_deref(), Some("KeyError"));
    }

    #[test]
    fn indented_source_lines_do_not_end_traceback() {
        let block = "\
  File \"/var/www/app/x.py\", line 12, in run
    value = int(raw)

TypeError: unsupported operand
";
        let parsed = parser().parse(block);
        assert_eq!(parsed.exception.as_deref(), Some("TypeError"));
    }

    #[test]
    fn missing_method_uses_placeholder() {
        let parsed = parser().parse("  File \"/var/www/app/x.py\", line 7\nOops\n");
        assert_eq!(parsed.method.as_deref(), Some(NO_METHOD_LISTED));
        assert_eq!(parsed.line_number, Some(7));
    }

    #[test]
    fn non_numeric_line_is_absent() {
        let parsed = parser().parse("  File \"/var/www/app/x.py\", line ?, in run\n");
        assert_eq!(parsed.location.as_deref(), Some("/var/www/app/x.py"));
        assert_eq!(parsed.line_number, None);
    }

    #[test]
    fn short_frame_yields_no_location() {
        let parsed = parser().parse("  File x.py\nBoom: now\n");
        assert!(parsed.location.is_none());
        assert!(parsed.method.is_none());
        assert_eq!(parsed.exception.as_deref(), Some("Boom"));
    }

    #[test]
    fn block_without_frames_is_empty() {
        let parsed = parser().parse("2024-01-01 ERROR something broke\nmore text\n");
        assert_eq!(parsed, ParsedBlock::default());
    }

    #[test]
    fn product_from_location() {
        let recognizer = FileLineRecognizer::from_config(&TracebackConfig::default());
        assert_eq!(
            recognizer.product("/var/www/kitsap/controllers/x.py").as_deref(),
            Some("kitsap")
        );
        assert_eq!(
            recognizer.product("/usr/lib/python2.7/json.py").as_deref(),
            Some("ops")
        );
        assert_eq!(recognizer.product("/opt/tool/x.py"), None);
    }

    #[test]
    fn empty_first_party_root_is_rejected() {
        let config = TracebackConfig {
            first_party_root: String::new(),
            ..TracebackConfig::default()
        };
        assert!(matches!(
            TracebackParser::from_config(&config),
            Err(ScannerError::Config { .. })
        ));
    }
}
