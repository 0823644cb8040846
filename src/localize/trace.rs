use regex::Regex;

/// One `at <owner>.<method>(<file>:<line>)` line of a failure trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub owner: String,
    pub method: String,
    pub file: String,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub struct FrameParser {
    pattern: Regex,
}

impl FrameParser {
    pub fn new() -> Result<Self, regex::Error> {
        let pattern = Regex::new(
            r"(?m)^\s*at\s+(?P<owner>[\w$.]+)\.(?P<method>[\w$<>\-]+)\((?P<file>[^:()\s]+):(?P<line>\d+)\)",
        )?;
        Ok(Self { pattern })
    }

    /// Frames in the order they appear. Frames without a file and line
    /// (native methods, unknown sources) are skipped.
    pub fn parse(&self, text: &str) -> Vec<StackFrame> {
        self.pattern
            .captures_iter(text)
            .filter_map(|cap| {
                Some(StackFrame {
                    owner: cap.name("owner")?.as_str().to_string(),
                    method: cap.name("method")?.as_str().to_string(),
                    file: cap.name("file")?.as_str().to_string(),
                    line: cap.name("line")?.as_str().parse().ok()?,
                })
            })
            .collect()
    }
}
