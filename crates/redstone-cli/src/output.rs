//! Terminal output for `redstone` commands
//!
//! Commands report through an [`OutputFormatter`] as a sequence of status
//! lines, each with a [`Tone`]. Human mode prints a marker per line; JSON
//! mode prints one object per line and skips details, which commands
//! replace with a full document through [`OutputFormatter::print_json`].

use serde_json::json;

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        self == OutputFormat::Json
    }
}

/// Kind of a status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// The requested change or sync went through
    Done,
    /// Local changes are queued and will go out on a later sync
    Pending,
    Warning,
    Failed,
    /// Indented supporting line under the previous one
    Detail,
}

impl Tone {
    fn as_str(self) -> &'static str {
        match self {
            Tone::Done => "done",
            Tone::Pending => "pending",
            Tone::Warning => "warning",
            Tone::Failed => "failed",
            Tone::Detail => "detail",
        }
    }

    fn to_stderr(self) -> bool {
        matches!(self, Tone::Warning | Tone::Failed)
    }
}

/// Renders a status line for a terminal
pub fn human_line(tone: Tone, message: &str) -> String {
    match tone {
        Tone::Done => format!("\u{2713} {message}"),
        Tone::Pending => format!("\u{21bb} {message}"),
        Tone::Warning => format!("\u{26a0} Warning: {message}"),
        Tone::Failed => format!("\u{2717} Error: {message}"),
        Tone::Detail => format!("  {message}"),
    }
}

/// Renders a status line as a JSON object; details have none
pub fn json_line(tone: Tone, message: &str) -> Option<serde_json::Value> {
    match tone {
        Tone::Detail => None,
        Tone::Failed => Some(json!({ "status": tone.as_str(), "error": message })),
        _ => Some(json!({ "status": tone.as_str(), "message": message })),
    }
}

/// Sink for command output
pub trait OutputFormatter {
    fn line(&self, tone: Tone, message: &str);
    fn print_json(&self, value: &serde_json::Value);

    fn success(&self, message: &str) {
        self.line(Tone::Done, message);
    }
    fn pending(&self, message: &str) {
        self.line(Tone::Pending, message);
    }
    fn warn(&self, message: &str) {
        self.line(Tone::Warning, message);
    }
    fn error(&self, message: &str) {
        self.line(Tone::Failed, message);
    }
    fn info(&self, message: &str) {
        self.line(Tone::Detail, message);
    }
}

/// Marked lines for people
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn line(&self, tone: Tone, message: &str) {
        let text = human_line(tone, message);
        if tone.to_stderr() {
            eprintln!("{text}");
        } else {
            println!("{text}");
        }
    }

    // Human mode prints status lines instead
    fn print_json(&self, _value: &serde_json::Value) {}
}

/// One JSON object per line, for scripts
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn line(&self, tone: Tone, message: &str) {
        let Some(value) = json_line(tone, message) else {
            return;
        };
        if tone.to_stderr() {
            eprintln!("{value}");
        } else {
            println!("{value}");
        }
    }

    fn print_json(&self, value: &serde_json::Value) {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{text}"),
            Err(err) => eprintln!("{}", json!({ "status": "failed", "error": err.to_string() })),
        }
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Human => Box::new(HumanFormatter),
    }
}

/// "1 file", "2 files"
pub fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// Shortens an id for table display
pub fn short_id(id: &str, width: usize) -> String {
    if id.chars().count() <= width {
        id.to_string()
    } else {
        let head: String = id.chars().take(width.saturating_sub(1)).collect();
        format!("{head}\u{2026}")
    }
}
