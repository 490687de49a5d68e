//! Message classification (schema sniffing)
//!
//! Maps a raw payload to exactly one [`MessageKind`] without deserializing it.
//! Classification is pure and total: the same envelope always yields the same
//! kind, and a payload nothing recognises is [`MessageKind::Unknown`], never
//! an error.
//!
//! # Rule families
//!
//! - **JSON rules** look for a discriminator (`"type": "X"`, `"type":"X"`,
//!   `"messageType": "X"`, `"messageType":"X"`) or a bespoke marker token in the
//!   first [`ScanWindow::max_lines`] lines, each truncated to
//!   [`ScanWindow::max_chars_per_line`] characters. This bounds the cost on
//!   very large payloads. A discriminator only counts as a key of the
//!   outermost object; the same text inside a nested object or a string value
//!   is ignored. Marker tokens match anywhere.
//! - **Header rules** match the first non-empty line against an exact header
//!   prefix. They are the only rules evaluated when the source hint has a
//!   delimited-text extension, or when a file arrives with no extension at all.
//!
//! Rules are tried in registration order and the first match wins.

pub mod rules;

use crate::config::ClassifierConfig;
use crate::types::{MessageEnvelope, MessageKind, Transport};

pub use rules::default_rules;

/// Extensions that select the header rule family
pub const DELIMITED_EXTENSIONS: [&str; 2] = ["csv", "tsv"];

/// Bounds on how much of a JSON payload is inspected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub max_lines: usize,
    pub max_chars_per_line: usize,
}

impl Default for ScanWindow {
    fn default() -> Self {
        ClassifierConfig::default().into()
    }
}

impl From<ClassifierConfig> for ScanWindow {
    fn from(config: ClassifierConfig) -> Self {
        Self {
            max_lines: config.max_lines.max(1),
            max_chars_per_line: config.max_chars_per_line.max(1),
        }
    }
}

/// One way of recognising a payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discriminator {
    /// Value of the `"type"` or `"messageType"` key, either spacing variant
    TypeField(String),
    /// Bespoke substring marker
    Token(String),
    /// Exact prefix of the first content line of delimited text
    HeaderPrefix(String),
}

impl Discriminator {
    /// Substrings any of which identifies the payload
    fn patterns(&self) -> Vec<String> {
        match self {
            Discriminator::TypeField(value) => ["type", "messageType"]
                .iter()
                .flat_map(|key| {
                    [
                        format!("\"{}\": \"{}\"", key, value),
                        format!("\"{}\":\"{}\"", key, value),
                    ]
                })
                .collect(),
            Discriminator::Token(token) => vec![token.clone()],
            Discriminator::HeaderPrefix(prefix) => vec![prefix.clone()],
        }
    }

    fn is_header(&self) -> bool {
        matches!(self, Discriminator::HeaderPrefix(_))
    }
}

/// A registered mapping from discriminators to a kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRule {
    pub kind: MessageKind,
    pub discriminators: Vec<Discriminator>,
    pub scan_window: ScanWindow,
    pub required_extension: Option<String>,
    /// Expanded `TypeField` keys, matched at the top level only
    fields: Vec<String>,
    /// Token and header substrings, matched anywhere
    patterns: Vec<String>,
}

impl ClassificationRule {
    /// Empty JSON rule; add discriminators with [`ClassificationRule::discriminator`]
    pub fn json(kind: MessageKind, scan_window: ScanWindow) -> Self {
        Self {
            kind,
            discriminators: Vec::new(),
            scan_window,
            required_extension: None,
            fields: Vec::new(),
            patterns: Vec::new(),
        }
    }

    /// Header-line rule for delimited text
    pub fn header(kind: MessageKind, prefix: impl Into<String>) -> Self {
        Self::json(
            kind,
            ScanWindow {
                max_lines: 1,
                max_chars_per_line: usize::MAX,
            },
        )
        .discriminator(Discriminator::HeaderPrefix(prefix.into()))
    }

    pub fn discriminator(mut self, discriminator: Discriminator) -> Self {
        match discriminator {
            Discriminator::TypeField(_) => self.fields.extend(discriminator.patterns()),
            _ => self.patterns.extend(discriminator.patterns()),
        }
        self.discriminators.push(discriminator);
        self
    }

    pub fn required_extension(mut self, ext: impl Into<String>) -> Self {
        self.required_extension = Some(ext.into().to_ascii_lowercase());
        self
    }

    /// True if this rule belongs to the header family
    pub fn is_header_rule(&self) -> bool {
        !self.discriminators.is_empty() && self.discriminators.iter().all(Discriminator::is_header)
    }

    fn extension_allows(&self, extension: Option<&str>) -> bool {
        match &self.required_extension {
            Some(required) => extension == Some(required.as_str()),
            None => true,
        }
    }

    fn matches_json(&self, text: &str) -> bool {
        let mut depth = 0;
        scan_lines(text, self.scan_window).any(|line| {
            self.patterns.iter().any(|p| line.contains(p.as_str()))
                || (!self.fields.is_empty() && top_level_key(line, &mut depth, &self.fields))
        })
    }

    fn matches_header(&self, first_line: &str) -> bool {
        self.patterns.iter().any(|p| first_line.contains(p.as_str()))
    }
}

/// Lines of the scan window, each truncated to the character limit
fn scan_lines(text: &str, window: ScanWindow) -> impl Iterator<Item = &str> {
    text.lines()
        .take(window.max_lines)
        .map(move |line| truncate_chars(line, window.max_chars_per_line))
}

/// True if a string on `line` that opens directly inside the outermost
/// object or array starts with one of `keys`. `depth` carries the bracket
/// nesting over from earlier lines.
fn top_level_key(line: &str, depth: &mut usize, keys: &[String]) -> bool {
    let mut in_string = false;
    let mut escaped = false;
    for (idx, c) in line.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '{' | '[' => *depth += 1,
            '}' | ']' => *depth = depth.saturating_sub(1),
            '"' => {
                let rest = &line[idx..];
                if *depth == 1 && keys.iter().any(|k| rest.starts_with(k.as_str())) {
                    return true;
                }
                in_string = true;
            }
            _ => {}
        }
    }
    false
}

fn truncate_chars(line: &str, max_chars: usize) -> &str {
    match line.char_indices().nth(max_chars) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

/// First non-blank line, without a byte-order mark or trailing carriage return
fn first_content_line(text: &str) -> Option<&str> {
    text.trim_start_matches('\u{feff}')
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .find(|l| !l.trim().is_empty())
}

/// Whether an envelope is evaluated against the header rule family
pub fn uses_header_rules(envelope: &MessageEnvelope) -> bool {
    match envelope.extension() {
        Some(ext) => DELIMITED_EXTENSIONS.contains(&ext.as_str()),
        None => envelope.transport() == Transport::File,
    }
}

/// Ordered rule table plus the classification entry point
#[derive(Debug, Clone)]
pub struct MessageClassifier {
    rules: Vec<ClassificationRule>,
}

impl Default for MessageClassifier {
    fn default() -> Self {
        Self::new(ScanWindow::default())
    }
}

impl MessageClassifier {
    /// Classifier with the default rule table
    pub fn new(window: ScanWindow) -> Self {
        Self::with_rules(default_rules(window))
    }

    /// Classifier with a caller-supplied rule table
    pub fn with_rules(rules: Vec<ClassificationRule>) -> Self {
        Self { rules }
    }

    /// Append a rule at the lowest priority
    pub fn register(&mut self, rule: ClassificationRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// The first rule that matches, if any
    pub fn matching_rule(&self, envelope: &MessageEnvelope) -> Option<&ClassificationRule> {
        let text = envelope.text();
        let extension = envelope.extension();

        if uses_header_rules(envelope) {
            let first_line = first_content_line(&text)?;
            self.rules
                .iter()
                .filter(|r| r.is_header_rule())
                .filter(|r| r.extension_allows(extension.as_deref()))
                .find(|r| r.matches_header(first_line))
        } else {
            self.rules
                .iter()
                .filter(|r| !r.is_header_rule())
                .filter(|r| r.extension_allows(extension.as_deref()))
                .find(|r| r.matches_json(&text))
        }
    }

    /// Classify an envelope; `Unknown` when no rule matches
    pub fn classify(&self, envelope: &MessageEnvelope) -> MessageKind {
        self.matching_rule(envelope)
            .map(|rule| rule.kind)
            .unwrap_or(MessageKind::Unknown)
    }
}
