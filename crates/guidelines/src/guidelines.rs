//! Guideline ingestion: turn a rule-style document into factoid facts.
//!
//! Two layouts are understood.
//!
//! **Index** lines, as found in a guideline's table of contents:
//!
//! ```text
//! * [P: Philosophy](#S-philosophy)
//! * [P.3: Express intent](#Rp-what)
//! ```
//!
//! A section line becomes one fact under its label in the `sec` group. A
//! rule line becomes a fact under `P.3` in group `P`, plus an alias under
//! the anchor (`Rp-what` -> `=P.3`) so either name finds the rule.
//!
//! **Reasons** blocks, as found in the body of the document:
//!
//! ```text
//! ### <a name="Rp-what"></a>P.3: Express intent
//!
//! ##### Reason
//!
//! Unless the intent of some code is stated, ...
//! ```
//!
//! Each heading yields the same rule fact and alias; the lines following
//! the `Reason` marker are appended to the rule's key until two blank lines
//! in a row, the next heading, or the end of the input.
//!
//! # Usage
//!
//! ```rust,no_run
//! use factoid::{FactoidDb, StoreOptions};
//! use factoid_guidelines::{ingest_file, IngestMode};
//!
//! let db = FactoidDb::open("cg-store.redb", "cg-index.redb", StoreOptions::default()).unwrap();
//! let report = ingest_file("CppCoreGuidelines.md", &db, IngestMode::Index).unwrap();
//! println!("{} rules", report.rules);
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use factoid::{FactoidDb, FactoidError};
use regex::Regex;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("read error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] FactoidError),
    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;

/// Group every section fact is filed under.
pub const SECTION_GROUP: &str = "sec";

/// Leading line of an accumulated reason block.
pub const REASON_HEADER: &str = "Reason:";

/// Which document layout to recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestMode {
    /// Table-of-contents bullets: sections and rules.
    #[default]
    Index,
    /// Anchored rule headings with their `Reason` paragraphs.
    Reasons,
}

impl FromStr for IngestMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "index" => Ok(IngestMode::Index),
            "reasons" => Ok(IngestMode::Reasons),
            other => Err(format!("unknown ingest mode {other:?} (expected index or reasons)")),
        }
    }
}

impl std::fmt::Display for IngestMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            IngestMode::Index => "index",
            IngestMode::Reasons => "reasons",
        })
    }
}

/// One store operation produced by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactOp {
    /// Section summary, filed under [`SECTION_GROUP`].
    Section { key: String, text: String },
    /// Primary rule fact, filed under the rule's own group.
    Rule {
        key: String,
        text: String,
        group: String,
    },
    /// `key` becomes an alias line pointing at `target`.
    Alias { key: String, target: String },
    /// One more line of a rule's reason block.
    Reason { key: String, text: String },
}

impl FactOp {
    /// Apply this operation to `db`.
    pub fn apply(&self, db: &FactoidDb) -> std::result::Result<(), FactoidError> {
        match self {
            FactOp::Section { key, text } => db.add_fact(key, text, &[SECTION_GROUP]),
            FactOp::Rule { key, text, group } => db.add_fact(key, text, &[group.as_str()]),
            FactOp::Alias { key, target } => db.add_fact(key, &format!("={target}"), &[]),
            FactOp::Reason { key, text } => db.add_fact(key, text, &[]),
        }
    }
}

/// Counts of what an ingestion run wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub lines_read: usize,
    pub sections: usize,
    pub rules: usize,
    pub aliases: usize,
    pub reason_lines: usize,
}

impl IngestReport {
    fn record(&mut self, op: &FactOp) {
        match op {
            FactOp::Section { .. } => self.sections += 1,
            FactOp::Rule { .. } => self.rules += 1,
            FactOp::Alias { .. } => self.aliases += 1,
            FactOp::Reason { .. } => self.reason_lines += 1,
        }
    }
}

struct Rule {
    key: String,
    text: String,
    group: String,
    anchor: String,
}

impl Rule {
    fn new(group: &str, number: &str, description: &str, anchor: &str) -> Self {
        let key = format!("{group}.{number}");
        Self {
            text: format!("{key}: {} {{{anchor}}}", description.trim()),
            key,
            group: group.to_string(),
            anchor: anchor.to_string(),
        }
    }

    fn ops(self, reason: Vec<String>) -> Vec<FactOp> {
        let mut ops = vec![
            FactOp::Rule {
                key: self.key.clone(),
                text: self.text,
                group: self.group,
            },
            FactOp::Alias {
                key: self.anchor,
                target: self.key.clone(),
            },
        ];
        if !reason.is_empty() {
            ops.push(FactOp::Reason {
                key: self.key.clone(),
                text: REASON_HEADER.to_string(),
            });
            ops.extend(reason.into_iter().map(|text| FactOp::Reason {
                key: self.key.clone(),
                text,
            }));
        }
        ops
    }
}

// Where a Reasons-mode scan is relative to the current heading.
#[derive(Clone, Copy)]
enum State {
    Scanning,
    AfterHeading { blank_seen: bool },
    InReason { blank_run: usize },
}

/// Line-at-a-time guideline scanner.
///
/// Feed lines with [`parse_line`](GuidelineParser::parse_line) and call
/// [`finish`](GuidelineParser::finish) at the end of the input to flush a
/// pending rule.
pub struct GuidelineParser {
    mode: IngestMode,
    section_re: Regex,
    rule_re: Regex,
    heading_re: Regex,
    reason_re: Regex,
    state: State,
    pending: Option<(Rule, Vec<String>)>,
}

impl GuidelineParser {
    pub fn new(mode: IngestMode) -> Result<Self> {
        Ok(Self {
            mode,
            // * [P: Philosophy](#S-philosophy)
            section_re: Regex::new(r"^\s*\*\s+\[([^.:\[\]]+):\s+([^\]]+)\]\(#?([^)\s]+)\)")?,
            // * [P.3: Express intent](#Rp-what)
            rule_re: Regex::new(r"\*\s+\[([^.:\[\]\s]+)\.(\d+):\s+([^\]]+)\]\(#?([^)\s]+)\)")?,
            // ### <a name="Rp-what"></a>P.3: Express intent
            heading_re: Regex::new(
                r#"^#{1,6}\s*<a\s+name="([^"]+)"\s*>\s*</a>\s*([^.:\s]+)\.(\d+):\s*(.+?)\s*$"#,
            )?,
            reason_re: Regex::new(r"^(?:#{1,6}\s*)?Reason:?\s*$")?,
            state: State::Scanning,
            pending: None,
        })
    }

    /// Scan one line; returns the operations it completes.
    pub fn parse_line(&mut self, line: &str) -> Vec<FactOp> {
        let line = line.trim_end_matches(['\r', '\n']);
        match self.mode {
            IngestMode::Index => self.parse_index_line(line),
            IngestMode::Reasons => self.parse_reasons_line(line),
        }
    }

    /// Flush whatever rule is still pending.
    pub fn finish(&mut self) -> Vec<FactOp> {
        self.state = State::Scanning;
        match self.pending.take() {
            Some((rule, reason)) => rule.ops(reason),
            None => Vec::new(),
        }
    }

    fn parse_index_line(&self, line: &str) -> Vec<FactOp> {
        if let Some(caps) = self.rule_re.captures(line) {
            return Rule::new(&caps[1], &caps[2], &caps[3], &caps[4]).ops(Vec::new());
        }
        if let Some(caps) = self.section_re.captures(line) {
            let label = caps[1].trim();
            return vec![FactOp::Section {
                key: label.to_string(),
                text: format!("{label}: [{SECTION_GROUP}] {}", caps[2].trim().to_lowercase()),
            }];
        }
        Vec::new()
    }

    fn parse_reasons_line(&mut self, line: &str) -> Vec<FactOp> {
        if let Some(caps) = self.heading_re.captures(line) {
            let rule = Rule::new(&caps[2], &caps[3], &caps[4], &caps[1]);
            let flushed = self.finish();
            debug!(key = rule.key.as_str(), "rule heading");
            self.pending = Some((rule, Vec::new()));
            self.state = State::AfterHeading { blank_seen: false };
            return flushed;
        }

        let blank = line.trim().is_empty();
        self.state = match self.state {
            State::Scanning => State::Scanning,
            State::AfterHeading { blank_seen } => {
                if self.reason_re.is_match(line.trim()) {
                    State::InReason { blank_run: 0 }
                } else if blank && !blank_seen {
                    State::AfterHeading { blank_seen: true }
                } else {
                    State::Scanning
                }
            }
            State::InReason { blank_run } => {
                if blank {
                    if blank_run + 1 >= 2 {
                        State::Scanning
                    } else {
                        State::InReason {
                            blank_run: blank_run + 1,
                        }
                    }
                } else {
                    if let Some((_, reason)) = self.pending.as_mut() {
                        reason.push(line.to_string());
                    }
                    State::InReason { blank_run: 0 }
                }
            }
        };
        Vec::new()
    }
}

/// Parse `reader` and apply every resulting operation to `db`.
pub fn ingest<R: BufRead>(reader: R, db: &FactoidDb, mode: IngestMode) -> Result<IngestReport> {
    let mut parser = GuidelineParser::new(mode)?;
    let mut report = IngestReport::default();

    for line in reader.lines() {
        let line = line?;
        report.lines_read += 1;
        for op in parser.parse_line(&line) {
            op.apply(db)?;
            report.record(&op);
        }
    }
    for op in parser.finish() {
        op.apply(db)?;
        report.record(&op);
    }

    debug!(?report, "guideline ingested");
    Ok(report)
}

/// [`ingest`] the file at `path`.
pub fn ingest_file(
    path: impl AsRef<Path>,
    db: &FactoidDb,
    mode: IngestMode,
) -> Result<IngestReport> {
    let file = File::open(path.as_ref())?;
    ingest(BufReader::new(file), db, mode)
}
