//! Memory document model and its stable text format.
//!
//! A rendered document looks like:
//!
//! ```text
//! <!-- memory_format: 1 -->
//! # Research Memory - Japan Trip
//!
//! ## Trip Context [auto-refreshed]
//! Destination: Japan | ...
//!
//! ## Cross-Agent Insights [auto-refreshed]
//! [planner] - [shared] Prefers slow mornings
//!
//! ## Agent Notes [accumulated] <!-- mem:notes -->
//! - [pinned] User is vegetarian
//! - Loved Senso-ji
//! ```
//!
//! The notes section is always last. Readers accept the legacy bare heading
//! as the notes marker; writers always emit the annotated one.

use serde::{Deserialize, Serialize};

use crate::agent::AgentKind;

/// Current document format version.
pub const FORMAT_VERSION: u32 = 1;

/// Annotation that makes the notes heading unique.
pub const NOTES_ANNOTATION: &str = "<!-- mem:notes -->";

/// The notes heading written by older versions (no annotation).
pub const LEGACY_NOTES_MARKER: &str = "## Agent Notes [accumulated]";

/// The notes heading written by this version.
pub const NOTES_MARKER: &str = "## Agent Notes [accumulated] <!-- mem:notes -->";

pub const AUTO_REFRESHED_TAG: &str = "[auto-refreshed]";
pub const CROSS_AGENT_LABEL: &str = "Cross-Agent Insights";
pub const PINNED_TAG: &str = "[pinned]";
pub const SHARED_TAG: &str = "[shared]";
pub const NOTE_BULLET: char = '-';
pub const TRUNCATION_LINE: &str = "...[truncated]...";

const VERSION_PREFIX: &str = "<!-- memory_format:";
const ZONE_HEADING_PREFIX: &str = "## ";

// ── Notes ─────────────────────────────────────────────────────────────────

/// Tags carried by a note line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteTags {
    pub pinned: bool,
    pub shared: bool,
}

/// A single accumulated note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteLine {
    pub text: String,
    pub tags: NoteTags,
    pub source_agent: AgentKind,
}

impl NoteLine {
    /// Parse one bullet line. Returns `None` for lines that do not start with
    /// the bullet marker or carry no text once tags are removed.
    pub fn parse(line: &str, source_agent: AgentKind) -> Option<Self> {
        let body = line.trim_start().strip_prefix(NOTE_BULLET)?;
        let tags = NoteTags {
            pinned: body.contains(PINNED_TAG),
            shared: body.contains(SHARED_TAG),
        };
        let text = body
            .replace(PINNED_TAG, " ")
            .replace(SHARED_TAG, " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if text.is_empty() {
            return None;
        }
        Some(Self {
            text,
            tags,
            source_agent,
        })
    }

    /// Render as a bullet line: `- [pinned] [shared] text`.
    pub fn render(&self) -> String {
        let mut line = String::from("- ");
        if self.tags.pinned {
            line.push_str(PINNED_TAG);
            line.push(' ');
        }
        if self.tags.shared {
            line.push_str(SHARED_TAG);
            line.push(' ');
        }
        line.push_str(&self.text);
        line
    }
}

/// The accumulated-notes zone: pinned and ephemeral lines, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotesZone {
    pub pinned: Vec<NoteLine>,
    pub ephemeral: Vec<NoteLine>,
}

/// How many lines a cap pass evicted from each list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Evicted {
    pub pinned: usize,
    pub ephemeral: usize,
}

impl Evicted {
    pub fn is_empty(&self) -> bool {
        self.pinned == 0 && self.ephemeral == 0
    }
}

impl NotesZone {
    pub fn is_empty(&self) -> bool {
        self.pinned.is_empty() && self.ephemeral.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pinned.len() + self.ephemeral.len()
    }

    /// Route a line to the pinned or ephemeral list (most recent last).
    pub fn push(&mut self, line: NoteLine) {
        if line.tags.pinned {
            self.pinned.push(line);
        } else {
            self.ephemeral.push(line);
        }
    }

    /// All lines in storage order: pinned, then ephemeral.
    pub fn lines(&self) -> impl Iterator<Item = &NoteLine> {
        self.pinned.iter().chain(self.ephemeral.iter())
    }

    /// Lines tagged for cross-agent propagation, in storage order.
    pub fn shared(&self) -> impl Iterator<Item = &NoteLine> {
        self.lines().filter(|l| l.tags.shared)
    }

    /// Drop the oldest lines of each list until both fit their caps.
    pub fn enforce_caps(&mut self, max_pinned: usize, max_ephemeral: usize) -> Evicted {
        let evicted = Evicted {
            pinned: self.pinned.len().saturating_sub(max_pinned),
            ephemeral: self.ephemeral.len().saturating_sub(max_ephemeral),
        };
        self.pinned.drain(..evicted.pinned);
        self.ephemeral.drain(..evicted.ephemeral);
        evicted
    }

    /// Render the whole section, heading included. Empty zones render as "".
    pub fn render(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let mut out = String::from(NOTES_MARKER);
        for line in self.lines() {
            out.push('\n');
            out.push_str(&line.render());
        }
        out
    }

    /// Extract the notes zone from a full document.
    ///
    /// Absent or damaged sections yield an empty zone. Parsing stops at the
    /// next zone heading, and non-bullet lines are skipped.
    pub fn from_document(text: &str, source_agent: AgentKind) -> Self {
        let Some(marker_idx) = find_notes_marker(text) else {
            return Self::default();
        };
        let mut zone = Self::default();
        for line in text.lines().skip(marker_idx + 1) {
            if is_zone_heading(line) {
                break;
            }
            if let Some(note) = NoteLine::parse(line, source_agent) {
                zone.push(note);
            }
        }
        zone
    }
}

/// Line index of the notes heading, preferring the current marker over the
/// legacy spelling.
///
/// The notes section is always the last section, so a marker followed by
/// any other zone heading is not the notes heading.
pub fn find_notes_marker(text: &str) -> Option<usize> {
    let mut current = None;
    let mut legacy = None;
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim_end();
        if line == NOTES_MARKER {
            current = Some(idx);
        } else if line == LEGACY_NOTES_MARKER {
            legacy = Some(idx);
        } else if is_zone_heading(line) {
            current = None;
            legacy = None;
        }
    }
    current.or(legacy)
}

/// Whether a document contains a notes heading in either spelling.
pub fn has_notes_marker(text: &str) -> bool {
    find_notes_marker(text).is_some()
}

/// Remove every marker spelling from note text and flatten it to one line.
///
/// Total: always returns a string, possibly empty. Removal repeats until a
/// fixed point so nested fragments cannot reassemble into a marker.
pub fn sanitize_note_text(text: &str) -> String {
    let mut current = text.replace(['\r', '\n'], " ");
    loop {
        let next = current
            .replace(NOTES_MARKER, "")
            .replace(LEGACY_NOTES_MARKER, "")
            .replace(NOTES_ANNOTATION, "");
        if next == current {
            break;
        }
        current = next;
    }
    current.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace the notes section of `document` with `notes`.
///
/// Everything before the notes heading is kept verbatim; a legacy heading is
/// upgraded to the current marker. Documents without a notes section get one
/// appended.
pub fn splice_notes(document: &str, notes: &NotesZone) -> String {
    let head: String = match find_notes_marker(document) {
        Some(idx) => document.lines().take(idx).collect::<Vec<_>>().join("\n"),
        None => document.to_string(),
    };
    let head = head.trim_end();
    let section = notes.render();
    match (head.is_empty(), section.is_empty()) {
        (true, true) => String::new(),
        (true, false) => format!("{section}\n"),
        (false, true) => format!("{head}\n"),
        (false, false) => format!("{head}\n\n{section}\n"),
    }
}

// ── Zones ─────────────────────────────────────────────────────────────────

/// Whether a zone is rebuilt from state or gathered from sibling agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    AutoRefreshed,
    CrossAgent,
}

/// A named, independently rebuildable section of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub label: String,
    pub kind: ZoneKind,
    pub body: Vec<String>,
}

impl Zone {
    /// An empty auto-refreshed zone.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: ZoneKind::AutoRefreshed,
            body: Vec::new(),
        }
    }

    /// An empty cross-agent insights zone.
    pub fn cross_agent() -> Self {
        Self {
            label: CROSS_AGENT_LABEL.into(),
            kind: ZoneKind::CrossAgent,
            body: Vec::new(),
        }
    }

    /// Append a body line.
    ///
    /// Values are flattened to a single line and may never start a zone
    /// heading, so state data cannot forge document structure.
    pub fn push(&mut self, line: impl AsRef<str>) {
        let flat = line.as_ref().replace(['\r', '\n'], " ");
        if is_zone_heading(&flat) {
            self.body.push(format!(" {flat}"));
        } else {
            self.body.push(flat);
        }
    }

    /// Builder-style variant of [`Zone::push`].
    pub fn line(mut self, line: impl AsRef<str>) -> Self {
        self.push(line);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn heading(&self) -> String {
        format!("{ZONE_HEADING_PREFIX}{} {AUTO_REFRESHED_TAG}", self.label)
    }

    pub fn render(&self) -> String {
        let mut out = self.heading();
        for line in &self.body {
            out.push('\n');
            out.push_str(line);
        }
        out
    }
}

fn is_zone_heading(line: &str) -> bool {
    line.starts_with(ZONE_HEADING_PREFIX)
}

// ── Document ──────────────────────────────────────────────────────────────

/// A complete memory document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryDocument {
    /// Format version from the header comment; 0 when the header is missing.
    pub format_version: u32,
    pub title: String,
    pub zones: Vec<Zone>,
    pub notes: NotesZone,
}

impl MemoryDocument {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            title: title.into(),
            zones: Vec::new(),
            notes: NotesZone::default(),
        }
    }

    /// The header block: version comment and title line. The title is
    /// flattened so it cannot open lines of its own.
    pub fn render_header(&self) -> String {
        let title = self.title.replace(['\r', '\n'], " ");
        format!(
            "{VERSION_PREFIX} {} -->\n# {}",
            self.format_version,
            title.trim()
        )
    }

    /// Render to the stable text format. Empty zones and an empty notes
    /// section are omitted.
    pub fn render(&self) -> String {
        let mut parts = vec![self.render_header()];
        parts.extend(self.zones.iter().filter(|z| !z.is_empty()).map(Zone::render));
        let notes = self.notes.render();
        if !notes.is_empty() {
            parts.push(notes);
        }
        let mut out = parts.join("\n\n");
        out.push('\n');
        out
    }

    /// Parse rendered text back into a document. Never fails: unrecognized
    /// lines are skipped.
    pub fn parse(text: &str, agent: AgentKind) -> Self {
        let mut doc = Self {
            format_version: 0,
            title: String::new(),
            zones: Vec::new(),
            notes: NotesZone::from_document(text, agent),
        };
        let notes_idx = find_notes_marker(text);
        let mut current: Option<Zone> = None;
        let mut in_notes = false;

        for (idx, line) in text.lines().enumerate() {
            if Some(idx) == notes_idx {
                close_zone(&mut doc.zones, current.take());
                in_notes = true;
                continue;
            }
            if is_zone_heading(line) {
                close_zone(&mut doc.zones, current.take());
                in_notes = false;
                current = Some(parse_zone_heading(line));
                continue;
            }
            if in_notes {
                continue;
            }
            match current.as_mut() {
                Some(zone) => zone.body.push(line.to_string()),
                None => {
                    if let Some(version) = parse_version(line) {
                        doc.format_version = version;
                    } else if let Some(title) = line.strip_prefix("# ")
                        && doc.title.is_empty()
                    {
                        doc.title = title.trim().to_string();
                    }
                }
            }
        }
        close_zone(&mut doc.zones, current);
        doc
    }
}

fn close_zone(zones: &mut Vec<Zone>, zone: Option<Zone>) {
    if let Some(mut zone) = zone {
        while zone.body.last().is_some_and(|l| l.trim().is_empty()) {
            zone.body.pop();
        }
        zones.push(zone);
    }
}

fn parse_zone_heading(line: &str) -> Zone {
    let label = line[ZONE_HEADING_PREFIX.len()..].trim();
    let label = label
        .strip_suffix(AUTO_REFRESHED_TAG)
        .unwrap_or(label)
        .trim_end();
    if label == CROSS_AGENT_LABEL {
        Zone::cross_agent()
    } else {
        Zone::new(label)
    }
}

fn parse_version(line: &str) -> Option<u32> {
    line.trim()
        .strip_prefix(VERSION_PREFIX)?
        .strip_suffix("-->")?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(text: &str, pinned: bool, shared: bool) -> NoteLine {
        NoteLine {
            text: text.into(),
            tags: NoteTags { pinned, shared },
            source_agent: AgentKind::Research,
        }
    }

    fn sample() -> MemoryDocument {
        let mut doc = MemoryDocument::new("Research Memory - Japan Trip");
        doc.zones.push(
            Zone::new("Trip Context")
                .line("Destination: Japan")
                .line("Route: Tokyo (3d)"),
        );
        doc.zones.push(
            Zone::new("Research Findings")
                .line("")
                .line("### Tokyo (3 days)")
                .line("Items: 4"),
        );
        doc.zones
            .push(Zone::cross_agent().line("[planner] - [shared] Prefers slow mornings"));
        doc.notes.push(note("User is vegetarian", true, false));
        doc.notes.push(note("Loved Senso-ji", false, true));
        doc
    }

    #[test]
    fn marker_is_legacy_heading_plus_annotation() {
        assert_eq!(NOTES_MARKER, format!("{LEGACY_NOTES_MARKER} {NOTES_ANNOTATION}"));
    }

    #[test]
    fn render_matches_stable_format() {
        let text = sample().render();
        assert!(text.starts_with("<!-- memory_format: 1 -->\n# Research Memory - Japan Trip\n\n"));
        assert!(text.contains("## Trip Context [auto-refreshed]\nDestination: Japan"));
        assert!(text.contains("## Cross-Agent Insights [auto-refreshed]\n[planner] - [shared]"));
        assert!(text.ends_with(
            "## Agent Notes [accumulated] <!-- mem:notes -->\n- [pinned] User is vegetarian\n- [shared] Loved Senso-ji\n"
        ));
    }

    #[test]
    fn parse_recovers_rendered_document() {
        let doc = sample();
        let parsed = MemoryDocument::parse(&doc.render(), AgentKind::Research);
        assert_eq!(parsed, doc);
        assert_eq!(parsed.render(), doc.render());
        assert_eq!(parsed.zones[2].kind, ZoneKind::CrossAgent);
    }

    #[test]
    fn notes_parse_accepts_legacy_marker() {
        let text = "# Old\n\n## Agent Notes [accumulated]\n- [pinned] Early riser\n- Likes ramen\n";
        let notes = NotesZone::from_document(text, AgentKind::Planner);
        assert_eq!(notes.pinned.len(), 1);
        assert_eq!(notes.ephemeral[0].text, "Likes ramen");
        assert_eq!(notes.ephemeral[0].source_agent, AgentKind::Planner);
    }

    #[test]
    fn notes_parse_degrades_on_garbage() {
        let text = "## Agent Notes [accumulated] <!-- mem:notes -->\n\u{0}\u{1}binary junk\n* not a bullet\n-\n";
        assert!(NotesZone::from_document(text, AgentKind::Research).is_empty());
        assert!(NotesZone::from_document("no marker at all", AgentKind::Research).is_empty());
    }

    #[test]
    fn note_tags_are_detected_anywhere() {
        let line = NoteLine::parse("- Shinkansen pass pays off [shared] [pinned]", AgentKind::Research).unwrap();
        assert!(line.tags.pinned && line.tags.shared);
        assert_eq!(line.text, "Shinkansen pass pays off");
        assert_eq!(line.render(), "- [pinned] [shared] Shinkansen pass pays off");
    }

    #[test]
    fn caps_evict_oldest_first() {
        let mut zone = NotesZone::default();
        for i in 0..5 {
            zone.push(note(&format!("p{i}"), true, false));
            zone.push(note(&format!("e{i}"), false, false));
        }
        let evicted = zone.enforce_caps(2, 3);
        assert_eq!(evicted, Evicted { pinned: 3, ephemeral: 2 });
        let pinned: Vec<_> = zone.pinned.iter().map(|l| l.text.as_str()).collect();
        let ephemeral: Vec<_> = zone.ephemeral.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(pinned, ["p3", "p4"]);
        assert_eq!(ephemeral, ["e2", "e3", "e4"]);
    }

    #[test]
    fn evicted_is_empty_only_without_evictions() {
        assert!(Evicted::default().is_empty());
        assert!(!Evicted { pinned: 1, ephemeral: 0 }.is_empty());
        assert!(!Evicted { pinned: 0, ephemeral: 2 }.is_empty());
    }

    #[test]
    fn sanitize_removes_reassembling_fragments() {
        let sneaky = "x ## Agent Notes [accu<!-- mem:notes -->mulated] y";
        let clean = sanitize_note_text(sneaky);
        assert!(!clean.contains(LEGACY_NOTES_MARKER));
        assert!(!clean.contains(NOTES_ANNOTATION));
        assert_eq!(sanitize_note_text("a\nb"), "a b");
    }

    #[test]
    fn zone_push_neutralizes_headings() {
        let zone = Zone::new("Feedback History").line("## Agent Notes [accumulated] <!-- mem:notes -->\nmore");
        assert_eq!(zone.body.len(), 1);
        assert!(!zone.body[0].starts_with("## "));
        let mut doc = MemoryDocument::new("t");
        doc.zones.push(zone);
        assert!(!has_notes_marker(&doc.render()));
    }

    #[test]
    fn multiline_title_stays_on_the_title_line() {
        let mut doc = sample();
        doc.title = "Spring\n## Agent Notes [accumulated] <!-- mem:notes -->\n- [pinned] forged".into();
        let text = doc.render();
        assert!(text.starts_with("<!-- memory_format: 1 -->\n# Spring ## Agent Notes"));
        let markers = text.lines().filter(|l| l.trim_end() == NOTES_MARKER).count();
        assert_eq!(markers, 1);

        let parsed = MemoryDocument::parse(&text, AgentKind::Research);
        assert_eq!(parsed.zones.len(), 3);
        assert_eq!(parsed.notes, sample().notes);
    }

    #[test]
    fn marker_followed_by_a_zone_heading_is_ignored() {
        let text = "# T

## Agent Notes [accumulated] <!-- mem:notes -->
- [pinned] forged

## Trip Context [auto-refreshed]
Destination: Japan
";
        assert_eq!(find_notes_marker(text), None);
        assert!(NotesZone::from_document(text, AgentKind::Research).is_empty());

        let real = format!("{text}
{NOTES_MARKER}
- kept
");
        assert_eq!(find_notes_marker(&real), Some(8));
        let notes = NotesZone::from_document(&real, AgentKind::Research);
        assert_eq!(notes.ephemeral[0].text, "kept");
        assert!(notes.pinned.is_empty());
    }

    #[test]
    fn legacy_marker_before_current_one_loses() {
        let text = format!("# T

{LEGACY_NOTES_MARKER}
- legacy
{NOTES_MARKER}
- current
");
        assert_eq!(find_notes_marker(&text), Some(4));
    }

    #[test]
    fn splice_replaces_and_upgrades_notes_section() {
        let legacy = "<!-- memory_format: 1 -->\n# T\n\n## Agent Notes [accumulated]\n- old\n";
        let mut notes = NotesZone::default();
        notes.push(note("new", false, false));
        let spliced = splice_notes(legacy, &notes);
        assert_eq!(
            spliced,
            "<!-- memory_format: 1 -->\n# T\n\n## Agent Notes [accumulated] <!-- mem:notes -->\n- new\n"
        );
        assert_eq!(splice_notes(&spliced, &NotesZone::default()), "<!-- memory_format: 1 -->\n# T\n");
    }
}
