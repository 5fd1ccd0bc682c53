//! Token estimation and deterministic truncation of memory text.
//!
//! Uses a byte-based heuristic: 1 token ≈ 3 bytes of UTF-8, rounded up.
//! ASCII text costs one byte per character, while CJK characters cost three
//! and emoji four, so wide scripts are never estimated below one token per
//! character and the estimate errs high.
//!
//! # Truncation order
//!
//! When a document exceeds its budget, parts are cut in this order until it
//! fits:
//!
//! 1. Auto-refreshed zones, last declared first. Each zone loses lines from
//!    its end (a `...[truncated]...` line marks the cut) and is dropped once
//!    empty.
//! 2. The header block (format comment and title).
//! 3. The cross-agent insights zone, the same way.
//! 4. Ephemeral notes, oldest first.
//! 5. Pinned notes, oldest first.
//! 6. A hard character cut of whatever remains.
//!
//! Identical input and budget always produce identical output.

use tracing::warn;

use wayfarer_core::agent::AgentKind;
use wayfarer_core::document::{
    MemoryDocument, NOTES_MARKER, NotesZone, TRUNCATION_LINE, Zone, ZoneKind,
};

/// UTF-8 bytes per estimated token.
pub const BYTES_PER_TOKEN: usize = 3;

/// Estimated tokens for a text of `bytes` UTF-8 bytes. Rounds up.
pub fn tokens_for_bytes(bytes: usize) -> usize {
    bytes.div_ceil(BYTES_PER_TOKEN)
}

/// Estimate the token count for a string.
pub fn estimate_tokens(text: &str) -> usize {
    tokens_for_bytes(text.len())
}

fn byte_len(text: &str) -> usize {
    text.len()
}

/// Outcome of fitting a document into a budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FitReport {
    pub text: String,
    pub budget: usize,
    pub original_tokens: usize,
    pub fitted_tokens: usize,
    /// Zones cut line-by-line but still present.
    pub shortened_zones: Vec<String>,
    /// Zones removed entirely.
    pub dropped_zones: Vec<String>,
    pub dropped_notes: usize,
    /// Whether the final character cut was needed.
    pub hard_cut: bool,
}

impl FitReport {
    pub fn truncated(&self) -> bool {
        self.original_tokens > self.budget
    }
}

/// Fits memory documents into token budgets. Stateless; create one and reuse it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenBudgeter;

impl TokenBudgeter {
    pub fn new() -> Self {
        Self
    }

    /// Fit `text` into `budget` tokens.
    pub fn fit(&self, agent: AgentKind, text: &str, budget: usize) -> String {
        self.fit_report(agent, text, budget).text
    }

    /// Fit `text` into `budget` tokens and describe what was removed.
    pub fn fit_report(&self, agent: AgentKind, text: &str, budget: usize) -> FitReport {
        let original_tokens = estimate_tokens(text);
        if original_tokens <= budget {
            return FitReport {
                text: text.to_string(),
                budget,
                original_tokens,
                fitted_tokens: original_tokens,
                shortened_zones: Vec::new(),
                dropped_zones: Vec::new(),
                dropped_notes: 0,
                hard_cut: false,
            };
        }

        let limit = budget.saturating_mul(BYTES_PER_TOKEN);
        let mut layout = Layout::from_text(text, agent);
        layout.shrink(limit);

        let mut fitted = layout.render();
        let hard_cut = fitted.len() > limit;
        if hard_cut {
            let mut end = limit;
            while !fitted.is_char_boundary(end) {
                end -= 1;
            }
            fitted.truncate(end);
        }

        let report = FitReport {
            fitted_tokens: estimate_tokens(&fitted),
            text: fitted,
            budget,
            original_tokens,
            shortened_zones: layout.shortened(),
            dropped_zones: layout.dropped(),
            dropped_notes: layout.dropped_notes,
            hard_cut,
        };

        warn!(
            agent = %agent,
            original_tokens,
            budget,
            dropped_tokens = original_tokens.saturating_sub(report.fitted_tokens),
            dropped_zones = ?report.dropped_zones,
            dropped_notes = report.dropped_notes,
            "Memory exceeds token budget; truncated"
        );
        report
    }
}

// ── Layout with incremental cost accounting ──────────────────────────────

struct ZoneState {
    zone: Zone,
    heading_cost: usize,
    body_cost: usize,
    cut: bool,
    dropped: bool,
}

impl ZoneState {
    fn new(zone: Zone) -> Self {
        Self {
            heading_cost: byte_len(&zone.heading()),
            body_cost: zone.body.iter().map(|l| byte_len(l) + 1).sum(),
            cut: false,
            dropped: zone.is_empty(),
            zone,
        }
    }

    fn cost(&self) -> usize {
        if self.dropped {
            return 0;
        }
        let marker = if self.cut { byte_len(TRUNCATION_LINE) + 1 } else { 0 };
        self.heading_cost + self.body_cost + marker
    }

    /// Remove one trailing line (and any blank lines it exposes).
    fn pop_line(&mut self) {
        if let Some(line) = self.zone.body.pop() {
            self.body_cost -= byte_len(&line) + 1;
            self.cut = true;
        }
        while let Some(last) = self.zone.body.last()
            && last.trim().is_empty()
        {
            self.body_cost -= byte_len(last) + 1;
            self.zone.body.pop();
        }
        if self.zone.body.is_empty() {
            self.dropped = true;
        }
    }

    fn render(&self) -> String {
        let mut out = self.zone.render();
        if self.cut {
            out.push('\n');
            out.push_str(TRUNCATION_LINE);
        }
        out
    }
}

struct Layout {
    header: Option<String>,
    zones: Vec<ZoneState>,
    notes: NotesZone,
    dropped_notes: usize,
}

impl Layout {
    fn from_text(text: &str, agent: AgentKind) -> Self {
        let header = text
            .lines()
            .take_while(|l| !l.starts_with("## "))
            .collect::<Vec<_>>()
            .join("\n");
        let header = header.trim_end();
        let doc = MemoryDocument::parse(text, agent);
        Self {
            header: (!header.is_empty()).then(|| header.to_string()),
            zones: doc.zones.into_iter().map(ZoneState::new).collect(),
            notes: doc.notes,
            dropped_notes: 0,
        }
    }

    fn notes_cost(&self) -> usize {
        if self.notes.is_empty() {
            return 0;
        }
        byte_len(NOTES_MARKER)
            + self
                .notes
                .lines()
                .map(|l| byte_len(&l.render()) + 1)
                .sum::<usize>()
    }

    /// Exact byte length of [`Layout::render`].
    fn total(&self) -> usize {
        let header = self.header.as_deref().map_or(0, byte_len);
        let parts = std::iter::once(header)
            .chain(self.zones.iter().map(ZoneState::cost))
            .chain(std::iter::once(self.notes_cost()))
            .filter(|cost| *cost > 0);
        let (count, sum) = parts.fold((0usize, 0usize), |(n, s), c| (n + 1, s + c));
        if count == 0 {
            0
        } else {
            sum + 2 * (count - 1) + 1
        }
    }

    fn shrink(&mut self, limit: usize) {
        for kind in [ZoneKind::AutoRefreshed, ZoneKind::CrossAgent] {
            if kind == ZoneKind::CrossAgent && self.total() > limit {
                self.header = None;
            }
            for idx in (0..self.zones.len()).rev() {
                if self.zones[idx].zone.kind != kind {
                    continue;
                }
                while self.total() > limit && !self.zones[idx].dropped {
                    self.zones[idx].pop_line();
                }
            }
        }
        while self.total() > limit && !self.notes.ephemeral.is_empty() {
            self.notes.ephemeral.remove(0);
            self.dropped_notes += 1;
        }
        while self.total() > limit && !self.notes.pinned.is_empty() {
            self.notes.pinned.remove(0);
            self.dropped_notes += 1;
        }
    }

    fn shortened(&self) -> Vec<String> {
        self.zones
            .iter()
            .filter(|z| z.cut && !z.dropped)
            .map(|z| z.zone.label.clone())
            .collect()
    }

    fn dropped(&self) -> Vec<String> {
        self.zones
            .iter()
            .filter(|z| z.dropped && z.cut)
            .map(|z| z.zone.label.clone())
            .collect()
    }

    fn render(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(header) = &self.header {
            parts.push(header.clone());
        }
        parts.extend(self.zones.iter().filter(|z| !z.dropped).map(ZoneState::render));
        let notes = self.notes.render();
        if !notes.is_empty() {
            parts.push(notes);
        }
        if parts.is_empty() {
            return String::new();
        }
        let mut out = parts.join("\n\n");
        out.push('\n');
        out
    }
}
