use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::resolve::GuildRecord;

/// `part` as a percentage of `whole`, rounded half to even at `places` decimals.
pub(crate) fn percent(mut part: f64, mut whole: f64, places: i32) -> f64 {
    if part == 0.0 || whole == 0.0 {
        part += 1e-11;
        whole += 1e-11;
    }
    let scale = 10f64.powi(places);
    (part / whole * 100.0 * scale).round_ties_even() / scale
}

/// `1234567` -> `1,234,567`
pub(crate) fn intcomma(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Splits lines into chat-sized pages wrapped in `prefix`/`suffix`.
#[derive(Debug, Clone)]
pub(crate) struct Paginator {
    prefix: String,
    suffix: String,
    max_size: usize,
    current: Vec<String>,
    current_len: usize,
    pages: Vec<String>,
}

impl Paginator {
    pub fn new(prefix: &str, suffix: &str, max_size: usize) -> Self {
        Self {
            prefix: prefix.to_owned(),
            suffix: suffix.to_owned(),
            max_size,
            current: Vec::new(),
            current_len: 0,
            pages: Vec::new(),
        }
    }

    /// Code block pages, e.g. ```` ```md ````.
    pub fn code_block(lang: &str, max_size: usize) -> Self {
        Self::new(&format!("```{lang}"), "```", max_size)
    }

    fn overhead(&self) -> usize {
        let newlines =
            usize::from(!self.prefix.is_empty()) + usize::from(!self.suffix.is_empty());
        self.prefix.chars().count() + self.suffix.chars().count() + newlines
    }

    fn close_page(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let mut page = Vec::with_capacity(self.current.len() + 2);
        if !self.prefix.is_empty() {
            page.push(self.prefix.clone());
        }
        page.append(&mut self.current);
        if !self.suffix.is_empty() {
            page.push(self.suffix.clone());
        }
        self.pages.push(page.join("\n"));
        self.current_len = 0;
    }

    pub fn add_line(&mut self, line: impl Into<String>) {
        let room = self.max_size.saturating_sub(self.overhead());
        let mut line: String = line.into();
        if line.chars().count() > room {
            line = line.chars().take(room).collect();
        }
        let len = line.chars().count() + 1;
        if self.current_len + len > room + 1 {
            self.close_page();
        }
        self.current_len += len;
        self.current.push(line);
    }

    pub fn pages(mut self) -> Vec<String> {
        self.close_page();
        self.pages
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OwnerShare {
    pub owner_id: u64,
    pub guilds: usize,
    pub percent: f64,
}

/// Owners by number of guilds, most first. Ties keep first-seen order.
pub(crate) fn rank_owners(records: &[GuildRecord], limit: usize) -> Vec<OwnerShare> {
    let mut counts: Vec<(u64, usize)> = Vec::new();
    for record in records {
        match counts.iter_mut().find(|(owner, _)| *owner == record.owner_id) {
            Some((_, count)) => *count += 1,
            None => counts.push((record.owner_id, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .take(limit)
        .map(|(owner_id, guilds)| OwnerShare {
            owner_id,
            guilds,
            percent: percent(guilds as f64, records.len() as f64, 0),
        })
        .collect()
}

/// Cumulative guild count at the end of each month a guild was joined in.
pub(crate) fn growth_series(
    joined: impl IntoIterator<Item = DateTime<Utc>>,
) -> Vec<(NaiveDate, usize)> {
    let mut per_month: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for date in joined {
        if let Some(month) = NaiveDate::from_ymd_opt(date.year(), date.month(), 1) {
            *per_month.entry(month).or_default() += 1;
        }
    }
    let mut total = 0;
    per_month
        .into_iter()
        .map(|(month, count)| {
            total += count;
            (month, total)
        })
        .collect()
}

const BAR_WIDTH: usize = 30;

pub(crate) fn growth_chart(series: &[(NaiveDate, usize)]) -> String {
    let Some(max) = series.iter().map(|(_, total)| *total).max() else {
        return "No guilds to chart.".to_owned();
    };
    let rows = series
        .iter()
        .map(|(month, total)| {
            let cells = (total * BAR_WIDTH).div_ceil(max.max(1));
            format!("{} │{} {}", month.format("%Y-%m"), "█".repeat(cells), total)
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("```\n{rows}\n```")
}
