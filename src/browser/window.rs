//! Filtered, paginated view over a fetched result set

use crate::search::DocumentEntry;
use std::ops::Range;

/// The full result set, the subset matching the local text filter, and the
/// page currently shown.
///
/// `current_page` is 1-based and always within `1..=total_pages()`.
#[derive(Debug, Clone)]
pub struct ResultWindow {
    entries: Vec<DocumentEntry>,
    filtered: Vec<usize>,
    filter_text: String,
    current_page: usize,
    page_size: usize,
}

impl ResultWindow {
    pub fn new(page_size: usize) -> Self {
        Self {
            entries: Vec::new(),
            filtered: Vec::new(),
            filter_text: String::new(),
            current_page: 1,
            page_size: page_size.max(1),
        }
    }

    /// Swap in a new result set, keeping the filter text and page size
    pub fn replace(&mut self, entries: Vec<DocumentEntry>, active: &[String]) {
        self.entries = entries;
        let text = std::mem::take(&mut self.filter_text);
        self.apply_filter(&text, active);
    }

    /// Keep entries whose formatted active-field values contain `text`
    /// (case-insensitive), then return to page 1. Empty text keeps all.
    pub fn apply_filter(&mut self, text: &str, active: &[String]) {
        let needle = text.trim().to_lowercase();
        self.filtered = if needle.is_empty() {
            (0..self.entries.len()).collect()
        } else {
            self.entries
                .iter()
                .enumerate()
                .filter(|(_, entry)| {
                    active
                        .iter()
                        .any(|field| entry.formatted(field).to_lowercase().contains(&needle))
                })
                .map(|(i, _)| i)
                .collect()
        };
        self.filter_text = text.to_string();
        self.current_page = 1;
    }

    /// Jump to page `n`, clamped into `1..=total_pages()`
    pub fn page(&mut self, n: usize) -> usize {
        self.current_page = n.clamp(1, self.total_pages());
        self.current_page
    }

    pub fn next_page(&mut self) -> usize {
        self.page(self.current_page.saturating_add(1))
    }

    pub fn prev_page(&mut self) -> usize {
        self.page(self.current_page.saturating_sub(1))
    }

    /// Range of filtered positions shown on the current page
    pub fn slice(&self) -> Range<usize> {
        let len = self.filtered.len();
        let start = (self.current_page - 1).saturating_mul(self.page_size).min(len);
        let end = start.saturating_add(self.page_size).min(len);
        start..end
    }

    /// Entries on the current page
    pub fn page_entries(&self) -> impl Iterator<Item = &DocumentEntry> {
        self.filtered[self.slice()]
            .iter()
            .map(move |&i| &self.entries[i])
    }

    pub fn total_pages(&self) -> usize {
        self.filtered.len().div_ceil(self.page_size).max(1)
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size.max(1);
        self.page(self.current_page);
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn filter_text(&self) -> &str {
        &self.filter_text
    }

    pub fn total_count(&self) -> usize {
        self.entries.len()
    }

    pub fn filtered_count(&self) -> usize {
        self.filtered.len()
    }

    pub fn entries(&self) -> &[DocumentEntry] {
        &self.entries
    }
}

impl Default for ResultWindow {
    fn default() -> Self {
        Self::new(50)
    }
}
