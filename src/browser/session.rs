//! Shared browsing state and the refresh workflow

use crate::browser::catalog::FieldCatalog;
use crate::browser::window::ResultWindow;
use crate::error::{AppError, Result};
use crate::search::{
    filter, timeframe, DocumentEntry, FetchMode, QueryBuildError, QueryBuilder, SearchExecutor,
};
use chrono::{DateTime, Local, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Everything a refresh reads or replaces
#[derive(Debug, Clone)]
pub struct BrowserState {
    pub index: String,
    pub filters: Vec<String>,
    pub timeframe: String,
    pub size: usize,
    pub catalog: FieldCatalog,
    pub window: ResultWindow,
    pub total_hits: u64,
    pub status: Option<String>,
    pub last_refresh: Option<DateTime<Utc>>,
}

impl BrowserState {
    pub fn new<I, S>(index: impl Into<String>, size: usize, page_size: usize, default_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            index: index.into(),
            filters: Vec::new(),
            timeframe: String::new(),
            size,
            catalog: FieldCatalog::with_active(default_fields),
            window: ResultWindow::new(page_size),
            total_hits: 0,
            status: None,
            last_refresh: None,
        }
    }
}

/// Result of a refresh request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new result set is displayed
    Loaded {
        retrieved: usize,
        total_hits: u64,
        new_fields: usize,
        mode: FetchMode,
    },
    /// Another refresh was already running; nothing happened
    AlreadyLoading,
}

/// Owned snapshot of the current page, formatted outside any lock
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageView {
    pub columns: Vec<String>,
    pub ids: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub current_page: usize,
    pub total_pages: usize,
    pub filtered_count: usize,
    pub total_count: usize,
    pub total_hits: u64,
    pub status: Option<String>,
    pub loading: bool,
}

/// Clears the loading flag when the refresh ends, however it ends
struct LoadingGuard<'a> {
    flag: &'a Mutex<bool>,
}

impl<'a> LoadingGuard<'a> {
    fn acquire(flag: &'a Mutex<bool>) -> Option<Self> {
        let mut loading = flag.lock();
        if *loading {
            return None;
        }
        *loading = true;
        Some(Self { flag })
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        *self.flag.lock() = false;
    }
}

/// Browsing session shared between the interactive thread and fetch workers.
///
/// At most one refresh runs at a time. Interactive operations take the state
/// lock only briefly and never across a network call.
pub struct SearchSession {
    builder: QueryBuilder,
    executor: SearchExecutor,
    state: RwLock<BrowserState>,
    loading: Mutex<bool>,
}

impl SearchSession {
    pub fn new(executor: SearchExecutor, builder: QueryBuilder, state: BrowserState) -> Self {
        Self {
            builder,
            executor,
            state: RwLock::new(state),
            loading: Mutex::new(false),
        }
    }

    pub fn executor(&self) -> &SearchExecutor {
        &self.executor
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.lock()
    }

    /// Rebuild the query, fetch, and replace the displayed result set.
    ///
    /// Invalid filters fail before any network call. On a failed fetch the
    /// previous results stay in place and the error becomes the status
    /// message.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let Some(_loading) = LoadingGuard::acquire(&self.loading) else {
            debug!("Refresh already in flight, ignoring request");
            return Ok(RefreshOutcome::AlreadyLoading);
        };

        let (index, filters, timeframe, size) = {
            let state = self.state.read();
            (
                state.index.clone(),
                state.filters.clone(),
                state.timeframe.clone(),
                state.size,
            )
        };

        let query = match self
            .builder
            .build(filters.as_slice(), size, &timeframe, &Local::now())
        {
            Ok(query) => query,
            Err(e) => {
                self.state.write().status = Some(format!("Invalid query: {}", e));
                return Err(e.into());
            }
        };

        let result = match self.executor.fetch(&query, &index, size).await {
            Ok(result) => result,
            Err(e) => {
                warn!(index = %index, error = %e, "Refresh failed, keeping previous results");
                self.state.write().status = Some(format!("Fetch failed: {}", e));
                return Err(e.into());
            }
        };

        let discovered = discover_fields(&result.entries);
        let retrieved = result.entries.len();

        let mut guard = self.state.write();
        let state = &mut *guard;
        let new_fields = state.catalog.merge(&discovered);
        state.window.replace(result.entries, state.catalog.active_fields());
        state.total_hits = result.total_hits;
        state.last_refresh = Some(Utc::now());
        state.status = Some(format!(
            "Loaded {} of {} documents",
            retrieved, result.total_hits
        ));

        info!(
            index = %index,
            retrieved,
            total_hits = result.total_hits,
            new_fields,
            "Refresh complete"
        );
        Ok(RefreshOutcome::Loaded {
            retrieved,
            total_hits: result.total_hits,
            new_fields,
            mode: result.mode,
        })
    }

    /// Run [`refresh`](Self::refresh) on a worker task
    pub fn spawn_refresh(self: &Arc<Self>) -> JoinHandle<Result<RefreshOutcome>> {
        let session = Arc::clone(self);
        tokio::spawn(async move { session.refresh().await })
    }

    /// Replace the filter list; rejected as a whole if any filter is invalid
    pub fn set_filters(&self, filters: Vec<String>) -> std::result::Result<(), QueryBuildError> {
        let errors: Vec<_> = filters
            .iter()
            .filter_map(|f| filter::parse(f).err())
            .collect();
        if !errors.is_empty() {
            return Err(QueryBuildError::new(errors));
        }
        self.state.write().filters = filters;
        Ok(())
    }

    /// Set the relative timeframe; empty clears it
    pub fn set_timeframe(&self, expr: impl Into<String>) -> std::result::Result<(), QueryBuildError> {
        let expr = expr.into();
        if !expr.trim().is_empty() {
            if let Err(e) = timeframe::resolve(&expr, &Local::now()) {
                return Err(QueryBuildError {
                    filters: Vec::new(),
                    timeframe: Some(e),
                });
            }
        }
        self.state.write().timeframe = expr;
        Ok(())
    }

    pub fn set_size(&self, size: usize) {
        self.state.write().size = size;
    }

    pub fn set_index(&self, index: impl Into<String>) {
        self.state.write().index = index.into();
    }

    /// Filter the loaded results locally; returns the matching count
    pub fn apply_filter(&self, text: &str) -> usize {
        let mut guard = self.state.write();
        let state = &mut *guard;
        state.window.apply_filter(text, state.catalog.active_fields());
        state.window.filtered_count()
    }

    /// Flip a field's activation; the local filter is re-run when set
    pub fn toggle_field(&self, field: &str) -> bool {
        let mut guard = self.state.write();
        let state = &mut *guard;
        if !state.catalog.toggle_active(field) {
            return false;
        }
        if !state.window.filter_text().is_empty() {
            let text = state.window.filter_text().to_string();
            state.window.apply_filter(&text, state.catalog.active_fields());
        }
        true
    }

    pub fn reorder_field(&self, field: &str, up: bool) -> bool {
        self.state.write().catalog.reorder(field, up)
    }

    pub fn goto_page(&self, page: usize) -> usize {
        self.state.write().window.page(page)
    }

    pub fn next_page(&self) -> usize {
        self.state.write().window.next_page()
    }

    pub fn prev_page(&self) -> usize {
        self.state.write().window.prev_page()
    }

    pub fn set_page_size(&self, page_size: usize) {
        self.state.write().window.set_page_size(page_size);
    }

    /// Known fields, active block first
    pub fn fields(&self) -> Vec<String> {
        self.state.read().catalog.fields().map(str::to_string).collect()
    }

    pub fn active_fields(&self) -> Vec<String> {
        self.state.read().catalog.active_fields().to_vec()
    }

    pub fn status(&self) -> Option<String> {
        self.state.read().status.clone()
    }

    /// Copy of the full state
    pub fn snapshot(&self) -> BrowserState {
        self.state.read().clone()
    }

    /// Snapshot and format the current page
    pub fn page_view(&self) -> PageView {
        let loading = self.is_loading();
        let (columns, entries, mut view) = {
            let state = self.state.read();
            let entries: Vec<DocumentEntry> = state.window.page_entries().cloned().collect();
            let view = PageView {
                current_page: state.window.current_page(),
                total_pages: state.window.total_pages(),
                filtered_count: state.window.filtered_count(),
                total_count: state.window.total_count(),
                total_hits: state.total_hits,
                status: state.status.clone(),
                loading,
                ..PageView::default()
            };
            (state.catalog.active_fields().to_vec(), entries, view)
        };

        view.ids = entries.iter().map(|e| e.id().to_string()).collect();
        view.rows = entries
            .iter()
            .map(|entry| columns.iter().map(|field| entry.formatted(field)).collect())
            .collect();
        view.columns = columns;
        view
    }

    /// Fetch one document from the session's index
    pub async fn fetch_document(&self, id: &str) -> Result<DocumentEntry> {
        let index = self.state.read().index.clone();
        self.executor
            .fetch_document(&index, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("document '{}' in '{}'", id, index)))
    }
}

/// Union of the entries' field names in first-seen order
fn discover_fields(entries: &[DocumentEntry]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    for entry in entries {
        for field in entry.available_fields() {
            if seen.insert(field.clone()) {
                ordered.push(field);
            }
        }
    }
    ordered
}
