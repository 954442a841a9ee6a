//! Result browsing: discovered fields, local filtering and pagination
//!
//! [`SearchSession`] ties a [`SearchExecutor`](crate::search::SearchExecutor)
//! to the state an interactive front end needs. A refresh runs on a worker
//! task while the front end keeps reading consistent [`PageView`] snapshots.

mod catalog;
mod session;
mod window;

pub use catalog::FieldCatalog;
pub use session::{BrowserState, PageView, RefreshOutcome, SearchSession};
pub use window::ResultWindow;
