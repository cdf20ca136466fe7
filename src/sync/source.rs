use serde_json::Value;

use crate::error::SourceError;
use crate::record::wire::decode_page;
use crate::record::CatalogRecord;

/// What the runner asks the remote catalog for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// Opaque position returned with the previous page.
    pub cursor: Option<String>,
    /// Incremental watermark; `None` asks for the whole catalog.
    pub since: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourcePage {
    pub records: Vec<CatalogRecord>,
    /// Cursor of the following page, `None` on the last one.
    pub next_cursor: Option<String>,
    /// Server time the page was produced at, used as the next watermark.
    pub watermark: Option<String>,
    /// Total number of objects in this pass, when the remote reports it.
    pub total_hint: Option<u64>,
}

impl SourcePage {
    /// Decode a `{ "objects", "cursor", "latest_time" }` response body.
    /// Objects that fail to decode are dropped.
    pub fn from_wire(body: &Value) -> Self {
        let decoded = decode_page(body);
        SourcePage {
            records: decoded.records,
            next_cursor: decoded.cursor,
            watermark: decoded.latest_time,
            total_hint: None,
        }
    }
}

/// The remote catalog service, seen as a pager.
///
/// Timeouts and retries belong to the implementation; the runner treats any
/// error as fatal for the current cycle.
pub trait CatalogSource: Send {
    fn fetch_page(&mut self, request: &PageRequest) -> Result<SourcePage, SourceError>;
}

impl<T: CatalogSource + ?Sized> CatalogSource for Box<T> {
    fn fetch_page(&mut self, request: &PageRequest) -> Result<SourcePage, SourceError> {
        (**self).fetch_page(request)
    }
}
