//! Page/limit parsing, pagination metadata, and sort parsing for list endpoints.

use serde::Serialize;

/// Default page size when the client sends none or an unparsable value.
pub const DEFAULT_LIMIT: u32 = 10;

/// Largest page size a client may request.
pub const MAX_LIMIT: u32 = 100;

/// A validated page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Parses raw query values.
    ///
    /// `page` is at least 1; `limit` is clamped to `1..=MAX_LIMIT`. Missing or
    /// non-numeric values fall back to page 1 and [`DEFAULT_LIMIT`].
    pub fn parse(page: Option<&str>, limit: Option<&str>) -> Self {
        let page = page
            .and_then(|p| p.trim().parse::<i64>().ok())
            .map(|p| p.max(1))
            .unwrap_or(1);
        let limit = limit
            .and_then(|l| l.trim().parse::<i64>().ok())
            .map(|l| l.clamp(1, MAX_LIMIT as i64))
            .unwrap_or(DEFAULT_LIMIT as i64);

        Self {
            page: u32::try_from(page).unwrap_or(u32::MAX),
            limit: limit as u32,
        }
    }

    /// Number of rows to skip.
    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// A page of rows plus the total row count matching the query.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64) -> Self {
        Self { items, total }
    }

    /// Maps each row, keeping the total.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }

    /// Slices an already filtered and sorted collection.
    pub fn from_slice(all: Vec<T>, request: &PageRequest) -> Self {
        let total = all.len() as u64;
        let items = all
            .into_iter()
            .skip(request.offset() as usize)
            .take(request.limit as usize)
            .collect();
        Self { items, total }
    }
}

/// Pagination metadata returned alongside list responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_items: u64,
    pub total_pages: u64,
    pub items_per_page: u32,
    pub has_previous_page: bool,
    pub has_next_page: bool,
}

impl Pagination {
    pub fn new(request: &PageRequest, total_items: u64) -> Self {
        let total_pages = total_items.div_ceil(request.limit as u64);
        Self {
            current_page: request.page,
            total_items,
            total_pages,
            items_per_page: request.limit,
            has_previous_page: request.page > 1,
            has_next_page: (request.page as u64) < total_pages,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Field that sorts list results when the client sends none or an unknown one.
pub const DEFAULT_SORT_FIELD: &str = "createdAt";

/// A validated sort order.
///
/// `field` is always one of the allow-listed names passed to [`Sort::parse`],
/// so stores may map it to a column without further checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub field: &'static str,
    pub direction: SortDirection,
}

impl Sort {
    /// Matches `field` case-insensitively against `valid_fields`.
    pub fn parse(
        field: Option<&str>,
        direction: Option<&str>,
        valid_fields: &[&'static str],
    ) -> Self {
        let field = field
            .and_then(|f| {
                valid_fields
                    .iter()
                    .find(|valid| valid.eq_ignore_ascii_case(f.trim()))
                    .copied()
            })
            .unwrap_or(DEFAULT_SORT_FIELD);
        let direction = match direction.map(|d| d.trim().to_ascii_lowercase()) {
            Some(d) if d == "asc" => SortDirection::Asc,
            _ => SortDirection::Desc,
        };
        Self { field, direction }
    }
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            field: DEFAULT_SORT_FIELD,
            direction: SortDirection::Desc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_defaults() {
        let req = PageRequest::parse(None, None);
        assert_eq!(req, PageRequest { page: 1, limit: 10 });
        assert_eq!(req.offset(), 0);
    }

    #[test]
    fn test_page_request_clamps_values() {
        assert_eq!(PageRequest::parse(Some("0"), Some("0")).page, 1);
        assert_eq!(PageRequest::parse(Some("-3"), Some("0")).limit, 1);
        assert_eq!(PageRequest::parse(Some("2"), Some("500")).limit, 100);
        assert_eq!(PageRequest::parse(Some("abc"), Some("xyz")), PageRequest::default());
    }

    #[test]
    fn test_page_request_offset() {
        let req = PageRequest::parse(Some("3"), Some("20"));
        assert_eq!(req.offset(), 40);
    }

    #[test]
    fn test_pagination_metadata() {
        let req = PageRequest::parse(Some("2"), Some("10"));
        let meta = Pagination::new(&req, 25);
        assert_eq!(meta.total_pages, 3);
        assert!(meta.has_previous_page);
        assert!(meta.has_next_page);

        let last = Pagination::new(&PageRequest::parse(Some("3"), Some("10")), 25);
        assert!(!last.has_next_page);

        let empty = Pagination::new(&PageRequest::default(), 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_previous_page);
        assert!(!empty.has_next_page);
    }

    #[test]
    fn test_pagination_serializes_camel_case() {
        let meta = Pagination::new(&PageRequest::default(), 5);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["currentPage"], 1);
        assert_eq!(json["itemsPerPage"], 10);
        assert_eq!(json["hasNextPage"], false);
    }

    #[test]
    fn test_page_from_slice() {
        let page = Page::from_slice((1..=25).collect::<Vec<_>>(), &PageRequest::parse(Some("3"), Some("10")));
        assert_eq!(page.items, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.total, 25);
    }

    #[test]
    fn test_sort_parse() {
        const FIELDS: &[&str] = &["createdAt", "updatedAt"];

        let sort = Sort::parse(Some("UPDATEDAT"), Some("ASC"), FIELDS);
        assert_eq!(sort.field, "updatedAt");
        assert_eq!(sort.direction, SortDirection::Asc);

        let fallback = Sort::parse(Some("password"), Some("sideways"), FIELDS);
        assert_eq!(fallback, Sort::default());
    }
}
