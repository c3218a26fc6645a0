//! Offset/limit pagination for list endpoints
//!
//! Lists are ordered newest first (`created_at DESC`, then `id DESC` to keep
//! pages stable when timestamps collide).

use serde::Deserialize;

/// Default page size when the caller passes no limit
pub const DEFAULT_LIMIT: i64 = 20;

/// Largest page a caller may request
pub const MAX_LIMIT: i64 = 100;

/// Raw query parameters as sent by clients
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

/// Sanitized pagination window, ready for `LIMIT $n OFFSET $m`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl From<PageQuery> for Page {
    fn from(query: PageQuery) -> Self {
        calculate_page(query.offset, query.limit)
    }
}

/// Clamp caller-supplied values into a valid window
///
/// # Examples
/// ```
/// use stockroom_common::pagination::calculate_page;
///
/// let p = calculate_page(Some(40), Some(500));
/// assert_eq!(p.offset, 40);
/// assert_eq!(p.limit, 100); // capped
///
/// let p = calculate_page(Some(-3), None);
/// assert_eq!(p.offset, 0);
/// assert_eq!(p.limit, 20);
/// ```
pub fn calculate_page(offset: Option<i64>, limit: Option<i64>) -> Page {
    let offset = offset.unwrap_or(0).max(0);
    let limit = match limit {
        Some(l) if l > 0 => l.min(MAX_LIMIT),
        _ => DEFAULT_LIMIT,
    };
    Page { offset, limit }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults() {
        let p = calculate_page(None, None);
        assert_eq!(p, Page { offset: 0, limit: 20 });
    }

    #[test]
    fn test_page_limit_capped() {
        let p = calculate_page(Some(0), Some(1000));
        assert_eq!(p.limit, MAX_LIMIT);
    }

    #[test]
    fn test_page_zero_limit_uses_default() {
        let p = calculate_page(Some(5), Some(0));
        assert_eq!(p, Page { offset: 5, limit: DEFAULT_LIMIT });
    }

    #[test]
    fn test_page_negative_offset_clamped() {
        let p = calculate_page(Some(-10), Some(10));
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_page_from_query() {
        let p: Page = PageQuery { offset: Some(20), limit: Some(20) }.into();
        assert_eq!(p, Page { offset: 20, limit: 20 });
    }
}
