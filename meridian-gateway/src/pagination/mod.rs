//! Connection assembly for list fields.
//!
//! Backends report lists in whatever shape they have — an array slice plus an
//! optional total count, usually out of an `x-total-count` header. Every
//! list-returning field translates that into the standard connection shape
//! (edges, pageInfo, cursors) through the types here, so cursor math lives in
//! exactly one place.

mod all_pages;

pub use all_pages::fetch_all_pages;
pub use all_pages::PageRequest;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use serde::Serialize;

use crate::error::PaginationError;

/// An opaque cursor, monotonically encoding an absolute position in a list.
///
/// By convention this is the base64 of the decimal offset. Clients must treat
/// it as opaque; the encoding is stable across pages of the same list.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Encode an absolute position as a cursor.
    pub fn from_position(position: u64) -> Self {
        Self(BASE64.encode(position.to_string()))
    }

    /// Decode a cursor back to the absolute position it encodes.
    pub fn position(&self) -> Result<u64, PaginationError> {
        BASE64
            .decode(&self.0)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .and_then(|decoded| decoded.parse::<u64>().ok())
            .ok_or_else(|| PaginationError::InvalidCursor {
                cursor: self.0.clone(),
            })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Cursor {
    fn from(encoded: String) -> Self {
        Self(encoded)
    }
}

impl From<&str> for Cursor {
    fn from(encoded: &str) -> Self {
        Self(encoded.to_string())
    }
}

/// Pagination arguments as they arrive on a list field.
///
/// Relay-style (`first`/`after`, `last`/`before`) and classic (`page`/`size`)
/// idioms are mutually exclusive; both resolve to the same internal
/// [`OffsetLimit`] representation via [`ConnectionArgs::offset_limit`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionArgs {
    pub first: Option<u64>,
    pub after: Option<Cursor>,
    pub last: Option<u64>,
    pub before: Option<Cursor>,
    pub page: Option<u64>,
    pub size: Option<u64>,
}

/// The backend-neutral window every pagination idiom resolves to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OffsetLimit {
    pub offset: u64,
    pub limit: u64,
}

impl ConnectionArgs {
    /// Compute the `{offset, limit}` window for these arguments.
    ///
    /// `default_limit` applies when neither `first`, `last` nor `size` was
    /// given.
    pub fn offset_limit(&self, default_limit: u64) -> Result<OffsetLimit, PaginationError> {
        let relay = self.first.is_some()
            || self.after.is_some()
            || self.last.is_some()
            || self.before.is_some();
        let classic = self.page.is_some() || self.size.is_some();
        if relay && classic {
            return Err(PaginationError::ExclusivePagination);
        }

        if classic {
            let page = self.page.unwrap_or(1);
            if page == 0 {
                return Err(PaginationError::InvalidPage);
            }
            let size = self.size.unwrap_or(default_limit);
            return Ok(OffsetLimit {
                offset: (page - 1) * size,
                limit: size,
            });
        }

        if let Some(last) = self.last {
            // The tail is unknowable without an anchor, so backward paging
            // requires a cursor to mirror from.
            let before = self
                .before
                .as_ref()
                .ok_or(PaginationError::LastWithoutBefore)?;
            let end = before.position()?;
            let offset = end.saturating_sub(last);
            return Ok(OffsetLimit {
                offset,
                limit: end - offset,
            });
        }

        let offset = match &self.after {
            Some(after) => after.position()? + 1,
            None => 0,
        };
        Ok(OffsetLimit {
            offset,
            limit: self.first.unwrap_or(default_limit),
        })
    }
}

/// An array slice as returned by a backend list endpoint.
///
/// `total_count` is absent when the backend does not report one (or was not
/// asked to).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SliceResult<T> {
    pub items: Vec<T>,
    pub total_count: Option<u64>,
}

impl<T> SliceResult<T> {
    pub fn new(items: Vec<T>, total_count: Option<u64>) -> Self {
        Self { items, total_count }
    }
}

/// A node paired with its position cursor.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge<T> {
    pub node: T,
    pub cursor: Cursor,
}

/// Information about the current page of a connection.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_cursor: Option<Cursor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_cursor: Option<Cursor>,
}

/// The standard edges/pageInfo/totalCount shape for paginated list fields.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection<T> {
    pub edges: Vec<Edge<T>>,
    pub page_info: PageInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
}

impl<T> Connection<T> {
    /// Assemble a connection from a backend slice, for the window that was
    /// used to request it.
    ///
    /// When the backend reported no total count, `hasNextPage` falls back to
    /// the full-page heuristic: a full page implies more may exist. That
    /// heuristic misreports on exact-multiple boundaries (exactly `limit`
    /// items remaining); this is a long-standing accepted approximation, and
    /// changing it would alter observable pagination behavior for existing
    /// clients. Backends known to never report counts can disable it with
    /// [`Connection::from_slice_with`].
    pub fn from_slice(slice: SliceResult<T>, paging: &OffsetLimit) -> Self {
        Self::from_slice_with(slice, paging, true)
    }

    /// As [`Connection::from_slice`], with the full-page heuristic made
    /// explicit.
    pub fn from_slice_with(
        slice: SliceResult<T>,
        paging: &OffsetLimit,
        full_page_means_more: bool,
    ) -> Self {
        let OffsetLimit { offset, limit } = *paging;
        let total_count = slice.total_count;

        let edges: Vec<Edge<T>> = slice
            .items
            .into_iter()
            .take(limit as usize)
            .enumerate()
            .map(|(index, node)| Edge {
                cursor: Cursor::from_position(offset + index as u64),
                node,
            })
            .collect();

        let returned = edges.len() as u64;
        let has_next_page = match total_count {
            Some(total) => offset + returned < total,
            None => full_page_means_more && limit > 0 && returned == limit,
        };

        Connection {
            page_info: PageInfo {
                has_next_page,
                has_previous_page: offset > 0,
                start_cursor: edges.first().map(|edge| edge.cursor.clone()),
                end_cursor: edges.last().map(|edge| edge.cursor.clone()),
            },
            edges,
            total_count,
        }
    }
}
