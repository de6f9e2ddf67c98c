//! Backend service clients.

mod rest;

pub use rest::PagingStyle;
pub use rest::RestBatchFetch;
pub use rest::RestService;
pub use rest::SliceQuery;
