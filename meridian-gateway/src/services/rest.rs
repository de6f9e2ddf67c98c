//! Thin client for REST backends.
//!
//! Builds endpoint URLs, injects the caller's access token, translates the
//! gateway's internal paging window into whichever query parameter idiom the
//! backend speaks, and reads total counts out of the `x-total-count`
//! response header.

use async_trait::async_trait;
use serde_json_bytes::Value;
use url::Url;

use crate::error::FetchError;
use crate::loader::BatchFetch;
use crate::pagination::OffsetLimit;
use crate::pagination::SliceResult;

/// Response header carrying a collection's total count.
const TOTAL_COUNT_HEADER: &str = "x-total-count";

/// Request header carrying the caller's access token.
const ACCESS_TOKEN_HEADER: &str = "x-access-token";

/// The query parameter idiom a backend's list endpoints accept.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PagingStyle {
    /// `page`/`size` parameters, 1-based page numbering.
    #[default]
    PageSize,
    /// `offset`/`size` parameters.
    OffsetLimit,
}

/// A list window request against a backend slice endpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SliceQuery {
    pub paging: OffsetLimit,
    /// Ask the backend to report the collection's total count. Counting is
    /// expensive on some backends, so it is only requested when the field
    /// selection actually needs it.
    pub include_total: bool,
}

/// One aggregated REST backend.
#[derive(Clone)]
pub struct RestService {
    service: String,
    url: Url,
    token: Option<String>,
    paging_style: PagingStyle,
    client: reqwest::Client,
}

#[buildstructor::buildstructor]
impl RestService {
    /// Constructor (or builder) for a [`RestService`].
    ///
    /// `service` names the backend in error attribution and logs; `url` is
    /// the base every endpoint path is joined onto.
    #[builder(visibility = "pub")]
    fn new(
        service: String,
        url: Url,
        token: Option<String>,
        paging_style: Option<PagingStyle>,
        client: Option<reqwest::Client>,
    ) -> Self {
        Self {
            service,
            url,
            token,
            paging_style: paging_style.unwrap_or_default(),
            client: client.unwrap_or_default(),
        }
    }

    /// The service name used in error attribution.
    pub fn name(&self) -> &str {
        &self.service
    }

    /// Fetch one window of a list endpoint.
    ///
    /// The returned slice carries the backend's total count when it was
    /// requested and reported; pagination assembly falls back to the
    /// full-page heuristic otherwise.
    pub async fn get_slice(
        &self,
        path: &str,
        query: &SliceQuery,
    ) -> Result<SliceResult<Value>, FetchError> {
        let mut params = self.paging_params(&query.paging)?;
        if query.include_total {
            params.push(("total_count".to_string(), "true".to_string()));
        }

        let response = self.get(path, &params).await?;
        let total_count = response
            .headers()
            .get(TOTAL_COUNT_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());

        let body: Value = response
            .json()
            .await
            .map_err(|e| FetchError::SubrequestMalformedResponse {
                service: self.service.clone(),
                reason: e.to_string(),
            })?;
        let items = match body {
            Value::Array(items) => items,
            _ => {
                return Err(FetchError::SubrequestMalformedResponse {
                    service: self.service.clone(),
                    reason: "list endpoint did not return an array".to_string(),
                });
            }
        };

        Ok(SliceResult { items, total_count })
    }

    /// Fetch a batch of entities by id, in the order of `ids`.
    ///
    /// Backends return batch results in arbitrary order; this is where the
    /// one-value-per-key, same-order contract of [`BatchFetch`] is honored.
    pub async fn get_batch(
        &self,
        path: &str,
        id_param: &str,
        id_field: &str,
        ids: &[String],
    ) -> Result<Vec<Value>, FetchError> {
        let params: Vec<(String, String)> = ids
            .iter()
            .map(|id| (id_param.to_string(), id.clone()))
            .collect();
        let response = self.get(path, &params).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| FetchError::SubrequestMalformedResponse {
                service: self.service.clone(),
                reason: e.to_string(),
            })?;
        let Value::Array(items) = body else {
            return Err(FetchError::SubrequestMalformedResponse {
                service: self.service.clone(),
                reason: "batch endpoint did not return an array".to_string(),
            });
        };

        let mut by_id = std::collections::HashMap::with_capacity(items.len());
        for item in items {
            let Some(id) = item
                .as_object()
                .and_then(|object| object.get(id_field))
                .and_then(Value::as_str)
            else {
                return Err(FetchError::SubrequestMalformedResponse {
                    service: self.service.clone(),
                    reason: format!("batch result is missing the '{id_field}' field"),
                });
            };
            let id = id.to_string();
            by_id.insert(id, item);
        }

        ids.iter()
            .map(|id| {
                by_id
                    .get(id)
                    .cloned()
                    .ok_or_else(|| FetchError::SubrequestMalformedResponse {
                        service: self.service.clone(),
                        reason: format!("batch endpoint did not return a result for id '{id}'"),
                    })
            })
            .collect()
    }

    fn paging_params(&self, paging: &OffsetLimit) -> Result<Vec<(String, String)>, FetchError> {
        match self.paging_style {
            PagingStyle::PageSize => {
                let page = if paging.limit == 0 {
                    1
                } else {
                    if paging.offset % paging.limit != 0 {
                        return Err(FetchError::MalformedRequest {
                            reason: format!(
                                "offset {} is not aligned to page size {}",
                                paging.offset, paging.limit
                            ),
                        });
                    }
                    paging.offset / paging.limit + 1
                };
                Ok(vec![
                    ("page".to_string(), page.to_string()),
                    ("size".to_string(), paging.limit.to_string()),
                ])
            }
            PagingStyle::OffsetLimit => Ok(vec![
                ("offset".to_string(), paging.offset.to_string()),
                ("size".to_string(), paging.limit.to_string()),
            ]),
        }
    }

    async fn get(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<reqwest::Response, FetchError> {
        let url = self
            .url
            .join(path)
            .map_err(|e| FetchError::MalformedRequest {
                reason: format!("could not build endpoint url for '{path}': {e}"),
            })?;

        let mut request = self.client.get(url).query(params);
        if let Some(token) = &self.token {
            request = request.header(ACCESS_TOKEN_HEADER, token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::SubrequestHttpError {
                status_code: e.status().map(|status| status.as_u16()),
                service: self.service.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(
                service = self.service.as_str(),
                status = status.as_u16(),
                "backend returned an error status"
            );
            return Err(FetchError::SubrequestHttpError {
                status_code: Some(status.as_u16()),
                service: self.service.clone(),
                reason: format!("HTTP {status}"),
            });
        }
        Ok(response)
    }
}

/// A [`BatchFetch`] over a REST batch endpoint, for id-keyed loaders.
#[derive(Clone)]
pub struct RestBatchFetch {
    service: RestService,
    path: String,
    id_param: String,
    id_field: String,
}

#[buildstructor::buildstructor]
impl RestBatchFetch {
    /// Constructor (or builder) for a [`RestBatchFetch`].
    #[builder(visibility = "pub")]
    fn new(
        service: RestService,
        path: String,
        id_param: Option<String>,
        id_field: Option<String>,
    ) -> Self {
        Self {
            service,
            path,
            id_param: id_param.unwrap_or_else(|| "ids[]".to_string()),
            id_field: id_field.unwrap_or_else(|| "id".to_string()),
        }
    }
}

#[async_trait]
impl BatchFetch for RestBatchFetch {
    type Key = String;
    type Value = Value;

    async fn fetch(&self, keys: &[String]) -> Result<Vec<Value>, FetchError> {
        self.service
            .get_batch(&self.path, &self.id_param, &self.id_field, keys)
            .await
    }
}
