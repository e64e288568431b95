//! Remote feature-service source.

use std::future::Future;
use std::time::Duration;

use crate::config::SourceConfig;
use crate::core::features::{FeatureResponse, RawFeatureResponse};

use super::{BoxFuture, FeatureQuery, FeatureSource, FeatureSourceError};

/// Queries a feature-service layer (`.../FeatureServer/<n>`) for all point
/// features, following transfer-limit pagination until the service reports
/// no more records.
pub struct FeatureServiceSource {
    client: reqwest::Client,
    where_clause: String,
    page_size: usize,
}

impl FeatureServiceSource {
    pub fn new(config: &SourceConfig) -> Result<Self, FeatureSourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            where_clause: config.where_clause.clone(),
            page_size: config.page_size.max(1),
        })
    }

    /// Endpoint for a layer location, tolerating a trailing slash or an
    /// explicit `/query` suffix.
    pub fn query_url(location: &str) -> String {
        let base = location.trim().trim_end_matches('/');
        if base.ends_with("/query") {
            base.to_string()
        } else {
            format!("{}/query", base)
        }
    }

    /// Query string for one request. `offset` is `None` for the first page,
    /// so services without pagination support are not sent paging options.
    pub fn query_params(&self, query: &FeatureQuery, offset: Option<usize>) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("where", self.where_clause.clone()),
            ("outFields", "*".to_string()),
            ("returnGeometry", "true".to_string()),
            ("outSR", query.spatial_reference.wkid.to_string()),
            ("returnZ", query.include_z.to_string()),
            ("f", "json".to_string()),
        ];
        if let Some(offset) = offset {
            params.push(("resultOffset", offset.to_string()));
            params.push(("resultRecordCount", self.page_size.to_string()));
        }
        params
    }

    async fn fetch_page(
        &self,
        url: &str,
        params: &[(&'static str, String)],
    ) -> Result<RawFeatureResponse, FeatureSourceError> {
        let resp = self.client.get(url).query(params).send().await?;

        if !resp.status().is_success() {
            return Err(FeatureSourceError::Status(resp.status().as_u16()));
        }

        let page: RawFeatureResponse = resp.json().await?;
        if let Some(err) = page.error.as_ref() {
            return Err(FeatureSourceError::Service {
                code: err.code,
                message: err.message.clone(),
            });
        }
        Ok(page)
    }
}

/// What one merged page contributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PageProgress {
    /// Records the service returned, including ones skipped for lacking a
    /// geometry. The next `resultOffset` advances by this count.
    pub records: usize,
    /// Whether another page should be requested.
    pub more: bool,
}

/// Append `page` to the accumulated response.
pub(crate) fn merge_page(acc: &mut Option<FeatureResponse>, page: RawFeatureResponse) -> PageProgress {
    let exceeded = page.exceeded_transfer_limit.unwrap_or(false);
    let records = page.record_count();
    let (page, skipped) = page.into_response();
    if skipped > 0 {
        log::warn!("skipped {} records without geometry", skipped);
    }

    if let Some(existing) = acc.as_mut() {
        existing.has_z |= page.has_z;
        if existing.spatial_reference.is_none() {
            existing.spatial_reference = page.spatial_reference;
        }
        match (existing.features.as_mut(), page.features) {
            (Some(all), Some(mut next)) => all.append(&mut next),
            (None, Some(features)) => existing.features = Some(features),
            (_, None) => {}
        }
    } else {
        *acc = Some(page);
    }

    // An empty page cannot advance the offset.
    PageProgress {
        records,
        more: exceeded && records > 0,
    }
}

/// Request pages until the service stops signalling more records.
///
/// `fetch` receives `None` for the first page and the count of records
/// already returned for every later one.
pub(crate) async fn collect_pages<F, Fut>(mut fetch: F) -> Result<FeatureResponse, FeatureSourceError>
where
    F: FnMut(Option<usize>) -> Fut,
    Fut: Future<Output = Result<RawFeatureResponse, FeatureSourceError>>,
{
    let mut acc: Option<FeatureResponse> = None;
    let mut offset: Option<usize> = None;

    loop {
        let page = fetch(offset).await?;
        let progress = merge_page(&mut acc, page);
        if !progress.more {
            break;
        }
        offset = Some(offset.unwrap_or(0) + progress.records);
    }

    Ok(acc.unwrap_or_default())
}

impl FeatureSource for FeatureServiceSource {
    fn name(&self) -> &str {
        "feature-service"
    }

    fn fetch_all_point_features<'a>(
        &'a self,
        query: &'a FeatureQuery,
    ) -> BoxFuture<'a, Result<FeatureResponse, FeatureSourceError>> {
        Box::pin(async move {
            let url = Self::query_url(&query.location);

            let response = collect_pages(|offset| {
                let params = self.query_params(query, offset);
                let url = url.as_str();
                async move {
                    log::debug!("GET {} (offset {:?})", url, offset);
                    self.fetch_page(url, &params).await
                }
            })
            .await?;

            log::debug!("{}: {} features", url, response.len());
            Ok(response)
        })
    }
}
