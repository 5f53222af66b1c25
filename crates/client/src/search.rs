//! Product search.

use reqwest::{Method, StatusCode};
use tracing::{debug, instrument};
use willys_core::validation::validate_search;
use willys_core::{Product, SearchPreferences, rank_products};

use crate::endpoints;
use crate::error::WillysError;
use crate::session::{WillysClient, decode_json, expect_status};
use crate::wire::SearchResponse;

impl WillysClient {
    /// Search the catalog.
    ///
    /// Results keep the store's order unless `preferences` is given, in which
    /// case they are filtered and sorted by [`rank_products`].
    ///
    /// # Errors
    ///
    /// - `Validation` for a blank query or a page size outside `1..=100`
    /// - `Api` for a non-success or undecodable response
    #[instrument(skip(self, preferences), fields(ranked = preferences.is_some()))]
    pub async fn search_products(
        &self,
        query: &str,
        page: u32,
        size: u32,
        preferences: Option<&SearchPreferences>,
    ) -> Result<Vec<Product>, WillysError> {
        validate_search(query, size)?;

        let page = page.to_string();
        let size = size.to_string();
        let path = endpoints::with_query(
            endpoints::SEARCH,
            [("q", query), ("page", page.as_str()), ("size", size.as_str())],
        );

        let response = self.execute(Method::GET, &path, None, false).await?;
        let response = expect_status(response, &[StatusCode::OK], &path, "search failed").await?;
        let SearchResponse { results } =
            decode_json(response, &path, "failed to parse search results").await?;

        debug!(count = results.len(), "search returned products");
        Ok(match preferences {
            Some(preferences) => rank_products(results, preferences),
            None => results,
        })
    }
}
