use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use shared_utils::env::get_env_or;
use snafu::ResultExt;

use crate::{
    models::request_params::FetchRequest,
    providers::{
        ApiSnafu, ClientBuildSnafu, DataProvider, FetchResult, InternalSnafu,
        InvalidHeaderSnafu, ProviderError, ProviderInitError, ReqwestSnafu,
        yahoo_chart::{
            params::{construct_params, validate_request},
            response::ChartEnvelope,
        },
    },
};

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const BASE_URL_ENV: &str = "YAHOO_CHART_BASE_URL";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) market_data_ingestor";

pub struct YahooChartProvider {
    client: Client,
    base_url: String,
    auto_adjust: bool,
}

impl YahooChartProvider {
    /// Creates a provider against the public endpoint.
    ///
    /// `YAHOO_CHART_BASE_URL` overrides the host, which is how tests point the
    /// provider at a local server. Prices are split/dividend adjusted.
    pub fn new() -> Result<Self, ProviderInitError> {
        Self::with_base_url(get_env_or(BASE_URL_ENV, DEFAULT_BASE_URL))
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ProviderInitError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_str(USER_AGENT).context(InvalidHeaderSnafu)?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auto_adjust: true,
        })
    }

    /// Toggle split/dividend adjustment of prices.
    pub fn auto_adjust(mut self, enabled: bool) -> Self {
        self.auto_adjust = enabled;
        self
    }

    fn chart_url(&self, symbol: &str) -> String {
        format!("{}/v8/finance/chart/{}", self.base_url, symbol.trim())
    }
}

#[async_trait]
impl DataProvider for YahooChartProvider {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, ProviderError> {
        validate_request(request)?;

        let response = self
            .client
            .get(self.chart_url(&request.symbol))
            .query(&construct_params(request))
            .send()
            .await
            .context(ReqwestSnafu)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            // Unknown or delisted symbols come back as 404 with a chart error.
            tracing::debug!(symbol = %request.symbol, "chart endpoint returned 404");
            return Ok(FetchResult::NoData);
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown API error".to_string());
            return ApiSnafu {
                status: status.as_u16(),
                message,
            }
            .fail();
        }

        let envelope = response.json::<ChartEnvelope>().await.context(ReqwestSnafu)?;
        if let Some(err) = envelope.chart.error {
            return ApiSnafu {
                status: status.as_u16(),
                message: format!(
                    "{}: {}",
                    err.code,
                    err.description.unwrap_or_default()
                ),
            }
            .fail();
        }

        let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
            return Ok(FetchResult::NoData);
        };
        if let Some(returned) = result.meta.symbol.as_deref() {
            if !returned.eq_ignore_ascii_case(request.symbol.trim()) {
                return InternalSnafu {
                    message: format!(
                        "asked for {} but the response is for {returned}",
                        request.symbol
                    ),
                }
                .fail();
            }
        }

        let table = result.into_raw_table(request.timeframe.is_intraday(), self.auto_adjust);
        tracing::debug!(
            symbol = %request.symbol,
            interval = %request.timeframe,
            rows = table.len(),
            "fetched chart"
        );
        Ok(FetchResult::from_table(table))
    }
}
