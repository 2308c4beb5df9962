use reqwest::Client;
use time::format_description::well_known::Rfc3339;

use super::{PageCursor, RateError, RatePage, RatePageFetcher};
use crate::config::TariffConfig;

/// Standard unit rates of one single-register electricity tariff.
#[derive(Debug, Clone)]
pub struct OctopusRateClient {
    client: Client,
    base_url: String,
    product_code: String,
    region_code: String,
    page_size: u32,
}

impl OctopusRateClient {
    pub fn new(cfg: &TariffConfig) -> Result<Self, RateError> {
        let client = Client::builder()
            .timeout(cfg.page_timeout())
            .build()
            .map_err(|e| RateError::RateSourceUnavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            product_code: cfg.product_code.clone(),
            region_code: cfg.region_code.clone(),
            page_size: cfg.page_size,
        })
    }

    pub fn tariff_code(&self) -> String {
        format!("E-1R-{}-{}", self.product_code, self.region_code)
    }

    pub fn rates_url(&self) -> String {
        format!(
            "{}/products/{}/electricity-tariffs/{}/standard-unit-rates/",
            self.base_url,
            self.product_code,
            self.tariff_code()
        )
    }
}

#[async_trait::async_trait]
impl RatePageFetcher for OctopusRateClient {
    async fn fetch(&self, cursor: &PageCursor) -> Result<RatePage, RateError> {
        let request = match cursor {
            PageCursor::First(window) => {
                let period_from = window
                    .start
                    .format(&Rfc3339)
                    .map_err(|e| RateError::InvalidWindow(e.to_string()))?;
                let period_to = window
                    .end
                    .format(&Rfc3339)
                    .map_err(|e| RateError::InvalidWindow(e.to_string()))?;

                tracing::info!(tariff = %self.tariff_code(), %period_from, %period_to, "fetching unit rates");
                self.client.get(self.rates_url()).query(&[
                    ("period_from", period_from),
                    ("period_to", period_to),
                    ("page_size", self.page_size.to_string()),
                ])
            }
            PageCursor::Next(url) => {
                tracing::debug!(%url, "fetching next unit rate page");
                self.client.get(url)
            }
        };

        let response = request
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| RateError::RateSourceUnavailable(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RateError::RateSourceUnavailable(format!(
                "rate API error {status}: {body}"
            )));
        }

        response
            .json::<RatePage>()
            .await
            .map_err(|e| RateError::RateSourceUnavailable(format!("invalid rate page: {e}")))
    }
}
