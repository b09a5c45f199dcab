// =============================================================================
// FRED Client — VIX close (series VIXCLS)
// =============================================================================
//
// Only the VIX component of the sentiment snapshot comes from here. FRED
// reports missing observations as ".", so the newest numeric value among the
// last few observations is used.
// =============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{get_json, json_f64, DataSource, SentimentSource};
use crate::types::SentimentSnapshot;

const VIX_SERIES: &str = "VIXCLS";
const OBSERVATION_LIMIT: u32 = 10;

#[derive(Clone)]
pub struct FredClient {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl FredClient {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    #[instrument(skip(self), name = "fred::latest_vix")]
    async fn latest_vix(&self) -> Result<f64> {
        let key = self
            .api_key
            .as_deref()
            .context("FRED_API_KEY is not set; fred source unavailable")?;
        let url = format!(
            "{}/fred/series/observations?series_id={}&api_key={}&file_type=json&sort_order=desc&limit={}",
            self.base_url, VIX_SERIES, key, OBSERVATION_LIMIT
        );
        let body = get_json(&self.client, &url, "fred observations").await?;

        let vix = body["observations"]
            .as_array()
            .context("fred response has no observations")?
            .iter()
            .find_map(|o| json_f64(&o["value"]))
            .context("fred observations contain no numeric value")?;

        debug!(vix, "fred VIX fetched");
        Ok(vix)
    }
}

impl DataSource for FredClient {
    fn name(&self) -> &str {
        "fred"
    }
}

#[async_trait]
impl SentimentSource for FredClient {
    async fn fetch_sentiment(&self) -> Result<SentimentSnapshot> {
        Ok(SentimentSnapshot {
            vix: Some(self.latest_vix().await?),
            ..SentimentSnapshot::default()
        })
    }
}
