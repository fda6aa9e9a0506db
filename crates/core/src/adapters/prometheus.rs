//! Prometheus range-query adapter
//!
//! Issues a `query_range` call against the Prometheus HTTP API and returns a
//! [`DataFrame`] with rows of the form `{"ts": RFC3339 string, "value": f64}`.
//! When the query matches multiple series, values at the same timestamp are
//! summed into one sample.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::{Adapter, DataFrame, Row};

const DEFAULT_STEP_SECONDS: u64 = 60;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct PrometheusAdapter {
    /// Full range-query URL, e.g.
    /// `http://prometheus.monitoring.svc:9090/api/v1/query_range`.
    server_url: String,
    /// PromQL expression to evaluate.
    query: String,
    /// Resolution in seconds (0 defaults to 60).
    step_seconds: u64,
    client: reqwest::Client,
}

impl PrometheusAdapter {
    pub fn new(server_url: impl Into<String>, query: impl Into<String>, step_seconds: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self::with_client(server_url, query, step_seconds, client)
    }

    pub fn with_client(
        server_url: impl Into<String>,
        query: impl Into<String>,
        step_seconds: u64,
        client: reqwest::Client,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            query: query.into(),
            step_seconds,
            client,
        }
    }
}

#[async_trait]
impl Adapter for PrometheusAdapter {
    async fn collect(&self, window_seconds: u64) -> Result<DataFrame> {
        if self.server_url.is_empty() || self.query.is_empty() {
            bail!("prometheus adapter: server_url and query are required");
        }
        let step = if self.step_seconds == 0 {
            DEFAULT_STEP_SECONDS
        } else {
            self.step_seconds
        };

        let end = DateTime::from_timestamp(Utc::now().timestamp(), 0)
            .ok_or_else(|| anyhow!("system clock out of range"))?;
        let start = end - chrono::Duration::seconds(window_seconds as i64);

        let mut url = Url::parse(&self.server_url).context("invalid server_url")?;
        url.query_pairs_mut()
            .append_pair("query", &self.query)
            .append_pair("start", &start.timestamp().to_string())
            .append_pair("end", &end.timestamp().to_string())
            .append_pair("step", &step.to_string());

        let resp = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            bail!("prometheus: status {}", status.as_u16());
        }

        let body: RangeResponse = resp
            .json()
            .await
            .context("decode prometheus response")?;
        if body.status != "success" {
            bail!("prometheus status: {}", body.status);
        }

        let rows = aggregate_range_result(&body.data.result)?;
        Ok(DataFrame { rows })
    }

    fn name(&self) -> &str {
        "prometheus"
    }
}

#[derive(Debug, Deserialize)]
struct RangeResponse {
    status: String,
    #[serde(default)]
    data: RangeData,
}

#[derive(Debug, Default, Deserialize)]
struct RangeData {
    #[serde(rename = "resultType", default)]
    #[allow(dead_code)]
    result_type: String,
    #[serde(default)]
    result: Vec<RangeSeries>,
}

#[derive(Debug, Deserialize)]
struct RangeSeries {
    #[serde(default)]
    #[allow(dead_code)]
    metric: HashMap<String, String>,
    /// Pairs of `[<unix_time>, "<value>"]`.
    #[serde(default)]
    values: Vec<(f64, Value)>,
}

/// Sums all series per timestamp and emits rows sorted by timestamp
/// ascending, with `ts` formatted as an RFC 3339 UTC string.
fn aggregate_range_result(series: &[RangeSeries]) -> Result<Vec<Row>> {
    let mut acc: BTreeMap<i64, f64> = BTreeMap::new();
    for serie in series {
        for (ts, raw) in &serie.values {
            let value = match raw {
                Value::String(s) => s
                    .parse::<f64>()
                    .with_context(|| format!("parse value {s:?}"))?,
                Value::Number(n) => n
                    .as_f64()
                    .ok_or_else(|| anyhow!("non-finite sample value"))?,
                other => bail!("unexpected value type: {other}"),
            };
            *acc.entry(*ts as i64).or_default() += value;
        }
    }

    acc.into_iter()
        .map(|(ts, value)| {
            let when = DateTime::from_timestamp(ts, 0)
                .ok_or_else(|| anyhow!("timestamp {ts} out of range"))?;
            Ok(HashMap::from([
                (
                    "ts".to_string(),
                    Value::String(when.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ),
                ("value".to_string(), Value::from(value)),
            ]))
        })
        .collect()
}
