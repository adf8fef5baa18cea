//! Request/response surface for popup and options collaborators.
//!
//! Requests are JSON objects tagged by `action`:
//! `get:histogram`, `get:options` and `set:options`.

use crate::{Aggregator, RecentlyError, RefreshOutcome};
use recently_core::{AggregationConfig, Histogram};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "action")]
pub enum Request {
    #[serde(rename = "get:histogram")]
    GetHistogram,
    #[serde(rename = "get:options")]
    GetOptions,
    /// Options arrive as `payload.options` from the options page; a flat
    /// `options` field is accepted as well.
    #[serde(rename = "set:options")]
    SetOptions {
        #[serde(default)]
        payload: Option<OptionsEnvelope>,
        #[serde(default)]
        options: Option<OptionsUpdate>,
    },
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OptionsEnvelope {
    pub options: OptionsUpdate,
}

/// Options as submitted by a form: `lookback` may be a number or a numeric string.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OptionsUpdate {
    pub lookback: Value,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Options {
    pub lookback: u32,
}

impl From<AggregationConfig> for Options {
    fn from(config: AggregationConfig) -> Self {
        Self {
            lookback: config.lookback_days,
        }
    }
}

/// One ranked sender as shown in a popup list.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RankedSender {
    pub address: String,
    pub author: String,
    pub names: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Payload {
    Histogram {
        options: Options,
        histogram: Vec<RankedSender>,
    },
    Options {
        options: Options,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Response {
    Ok { payload: Payload },
    Error { error: String },
}

pub fn ranked_senders(histogram: &Histogram) -> Vec<RankedSender> {
    histogram
        .ranked()
        .into_iter()
        .map(|(_, entry)| RankedSender {
            address: entry.address().to_string(),
            author: entry.representative_address.clone(),
            names: entry.display_names.iter().cloned().collect(),
            count: entry.count,
        })
        .collect()
}

/// Reads a lookback value as submitted by an options form.
pub fn parse_lookback(value: &Value) -> Result<i64, RecentlyError> {
    let parsed = match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        RecentlyError::InvalidConfig(format!(
            "lookback must be a whole number of days, got {value}"
        ))
    })
}

#[derive(Clone)]
pub struct QueryHandler {
    aggregator: Arc<Aggregator>,
}

impl QueryHandler {
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        Self { aggregator }
    }

    pub async fn handle(&self, request: Request) -> Response {
        match self.dispatch(request).await {
            Ok(payload) => Response::Ok { payload },
            Err(err) => Response::Error {
                error: err.to_string(),
            },
        }
    }

    /// Handles one JSON-encoded request and returns the JSON-encoded response.
    pub async fn handle_json(&self, raw: &str) -> String {
        let response = match serde_json::from_str::<Request>(raw) {
            Ok(request) => self.handle(request).await,
            Err(err) => Response::Error {
                error: format!("invalid request: {err}"),
            },
        };

        serde_json::to_string(&response).unwrap_or_else(|err| {
            tracing::error!("failed to encode response: {err}");
            r#"{"error":"failed to encode response"}"#.to_string()
        })
    }

    async fn dispatch(&self, request: Request) -> Result<Payload, RecentlyError> {
        match request {
            Request::GetHistogram => {
                let snapshot = self.aggregator.snapshot().await;
                Ok(Payload::Histogram {
                    options: snapshot.config.into(),
                    histogram: ranked_senders(&snapshot.histogram),
                })
            }
            Request::GetOptions => Ok(Payload::Options {
                options: self.aggregator.config().await.into(),
            }),
            Request::SetOptions { payload, options } => {
                let Some(options) = payload.map(|payload| payload.options).or(options) else {
                    return Err(RecentlyError::InvalidConfig(
                        "set:options request carries no options".to_string(),
                    ));
                };
                let days = parse_lookback(&options.lookback)?;
                match self.aggregator.set_lookback_days(days).await {
                    Ok(RefreshOutcome::Refreshed(_) | RefreshOutcome::Coalesced) => {}
                    Err(RecentlyError::Fetch(err)) => {
                        tracing::warn!("lookback saved but refresh failed: {err}");
                    }
                    Err(err) => return Err(err),
                }
                Ok(Payload::Options {
                    options: self.aggregator.config().await.into(),
                })
            }
        }
    }
}
