//! Reader for telemetry and configuration parameters
//!
//! Both endpoints return the same document shape:
//!
//! ```json
//! { "groups": [ { "viewParameters": [ { "id": "...", "actualValue": "21.5" } ] } ] }
//! ```
//!
//! The two are fetched concurrently and merged into one [`ReadingSet`], with
//! configuration values winning over telemetry values for the same id.

use crate::client::guard::{Attempt, InvalidationScope, SessionGuard};
use crate::client::session::Session;
use crate::client::transport::{self, AuthRejection, LoginDetector};
use crate::error::{PortalError, Result};
use crate::scrape;
use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

/// One numeric parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Vendor parameter id
    pub id: String,
    /// Parsed value
    pub value: f64,
    /// Value as the portal sent it
    pub raw_text: String,
    /// When the value was fetched
    pub observed_at: DateTime<Utc>,
}

/// Readings keyed by parameter id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReadingSet {
    readings: BTreeMap<String, Reading>,
}

impl ReadingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a reading, replacing any previous one with the same id
    pub fn insert(&mut self, reading: Reading) {
        self.readings.insert(reading.id.clone(), reading);
    }

    /// Overlay `other`; its readings win on id clashes
    pub fn merge(&mut self, other: ReadingSet) {
        self.readings.extend(other.readings);
    }

    pub fn get(&self, id: &str) -> Option<&Reading> {
        self.readings.get(id)
    }

    /// Parsed value for `id`
    pub fn value(&self, id: &str) -> Option<f64> {
        self.get(id).map(|r| r.value)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Readings in id order
    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.readings.values()
    }
}

#[derive(Debug, Deserialize)]
struct ParameterDocument {
    #[serde(default)]
    groups: Vec<ParameterGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParameterGroup {
    #[serde(default)]
    view_parameters: Vec<ViewParameter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViewParameter {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    actual_value: Option<Value>,
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl ParameterDocument {
    fn into_readings(self, observed_at: DateTime<Utc>) -> ReadingSet {
        let mut set = ReadingSet::new();

        for parameter in self.groups.into_iter().flat_map(|g| g.view_parameters) {
            let Some(id) = parameter.id.as_ref().and_then(scalar_text) else {
                debug!("Skipping parameter without id");
                continue;
            };
            let Some(raw_text) = parameter.actual_value.as_ref().and_then(scalar_text) else {
                debug!(id = %id, "Skipping parameter without scalar value");
                continue;
            };

            match raw_text.trim().parse::<f64>() {
                Ok(value) if value.is_finite() => set.insert(Reading {
                    id,
                    value,
                    raw_text,
                    observed_at,
                }),
                _ => debug!(id = %id, raw = %raw_text, "Skipping non-numeric parameter"),
            }
        }

        set
    }
}

/// Parse a parameter document into readings
pub fn parse_readings(body: &str, observed_at: DateTime<Utc>) -> Result<ReadingSet> {
    let document: ParameterDocument = serde_json::from_str(body)?;
    Ok(document.into_readings(observed_at))
}

/// Fetches and merges the two parameter endpoints
pub struct Reader {
    client: Client,
    telemetry_url: Url,
    configuration_url: Url,
    detector: LoginDetector,
}

impl Reader {
    pub fn new(
        client: Client,
        telemetry_url: Url,
        configuration_url: Url,
        detector: LoginDetector,
    ) -> Self {
        Self {
            client,
            telemetry_url,
            configuration_url,
            detector,
        }
    }

    /// Fetch telemetry and configuration concurrently and merge them
    pub async fn fetch_readings(&self, guard: &SessionGuard) -> Result<ReadingSet> {
        let (mut readings, configuration) = tokio::try_join!(
            self.fetch_endpoint(guard, &self.telemetry_url, "telemetry"),
            self.fetch_endpoint(guard, &self.configuration_url, "configuration"),
        )?;

        readings.merge(configuration);
        debug!(count = readings.len(), "Readings fetched");
        Ok(readings)
    }

    async fn fetch_endpoint(
        &self,
        guard: &SessionGuard,
        url: &Url,
        label: &str,
    ) -> Result<ReadingSet> {
        guard
            .with_auth_retry(label, InvalidationScope::Token, move |session| {
                self.fetch_once(url, label, session)
            })
            .await
    }

    async fn fetch_once(
        &self,
        url: &Url,
        label: &str,
        session: Session,
    ) -> Result<Attempt<ReadingSet>> {
        let token = session
            .bearer_token
            .as_deref()
            .ok_or_else(|| PortalError::authentication("session holds no bearer token"))?;

        let request = self
            .client
            .get(url.clone())
            .bearer_auth(token)
            .header(ACCEPT, "application/json");
        let response =
            transport::send(transport::with_cookies(request, &session.cookie_jar), label).await?;

        if let Some(rejection) = self.detector.rejection(&response) {
            return Ok(Attempt::AuthRejected(rejection));
        }

        let status = response.status();
        if !status.is_success() {
            return Err(PortalError::api(
                Some(status.as_u16()),
                format!("{label} request failed"),
            ));
        }

        let body = transport::read_text(response, label).await?;
        match parse_readings(&body, Utc::now()) {
            Ok(readings) => Ok(Attempt::Done(readings)),
            Err(_) if scrape::looks_like_login_page(&body) => Ok(Attempt::AuthRejected(
                AuthRejection::new(Some(status.as_u16()), "login page served instead of JSON"),
            )),
            Err(e) => Err(PortalError::parsing(format!(
                "{label} response is not a parameter document: {e}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_non_numeric_values_are_skipped() {
        let body = r#"{
            "groups": [
                { "viewParameters": [
                    { "id": "1.2.3", "actualValue": "21.5" },
                    { "id": "1.2.4", "actualValue": "TOGGLE_VALUE_OFFON_1" },
                    { "id": "1.2.5", "actualValue": 7 }
                ] },
                { "viewParameters": [
                    { "actualValue": "1.0" },
                    { "id": "1.3.1", "actualValue": "NaN" },
                    { "id": "1.3.2", "actualValue": null },
                    { "id": "1.3.3", "actualValue": " -4.25 " }
                ] }
            ]
        }"#;

        let readings = parse_readings(body, Utc::now()).unwrap();

        assert_eq!(
            readings.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["1.2.3", "1.2.5", "1.3.3"]
        );
        assert_eq!(readings.value("1.2.3"), Some(21.5));
        assert_eq!(readings.value("1.2.5"), Some(7.0));
        assert_eq!(readings.get("1.3.3").unwrap().raw_text, " -4.25 ");
        assert_eq!(readings.value("1.3.3"), Some(-4.25));
    }

    #[test]
    fn test_merge_prefers_other() {
        let now = Utc::now();
        let mut telemetry =
            parse_readings(r#"{"groups":[{"viewParameters":[{"id":"k","actualValue":"10.0"},{"id":"t","actualValue":"1"}]}]}"#, now)
                .unwrap();
        let configuration =
            parse_readings(r#"{"groups":[{"viewParameters":[{"id":"k","actualValue":"12.0"}]}]}"#, now)
                .unwrap();

        telemetry.merge(configuration);
        assert_eq!(telemetry.value("k"), Some(12.0));
        assert_eq!(telemetry.value("t"), Some(1.0));
        assert_eq!(telemetry.len(), 2);
    }

    #[test]
    fn test_empty_document() {
        assert!(parse_readings("{}", Utc::now()).unwrap().is_empty());
        assert!(parse_readings("<html>", Utc::now()).is_err());
    }

    #[test]
    fn test_reading_set_serializes_as_map() {
        let now = Utc::now();
        let readings =
            parse_readings(r#"{"groups":[{"viewParameters":[{"id":"a","actualValue":"1.5"}]}]}"#, now)
                .unwrap();
        let json = serde_json::to_value(&readings).unwrap();
        assert_eq!(json["a"]["value"], 1.5);
        assert_eq!(json["a"]["raw_text"], "1.5");
    }
}
