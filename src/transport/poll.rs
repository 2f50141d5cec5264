use async_trait::async_trait;
use tokio::time::{Duration, Interval, MissedTickBehavior};

use crate::ingest::FieldMapping;
use crate::settings::PollSettings;

use super::{Transport, TransportError};

/// Last non-blank line of a JSON-lines body.
pub fn newest_line(body: &str) -> Option<&str> {
    body.lines().rev().map(str::trim).find(|line| !line.is_empty())
}

/// Fetches a JSON-lines log on an interval and yields its newest line
/// whenever it changes, renamed to the canonical field names.
pub struct PollTransport {
    client: reqwest::Client,
    url: String,
    fields: FieldMapping,
    ticker: Interval,
    last_line: Option<String>,
}

impl PollTransport {
    pub fn new(settings: &PollSettings) -> Self {
        let mut ticker = tokio::time::interval(Duration::from_millis(settings.interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            client: reqwest::Client::new(),
            url: settings.url.clone(),
            fields: settings.fields.clone(),
            ticker,
            last_line: None,
        }
    }

    async fn fetch(&self) -> Result<String, TransportError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| TransportError::Disconnected(err.to_string()))?;

        response
            .text()
            .await
            .map_err(|err| TransportError::Disconnected(err.to_string()))
    }

    /// Returns the newest line if it differs from the one seen last.
    fn take_new(&mut self, body: &str) -> Option<String> {
        let line = newest_line(body)?;
        if self.last_line.as_deref() == Some(line) {
            return None;
        }
        self.last_line = Some(line.to_owned());
        Some(self.fields.apply(line))
    }
}

#[async_trait]
impl Transport for PollTransport {
    fn name(&self) -> &'static str {
        "poll"
    }

    async fn next_payload(&mut self) -> Result<String, TransportError> {
        loop {
            self.ticker.tick().await;
            let body = self.fetch().await?;
            if let Some(line) = self.take_new(&body) {
                return Ok(line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_line_skips_trailing_blank_lines() {
        let body = "{\"distance\": 1}\n{\"distance\": 2}\n\n  \n";
        assert_eq!(newest_line(body), Some("{\"distance\": 2}"));
        assert_eq!(newest_line("\n \n"), None);
    }

    #[tokio::test]
    async fn repeated_lines_are_reported_once() {
        let mut transport = PollTransport::new(&PollSettings::default());
        assert_eq!(
            transport.take_new("a\nb\n").as_deref(),
            Some("b")
        );
        assert_eq!(transport.take_new("a\nb\n"), None);
        assert_eq!(transport.take_new("b\nc").as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn pigeon_log_lines_become_readings() {
        let settings = PollSettings {
            fields: FieldMapping {
                distance: "sensor".into(),
                volume: None,
            },
            ..PollSettings::default()
        };
        let mut transport = PollTransport::new(&settings);

        let body = "{\"sensor\": 4100}\n{\"sensor\": 3500}\n";
        let line = transport.take_new(body).unwrap();
        let reading = crate::ingest::ingest(&line, chrono::Utc::now()).unwrap();
        assert_eq!(reading.sample.distance, 3500);
        assert_eq!(reading.sample.volume, 0);
        assert_eq!(transport.take_new(body), None);
    }
}
