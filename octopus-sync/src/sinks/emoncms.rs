use meter_client::{
    api::emoncms::{FeedCreated, FeedRequest},
    EmoncmsClient, ProcessChain, ReadingBatch,
};

use crate::pipeline::{FeedSpec, InputState, Lookup, SyncError, TimeSeriesSink};

/// Inputs, feeds and bulk writes against an emoncms instance.
#[derive(Clone)]
pub struct EmoncmsSink {
    client: EmoncmsClient,
}

impl EmoncmsSink {
    pub fn new(client: EmoncmsClient) -> Self {
        Self { client }
    }
}

fn sink_error(err: meter_client::ApiError) -> SyncError {
    metrics::counter!("emoncms_sink_errors_total").increment(1);
    SyncError::from_sink(err)
}

#[async_trait::async_trait]
impl TimeSeriesSink for EmoncmsSink {
    async fn input(&self, node: &str, name: &str) -> Result<Lookup<InputState>, SyncError> {
        let Some(record) = self.client.input_get(node, name).await.map_err(sink_error)? else {
            return Ok(Lookup::NotFound);
        };

        let process_chain: ProcessChain = record.process_list.parse().map_err(|e| {
            SyncError::MalformedResponse(format!("input {node}/{name}: {e}"))
        })?;

        Ok(Lookup::Found(InputState {
            last_timestamp: record.time,
            process_chain,
        }))
    }

    async fn input_id(&self, node: &str, name: &str) -> Result<Lookup<i64>, SyncError> {
        self.client
            .input_id(node, name)
            .await
            .map(Lookup::from)
            .map_err(sink_error)
    }

    async fn create_feed(&self, feed: &FeedSpec) -> Result<Option<i64>, SyncError> {
        let request = FeedRequest {
            tag: &feed.tag,
            name: &feed.name,
            datatype: feed.datatype,
            engine: feed.engine,
            interval_secs: feed.interval_secs,
            unit: &feed.unit,
        };

        match self.client.feed_create(&request).await.map_err(sink_error)? {
            FeedCreated::Created(feed_id) => {
                metrics::counter!("emoncms_feeds_created_total").increment(1);
                tracing::info!(feed_id, tag = %feed.tag, name = %feed.name, "created emoncms feed");
                Ok(Some(feed_id))
            }
            FeedCreated::Rejected(message) => {
                tracing::error!(name = %feed.name, %message, "emoncms rejected feed creation");
                Ok(None)
            }
        }
    }

    async fn bind_process_chain(&self, input_id: i64, chain: &ProcessChain) -> Result<bool, SyncError> {
        self.client
            .input_process_set(input_id, chain)
            .await
            .map_err(sink_error)
    }

    async fn bulk_insert(&self, batch: &ReadingBatch, node: &str, name: &str) -> Result<bool, SyncError> {
        let written = self
            .client
            .input_bulk(batch, node, name)
            .await
            .map_err(|e| {
                tracing::error!(
                    node,
                    input = name,
                    last_timestamp = ?batch.last_timestamp(),
                    status = ?e.status(),
                    error = %e,
                    "emoncms bulk insert failed"
                );
                sink_error(e)
            })?;

        if written {
            metrics::counter!("emoncms_bulk_requests_total").increment(1);
            metrics::counter!("emoncms_readings_written_total").increment(batch.len() as u64);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use meter_client::Reading;

    use super::*;
    use crate::mock_http;

    const JAN_1_2021: i64 = 1_609_459_200;

    fn sink(base_url: &str) -> EmoncmsSink {
        EmoncmsSink::new(EmoncmsClient::new(reqwest::Client::new(), base_url, "rw_key"))
    }

    fn batch() -> ReadingBatch {
        ReadingBatch::new(vec![
            Reading { timestamp: JAN_1_2021, value: 0.5 },
            Reading { timestamp: JAN_1_2021 + 1800, value: 0.25 },
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn bulk_insert_posts_readings_as_form_fields() {
        let server = mock_http::spawn(&[("/input/bulk", StatusCode::OK, "ok")]).await;

        assert!(sink(&server.base_url).bulk_insert(&batch(), "030", "E1").await.unwrap());

        let request = server.request_to("/input/bulk");
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.form["apikey"], "rw_key");
        assert_eq!(request.form["time"], "1609461000");
        assert_eq!(request.form["data"], r#"[[-1800,"030",{"E1":0.5}],[0,"030",{"E1":0.25}]]"#);
        assert!(request.query.is_empty());
    }

    #[tokio::test]
    async fn empty_batch_is_not_posted() {
        let server = mock_http::spawn(&[]).await;

        let written = sink(&server.base_url)
            .bulk_insert(&ReadingBatch::default(), "30", "E1")
            .await
            .unwrap();

        assert!(!written);
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn process_chain_is_bound_with_input_id_in_query() {
        let server = mock_http::spawn(&[(
            "/input/process/set",
            StatusCode::OK,
            r#"{"success":true,"message":"Input processlist updated"}"#,
        )])
        .await;
        let chain: ProcessChain = "1:42".parse().unwrap();

        assert!(sink(&server.base_url).bind_process_chain(17, &chain).await.unwrap());

        let request = server.request_to("/input/process/set");
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.query["inputid"], "17");
        assert_eq!(request.query["apikey"], "rw_key");
        assert_eq!(request.form["processlist"], "1:42");
        assert!(!request.form.contains_key("inputid"));
    }

    #[tokio::test]
    async fn input_lookup_skips_leading_markup() {
        let server = mock_http::spawn(&[
            (
                "/input/get/30/E1",
                StatusCode::OK,
                "<br />\n<b>Notice</b>: Undefined index<br />\n{\"time\":1609459200,\"value\":0.5,\"processList\":\"1:42\"}",
            ),
            ("/input/get/30/G1", StatusCode::OK, r#""Node variable does not exist""#),
        ])
        .await;
        let sink = sink(&server.base_url);

        let Lookup::Found(input) = sink.input("30", "E1").await.unwrap() else {
            panic!("expected input 30/E1");
        };
        assert_eq!(input.last_timestamp, Some(JAN_1_2021));
        assert!(input.process_chain.logs_first());
        assert_eq!(sink.input("30", "G1").await.unwrap(), Lookup::NotFound);

        assert_eq!(server.request_to("/input/get/30/E1").query["apikey"], "rw_key");
    }

    #[tokio::test]
    async fn feed_is_created_by_post_with_query_parameters() {
        let server = mock_http::spawn(&[(
            "/feed/create.json",
            StatusCode::OK,
            r#"{"success":true,"feedid":42,"result":true}"#,
        )])
        .await;
        let feed = FeedSpec {
            tag: "Octopus Smart Meter".to_string(),
            name: "18P0000001".to_string(),
            datatype: 1,
            engine: 5,
            interval_secs: 1800,
            unit: "kWh".to_string(),
        };

        assert_eq!(sink(&server.base_url).create_feed(&feed).await.unwrap(), Some(42));

        let request = server.request_to("/feed/create.json");
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.query["apikey"], "rw_key");
        assert_eq!(request.query["tag"], "Octopus Smart Meter");
        assert_eq!(request.query["name"], "18P0000001");
        assert_eq!(request.query["datatype"], "1");
        assert_eq!(request.query["engine"], "5");
        assert_eq!(request.query["unit"], "kWh");
        assert_eq!(request.query["options"], r#"{"interval":1800}"#);
    }

    #[tokio::test]
    async fn server_errors_are_sink_unavailable() {
        let server = mock_http::spawn(&[
            ("/input/get/30/E1", StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            ("/input/bulk", StatusCode::SERVICE_UNAVAILABLE, "down"),
        ])
        .await;
        let sink = sink(&server.base_url);

        let err = sink.input("30", "E1").await.unwrap_err();
        assert!(matches!(err, SyncError::SinkUnavailable(_)), "{err:?}");

        let err = sink.bulk_insert(&batch(), "30", "E1").await.unwrap_err();
        assert!(matches!(err, SyncError::SinkUnavailable(_)), "{err:?}");
    }
}
