use reqwest::Client;
use serde_json::{json, Value};

use super::{error::ApiError, read_body};
use crate::domain::{ProcessChain, ReadingBatch};

/// Replies `input/get` uses for inputs that have never been posted to.
const NOT_FOUND_REPLIES: &[&str] = &["Node does not exist", "Node variable does not exist"];

/// Client for the emoncms HTTP API. Every call carries the read/write key.
#[derive(Clone)]
pub struct EmoncmsClient {
    http: Client,
    base_url: String,
    api_key: String,
}

/// State of one input as reported by `input/get`.
#[derive(Debug, Clone, PartialEq)]
pub struct InputRecord {
    /// Timestamp of the last value logged to the input, if any.
    pub time: Option<i64>,
    /// Raw `processList`, e.g. `"1:42"`.
    pub process_list: String,
}

#[derive(Debug, Clone)]
pub struct FeedRequest<'a> {
    pub tag: &'a str,
    pub name: &'a str,
    pub datatype: u32,
    pub engine: u32,
    pub interval_secs: u32,
    pub unit: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedCreated {
    Created(i64),
    Rejected(String),
}

impl EmoncmsClient {
    pub fn new(http: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            http,
            base_url,
            api_key: api_key.into(),
        }
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .query(&[("apikey", self.api_key.as_str())])
            .query(query)
            .send()
            .await;
        let body = read_body(path, response).await?;
        decode_reply(path, &body)
    }

    /// `Ok(None)` when the node or the input under it does not exist.
    pub async fn input_get(&self, node: &str, name: &str) -> Result<Option<InputRecord>, ApiError> {
        let path = format!(
            "input/get/{}/{}",
            urlencoding::encode(node),
            urlencoding::encode(name)
        );
        let reply = self.get_json(&path, &[]).await?;
        parse_input_record("input/get", &reply)
    }

    /// Resolve the numeric input id that `input/process/set` needs.
    pub async fn input_id(&self, node: &str, name: &str) -> Result<Option<i64>, ApiError> {
        let reply = self.get_json("input/getinputs", &[]).await?;
        parse_input_id("input/getinputs", &reply, node, name)
    }

    pub async fn feed_create(&self, feed: &FeedRequest<'_>) -> Result<FeedCreated, ApiError> {
        let options = json!({ "interval": feed.interval_secs }).to_string();
        let query = [
            ("tag", feed.tag.to_string()),
            ("name", feed.name.to_string()),
            ("datatype", feed.datatype.to_string()),
            ("engine", feed.engine.to_string()),
            ("unit", feed.unit.to_string()),
            ("options", options),
        ];
        let path = "feed/create.json";
        let url = format!("{}{}", self.base_url, path);
        // emoncms reads the feed fields from the query string, POST or not.
        let response = self
            .http
            .post(&url)
            .query(&[("apikey", self.api_key.as_str())])
            .query(&query)
            .send()
            .await;
        let body = read_body(path, response).await?;
        let reply = decode_reply(path, &body)?;
        parse_feed_created(path, &reply)
    }

    /// Replace the process list of an input. emoncms only honours the call
    /// when `inputid` is in the query string and `processlist` in the body.
    pub async fn input_process_set(&self, input_id: i64, chain: &ProcessChain) -> Result<bool, ApiError> {
        let path = "input/process/set";
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .query(&[("apikey", self.api_key.clone()), ("inputid", input_id.to_string())])
            .form(&[("processlist", chain.to_string())])
            .send()
            .await;
        let body = read_body(path, response).await?;
        let reply = decode_reply(path, &body)?;

        Ok(reply.get("success").and_then(Value::as_bool).unwrap_or(false))
    }

    /// Post a batch to `input/bulk` in one request. An empty batch is not
    /// sent and reports `false`.
    pub async fn input_bulk(&self, batch: &ReadingBatch, node: &str, name: &str) -> Result<bool, ApiError> {
        let Some((last_timestamp, data)) = encode_bulk(batch, node, name) else {
            tracing::warn!(node, input = name, "no readings to post to emoncms");
            return Ok(false);
        };

        tracing::info!(
            node,
            input = name,
            last_timestamp,
            items = batch.len(),
            "posting bulk request to emoncms"
        );

        let path = "input/bulk";
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("apikey", self.api_key.clone()),
                ("time", last_timestamp.to_string()),
                ("data", data),
            ])
            .send()
            .await;
        read_body(path, response).await?;

        Ok(true)
    }
}

/// Some emoncms builds emit PHP warnings (`<br />...`) ahead of the JSON
/// body. Skip to the first `{` when the reply does not start as JSON.
pub fn strip_to_json(body: &str) -> &str {
    let trimmed = body.trim_start();
    match trimmed.chars().next() {
        Some('{' | '[' | '"') | None => trimmed,
        Some(_) => match trimmed.find('{') {
            Some(idx) => &trimmed[idx..],
            None => trimmed,
        },
    }
}

pub fn decode_reply(endpoint: &str, body: &str) -> Result<Value, ApiError> {
    serde_json::from_str(strip_to_json(body)).map_err(|e| ApiError::Decode {
        endpoint: endpoint.to_string(),
        detail: e.to_string(),
    })
}

/// `(time, data)` form fields for `input/bulk`: `time` is the last
/// timestamp and `data` holds `[offset, node, {name: value}]` rows.
pub fn encode_bulk(batch: &ReadingBatch, node: &str, name: &str) -> Option<(i64, String)> {
    let last_timestamp = batch.last_timestamp()?;
    let node = node_value(node);

    let rows: Vec<Value> = batch
        .offsets()
        .map(|(offset, value)| {
            let mut inputs = serde_json::Map::with_capacity(1);
            inputs.insert(name.to_string(), json!(value));
            json!([offset, node, inputs])
        })
        .collect();

    Some((last_timestamp, Value::Array(rows).to_string()))
}

/// Numeric node ids go out as JSON numbers, anything else (including
/// zero-padded ids such as `"030"`) as the string it was configured as.
fn node_value(node: &str) -> Value {
    match node.parse::<u64>() {
        Ok(id) if id.to_string() == node => json!(id),
        _ => json!(node),
    }
}

fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    }
}

fn is_not_found_reply(reply: &Value) -> bool {
    let message = match reply {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) if map.get("success") == Some(&Value::Bool(false)) => {
            map.get("message").and_then(Value::as_str)
        }
        _ => None,
    };
    message.is_some_and(|m| NOT_FOUND_REPLIES.iter().any(|nf| m.trim() == *nf))
}

fn parse_input_record(endpoint: &str, reply: &Value) -> Result<Option<InputRecord>, ApiError> {
    if is_not_found_reply(reply) {
        return Ok(None);
    }

    let Value::Object(map) = reply else {
        return Err(ApiError::Decode {
            endpoint: endpoint.to_string(),
            detail: format!("expected an object, got {reply}"),
        });
    };

    let process_list = map
        .get("processList")
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Null => Some(String::new()),
            _ => None,
        })
        .ok_or_else(|| ApiError::MissingField {
            endpoint: endpoint.to_string(),
            field: "processList",
        })?;

    Ok(Some(InputRecord {
        time: map.get("time").and_then(lenient_i64),
        process_list,
    }))
}

fn parse_input_id(endpoint: &str, reply: &Value, node: &str, name: &str) -> Result<Option<i64>, ApiError> {
    if !reply.is_object() {
        return Err(ApiError::Decode {
            endpoint: endpoint.to_string(),
            detail: format!("expected an object, got {reply}"),
        });
    }

    let Some(input) = reply.get(node).and_then(|n| n.get(name)) else {
        return Ok(None);
    };

    input
        .get("id")
        .and_then(lenient_i64)
        .map(Some)
        .ok_or_else(|| ApiError::MissingField {
            endpoint: endpoint.to_string(),
            field: "id",
        })
}

fn parse_feed_created(endpoint: &str, reply: &Value) -> Result<FeedCreated, ApiError> {
    if !reply.is_object() {
        return Err(ApiError::Decode {
            endpoint: endpoint.to_string(),
            detail: format!("expected an object, got {reply}"),
        });
    }

    if reply.get("success") == Some(&Value::Bool(false)) {
        let message = reply
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("feed creation rejected")
            .to_string();
        return Ok(FeedCreated::Rejected(message));
    }

    Ok(match reply.get("feedid").and_then(lenient_i64) {
        Some(id) => FeedCreated::Created(id),
        None => FeedCreated::Rejected("reply did not include a feed id".to_string()),
    })
}
