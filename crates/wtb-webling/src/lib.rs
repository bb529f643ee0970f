//! Webling adapter (membership database).
//!
//! Implements the `wtb-core` MembershipPort over the Webling REST API
//! (`{base}/api/1/...`, `apikey` header). Every call goes through the shared
//! request client and retry policy.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use wtb_core::{
    config::WeblingConfig,
    domain::{GroupId, MemberId, MemberRecord},
    errors::Error,
    http::{Method, RequestClient},
    ports::MembershipPort,
    retry::Retrier,
    Result,
};

const SERVICE: &str = "webling";

#[derive(Clone, Debug)]
pub struct WeblingClient {
    http: RequestClient,
    base_url: String,
    api_key: String,
    retrier: Retrier,
}

/// `GET member/{id}` / `GET member/{a,b}` element.
#[derive(Debug, Deserialize)]
struct MemberObject {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    parents: Vec<i64>,
    #[serde(default)]
    properties: Map<String, Value>,
}

/// `GET member?filter=...`
#[derive(Debug, Deserialize)]
struct IdList {
    #[serde(default)]
    objects: Vec<u64>,
}

/// `PUT member/{id}`; replaces the whole parent set.
#[derive(Debug, Serialize)]
struct MoveRequest {
    #[serde(rename = "type")]
    kind: &'static str,
    parents: Vec<GroupId>,
}

impl WeblingClient {
    pub fn new(cfg: &WeblingConfig, http: RequestClient) -> Self {
        Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            retrier: Retrier::default(),
        }
    }

    pub fn with_retrier(mut self, retrier: Retrier) -> Self {
        self.retrier = retrier;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/1/{path}", self.base_url)
    }

    async fn call(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = self.url(path);
        let headers = [("apikey", self.api_key.as_str())];
        let what = format!("{method} {path}");

        self.retrier
            .run(SERVICE, &what, || {
                let method = method.clone();
                let (url, headers) = (&url, &headers);
                async move {
                    self.http
                        .request(method, url, body, headers)
                        .await
                        .into_outcome(|r| r.retry_after_header)
                }
            })
            .await
    }

    async fn get_objects(&self, ids: &[MemberId]) -> Result<Vec<MemberObject>> {
        let joined = ids
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let v = self.call(Method::GET, &format!("member/{joined}"), None).await?;

        // A single id yields an object, several ids yield an array.
        if ids.len() == 1 {
            return Ok(vec![decode::<MemberObject>(v)?]);
        }
        decode(v)
    }
}

#[async_trait]
impl MembershipPort for WeblingClient {
    async fn fetch_member(&self, id: &MemberId) -> Result<MemberRecord> {
        let mut objs = self.get_objects(std::slice::from_ref(id)).await?;
        let obj = objs.pop().ok_or_else(|| malformed("empty member response"))?;
        // Single-record responses omit the id.
        Ok(into_record(obj, id.as_str()))
    }

    async fn fetch_members_in_group(&self, group: GroupId) -> Result<Vec<MemberId>> {
        let v = self
            .call(
                Method::GET,
                &format!("member?filter=%24ancestors.%24id={group}"),
                None,
            )
            .await?;
        let list: Option<IdList> = decode(v)?;
        Ok(list
            .map(|l| l.objects)
            .unwrap_or_default()
            .into_iter()
            .map(MemberId::from)
            .collect())
    }

    async fn fetch_members(&self, ids: &[MemberId]) -> Result<Vec<MemberRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let objs = self.get_objects(ids).await?;
        Ok(objs
            .into_iter()
            .enumerate()
            .map(|(i, obj)| {
                let fallback = ids.get(i).map(|id| id.as_str()).unwrap_or("N/A");
                into_record(obj, fallback)
            })
            .collect())
    }

    async fn move_member(
        &self,
        id: &MemberId,
        expected_current: GroupId,
        target: GroupId,
    ) -> Result<MemberRecord> {
        let record = self.fetch_member(id).await?;
        if !record.is_in(expected_current) {
            return Err(Error::PreconditionFailed {
                member: id.to_string(),
                group: expected_current,
            });
        }

        let body = serde_json::to_value(MoveRequest {
            kind: "member",
            parents: vec![target],
        })?;
        self.call(Method::PUT, &format!("member/{id}"), Some(&body))
            .await?;

        tracing::info!(member = %id, from = %expected_current, to = %target, "member moved");
        Ok(record)
    }
}

fn into_record(obj: MemberObject, fallback_id: &str) -> MemberRecord {
    let id = match obj.id {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) if !s.is_empty() => s,
        _ => fallback_id.to_string(),
    };

    let properties: BTreeMap<String, String> = obj
        .properties
        .into_iter()
        .filter_map(|(k, v)| property_text(v).map(|s| (k, s)))
        .collect();

    MemberRecord {
        id,
        parents: obj.parents.into_iter().map(GroupId).collect::<BTreeSet<_>>(),
        properties,
    }
}

/// Webling property values are mostly strings; keep everything else readable.
fn property_text(v: Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn decode<T: serde::de::DeserializeOwned>(v: Value) -> Result<T> {
    serde_json::from_value(v).map_err(|e| malformed(&e.to_string()))
}

fn malformed(detail: &str) -> Error {
    Error::Upstream {
        service: SERVICE,
        status: None,
        detail: format!("unexpected payload: {detail}"),
    }
}
