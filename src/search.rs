use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::{DatasetStatus, HubmapId, Instance};
use crate::error::BagsError;
use crate::http::ApiClient;

const PAGE_SIZE: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub hubmap_id: HubmapId,
    pub uuid: String,
    pub status: DatasetStatus,
    pub data_type: String,
    pub group_name: String,
}

pub trait SearchClient: Send + Sync {
    fn assay_types(&self) -> Result<Vec<String>, BagsError>;
    fn datasets_by_data_type(&self, data_type: &str) -> Result<Vec<SearchHit>, BagsError>;
}

#[derive(Clone)]
pub struct SearchHttpClient {
    api: ApiClient,
}

impl SearchHttpClient {
    pub fn new(instance: Instance, token: &str) -> Result<Self, BagsError> {
        Ok(Self {
            api: ApiClient::new("search-api", instance.search_base(), token)?,
        })
    }
}

impl SearchClient for SearchHttpClient {
    fn assay_types(&self) -> Result<Vec<String>, BagsError> {
        let response = self
            .api
            .post_json("v3/search", &assay_types_query(), "assay types")?;
        parse_assay_types(&response)
    }

    fn datasets_by_data_type(&self, data_type: &str) -> Result<Vec<SearchHit>, BagsError> {
        let response = self
            .api
            .post_json("v3/search", &datasets_query(data_type), data_type)?;
        Ok(parse_hits(&response))
    }
}

pub fn assay_types_query() -> Value {
    json!({
        "size": 0,
        "query": {
            "bool": {
                "must": [{ "match_phrase": { "entity_type": "dataset" } }]
            }
        },
        "aggs": {
            "fieldvals": {
                "terms": { "field": "data_types.keyword", "size": PAGE_SIZE }
            }
        }
    })
}

pub fn datasets_query(data_type: &str) -> Value {
    json!({
        "size": PAGE_SIZE,
        "_source": {
            "include": ["hubmap_id", "uuid", "group_name", "status", "data_types", "dataset_type"]
        },
        "query": {
            "bool": {
                "must": [{ "match_phrase": { "data_types": data_type } }],
                "filter": [{ "match": { "entity_type": "Dataset" } }]
            }
        }
    })
}

pub fn parse_assay_types(response: &Value) -> Result<Vec<String>, BagsError> {
    let buckets = response
        .pointer("/aggregations/fieldvals/buckets")
        .and_then(Value::as_array)
        .ok_or_else(|| BagsError::MalformedResponse {
            service: "search-api",
            message: "missing aggregations.fieldvals.buckets".to_string(),
        })?;
    let mut types = buckets
        .iter()
        .filter_map(|bucket| bucket.get("key").and_then(Value::as_str))
        .map(str::to_string)
        .collect::<Vec<_>>();
    types.sort();
    types.dedup();
    Ok(types)
}

pub fn parse_hits(response: &Value) -> Vec<SearchHit> {
    let Some(hits) = response.pointer("/hits/hits").and_then(Value::as_array) else {
        return Vec::new();
    };
    hits.iter()
        .filter_map(|hit| hit.get("_source"))
        .filter_map(|source| {
            let raw_id = source.get("hubmap_id").and_then(Value::as_str)?;
            let hubmap_id = match raw_id.parse::<HubmapId>() {
                Ok(id) => id,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping search hit");
                    return None;
                }
            };
            Some(SearchHit {
                hubmap_id,
                uuid: string_field(source, "uuid"),
                status: DatasetStatus::from(string_field(source, "status").as_str()),
                data_type: first_data_type(source).unwrap_or_default(),
                group_name: string_field(source, "group_name"),
            })
        })
        .collect()
}

pub fn first_data_type(record: &Value) -> Option<String> {
    record
        .get("data_types")
        .and_then(Value::as_array)
        .and_then(|types| types.first())
        .and_then(Value::as_str)
        .or_else(|| record.get("dataset_type").and_then(Value::as_str))
        .map(str::to_string)
}

fn string_field(record: &Value, key: &str) -> String {
    record
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assay_types_are_sorted() {
        let response = json!({
            "aggregations": { "fieldvals": { "buckets": [
                { "key": "codex", "doc_count": 3 },
                { "key": "AF", "doc_count": 1 }
            ]}}
        });
        assert_eq!(parse_assay_types(&response).unwrap(), vec!["AF", "codex"]);
    }

    #[test]
    fn hits_with_bad_ids_are_dropped() {
        let response = json!({
            "hits": { "hits": [
                { "_source": { "hubmap_id": "HBM123.ABCD.456", "uuid": "abc",
                               "status": "Published", "data_types": ["AF"],
                               "group_name": "Vanderbilt TMC" } },
                { "_source": { "hubmap_id": "bogus" } }
            ]}
        });
        let hits = parse_hits(&response);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].status, DatasetStatus::Published);
        assert_eq!(hits[0].data_type, "AF");
    }
}
