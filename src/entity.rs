use serde_json::Value;

use crate::domain::{HubmapId, Instance};
use crate::error::BagsError;
use crate::http::ApiClient;

pub trait EntityClient: Send + Sync {
    fn entity(&self, id: &HubmapId) -> Result<Value, BagsError>;
    fn ancestors(&self, id: &HubmapId) -> Result<Value, BagsError>;
    fn provenance(&self, id: &HubmapId) -> Result<Value, BagsError>;
}

#[derive(Clone)]
pub struct EntityHttpClient {
    api: ApiClient,
}

impl EntityHttpClient {
    pub fn new(instance: Instance, token: &str) -> Result<Self, BagsError> {
        Ok(Self {
            api: ApiClient::new("entity-api", instance.entity_base(), token)?,
        })
    }

    pub fn entity_path(id: &HubmapId) -> String {
        format!("entities/{}", id.as_str())
    }

    pub fn ancestors_path(id: &HubmapId) -> String {
        format!("ancestors/{}", id.as_str())
    }

    pub fn provenance_path(id: &HubmapId) -> String {
        format!("datasets/{}/prov-info?format=json", id.as_str())
    }
}

impl EntityClient for EntityHttpClient {
    fn entity(&self, id: &HubmapId) -> Result<Value, BagsError> {
        self.api.get_json(&Self::entity_path(id), id.as_str())
    }

    fn ancestors(&self, id: &HubmapId) -> Result<Value, BagsError> {
        let value = self.api.get_json(&Self::ancestors_path(id), id.as_str())?;
        if !value.is_array() {
            return Err(BagsError::MalformedResponse {
                service: self.api.service(),
                message: format!("ancestors of {id} is not a list"),
            });
        }
        Ok(value)
    }

    fn provenance(&self, id: &HubmapId) -> Result<Value, BagsError> {
        self.api.get_json(&Self::provenance_path(id), id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_paths() {
        let id: HubmapId = "HBM123.ABCD.456".parse().unwrap();
        assert_eq!(EntityHttpClient::entity_path(&id), "entities/HBM123.ABCD.456");
        assert_eq!(
            EntityHttpClient::provenance_path(&id),
            "datasets/HBM123.ABCD.456/prov-info?format=json"
        );
    }
}
