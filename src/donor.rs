use serde::Serialize;
use serde_json::Value;

use crate::error::BagsError;

pub const SUBJECT_GRANULARITY: &str = "cfde_subject_granularity:0";

const RACES: &[(&str, &str)] = &[
    ("American Indian or Alaska native", "cfde_subject_race:0"),
    ("Asian or Pacific Islander", "cfde_subject_race:1"),
    ("Black or African American", "cfde_subject_race:2"),
    ("White", "cfde_subject_race:3"),
    ("Unknown", "cfde_subject_race:4"),
    ("Hispanic", "cfde_subject_race:4"),
    ("Asian", "cfde_subject_race:5"),
    ("Native Hawaiian or Other Pacific Islander", "cfde_subject_race:5"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DonorMetadata {
    pub local_id: String,
    pub local_uuid: String,
    pub persistent_id: String,
    pub granularity: &'static str,
    pub sex: Option<&'static str>,
    pub age_at_enrollment: Option<String>,
    pub race: Option<&'static str>,
    pub ethnicity: Option<&'static str>,
}

impl DonorMetadata {
    pub fn from_entity(record: &Value, persistent_id: String) -> Result<Self, BagsError> {
        let local_id = required_str(record, "hubmap_id")?;
        let local_uuid = required_str(record, "uuid")?;
        let data = donor_data(record);

        let age_at_enrollment = data
            .iter()
            .find(|datum| concept_is(datum, "Age"))
            .and_then(|datum| datum.get("data_value"))
            .and_then(value_as_string);

        let sex = data
            .iter()
            .find(|datum| concept_is(datum, "Sex"))
            .and_then(|datum| datum.get("preferred_term"))
            .and_then(Value::as_str)
            .and_then(sex_code);

        let race_terms = data
            .iter()
            .filter(|datum| concept_is(datum, "Race"))
            .filter_map(|datum| datum.get("preferred_term").and_then(Value::as_str))
            .collect::<Vec<_>>();
        let race = race_terms.iter().find_map(|term| {
            let code = race_code(term);
            if code.is_none() {
                tracing::warn!(donor = %local_id, term, "unmapped race term");
            }
            code
        });
        let ethnicity = if race_terms.is_empty() {
            None
        } else if race_terms.iter().any(|term| *term == "Hispanic") {
            Some("cfde_subject_ethnicity:0")
        } else {
            Some("cfde_subject_ethnicity:1")
        };

        Ok(Self {
            local_id,
            local_uuid,
            persistent_id,
            granularity: SUBJECT_GRANULARITY,
            sex,
            age_at_enrollment,
            race,
            ethnicity,
        })
    }
}

pub fn sex_code(term: &str) -> Option<&'static str> {
    match term {
        "Female" => Some("cfde_subject_sex:1"),
        "Male" => Some("cfde_subject_sex:2"),
        _ => None,
    }
}

pub fn race_code(term: &str) -> Option<&'static str> {
    RACES
        .iter()
        .find(|(name, _)| *name == term)
        .map(|(_, code)| *code)
}

fn donor_data(record: &Value) -> Vec<Value> {
    let Some(metadata) = record.get("metadata") else {
        return Vec::new();
    };
    metadata
        .get("living_donor_data")
        .or_else(|| metadata.get("organ_donor_data"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn concept_is(datum: &Value, concept: &str) -> bool {
    let field_is = |key: &str| datum.get(key).and_then(Value::as_str) == Some(concept);
    field_is("grouping_concept_preferred_term")
        || (concept == "Age" && field_is("preferred_term"))
        || field_is("data_value")
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn required_str(record: &Value, field: &str) -> Result<String, BagsError> {
    record
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BagsError::MissingField {
            id: record
                .get("hubmap_id")
                .and_then(Value::as_str)
                .unwrap_or("donor")
                .to_string(),
            field: field.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn donor(data_key: &str, data: Value) -> Value {
        json!({
            "hubmap_id": "HBM111.AAAA.111",
            "uuid": "d0",
            "metadata": { data_key: data }
        })
    }

    #[test]
    fn living_donor_demographics() {
        let record = donor(
            "living_donor_data",
            json!([
                { "grouping_concept_preferred_term": "Age", "preferred_term": "Age", "data_value": 44 },
                { "grouping_concept_preferred_term": "Sex", "preferred_term": "Female", "data_value": "Female" },
                { "grouping_concept_preferred_term": "Race", "preferred_term": "White", "data_value": "White" }
            ]),
        );
        let meta = DonorMetadata::from_entity(&record, "url".to_string()).unwrap();
        assert_eq!(meta.age_at_enrollment.as_deref(), Some("44"));
        assert_eq!(meta.sex, Some("cfde_subject_sex:1"));
        assert_eq!(meta.race, Some("cfde_subject_race:3"));
        assert_eq!(meta.ethnicity, Some("cfde_subject_ethnicity:1"));
    }

    #[test]
    fn organ_donor_hispanic_ethnicity() {
        let record = donor(
            "organ_donor_data",
            json!([
                { "grouping_concept_preferred_term": "Race", "preferred_term": "Hispanic", "data_value": "Hispanic" }
            ]),
        );
        let meta = DonorMetadata::from_entity(&record, "url".to_string()).unwrap();
        assert_eq!(meta.race, Some("cfde_subject_race:4"));
        assert_eq!(meta.ethnicity, Some("cfde_subject_ethnicity:0"));
        assert_eq!(meta.sex, None);
    }

    #[test]
    fn donor_without_metadata_has_no_demographics() {
        let record = json!({ "hubmap_id": "HBM111.AAAA.111", "uuid": "d0" });
        let meta = DonorMetadata::from_entity(&record, "url".to_string()).unwrap();
        assert_eq!(meta.age_at_enrollment, None);
        assert_eq!(meta.ethnicity, None);
        assert_eq!(meta.granularity, SUBJECT_GRANULARITY);
    }
}
