use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use super::StepError;

/// Key/value state shared by every step of a runner.
///
/// Values are JSON so that anything a page script returns can be stored
/// as-is. Keys are never removed; writing an existing key replaces it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    values: Map<String, Value>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Deserialize the value stored under `key`.
    ///
    /// Returns `Ok(None)` when the key is absent and `DomainParse` when the
    /// stored value has a different shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StepError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| StepError::DomainParse(format!("model key {key:?}: {e}"))),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Serialize `value` and store it under `key`.
    pub fn insert_serialized<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), StepError> {
        let key = key.into();
        let value = serde_json::to_value(value)
            .map_err(|e| StepError::DomainParse(format!("model key {key:?}: {e}")))?;
        self.values.insert(key, value);
        Ok(())
    }

    /// Copy every entry of `other` into this model; `other` wins on conflicts.
    pub fn merge(&mut self, other: Model) {
        self.values.extend(other.values);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Map<String, Value>> for Model {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_insert_overwrites_existing_key() {
        let mut model = Model::new();
        model.insert("otp", "111111");
        model.insert("otp", "222222");
        assert_eq!(model.get("otp"), Some(&json!("222222")));
        assert_eq!(model.len(), 1);
    }

    #[test]
    fn test_merge_keeps_unrelated_keys() {
        let mut model = Model::new();
        model.insert("accounts", json!([{"number": "1"}]));
        model.insert("status", "old");

        let mut other = Model::new();
        other.insert("transactions", json!({}));
        other.insert("status", "new");

        model.merge(other);

        assert_eq!(model.get("accounts"), Some(&json!([{"number": "1"}])));
        assert_eq!(model.get("transactions"), Some(&json!({})));
        assert_eq!(model.get("status"), Some(&json!("new")));
        assert_eq!(
            model.keys().collect::<Vec<_>>(),
            vec!["accounts", "status", "transactions"]
        );
    }

    #[test]
    fn test_get_as_reports_shape_mismatch() {
        let mut model = Model::new();
        model.insert("transactions", json!("not a map"));

        let missing: Option<BTreeMap<String, Vec<Value>>> = model.get_as("absent").unwrap();
        assert!(missing.is_none());

        let err = model
            .get_as::<BTreeMap<String, Vec<Value>>>("transactions")
            .unwrap_err();
        assert!(matches!(err, StepError::DomainParse(_)));
    }

    #[test]
    fn test_insert_serialized_round_trips_through_get_as() {
        let mut model = Model::new();
        let mut saved = BTreeMap::new();
        saved.insert("Savings".to_string(), vec![json!({"amount": 1.5})]);
        model.insert_serialized("transactions", &saved).unwrap();

        let loaded: BTreeMap<String, Vec<Value>> = model.get_as("transactions").unwrap().unwrap();
        assert_eq!(loaded, saved);
    }
}
