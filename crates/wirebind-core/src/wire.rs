//! Wire model for replica mutations
//!
//! ```text
//! Mutation := { "i": <uint64>, "m": { <key>: null | [<value>] } }
//! ```
//!
//! A set is wrapped in a one-element sequence so that a value which is itself
//! null stays distinguishable from a delete. Inside the crate the change is a
//! plain [`Change`] enum; the `null | [v]` shape only exists at the serde
//! boundary.

use crate::errors::{Result, SyncError};
use crate::token::MutationToken;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::hash::Hash;

/// Wire key for the mutation token
pub const TOKEN_FIELD: &str = "i";
/// Wire key for the per-key change map
pub const CHANGES_FIELD: &str = "m";

/// One key's change within a mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change<V> {
    /// Set the key to this value
    Set(V),
    /// Remove the key
    Delete,
}

impl<V> Change<V> {
    /// The value being set, if any
    pub fn value(&self) -> Option<&V> {
        match self {
            Self::Set(v) => Some(v),
            Self::Delete => None,
        }
    }

    /// Convert into the structural option used by the overlay
    pub fn into_option(self) -> Option<V> {
        match self {
            Self::Set(v) => Some(v),
            Self::Delete => None,
        }
    }

    /// Whether this change removes the key
    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete)
    }
}

impl<V> From<Option<V>> for Change<V> {
    fn from(value: Option<V>) -> Self {
        match value {
            Some(v) => Self::Set(v),
            None => Self::Delete,
        }
    }
}

impl<V: Serialize> Serialize for Change<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Set(v) => serializer.serialize_some(&(v,)),
            Self::Delete => serializer.serialize_none(),
        }
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for Change<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let wrapped = Option::<(V,)>::deserialize(deserializer)?;
        Ok(match wrapped {
            Some((v,)) => Self::Set(v),
            None => Self::Delete,
        })
    }
}

/// A batch of per-key changes tagged with one token
///
/// Local writes produce single-key mutations; the authority may send batches
/// spanning any number of keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: Serialize + Eq + Hash, V: Serialize",
    deserialize = "K: Deserialize<'de> + Eq + Hash, V: Deserialize<'de>"
))]
pub struct Mutation<K, V> {
    /// Correlation token
    // Keep in sync with TOKEN_FIELD / CHANGES_FIELD
    #[serde(rename = "i")]
    pub token: MutationToken,
    /// Per-key changes
    #[serde(rename = "m")]
    pub changes: HashMap<K, Change<V>>,
}

impl<K: Eq + Hash, V: PartialEq> PartialEq for Mutation<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token && self.changes == other.changes
    }
}

impl<K: Eq + Hash, V: Eq> Eq for Mutation<K, V> {}

/// Mutation sent to the authority for a local write or delete
pub type OutboundMutation<K, V> = Mutation<K, V>;
/// Mutation received from the authority
pub type InboundMutation<K, V> = Mutation<K, V>;

impl<K: Eq + Hash, V> Mutation<K, V> {
    /// Empty mutation carrying `token`
    pub fn new(token: MutationToken) -> Self {
        Self {
            token,
            changes: HashMap::new(),
        }
    }

    /// Single-key set
    pub fn set(token: MutationToken, key: K, value: V) -> Self {
        Self::new(token).with_set(key, value)
    }

    /// Single-key delete
    pub fn delete(token: MutationToken, key: K) -> Self {
        Self::new(token).with_delete(key)
    }

    /// Add a set for `key`, replacing any change already recorded for it
    pub fn with_set(mut self, key: K, value: V) -> Self {
        self.changes.insert(key, Change::Set(value));
        self
    }

    /// Add a delete for `key`, replacing any change already recorded for it
    pub fn with_delete(mut self, key: K) -> Self {
        self.changes.insert(key, Change::Delete);
        self
    }

    /// Change recorded for `key`
    pub fn change(&self, key: &K) -> Option<&Change<V>> {
        self.changes.get(key)
    }

    /// Number of keys touched
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether no keys are touched
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Keys touched by this mutation
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.changes.keys()
    }
}

/// Encoding used on the transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    /// JSON text frames
    #[default]
    Json,
    /// DAG-CBOR binary frames
    DagCbor,
}

/// Encode a mutation as JSON
pub fn to_json<K, V>(mutation: &Mutation<K, V>) -> Result<Vec<u8>>
where
    K: Serialize + Eq + Hash,
    V: Serialize,
{
    Ok(serde_json::to_vec(mutation)?)
}

/// Decode a mutation from JSON
pub fn from_json<K, V>(bytes: &[u8]) -> Result<Mutation<K, V>>
where
    K: DeserializeOwned + Eq + Hash,
    V: DeserializeOwned,
{
    Ok(serde_json::from_slice(bytes)?)
}

/// Encode a mutation as DAG-CBOR
pub fn to_dag_cbor<K, V>(mutation: &Mutation<K, V>) -> Result<Vec<u8>>
where
    K: Serialize + Eq + Hash,
    V: Serialize,
{
    serde_ipld_dagcbor::to_vec(mutation)
        .map_err(|e| SyncError::serialization(format!("Failed to serialize to DAG-CBOR: {e}")))
}

/// Decode a mutation from DAG-CBOR
pub fn from_dag_cbor<K, V>(bytes: &[u8]) -> Result<Mutation<K, V>>
where
    K: DeserializeOwned + Eq + Hash,
    V: DeserializeOwned,
{
    serde_ipld_dagcbor::from_slice(bytes).map_err(|e| SyncError::serialization(e.to_string()))
}

/// Encode with the given format
pub fn encode<K, V>(format: WireFormat, mutation: &Mutation<K, V>) -> Result<Vec<u8>>
where
    K: Serialize + Eq + Hash,
    V: Serialize,
{
    match format {
        WireFormat::Json => to_json(mutation),
        WireFormat::DagCbor => to_dag_cbor(mutation),
    }
}

/// Decode with the given format
pub fn decode<K, V>(format: WireFormat, bytes: &[u8]) -> Result<Mutation<K, V>>
where
    K: DeserializeOwned + Eq + Hash,
    V: DeserializeOwned,
{
    match format {
        WireFormat::Json => from_json(bytes),
        WireFormat::DagCbor => from_dag_cbor(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn set_is_wrapped_in_singleton_sequence() {
        let m = Mutation::set(MutationToken(42), "a".to_string(), 1);
        let value: serde_json::Value = serde_json::from_slice(&to_json(&m).unwrap()).unwrap();
        assert_eq!(value, json!({ "i": 42, "m": { "a": [1] } }));
    }

    #[test]
    fn top_level_fields_use_short_names() {
        let m = Mutation::set(MutationToken(1), "a".to_string(), 1);
        let value: serde_json::Value = serde_json::from_slice(&to_json(&m).unwrap()).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object.len(), 2);
        assert_eq!(object[TOKEN_FIELD], json!(1));
        assert_eq!(object[CHANGES_FIELD], json!({ "a": [1] }));
    }

    #[test]
    fn delete_is_null() {
        let m: Mutation<String, i32> = Mutation::delete(MutationToken(7), "a".to_string());
        let value: serde_json::Value = serde_json::from_slice(&to_json(&m).unwrap()).unwrap();
        assert_eq!(value, json!({ "i": 7, "m": { "a": null } }));
    }

    #[test]
    fn null_value_is_not_a_delete() {
        let bytes = br#"{"i": 3, "m": {"present": [null], "gone": null}}"#;
        let m: Mutation<String, Option<u8>> = from_json(bytes).unwrap();

        assert_eq!(m.change(&"present".to_string()), Some(&Change::Set(None)));
        assert_eq!(m.change(&"gone".to_string()), Some(&Change::Delete));
    }

    #[test]
    fn full_width_token_survives_json() {
        let m = Mutation::set(MutationToken(u64::MAX), "k".to_string(), true);
        let back: Mutation<String, bool> = from_json(&to_json(&m).unwrap()).unwrap();
        assert_eq!(back.token, MutationToken(u64::MAX));
    }

    #[test]
    fn malformed_changes_are_rejected() {
        assert_matches!(
            from_json::<String, i32>(br#"{"i": 1, "m": {"a": 1}}"#),
            Err(SyncError::Serialization { .. })
        );
        assert_matches!(
            from_json::<String, i32>(br#"{"i": 1, "m": {"a": []}}"#),
            Err(SyncError::Serialization { .. })
        );
        assert_matches!(
            from_json::<String, i32>(br#"{"m": {"a": [1]}}"#),
            Err(SyncError::Serialization { .. })
        );
    }

    #[test]
    fn dag_cbor_carries_the_same_batch() {
        let m = Mutation::new(MutationToken(9))
            .with_set("a".to_string(), "x".to_string())
            .with_delete("b".to_string());
        let bytes = encode(WireFormat::DagCbor, &m).unwrap();
        let back: Mutation<String, String> = decode(WireFormat::DagCbor, &bytes).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn change_mirrors_structural_option() {
        let set: Change<i32> = Some(4).into();
        let delete: Change<i32> = None.into();

        assert_eq!(set, Change::Set(4));
        assert_eq!(set.value(), Some(&4));
        assert_eq!(set.into_option(), Some(4));
        assert!(delete.is_delete());
        assert_eq!(delete.value(), None);
        assert_eq!(delete.into_option(), None);
    }

    #[test]
    fn equality_ignores_change_order() {
        let a = Mutation::new(MutationToken(2)).with_set("x", 1).with_delete("y");
        let b = Mutation::new(MutationToken(2)).with_delete("y").with_set("x", 1);
        let other_token = Mutation::new(MutationToken(3)).with_set("x", 1).with_delete("y");

        assert_eq!(a, b);
        assert_ne!(a, other_token);
    }

    #[test]
    fn builder_replaces_earlier_change_for_same_key() {
        let m = Mutation::new(MutationToken(1)).with_set("a", 1).with_delete("a");
        assert_eq!(m.len(), 1);
        assert!(m.change(&"a").unwrap().is_delete());
    }
}
