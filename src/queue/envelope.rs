//! Job envelopes and their parameter bags.
//!
//! A job payload is a flat, ordered list of named string parameters encoded
//! as a JSON array of `{"name", "value"}` objects. Order is preserved for
//! re-encoding, lookups are by name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while encoding or decoding a parameter bag.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamsError {
    #[error("parameter name must not be empty")]
    EmptyName,

    #[error("duplicate parameter name: {0}")]
    DuplicateName(String),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct EncodedParam {
    name: String,
    value: String,
}

/// Ordered key/value bag carried by a job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobParams {
    entries: Vec<(String, String)>,
}

impl JobParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `set`.
    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.set(name, value);
        self
    }

    /// Set a parameter, replacing an existing value in place.
    pub fn set(&mut self, name: impl Into<String>, value: impl ToString) {
        let name = name.into();
        let value = value.to_string();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Read a parameter as an integer.
    ///
    /// Absent or unparsable values yield `0`; callers treat that as "not set"
    /// instead of failing the whole job.
    pub fn get_int(&self, name: &str) -> i64 {
        self.get_int_or(name, 0)
    }

    pub fn get_int_or(&self, name: &str, default: i64) -> i64 {
        self.get(name)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(default)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn encode(&self) -> Result<String, ParamsError> {
        let mut encoded = Vec::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            if name.is_empty() {
                return Err(ParamsError::EmptyName);
            }
            encoded.push(EncodedParam {
                name: name.clone(),
                value: value.clone(),
            });
        }
        serde_json::to_string(&encoded).map_err(|e| ParamsError::Malformed(e.to_string()))
    }

    pub fn decode(payload: &str) -> Result<Self, ParamsError> {
        let decoded: Vec<EncodedParam> =
            serde_json::from_str(payload).map_err(|e| ParamsError::Malformed(e.to_string()))?;

        let mut params = JobParams::new();
        for param in decoded {
            if param.name.is_empty() {
                return Err(ParamsError::EmptyName);
            }
            if params.get(&param.name).is_some() {
                return Err(ParamsError::DuplicateName(param.name));
            }
            params.entries.push((param.name, param.value));
        }
        Ok(params)
    }
}

/// The unit of work placed on a durable queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEnvelope {
    /// Opaque id, unique per enqueue.
    pub id: String,
    /// Display label, e.g. `export:video`.
    pub label: String,
    /// Encoded [`JobParams`].
    pub payload: String,
    pub created: DateTime<Utc>,
}

impl JobEnvelope {
    /// Build an envelope from parameters, encoding them up front so a bad
    /// bag is rejected before anything reaches a queue.
    pub fn new(label: impl Into<String>, params: &JobParams) -> Result<Self, ParamsError> {
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            label: label.into(),
            payload: params.encode()?,
            created: Utc::now(),
        })
    }

    pub fn params(&self) -> Result<JobParams, ParamsError> {
        JobParams::decode(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_preserves_order_and_values() {
        let params = JobParams::new()
            .with("subjectId", 42)
            .with("title", "Quarterly, \"final\" deck")
            .with("empty", "")
            .with("unicode", "päivää → 🎬");

        let decoded = JobParams::decode(&params.encode().unwrap()).unwrap();
        assert_eq!(decoded, params);

        let names: Vec<&str> = decoded.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["subjectId", "title", "empty", "unicode"]);
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut params = JobParams::new().with("a", 1).with("b", 2);
        params.set("a", 3);
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("a"), Some("3"));
        assert_eq!(params.iter().next(), Some(("a", "3")));
    }

    #[test]
    fn test_get_int_defaults_to_zero() {
        let params = JobParams::new()
            .with("width", "800")
            .with("height", "tall")
            .with("padded", " 12 ");

        assert_eq!(params.get_int("width"), 800);
        assert_eq!(params.get_int("height"), 0);
        assert_eq!(params.get_int("missing"), 0);
        assert_eq!(params.get_int("padded"), 12);
        assert_eq!(params.get_int_or("missing", 1), 1);
    }

    #[test]
    fn test_encode_rejects_empty_name() {
        let params = JobParams::new().with("", "x");
        assert_eq!(params.encode(), Err(ParamsError::EmptyName));
        assert!(JobEnvelope::new("broken", &params).is_err());
    }

    #[test]
    fn test_decode_rejects_garbage_and_duplicates() {
        assert!(matches!(
            JobParams::decode("not json"),
            Err(ParamsError::Malformed(_))
        ));
        assert_eq!(
            JobParams::decode(r#"[{"name":"a","value":"1"},{"name":"a","value":"2"}]"#),
            Err(ParamsError::DuplicateName("a".to_string()))
        );
    }

    #[test]
    fn test_envelope_ids_are_unique() {
        let params = JobParams::new().with("to", "someone@example.com");
        let a = JobEnvelope::new("email", &params).unwrap();
        let b = JobEnvelope::new("email", &params).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.params().unwrap(), params);
    }
}
