use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fmt;

/// A single numeric field as reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
}

impl FieldValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            FieldValue::Int(v) => v as f64,
            FieldValue::Float(v) => v,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            // Keeps a trailing `.0` so whole floats stay floats on the wire.
            FieldValue::Float(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::Float(v as f64)
    }
}

/// Field name -> value, kept in the order the device reports them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Values {
    fields: Vec<(String, FieldValue)>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a field; a replaced field keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<FieldValue> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, FieldValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Values {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = Values::new();
        for (k, v) in iter {
            values.insert(k, v);
        }
        values
    }
}

impl Serialize for Values {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// One timestamped reading of one device. Immutable once built; shared
/// read-only between all dispatchers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    device_name: String,
    values: Values,
    captured_at: DateTime<Utc>,
}

impl Measurement {
    pub fn new(device_name: impl Into<String>, values: Values, captured_at: DateTime<Utc>) -> Self {
        Self {
            device_name: device_name.into(),
            values,
            captured_at,
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn values(&self) -> &Values {
        &self.values
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_order_and_replaces() {
        let mut values = Values::new();
        values.insert("status", 4i64);
        values.insert("netzspannung", 230.1);
        values.insert("status", 5i64);

        let names: Vec<_> = values.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["status", "netzspannung"]);
        assert_eq!(values.get("status"), Some(FieldValue::Int(5)));
    }

    #[test]
    fn serializes_as_ordered_json_object() {
        let values: Values = vec![("b", 1.5f64), ("a", 2.0)].into_iter().collect();
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"{"b":1.5,"a":2.0}"#);
    }

    #[test]
    fn display_for_payloads() {
        assert_eq!(FieldValue::Int(4).to_string(), "4");
        assert_eq!(FieldValue::Float(0.5).to_string(), "0.5");
        assert_eq!(FieldValue::Float(430.0).to_string(), "430.0");
    }
}
