//! Extra parameters forwarded to every evaluator.
//!
//! JSON has no tuple type, so sequences travel as arrays. Deserializing
//! into [`ParamValue`] turns every array back into an immutable
//! [`ParamValue::Tuple`], which restores the shape the coordinator sent
//! before the evaluator is constructed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Extra evaluator parameters keyed by name (e.g. `epochs`, `kfold`).
pub type Parameters = BTreeMap<String, ParamValue>;

/// One extra parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Explicitly unset.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Unsigned integer too large for `i64`.
    UInt(u64),
    /// Floating point value.
    Float(f64),
    /// Free text.
    Text(String),
    /// Ordered, immutable sequence.
    Tuple(Box<[ParamValue]>),
    /// Nested parameters.
    Map(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    /// Builds a tuple from any iterator of values.
    pub fn tuple<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ParamValue>,
    {
        ParamValue::Tuple(items.into_iter().map(Into::into).collect())
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::UInt(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer view.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Sequence view.
    pub fn as_tuple(&self) -> Option<&[ParamValue]> {
        match self {
            ParamValue::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Text view.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Nested parameter view.
    pub fn as_map(&self) -> Option<&BTreeMap<String, ParamValue>> {
        match self {
            ParamValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Whether the value is [`ParamValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_parameters() -> Parameters {
        let mut params = Parameters::new();
        params.insert("kfold".into(), 5.into());
        params.insert("epochs".into(), ParamValue::tuple([20, 4, 1]));
        params.insert("learning_rate".into(), ParamValue::tuple([1e-3, 1e-4, 1e-5]));
        params.insert("batch_size".into(), 32.into());
        params
    }

    #[test]
    fn test_tuple_survives_json_round_trip() {
        let params = sample_parameters();
        let json = serde_json::to_string(&params).unwrap();
        assert!(json.contains("[20,4,1]"), "tuples travel as arrays: {json}");

        let restored: Parameters = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, params);
        let epochs = restored["epochs"].as_tuple().unwrap();
        assert_eq!(epochs, &[ParamValue::Int(20), ParamValue::Int(4), ParamValue::Int(1)]);
    }

    #[test]
    fn test_float_tuple_keeps_order() {
        let restored: Parameters =
            serde_json::from_str(r#"{"learning_rate":[0.001,0.0001,1e-05]}"#).unwrap();
        let values: Vec<f64> = restored["learning_rate"]
            .as_tuple()
            .unwrap()
            .iter()
            .filter_map(ParamValue::as_f64)
            .collect();
        assert_eq!(values, vec![1e-3, 1e-4, 1e-5]);
    }

    #[test]
    fn test_scalar_views() {
        assert_eq!(ParamValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(ParamValue::Float(0.5).as_i64(), None);
        assert_eq!(ParamValue::from("adam").as_str(), Some("adam"));
        assert!(ParamValue::Bool(true).as_tuple().is_none());
    }

    #[test]
    fn test_nested_tuple() {
        let nested = ParamValue::tuple([ParamValue::tuple([1, 2]), ParamValue::Int(3)]);
        let json = serde_json::to_string(&nested).unwrap();
        assert_eq!(json, "[[1,2],3]");
        let back: ParamValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, nested);
    }

    #[test]
    fn test_null_map_and_large_unsigned_values() {
        let json = r#"{"dropout":null,"optimizer":{"betas":[0.9,0.999],"name":"adam"},"seed":18446744073709551615}"#;
        let params: Parameters = serde_json::from_str(json).unwrap();

        assert!(params["dropout"].is_null());
        assert_eq!(params["seed"], ParamValue::UInt(u64::MAX));
        let optimizer = params["optimizer"].as_map().unwrap();
        assert_eq!(optimizer["name"].as_str(), Some("adam"));
        assert_eq!(optimizer["betas"].as_tuple().map(<[ParamValue]>::len), Some(2));

        assert_eq!(serde_json::to_string(&params).unwrap(), json);
    }

    proptest! {
        #[test]
        fn prop_integer_tuples_round_trip(items in proptest::collection::vec(any::<i64>(), 0..8)) {
            let original = ParamValue::tuple(items.clone());
            let json = serde_json::to_string(&original).unwrap();
            let back: ParamValue = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(back.as_tuple().map(|t| t.len()), Some(items.len()));
            prop_assert_eq!(back, original);
        }
    }
}
