//! Request and reply encoding.
//!
//! Two JSON encodings are supported:
//!
//! - [`WireFormat::Tagged`]: self-describing objects (the serde form of
//!   [`EvaluationRequest`] / [`EvaluationReply`])
//! - [`WireFormat::Positional`]: bare arrays, for interoperating with
//!   workers that exchange fixed-order tuples
//!
//! Decoders detect the format from the payload; a worker answers in the
//! format it was asked in.

use super::message::{EvaluationReply, EvaluationRequest, Mode, SwarmReply};
use crate::error::GentunError;
use crate::genome::{Genes, Parameters};
use crate::population::CandidateId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON layout of a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    /// Objects with named fields.
    #[default]
    Tagged,
    /// Fixed-order arrays.
    Positional,
}

/// Fields positional requests do not carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestDefaults {
    /// Mode to assume.
    pub mode: Mode,
    /// Fitness direction to assume.
    pub maximize: bool,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            mode: Mode::Genetic,
            maximize: true,
        }
    }
}

/// `[id, genes, fitness, last_location, best_fitness, memory, new_location,
/// additional_parameters, experiment_id]`
type PositionalRequest = (
    CandidateId,
    Genes,
    Option<f64>,
    Option<Genes>,
    Option<f64>,
    Option<Genes>,
    Option<Genes>,
    Option<Parameters>,
    Option<Value>,
);

/// `[id, last_location, fitness, memory, best_fitness, location,
/// training_time, loss, mae, mse, msle]`
type PositionalSwarmReply = (
    CandidateId,
    Genes,
    f64,
    Genes,
    f64,
    Genes,
    f64,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
);

fn codec_error(what: &str, e: serde_json::Error) -> GentunError {
    GentunError::Serialization(format!("{what}: {e}"))
}

/// Encodes a request.
pub fn encode_request(request: &EvaluationRequest, format: WireFormat) -> Result<Vec<u8>, GentunError> {
    let encoded = match format {
        WireFormat::Tagged => serde_json::to_vec(request),
        WireFormat::Positional => serde_json::to_vec(&(
            request.id,
            &request.genes,
            request.fitness,
            &request.last_location,
            request.best_fitness,
            &request.memory,
            &request.new_location,
            &request.additional_parameters,
            &request.experiment_id,
        )),
    };
    encoded.map_err(|e| codec_error("failed to encode request", e))
}

/// Decodes a request in either format.
///
/// Positional requests take mode and direction from `defaults`; their
/// generation is 0.
pub fn decode_request(
    bytes: &[u8],
    defaults: &RequestDefaults,
) -> Result<(EvaluationRequest, WireFormat), GentunError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| codec_error("request is not valid JSON", e))?;
    match value {
        Value::Object(_) => {
            let request = serde_json::from_value(value)
                .map_err(|e| codec_error("malformed tagged request", e))?;
            Ok((request, WireFormat::Tagged))
        }
        Value::Array(_) => {
            let (id, genes, fitness, last_location, best_fitness, memory, new_location, params, experiment): PositionalRequest =
                serde_json::from_value(value)
                    .map_err(|e| codec_error("malformed positional request", e))?;
            let request = EvaluationRequest {
                mode: defaults.mode,
                id,
                generation: 0,
                genes,
                fitness,
                last_location,
                best_fitness,
                memory,
                new_location,
                additional_parameters: params.unwrap_or_default(),
                experiment_id: experiment.and_then(experiment_label),
                maximize: defaults.maximize,
            };
            Ok((request, WireFormat::Positional))
        }
        other => Err(GentunError::Serialization(format!(
            "request must be a JSON object or array, got {other}"
        ))),
    }
}

/// Experiment ids may arrive as numbers.
fn experiment_label(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// Encodes a reply.
pub fn encode_reply(reply: &EvaluationReply, format: WireFormat) -> Result<Vec<u8>, GentunError> {
    let encoded = match (format, reply) {
        (WireFormat::Tagged, reply) => serde_json::to_vec(reply),
        (WireFormat::Positional, EvaluationReply::Genetic { id, fitness }) => {
            serde_json::to_vec(&(id, fitness))
        }
        (WireFormat::Positional, EvaluationReply::Swarm(r)) => serde_json::to_vec(&(
            r.id,
            &r.last_location,
            r.fitness,
            &r.memory,
            r.best_fitness,
            &r.location,
            r.training_time,
            r.loss,
            r.mae,
            r.mse,
            r.msle,
        )),
        (WireFormat::Positional, EvaluationReply::Failed { id, reason }) => {
            serde_json::to_vec(&(id, Value::Null, reason))
        }
    };
    encoded.map_err(|e| codec_error("failed to encode reply", e))
}

/// Decodes a reply in either format.
///
/// Positional replies are told apart by length: 2 is genetic, 3 (with a
/// null second field) is a failure, 11 is swarm.
pub fn decode_reply(bytes: &[u8]) -> Result<EvaluationReply, GentunError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| codec_error("reply is not valid JSON", e))?;
    match value {
        Value::Object(_) => {
            serde_json::from_value(value).map_err(|e| codec_error("malformed tagged reply", e))
        }
        Value::Array(items) => decode_positional_reply(items),
        other => Err(GentunError::Serialization(format!(
            "reply must be a JSON object or array, got {other}"
        ))),
    }
}

fn decode_positional_reply(items: Vec<Value>) -> Result<EvaluationReply, GentunError> {
    let len = items.len();
    let failure = len == 3 && items[1].is_null();
    let value = Value::Array(items);
    let positional = |e: serde_json::Error| codec_error("malformed positional reply", e);
    match len {
        2 => {
            let (id, fitness): (CandidateId, f64) = serde_json::from_value(value).map_err(positional)?;
            Ok(EvaluationReply::Genetic { id, fitness })
        }
        3 if failure => {
            let (id, _, reason): (Option<CandidateId>, Value, String) =
                serde_json::from_value(value).map_err(positional)?;
            Ok(EvaluationReply::Failed { id, reason })
        }
        11 => {
            let r: PositionalSwarmReply = serde_json::from_value(value).map_err(positional)?;
            Ok(EvaluationReply::Swarm(SwarmReply {
                id: r.0,
                last_location: r.1,
                fitness: r.2,
                memory: r.3,
                best_fitness: r.4,
                location: r.5,
                training_time: r.6,
                loss: r.7,
                mae: r.8,
                mse: r.9,
                msle: r.10,
            }))
        }
        n => Err(GentunError::Serialization(format!(
            "positional reply has unexpected length {n}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::ParamValue;

    fn genes(bits: &str) -> Genes {
        [("S_1".to_string(), Value::from(bits))].into()
    }

    fn params() -> Parameters {
        let mut params = Parameters::new();
        params.insert("epochs".into(), ParamValue::tuple([20i64, 4, 1]));
        params.insert(
            "learning_rate".into(),
            ParamValue::tuple([1e-3, 1e-4, 1e-5]),
        );
        params.insert("batch_size".into(), 32i64.into());
        params
    }

    #[test]
    fn test_positional_request_restores_tuples() {
        let mut request = EvaluationRequest::genetic(4, genes("0110"));
        request.additional_parameters = params();
        let bytes = encode_request(&request, WireFormat::Positional).unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.starts_with("[4,"), "unexpected layout {text}");

        let (decoded, format) = decode_request(&bytes, &RequestDefaults::default()).unwrap();
        assert_eq!(format, WireFormat::Positional);
        assert_eq!(decoded, request);
        let epochs = decoded.additional_parameters["epochs"].as_tuple().unwrap();
        assert_eq!(epochs.len(), 3);
        assert_eq!(epochs[0].as_i64(), Some(20));
    }

    #[test]
    fn test_tagged_request_detected() {
        let request = EvaluationRequest::swarm(2, genes("1")).with_generation(9);
        let bytes = encode_request(&request, WireFormat::Tagged).unwrap();
        let (decoded, format) = decode_request(&bytes, &RequestDefaults::default()).unwrap();
        assert_eq!(format, WireFormat::Tagged);
        assert_eq!(decoded.mode, Mode::Swarm);
        assert_eq!(decoded.generation, 9);
    }

    #[test]
    fn test_positional_defaults_and_numeric_experiment() {
        let bytes = br#"[1, {"S_1": "01"}, null, null, null, null, null, {}, 3]"#;
        let defaults = RequestDefaults {
            mode: Mode::Swarm,
            maximize: false,
        };
        let (request, _) = decode_request(bytes, &defaults).unwrap();
        assert_eq!(request.mode, Mode::Swarm);
        assert!(!request.maximize);
        assert_eq!(request.experiment_id.as_deref(), Some("3"));
    }

    #[test]
    fn test_positional_genetic_reply() {
        let reply = EvaluationReply::Genetic { id: 3, fitness: 0.75 };
        let bytes = encode_reply(&reply, WireFormat::Positional).unwrap();
        assert_eq!(bytes, b"[3,0.75]");
        assert_eq!(decode_reply(&bytes).unwrap(), reply);
    }

    #[test]
    fn test_positional_swarm_reply_has_eleven_fields() {
        let reply = EvaluationReply::Swarm(SwarmReply {
            id: 1,
            last_location: genes("00"),
            fitness: 0.4,
            memory: genes("01"),
            best_fitness: 0.6,
            location: genes("01"),
            training_time: 12.5,
            loss: Some(0.3),
            mae: None,
            mse: Some(0.1),
            msle: None,
        });
        let bytes = encode_reply(&reply, WireFormat::Positional).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(11));
        assert_eq!(decode_reply(&bytes).unwrap(), reply);
    }

    #[test]
    fn test_positional_failure_reply() {
        let reply = EvaluationReply::Failed {
            id: Some(5),
            reason: "diverged".into(),
        };
        let bytes = encode_reply(&reply, WireFormat::Positional).unwrap();
        assert_eq!(decode_reply(&bytes).unwrap(), reply);
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(decode_reply(b"not json").is_err());
        assert!(decode_reply(b"[1, 2, 3, 4]").is_err());
        assert!(decode_reply(b"42").is_err());
        assert!(decode_request(b"\"text\"", &RequestDefaults::default()).is_err());
        assert!(decode_request(b"[1]", &RequestDefaults::default()).is_err());
    }
}
