pub mod classify;
pub use classify::*;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub const UNKNOWN_SESSION: &str = "unknown";

#[derive(Debug, Error)]
pub enum BatchError{
    #[error("no known measurement shape in payload (keys: {0})")]
    UnknownShape(String),

    #[error("field `{field}` element {index} is not a number")]
    NotANumber{ field: &'static str, index: usize },

    #[error("field `{field}` has the wrong type, expected {expected}")]
    WrongType{ field: &'static str, expected: &'static str },
}

/// Per-group arrays. Only the fields valid for the shape exist; the keys
/// that identify a shape are mandatory, the rest may be missing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Series{
    ResponsePeriod{
        avg_response_us: Vec<f64>,
        rms_response_us: Vec<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        avg_period_us: Option<Vec<f64>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        rms_period_us: Option<Vec<f64>>,
    },
    LatencyJitter{
        avg_latency_us: Vec<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        rms_latency_us: Option<Vec<f64>>,
        avg_jitter_us: Vec<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        rms_jitter_us: Option<Vec<f64>>,
    },
    LatencyRange{
        avg_latency_us: Vec<f64>,
        min_latency_us: Vec<f64>,
        max_latency_us: Vec<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        avg_jitter_us: Option<Vec<f64>>,
    },
}

impl Series{
    pub fn shape(&self) -> Shape{
        match self{
            Series::ResponsePeriod{ .. } => Shape::ResponsePeriod,
            Series::LatencyJitter{ .. } => Shape::LatencyJitter,
            Series::LatencyRange{ .. } => Shape::LatencyRange,
        }
    }

    /// Arrays keyed by [`Shape::array_keys`], in that order; `None` where the
    /// payload omitted one.
    pub fn columns(&self) -> [(&'static str, Option<&[f64]>); 4]{
        let values: [Option<&[f64]>; 4] = match self{
            Series::ResponsePeriod{ avg_response_us, rms_response_us, avg_period_us, rms_period_us } =>
                [Some(avg_response_us.as_slice()), Some(rms_response_us.as_slice()), avg_period_us.as_deref(), rms_period_us.as_deref()],
            Series::LatencyJitter{ avg_latency_us, rms_latency_us, avg_jitter_us, rms_jitter_us } =>
                [Some(avg_latency_us.as_slice()), rms_latency_us.as_deref(), Some(avg_jitter_us.as_slice()), rms_jitter_us.as_deref()],
            Series::LatencyRange{ avg_latency_us, min_latency_us, max_latency_us, avg_jitter_us } =>
                [Some(avg_latency_us.as_slice()), Some(min_latency_us.as_slice()), Some(max_latency_us.as_slice()), avg_jitter_us.as_deref()],
        };
        //every variant maps to a shape with exactly four keys
        let keys = self.shape().array_keys();
        std::array::from_fn(|i| (keys[i], values[i]))
    }

    pub fn column(&self, key: &str) -> Option<&[f64]>{
        self.columns().into_iter().find(|(k, _)| *k == key).and_then(|(_, v)| v)
    }

    /// The series compared across sessions in the summary chart.
    pub fn primary(&self) -> &[f64]{
        match self{
            Series::ResponsePeriod{ avg_response_us, .. } => avg_response_us,
            Series::LatencyJitter{ avg_latency_us, .. } => avg_latency_us,
            Series::LatencyRange{ avg_latency_us, .. } => avg_latency_us,
        }
    }

    pub fn is_complete(&self) -> bool{
        self.columns().iter().all(|(_, v)| v.is_some())
    }

    /// Shared length of the present arrays, `None` when they disagree.
    pub fn group_len(&self) -> Option<usize>{
        let mut lens = self.columns().into_iter().filter_map(|(_, v)| v.map(<[f64]>::len));
        let first = lens.next()?;
        lens.all(|len| len == first).then_some(first)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementBatch{
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurements_per_group: Option<u64>,
    #[serde(flatten)]
    pub series: Series,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,
}

impl MeasurementBatch{
    /// Classifies a decoded device object and keeps only the fields its
    /// shape defines.
    pub fn from_json(object: &Map<String, Value>) -> Result<Self, BatchError>{
        let series = match classify(object){
            Shape::LatencyRange => Series::LatencyRange{
                avg_latency_us: required(object, AVG_LATENCY)?,
                min_latency_us: required(object, MIN_LATENCY)?,
                max_latency_us: required(object, MAX_LATENCY)?,
                avg_jitter_us: optional(object, AVG_JITTER)?,
            },
            Shape::LatencyJitter => Series::LatencyJitter{
                avg_latency_us: required(object, AVG_LATENCY)?,
                rms_latency_us: optional(object, RMS_LATENCY)?,
                avg_jitter_us: required(object, AVG_JITTER)?,
                rms_jitter_us: optional(object, RMS_JITTER)?,
            },
            Shape::ResponsePeriod => Series::ResponsePeriod{
                avg_response_us: required(object, AVG_RESPONSE)?,
                rms_response_us: required(object, RMS_RESPONSE)?,
                avg_period_us: optional(object, AVG_PERIOD)?,
                rms_period_us: optional(object, RMS_PERIOD)?,
            },
            Shape::Unknown =>{
                let keys: Vec<&str> = object.keys().map(String::as_str).collect();
                return Err(BatchError::UnknownShape(keys.join(", ")));
            }
        };

        Ok(MeasurementBatch{
            session_id: session_id(object)?,
            groups_count: count(object, "groups_count")?,
            measurements_per_group: count(object, "measurements_per_group")?,
            series,
            statistics: sub_record(object, "statistics")?,
            parameters: sub_record(object, "parameters")?,
        })
    }

    pub fn shape(&self) -> Shape{
        self.series.shape()
    }

    /// `statistics.<block>.overall_<kind>_us`, when the board sent it.
    pub fn overall(&self, block: &str, kind: &str) -> Option<f64>{
        self.statistics
            .as_ref()?
            .get(block)?
            .get(format!("overall_{}_us", kind))?
            .as_f64()
    }

    /// Number of groups as announced, falling back to the array length.
    pub fn groups(&self) -> usize{
        self.groups_count
            .map(|n| n as usize)
            .unwrap_or_else(|| self.series.primary().len())
    }

    /// Describes any disagreement between `groups_count` and the arrays.
    pub fn length_mismatch(&self) -> Option<String>{
        match (self.series.group_len(), self.groups_count){
            (None, _) => Some("per-group arrays have different lengths".to_string()),
            (Some(len), Some(count)) if len as u64 != count =>{
                Some(format!("groups_count is {} but arrays hold {} groups", count, len))
            }
            _ => None,
        }
    }
}

fn numbers(field: &'static str, value: &Value) -> Result<Vec<f64>, BatchError>{
    let items = value.as_array().ok_or(BatchError::WrongType{ field, expected: "an array of numbers" })?;
    items
        .iter()
        .enumerate()
        .map(|(index, v)| v.as_f64().ok_or(BatchError::NotANumber{ field, index }))
        .collect()
}

fn required(object: &Map<String, Value>, field: &'static str) -> Result<Vec<f64>, BatchError>{
    match object.get(field){
        Some(value) => numbers(field, value),
        None => Err(BatchError::WrongType{ field, expected: "an array of numbers" }),
    }
}

fn optional(object: &Map<String, Value>, field: &'static str) -> Result<Option<Vec<f64>>, BatchError>{
    match object.get(field){
        None | Some(Value::Null) => Ok(None),
        Some(value) => numbers(field, value).map(Some),
    }
}

fn session_id(object: &Map<String, Value>) -> Result<String, BatchError>{
    match object.get("session_id"){
        None | Some(Value::Null) => Ok(UNKNOWN_SESSION.to_string()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(_) => Err(BatchError::WrongType{ field: "session_id", expected: "a string or number" }),
    }
}

fn count(object: &Map<String, Value>, field: &'static str) -> Result<Option<u64>, BatchError>{
    match object.get(field){
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or(BatchError::WrongType{ field, expected: "a non-negative integer" }),
    }
}

fn sub_record(object: &Map<String, Value>, field: &'static str) -> Result<Option<Map<String, Value>>, BatchError>{
    match object.get(field){
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map.clone())),
        Some(_) => Err(BatchError::WrongType{ field, expected: "an object" }),
    }
}
