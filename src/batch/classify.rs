use serde::Serialize;
use serde_json::{Map, Value};

pub const AVG_RESPONSE: &str = "avg_response_us";
pub const RMS_RESPONSE: &str = "rms_response_us";
pub const AVG_PERIOD: &str = "avg_period_us";
pub const RMS_PERIOD: &str = "rms_period_us";
pub const AVG_LATENCY: &str = "avg_latency_us";
pub const RMS_LATENCY: &str = "rms_latency_us";
pub const MIN_LATENCY: &str = "min_latency_us";
pub const MAX_LATENCY: &str = "max_latency_us";
pub const AVG_JITTER: &str = "avg_jitter_us";
pub const RMS_JITTER: &str = "rms_jitter_us";

/// Payload layouts the firmware has produced over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape{
    ResponsePeriod,
    LatencyJitter,
    LatencyRange,
    Unknown,
}

/// One figure repeated from `statistics` into the CSV.
#[derive(Debug, Clone, Copy)]
pub struct OverallColumn{
    pub column: &'static str,
    pub block: &'static str,
    pub kind: &'static str,
}

/// One chart of the per-batch grid.
#[derive(Debug, Clone, Copy)]
pub struct ChartSpec{
    pub key: &'static str,
    pub title: &'static str,
    pub block: &'static str,
    pub kind: &'static str,
}

const fn overall(column: &'static str, block: &'static str, kind: &'static str) -> OverallColumn{
    OverallColumn{ column, block, kind }
}

const fn chart(key: &'static str, title: &'static str, block: &'static str, kind: &'static str) -> ChartSpec{
    ChartSpec{ key, title, block, kind }
}

const RESPONSE_OVERALL: [OverallColumn; 4] = [
    overall("overall_avg_response", "response_time", "avg"),
    overall("overall_rms_response", "response_time", "rms"),
    overall("overall_avg_period", "period", "avg"),
    overall("overall_rms_period", "period", "rms"),
];

const LATENCY_OVERALL: [OverallColumn; 4] = [
    overall("overall_avg_latency", "latency", "avg"),
    overall("overall_rms_latency", "latency", "rms"),
    overall("overall_avg_jitter", "jitter", "avg"),
    overall("overall_rms_jitter", "jitter", "rms"),
];

const RANGE_OVERALL: [OverallColumn; 4] = [
    overall("overall_avg_latency", "latency", "avg"),
    overall("overall_min_latency", "latency", "min"),
    overall("overall_max_latency", "latency", "max"),
    overall("overall_avg_jitter", "jitter", "avg"),
];

const RESPONSE_CHARTS: [ChartSpec; 4] = [
    chart(AVG_RESPONSE, "Mean response time per group", "response_time", "avg"),
    chart(RMS_RESPONSE, "Response time RMS per group", "response_time", "rms"),
    chart(AVG_PERIOD, "Mean period per group", "period", "avg"),
    chart(RMS_PERIOD, "Period RMS per group", "period", "rms"),
];

const LATENCY_CHARTS: [ChartSpec; 4] = [
    chart(AVG_LATENCY, "Mean latency per group", "latency", "avg"),
    chart(RMS_LATENCY, "Latency RMS per group", "latency", "rms"),
    chart(AVG_JITTER, "Mean jitter per group", "jitter", "avg"),
    chart(RMS_JITTER, "Jitter RMS per group", "jitter", "rms"),
];

const RANGE_CHARTS: [ChartSpec; 4] = [
    chart(AVG_LATENCY, "Mean latency per group", "latency", "avg"),
    chart(MIN_LATENCY, "Minimum latency per group", "latency", "min"),
    chart(MAX_LATENCY, "Maximum latency per group", "latency", "max"),
    chart(AVG_JITTER, "Mean jitter per group", "jitter", "avg"),
];

impl Shape{
    /// The four array keys of this shape, in column order.
    pub fn array_keys(&self) -> &'static [&'static str]{
        match self{
            Shape::ResponsePeriod => &[AVG_RESPONSE, RMS_RESPONSE, AVG_PERIOD, RMS_PERIOD],
            Shape::LatencyJitter => &[AVG_LATENCY, RMS_LATENCY, AVG_JITTER, RMS_JITTER],
            Shape::LatencyRange => &[AVG_LATENCY, MIN_LATENCY, MAX_LATENCY, AVG_JITTER],
            Shape::Unknown => &[],
        }
    }

    pub fn overall_columns(&self) -> &'static [OverallColumn]{
        match self{
            Shape::ResponsePeriod => &RESPONSE_OVERALL,
            Shape::LatencyJitter => &LATENCY_OVERALL,
            Shape::LatencyRange => &RANGE_OVERALL,
            Shape::Unknown => &[],
        }
    }

    pub fn charts(&self) -> &'static [ChartSpec]{
        match self{
            Shape::ResponsePeriod => &RESPONSE_CHARTS,
            Shape::LatencyJitter => &LATENCY_CHARTS,
            Shape::LatencyRange => &RANGE_CHARTS,
            Shape::Unknown => &[],
        }
    }

    pub fn primary_key(&self) -> Option<&'static str>{
        self.array_keys().first().copied()
    }

    pub fn file_prefix(&self) -> &'static str{
        match self{
            Shape::ResponsePeriod => "response",
            Shape::LatencyJitter => "latency",
            Shape::LatencyRange => "latency_range",
            Shape::Unknown => "unknown",
        }
    }

    pub fn label(&self) -> &'static str{
        match self{
            Shape::ResponsePeriod => "response/period",
            Shape::LatencyJitter => "latency/jitter",
            Shape::LatencyRange => "latency min/max",
            Shape::Unknown => "unknown",
        }
    }
}

//explicit null counts as absent
fn has(object: &Map<String, Value>, key: &str) -> bool{
    object.get(key).map_or(false, |v| !v.is_null())
}

/// Decides the shape from key presence alone. Order matters: a payload
/// carrying min/max latency is a range batch even if it also has every
/// latency/jitter key.
pub fn classify(object: &Map<String, Value>) -> Shape{
    if has(object, AVG_LATENCY) && has(object, MIN_LATENCY) && has(object, MAX_LATENCY){
        Shape::LatencyRange
    }else if has(object, AVG_LATENCY) && has(object, AVG_JITTER){
        Shape::LatencyJitter
    }else if has(object, AVG_RESPONSE) && has(object, RMS_RESPONSE){
        Shape::ResponsePeriod
    }else{
        Shape::Unknown
    }
}
