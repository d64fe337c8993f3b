use serde_json::{Map, Value};
use crate::batch::{classify, BatchError, MeasurementBatch, Shape};

//command keywords understood by the board firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command{
    Start,
    Send,
    Status,
    Reset,
}

impl Command{
    pub fn keyword(&self) -> &'static str{
        match self{
            Command::Start => "START",
            Command::Send => "SEND",
            Command::Status => "STATUS",
            Command::Reset => "RESET",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceStatus{
    Started,
    Sending,
    DataReady,
    Error,
    Other(String),
}

impl DeviceStatus{
    pub fn parse(raw: &str) -> Self{
        match raw{
            "started" => DeviceStatus::Started,
            "sending" => DeviceStatus::Sending,
            "data_ready" => DeviceStatus::DataReady,
            "error" => DeviceStatus::Error,
            other => DeviceStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str{
        match self{
            DeviceStatus::Started => "started",
            DeviceStatus::Sending => "sending",
            DeviceStatus::DataReady => "data_ready",
            DeviceStatus::Error => "error",
            DeviceStatus::Other(s) => s,
        }
    }
}

#[derive(Debug)]
pub enum DeviceMessage{
    Batch(MeasurementBatch),
    Status{
        status: DeviceStatus,
        message: Option<String>,
    },
    //had a batch shape but the fields did not hold up
    Malformed(BatchError),
    Unrecognized(Map<String, Value>),
}

impl DeviceMessage{
    pub fn route(object: Map<String, Value>) -> Self{
        if classify(&object) != Shape::Unknown{
            return match MeasurementBatch::from_json(&object){
                Ok(batch) => DeviceMessage::Batch(batch),
                Err(e) => DeviceMessage::Malformed(e),
            };
        }

        match object.get("status"){
            Some(Value::String(status)) => DeviceMessage::Status{
                status: DeviceStatus::parse(status),
                message: object.get("message").and_then(Value::as_str).map(str::to_string),
            },
            _ => DeviceMessage::Unrecognized(object),
        }
    }
}

#[cfg(test)]
mod tests{
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value>{
        match value{
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_command_keywords(){
        assert_eq!(Command::Start.keyword(), "START");
        assert_eq!(Command::Send.keyword(), "SEND");
        assert_eq!(Command::Status.keyword(), "STATUS");
        assert_eq!(Command::Reset.keyword(), "RESET");
    }

    #[test]
    fn test_status_roundtrip_keeps_unknown(){
        assert_eq!(DeviceStatus::parse("data_ready"), DeviceStatus::DataReady);
        let other = DeviceStatus::parse("calibrating");
        assert_eq!(other, DeviceStatus::Other("calibrating".into()));
        assert_eq!(other.as_str(), "calibrating");
    }

    #[test]
    fn test_route_status_message(){
        let msg = DeviceMessage::route(object(json!({"status": "data_ready", "message": "ready"})));
        match msg{
            DeviceMessage::Status{ status, message } =>{
                assert_eq!(status, DeviceStatus::DataReady);
                assert_eq!(message.as_deref(), Some("ready"));
            }
            other => panic!("unexpected route: {:?}", other),
        }
    }

    #[test]
    fn test_route_batch_wins_over_status(){
        let msg = DeviceMessage::route(object(json!({
            "status": "sending",
            "session_id": "s1",
            "avg_latency_us": [1.0],
            "avg_jitter_us": [0.5],
        })));
        assert!(matches!(msg, DeviceMessage::Batch(_)));
    }

    #[test]
    fn test_route_malformed_and_unrecognized(){
        let bad = DeviceMessage::route(object(json!({
            "avg_response_us": [1.0, "x"],
            "rms_response_us": [0.1, 0.2],
        })));
        assert!(matches!(bad, DeviceMessage::Malformed(_)));

        let unknown = DeviceMessage::route(object(json!({"hello": 1})));
        assert!(matches!(unknown, DeviceMessage::Unrecognized(_)));
    }
}
