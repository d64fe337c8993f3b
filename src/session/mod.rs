use chrono::{DateTime, Local};
use serde::Serialize;
use crate::batch::MeasurementBatch;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionEntry{
    #[serde(rename = "timestamp")]
    pub received_at: DateTime<Local>,
    #[serde(flatten)]
    pub batch: MeasurementBatch,
}

impl SessionEntry{
    pub fn session_id(&self) -> &str{
        &self.batch.session_id
    }
}

//append-only; repeated session ids are kept as separate entries
#[derive(Debug, Default)]
pub struct SessionStore{
    entries: Vec<SessionEntry>,
}

impl SessionStore{
    pub fn new() -> Self{
        SessionStore{ entries: Vec::new() }
    }

    pub fn append(&mut self, batch: MeasurementBatch, received_at: DateTime<Local>) -> &SessionEntry{
        self.entries.push(SessionEntry{ received_at, batch });
        &self.entries[self.entries.len() - 1]
    }

    pub fn all(&self) -> &[SessionEntry]{
        &self.entries
    }

    pub fn latest(&self) -> Option<&SessionEntry>{
        self.entries.last()
    }

    pub fn len(&self) -> usize{
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool{
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests{
    use super::*;
    use crate::batch::Series;

    fn batch(session_id: &str, first: f64) -> MeasurementBatch{
        MeasurementBatch{
            session_id: session_id.to_string(),
            groups_count: Some(1),
            measurements_per_group: None,
            series: Series::LatencyJitter{
                avg_latency_us: vec![first],
                rms_latency_us: None,
                avg_jitter_us: vec![0.5],
                rms_jitter_us: None,
            },
            statistics: None,
            parameters: None,
        }
    }

    #[test]
    fn test_append_preserves_order(){
        let mut store = SessionStore::new();
        let now = Local::now();
        let (b1, b2, b3) = (batch("a", 1.0), batch("b", 2.0), batch("c", 3.0));

        store.append(b1.clone(), now);
        store.append(b2.clone(), now);
        store.append(b3.clone(), now);

        let batches: Vec<_> = store.all().iter().map(|e| e.batch.clone()).collect();
        assert_eq!(batches, vec![b1, b2, b3]);
        assert_eq!(store.latest().unwrap().session_id(), "c");
    }

    #[test]
    fn test_same_session_id_is_not_deduplicated(){
        let mut store = SessionStore::new();
        let now = Local::now();
        store.append(batch("7", 1.0), now);
        store.append(batch("7", 2.0), now);

        assert_eq!(store.len(), 2);
        assert_eq!(store.all()[0].batch.series.primary(), &[1.0]);
        assert_eq!(store.all()[1].batch.series.primary(), &[2.0]);
    }

    #[test]
    fn test_entry_serializes_flat_with_timestamp(){
        let mut store = SessionStore::new();
        let entry = store.append(batch("s", 1.0), Local::now());
        let value = serde_json::to_value(entry).unwrap();
        assert_eq!(value["session_id"], "s");
        assert!(value["timestamp"].is_string());
        assert!(value["avg_latency_us"].is_array());
    }
}
