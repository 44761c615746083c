//! Binance `depthUpdate` JSON parsing.
//!
//! Raw-stream connections deliver the event object directly. Combined-stream
//! connections (`/stream?streams=...`) wrap it as `{"stream": .., "data": {..}}`;
//! both shapes are accepted.

use depthrec_core::error::Result;
use depthrec_core::validate::validate_depth_update;
use serde_json::Value;

use crate::consumer::DepthUpdate;

/// Decode, validate and extract one diff-depth event.
pub fn parse_depth_update(text: &str) -> Result<DepthUpdate> {
    let mut msg: Value = serde_json::from_str(text)?;
    if msg.get("stream").is_some() && msg.get("data").is_some_and(Value::is_object) {
        msg = msg["data"].take();
    }
    validate_depth_update(&msg)?;

    Ok(DepthUpdate {
        event_time_ms: msg["E"].as_u64().unwrap_or_default(),
        first_update_id: msg["U"].as_u64().unwrap_or_default(),
        last_update_id: msg["u"].as_u64().unwrap_or_default(),
        bid_levels: take_array(&mut msg["b"]),
        ask_levels: take_array(&mut msg["a"]),
    })
}

fn take_array(v: &mut Value) -> Vec<Value> {
    match v.take() {
        Value::Array(levels) => levels,
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depthrec_core::error::DepthRecError;
    use depthrec_core::validate::SchemaError;
    use serde_json::json;

    const SAMPLE: &str = r#"{"e":"depthUpdate","E":1700000000100,"T":1700000000099,"s":"BTCUSDT",
        "U":157,"u":160,"pu":149,"b":[["0.0024","10"]],"a":[["0.0026","100"],["0.0027","0"]]}"#;

    #[test]
    fn parses_raw_stream_event() {
        let u = parse_depth_update(SAMPLE).unwrap();
        assert_eq!(u.event_time_ms, 1_700_000_000_100);
        assert_eq!(u.first_update_id, 157);
        assert_eq!(u.last_update_id, 160);
        assert_eq!(u.bid_levels, vec![json!(["0.0024", "10"])]);
        assert_eq!(u.ask_levels.len(), 2);
    }

    #[test]
    fn unwraps_combined_stream_envelope() {
        let wrapped = format!(r#"{{"stream":"btcusdt@depth@100ms","data":{SAMPLE}}}"#);
        let u = parse_depth_update(&wrapped).unwrap();
        assert_eq!(u.last_update_id, 160);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(parse_depth_update("not json"), Err(DepthRecError::Json(_))));
        assert!(matches!(
            parse_depth_update(r#"{"result":null,"id":1}"#),
            Err(DepthRecError::Schema(SchemaError::Missing { field: "e" }))
        ));
        let trade = r#"{"e":"aggTrade","E":1,"s":"BTCUSDT","U":1,"u":2,"b":[],"a":[]}"#;
        assert!(matches!(
            parse_depth_update(trade),
            Err(DepthRecError::Schema(SchemaError::UnexpectedValue { field: "e", .. }))
        ));
    }
}
