// common/src/messages.rs
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client-to-server invocation that starts the tick feed.
pub const FEED_METHOD: &str = "Feed";
/// Client-to-server invocation that broadcasts to every session.
pub const ECHO_METHOD: &str = "Echo";
/// Server-to-client event carrying one tick.
pub const DATA_EVENT: &str = "data";
/// Server-to-client event carrying an echoed message.
pub const RECEIVE_EVENT: &str = "receive";

const PAYLOAD_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const TIMESTAMP_FORMAT: &str = "%m/%d/%Y %H:%M:%S%.3f";
/// Prices are drawn as whole cents below 100000.00.
const PRICE_CENTS_BOUND: u64 = 10_000_000;

/// One synthetic price tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub data: String,
    pub price: f64,
    pub timestamp: String,
}

impl Tick {
    /// Generate a tick stamped with the current time.
    pub fn generate(payload_length: usize) -> Self {
        Self::generate_at(payload_length, Utc::now())
    }

    pub fn generate_at(payload_length: usize, at: DateTime<Utc>) -> Self {
        let mut rng = rand::thread_rng();

        let data = (0..payload_length)
            .map(|_| PAYLOAD_ALPHABET[rng.gen_range(0..PAYLOAD_ALPHABET.len())] as char)
            .collect();
        let cents = rng.gen_range(0..PRICE_CENTS_BOUND);

        Self {
            data,
            price: cents as f64 / 100.0,
            timestamp: at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

/// Frames exchanged over a hub connection, one JSON object per text message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HubFrame {
    /// A method call. Server-to-client events never carry an invocation id;
    /// client calls carry one when they expect a completion.
    Invocation {
        #[serde(rename = "invocationId", default, skip_serializing_if = "Option::is_none")]
        invocation_id: Option<String>,
        target: String,
        #[serde(default)]
        arguments: Vec<Value>,
    },
    Completion {
        #[serde(rename = "invocationId")]
        invocation_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Ping,
    Close {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl HubFrame {
    pub fn invocation(target: &str, arguments: Vec<Value>) -> Self {
        HubFrame::Invocation {
            invocation_id: None,
            target: target.to_string(),
            arguments,
        }
    }

    /// `data` event for one tick
    pub fn data(tick: &Tick) -> Self {
        // Tick only holds strings and a finite f64, so conversion cannot fail.
        let payload = serde_json::to_value(tick).unwrap_or(Value::Null);
        Self::invocation(DATA_EVENT, vec![payload])
    }

    /// `receive` event for an echoed message
    pub fn receive(user: &str, message: &str) -> Self {
        Self::invocation(
            RECEIVE_EVENT,
            vec![Value::String(user.to_string()), Value::String(message.to_string())],
        )
    }

    pub fn completion(invocation_id: String, error: Option<String>) -> Self {
        HubFrame::Completion { invocation_id, error }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDateTime, TimeZone};

    #[test]
    fn test_tick_price_range_and_precision() {
        for _ in 0..5_000 {
            let tick = Tick::generate(10);
            assert!(tick.price >= 0.0 && tick.price < 100_000.0, "price {}", tick.price);
            let scaled = tick.price * 100.0;
            assert!((scaled - scaled.round()).abs() < 1e-6, "price {}", tick.price);
        }
    }

    #[test]
    fn test_tick_payload_alphabet() {
        let tick = Tick::generate(100);
        assert_eq!(tick.data.len(), 100);
        assert!(tick
            .data
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
    }

    #[test]
    fn test_tick_timestamp_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 14, 5, 9).unwrap();
        let tick = Tick::generate_at(1, at);
        assert_eq!(tick.timestamp, "03/07/2024 14:05:09.000");

        let parsed = NaiveDateTime::parse_from_str(&Tick::generate(1).timestamp, TIMESTAMP_FORMAT);
        assert!(parsed.is_ok());
    }

    #[test]
    fn test_data_frame_wire_shape() {
        let tick = Tick {
            data: "AB12".to_string(),
            price: 12.5,
            timestamp: "01/02/2024 03:04:05.678".to_string(),
        };
        let json: Value = serde_json::from_str(&HubFrame::data(&tick).to_json().unwrap()).unwrap();

        assert_eq!(json["type"], "invocation");
        assert_eq!(json["target"], "data");
        assert!(json.get("invocationId").is_none());
        assert_eq!(json["arguments"][0]["data"], "AB12");
        assert_eq!(json["arguments"][0]["price"], 12.5);
        assert_eq!(json["arguments"][0]["timestamp"], "01/02/2024 03:04:05.678");
    }

    #[test]
    fn test_parse_client_invocation() {
        let frame = HubFrame::from_json(
            r#"{"type":"invocation","invocationId":"7","target":"Echo","arguments":["alice","hi"]}"#,
        )
        .unwrap();

        match frame {
            HubFrame::Invocation { invocation_id, target, arguments } => {
                assert_eq!(invocation_id.as_deref(), Some("7"));
                assert_eq!(target, ECHO_METHOD);
                assert_eq!(arguments, vec![Value::from("alice"), Value::from("hi")]);
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_parse_invocation_without_arguments() {
        let frame = HubFrame::from_json(r#"{"type":"invocation","target":"Feed"}"#).unwrap();
        assert_eq!(frame, HubFrame::invocation(FEED_METHOD, vec![]));
    }

    #[test]
    fn test_completion_omits_empty_error() {
        let json = HubFrame::completion("1".to_string(), None).to_json().unwrap();
        assert_eq!(json, r#"{"type":"completion","invocationId":"1"}"#);
        assert_eq!(HubFrame::from_json(r#"{"type":"ping"}"#).unwrap(), HubFrame::Ping);
    }
}
