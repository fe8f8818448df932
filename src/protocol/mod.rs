//! Wire formats: the ADTS access-unit stream and control messages

pub mod adts;

use serde::{Deserialize, Serialize};

pub use adts::{AdtsFramer, AdtsHeader, AdtsReader};

/// Control messages accepted from the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    SetVolume { volume: f32 },
    SetTone { bass_db: f32, treble_db: f32 },
    Stop,
}

/// Audio device information exposed to the control API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDeviceInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_message_json() {
        let msg: ControlMessage =
            serde_json::from_str(r#"{"type":"set_tone","bass_db":3.0,"treble_db":-2.5}"#).unwrap();
        assert_eq!(
            msg,
            ControlMessage::SetTone {
                bass_db: 3.0,
                treble_db: -2.5
            }
        );

        let stop = serde_json::to_string(&ControlMessage::Stop).unwrap();
        assert_eq!(stop, r#"{"type":"stop"}"#);
    }
}
