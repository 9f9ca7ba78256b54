//! Push frames
//!
//! A frame is a JSON object with up to three independent facets: a race
//! snapshot, the list of online barriers and the current race pointer. Absent
//! keys mean "no update"; for `currentRace` an explicit `null` clears the
//! pointer, so that facet is a double option.

use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::Result;
use crate::types::{BarrierId, FullRace, RaceRef};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub race: Option<FullRace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barriers: Option<Vec<BarrierId>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_race: Option<Option<RaceRef>>,
}

/// Distinguishes a present `null` from an absent key
fn present<'de, D, T>(deserializer: D) -> core::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl InboundFrame {
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn race(race: FullRace) -> Self {
        Self {
            race: Some(race),
            ..Self::default()
        }
    }

    pub fn barriers(barriers: Vec<BarrierId>) -> Self {
        Self {
            barriers: Some(barriers),
            ..Self::default()
        }
    }

    pub fn current_race(current: Option<RaceRef>) -> Self {
        Self {
            current_race: Some(current),
            ..Self::default()
        }
    }

    /// No recognized facet is present
    pub fn is_empty(&self) -> bool {
        self.race.is_none() && self.barriers.is_none() && self.current_race.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_race_null_vs_absent() {
        let cleared = InboundFrame::decode(r#"{"currentRace": null}"#).unwrap();
        assert_eq!(cleared.current_race, Some(None));

        let set = InboundFrame::decode(r#"{"currentRace": {"id": 4}}"#).unwrap();
        assert_eq!(set.current_race, Some(Some(RaceRef { id: 4 })));

        let absent = InboundFrame::decode(r#"{"barriers": []}"#).unwrap();
        assert_eq!(absent.current_race, None);
        assert_eq!(absent.barriers, Some(Vec::new()));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let frame = InboundFrame::decode(r#"{"hello": "world"}"#).unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn test_malformed_frames_fail() {
        assert!(InboundFrame::decode("not json").is_err());
        assert!(InboundFrame::decode("[1, 2]").is_err());
        assert!(InboundFrame::decode(r#"{"barriers": "1,2"}"#).is_err());
    }

    #[test]
    fn test_encode_cleared_pointer_as_null() {
        let text = InboundFrame::current_race(None).encode().unwrap();
        assert_eq!(text, r#"{"currentRace":null}"#);
        assert_eq!(InboundFrame::decode(&text).unwrap().current_race, Some(None));
    }
}
