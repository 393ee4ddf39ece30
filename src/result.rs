use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Immutable record of one completed typing attempt.
///
/// Produced exactly once per completed session and handed by value to the
/// result sink. `created_at` and `username` are absent until the persistence
/// boundary assigns them on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub wpm: u32,
    pub accuracy: u8,
    pub time_elapsed: u64,
    pub total_characters: usize,
    pub correct_characters: usize,
    pub incorrect_characters: usize,
    pub text_sample: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Local>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TestResult {
        TestResult {
            wpm: 72,
            accuracy: 98,
            time_elapsed: 41,
            total_characters: 180,
            correct_characters: 176,
            incorrect_characters: 4,
            text_sample: "the quick brown fox".to_string(),
            session_id: "1717171717171-00ff".to_string(),
            created_at: None,
            username: None,
        }
    }

    #[test]
    fn serializes_with_camel_case_field_names() {
        let json = serde_json::to_string(&sample()).unwrap();

        assert!(json.contains("\"wpm\":72"));
        assert!(json.contains("\"accuracy\":98"));
        assert!(json.contains("\"timeElapsed\":41"));
        assert!(json.contains("\"totalCharacters\":180"));
        assert!(json.contains("\"correctCharacters\":176"));
        assert!(json.contains("\"incorrectCharacters\":4"));
        assert!(json.contains("\"textSample\""));
        assert!(json.contains("\"sessionId\""));
        // unassigned boundary fields stay off the wire
        assert!(!json.contains("createdAt"));
        assert!(!json.contains("username"));
    }

    #[test]
    fn round_trips_through_json() {
        let result = sample();
        let json = serde_json::to_string(&result).unwrap();
        let back: TestResult = serde_json::from_str(&json).unwrap();

        assert_eq!(result, back);
    }

    #[test]
    fn deserializes_created_at_when_present() {
        let json = r#"{
            "wpm": 60,
            "accuracy": 100,
            "timeElapsed": 30,
            "totalCharacters": 10,
            "correctCharacters": 10,
            "incorrectCharacters": 0,
            "textSample": "hello there",
            "sessionId": "abc-1234",
            "createdAt": "2025-06-01T10:30:00+00:00",
            "username": "mira"
        }"#;

        let result: TestResult = serde_json::from_str(json).unwrap();
        assert!(result.created_at.is_some());
        assert_eq!(result.username.as_deref(), Some("mira"));
    }
}
