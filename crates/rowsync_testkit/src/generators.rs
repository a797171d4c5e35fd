//! Property-based test generators using proptest.

use proptest::prelude::*;
use serde_json::{json, Value};

/// Strategy for todo texts.
pub fn todo_text_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9 ']{1,40}").expect("Invalid regex")
}

/// Strategy for todo create payloads.
pub fn todo_payload_strategy() -> impl Strategy<Value = Value> {
    (todo_text_strategy(), any::<bool>())
        .prop_map(|(text, completed)| json!({ "text": text, "completed": completed }))
}

/// Strategy for user ids.
pub fn user_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{3,10}").expect("Invalid regex")
}
