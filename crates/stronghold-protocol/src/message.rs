//! The typed view handlers work with.
//!
//! A decoded frame is a flat list. By convention an odd-length list (other
//! than a single value) starts with a type tag and the rest alternate
//! key, value:
//!
//! ```text
//! ["join", "joinKey", "3fa9..."]      -> tag "join", {joinKey: "3fa9..."}
//! ["s", "{\"data\":{...}}", ...]      -> no tag,     {s: "...", ...}
//! ```

use std::fmt;

use crate::Value;

/// Fallback kind when a message has neither a tag nor a key.
const UNDETERMINED: &str = "[Undetermined]";

/// An immutable decoded message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    raw: Vec<Value>,
    tag: Option<String>,
    /// Insertion-ordered pairs; a dangling trailing key has no value.
    entries: Vec<(String, Option<Value>)>,
}

impl Message {
    /// Builds the keyed view over a decoded frame.
    pub fn from_values(raw: Vec<Value>) -> Self {
        let tag = if raw.len() % 2 == 1 && raw.len() != 1 {
            raw.first().and_then(Value::as_str).map(str::to_owned)
        } else {
            None
        };

        let start = usize::from(tag.is_some());
        let mut entries: Vec<(String, Option<Value>)> = Vec::new();
        for pair in raw[start..].chunks(2) {
            let Some(key) = pair[0].as_str() else {
                continue;
            };
            let value = pair.get(1).cloned();
            match entries.iter_mut().find(|(k, _)| k == key) {
                Some(slot) => slot.1 = value,
                None => entries.push((key.to_owned(), value)),
            }
        }

        Self { raw, tag, entries }
    }

    /// The leading type tag, if the frame carries one.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// `true` if the message's tag, or failing that its first key, is `tag`.
    ///
    /// Clients send some requests as a bare `[key, value]` pair, so the
    /// first key stands in for a tag.
    pub fn is(&self, tag: &str) -> bool {
        match &self.tag {
            Some(t) => t == tag,
            None => self.entries.first().is_some_and(|(k, _)| k == tag),
        }
    }

    /// A printable name for routing logs.
    ///
    /// Save requests (`["s", json, ...]`) report `save/<_type>`.
    pub fn kind(&self) -> String {
        if let Some((first, _)) = self.entries.first() {
            if first == "s" {
                return format!("save/{}", self.save_type().unwrap_or_default());
            }
        }
        self.tag
            .clone()
            .or_else(|| self.entries.first().map(|(k, _)| k.clone()))
            .unwrap_or_else(|| UNDETERMINED.to_owned())
    }

    /// The `_type` of a save request, read from `s.data._type`.
    #[cfg(feature = "json")]
    pub fn save_type(&self) -> Option<String> {
        let save = self.get_map("s")?;
        save.get("data")?.get("_type")?.as_str().map(str::to_owned)
    }

    #[cfg(not(feature = "json"))]
    pub fn save_type(&self) -> Option<String> {
        None
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_ref())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Integer value narrowed to `i32`. Numbers wider than `i32` return `None`.
    pub fn get_i32(&self, key: &str) -> Option<i32> {
        self.get_i64(key).and_then(|v| i32::try_from(v).ok())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_bytes(&self, key: &str) -> Option<&[u8]> {
        self.get(key).and_then(Value::as_bytes)
    }

    /// Parses a JSON object carried as a string value.
    ///
    /// Returns `None` if the key is missing, not a string, or not an object.
    #[cfg(feature = "json")]
    pub fn get_map(&self, key: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
        match serde_json::from_str::<serde_json::Value>(self.get_str(key)?).ok()? {
            serde_json::Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Parses a JSON array carried as a string value.
    #[cfg(feature = "json")]
    pub fn get_list(&self, key: &str) -> Option<Vec<serde_json::Value>> {
        match serde_json::from_str::<serde_json::Value>(self.get_str(key)?).ok()? {
            serde_json::Value::Array(list) => Some(list),
            _ => None,
        }
    }

    /// Deserializes the JSON carried under `key` into `T`.
    #[cfg(feature = "json")]
    pub fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        serde_json::from_str(self.get_str(key)?).ok()
    }

    /// Positional access into the raw frame.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.raw.get(index)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// `true` if the message carries no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of values in the raw frame.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn raw(&self) -> &[Value] {
        &self.raw
    }

    pub fn into_raw(self) -> Vec<Value> {
        self.raw
    }
}

impl From<Vec<Value>> for Message {
    fn from(raw: Vec<Value>) -> Self {
        Self::from_values(raw)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tag) = &self.tag {
            write!(f, "{tag}")?;
        }
        f.write_str("{")?;
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match v {
                Some(v) => write!(f, "{k}: {v}")?,
                None => write!(f, "{k}")?,
            }
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(values: Vec<Value>) -> Message {
        Message::from_values(values)
    }

    #[test]
    fn test_odd_length_frame_has_tag() {
        let m = msg(vec!["join".into(), "joinKey".into(), "abc".into()]);
        assert_eq!(m.tag(), Some("join"));
        assert_eq!(m.get_str("joinKey"), Some("abc"));
        assert!(m.is("join"));
        assert_eq!(m.kind(), "join");
    }

    #[test]
    fn test_even_length_frame_is_all_pairs() {
        let m = msg(vec!["ic".into(), Value::Bool(true)]);
        assert_eq!(m.tag(), None);
        assert!(m.is("ic"));
        assert_eq!(m.get_bool("ic"), Some(true));
        assert_eq!(m.kind(), "ic");
    }

    #[test]
    fn test_single_value_frame_is_dangling_key() {
        let m = msg(vec!["gr".into()]);
        assert_eq!(m.tag(), None);
        assert!(m.contains("gr"));
        assert!(m.get("gr").is_none());
    }

    #[test]
    fn test_non_string_keys_are_skipped() {
        let m = msg(vec![Value::Int(1), "a".into(), "k".into(), Value::Int(2)]);
        assert_eq!(m.keys().collect::<Vec<_>>(), vec!["k"]);
        assert_eq!(m.get_i32("k"), Some(2));
    }

    #[test]
    fn test_later_duplicate_key_wins() {
        let m = msg(vec!["k".into(), Value::Int(1), "k".into(), Value::Int(2)]);
        assert_eq!(m.get_i32("k"), Some(2));
        assert_eq!(m.keys().count(), 1);
    }

    #[test]
    fn test_save_message_kind_uses_nested_type() {
        let payload = r#"{"id":"req-1","data":{"_type":"bld_create","id":"b1"}}"#;
        let m = msg(vec!["s".into(), payload.into()]);
        assert_eq!(m.kind(), "save/bld_create");
        assert_eq!(m.save_type().as_deref(), Some("bld_create"));
    }

    #[test]
    fn test_save_message_without_type_has_empty_subtype() {
        let m = msg(vec!["s".into(), "{}".into()]);
        assert_eq!(m.kind(), "save/");
    }

    #[test]
    fn test_get_map_and_list_parse_json_strings() {
        let m = msg(vec![
            "data".into(),
            r#"{"hp":100}"#.into(),
            "ids".into(),
            "[1,2,3]".into(),
        ]);
        assert_eq!(m.get_map("data").unwrap()["hp"], 100);
        assert_eq!(m.get_list("ids").unwrap().len(), 3);
        assert!(m.get_map("ids").is_none());
    }

    #[test]
    fn test_get_i32_rejects_wide_values() {
        let m = msg(vec!["t".into(), Value::Long(1 << 40)]);
        assert_eq!(m.get_i32("t"), None);
        assert_eq!(m.get_i64("t"), Some(1 << 40));
    }

    #[test]
    fn test_empty_message_is_undetermined() {
        let m = msg(Vec::new());
        assert!(m.is_empty());
        assert_eq!(m.kind(), "[Undetermined]");
    }
}
