use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wraps traveller contact data so it never lands in logs verbatim.
///
/// `Debug` and `Display` show only the last two characters; serialization
/// emits the real value because outbound payloads need it.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T: AsRef<str>> Masked<T> {
    fn redacted(&self) -> String {
        let raw = self.0.as_ref();
        let visible: String = raw
            .chars()
            .rev()
            .take(2)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        if raw.chars().count() <= 2 {
            "********".to_string()
        } else {
            format!("********{}", visible)
        }
    }
}

impl<T: AsRef<str>> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.redacted())
    }
}

impl<T: AsRef<str>> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.redacted())
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Access the raw value. Callers must not log the result.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_is_redacted_in_debug() {
        let phone = Masked::new("+919812345678".to_string());
        assert_eq!(format!("{:?}", phone), "********78");
        assert_eq!(phone.to_string(), "********78");
    }

    #[test]
    fn test_serialization_keeps_real_value() {
        let phone = Masked::new("+919812345678".to_string());
        let json = serde_json::to_string(&phone).unwrap();
        assert_eq!(json, "\"+919812345678\"");
    }
}
