use serde::{Deserialize, Serialize};
use std::fmt;

/// Hand gesture label
///
/// Labels outside the known vocabulary are kept verbatim in `Other` so newer
/// detectors can report gestures this build does not know about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Gesture {
    Fist,
    Palm,
    ThumbUp,
    Peace,
    Pointing,
    Other(String),
}

impl Gesture {
    pub const KNOWN: [Gesture; 5] = [
        Gesture::Fist,
        Gesture::Palm,
        Gesture::ThumbUp,
        Gesture::Peace,
        Gesture::Pointing,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Gesture::Fist => "fist",
            Gesture::Palm => "palm",
            Gesture::ThumbUp => "thumb_up",
            Gesture::Peace => "peace",
            Gesture::Pointing => "pointing",
            Gesture::Other(label) => label,
        }
    }
}

impl From<String> for Gesture {
    fn from(label: String) -> Self {
        match label.as_str() {
            "fist" => Gesture::Fist,
            "palm" => Gesture::Palm,
            "thumb_up" => Gesture::ThumbUp,
            "peace" => Gesture::Peace,
            "pointing" => Gesture::Pointing,
            _ => Gesture::Other(label),
        }
    }
}

impl From<&str> for Gesture {
    fn from(label: &str) -> Self {
        Gesture::from(label.to_string())
    }
}

impl From<Gesture> for String {
    fn from(gesture: Gesture) -> Self {
        match gesture {
            Gesture::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facial expression label
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Expression {
    Smile,
    Blink,
    Other(String),
}

impl Expression {
    pub const KNOWN: [Expression; 2] = [Expression::Smile, Expression::Blink];

    pub fn as_str(&self) -> &str {
        match self {
            Expression::Smile => "smile",
            Expression::Blink => "blink",
            Expression::Other(label) => label,
        }
    }
}

impl From<String> for Expression {
    fn from(label: String) -> Self {
        match label.as_str() {
            "smile" => Expression::Smile,
            "blink" => Expression::Blink,
            _ => Expression::Other(label),
        }
    }
}

impl From<&str> for Expression {
    fn from(label: &str) -> Self {
        Expression::from(label.to_string())
    }
}

impl From<Expression> for String {
    fn from(expression: Expression) -> Self {
        match expression {
            Expression::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_labels_round_trip_through_strings() {
        for gesture in Gesture::KNOWN {
            let label = gesture.as_str().to_string();
            assert_eq!(Gesture::from(label), gesture);
        }
        for expression in Expression::KNOWN {
            let label = expression.as_str().to_string();
            assert_eq!(Expression::from(label), expression);
        }
    }

    #[test]
    fn unknown_labels_pass_through() {
        let gesture: Gesture = serde_json::from_str("\"zoom_in\"").unwrap();
        assert_eq!(gesture, Gesture::Other("zoom_in".to_string()));
        assert_eq!(serde_json::to_string(&gesture).unwrap(), "\"zoom_in\"");
    }

    #[test]
    fn labels_serialize_as_plain_strings() {
        let json = serde_json::to_string(&vec![Gesture::ThumbUp, Gesture::Fist]).unwrap();
        assert_eq!(json, r#"["thumb_up","fist"]"#);
    }
}
