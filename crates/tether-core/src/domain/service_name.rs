//! ServiceName - サービス名の検証付きラッパー
//!
//! ノードのサービステーブルのキーであり、トランスポートでのマッチングにも使います。
//!
//! # 規約
//! - 空文字は不可
//! - 空白文字は不可
//! - 生成後は不変

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Validated, immutable service name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceName(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidServiceName {
    #[error("service name must not be empty")]
    Empty,

    #[error("service name '{0}' must not contain whitespace")]
    Whitespace(String),
}

impl ServiceName {
    pub fn new(value: impl Into<String>) -> Result<Self, InvalidServiceName> {
        let value = value.into();
        if value.is_empty() {
            return Err(InvalidServiceName::Empty);
        }
        if value.chars().any(char::is_whitespace) {
            return Err(InvalidServiceName::Whitespace(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ServiceName {
    type Error = InvalidServiceName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ServiceName {
    type Error = InvalidServiceName;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ServiceName> for String {
    fn from(name: ServiceName) -> Self {
        name.0
    }
}

impl AsRef<str> for ServiceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("add_two_ints")]
    #[case("/robot/add_two_ints")]
    #[case("a")]
    fn accepts_valid_names(#[case] raw: &str) {
        let name = ServiceName::new(raw).unwrap();
        assert_eq!(name.as_str(), raw);
    }

    #[rstest]
    #[case("", InvalidServiceName::Empty)]
    #[case("add two", InvalidServiceName::Whitespace("add two".to_string()))]
    #[case("add\t", InvalidServiceName::Whitespace("add\t".to_string()))]
    fn rejects_invalid_names(#[case] raw: &str, #[case] expected: InvalidServiceName) {
        assert_eq!(ServiceName::new(raw).unwrap_err(), expected);
    }

    #[test]
    fn deserialization_validates() {
        let ok: ServiceName = serde_json::from_str("\"add_two_ints\"").unwrap();
        assert_eq!(ok.to_string(), "add_two_ints");

        let err = serde_json::from_str::<ServiceName>("\"\"");
        assert!(err.is_err());
    }
}
