use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::WardenError;

/// Numeric identifier of a channel on the external chat platform.
///
/// Ids may be negative (group and supergroup ids are), but never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct ChannelId(i64);

impl ChannelId {
    pub fn new(id: i64) -> Result<Self, WardenError> {
        if id == 0 {
            return Err(WardenError::InvalidChannelId(id));
        }
        Ok(ChannelId(id))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for ChannelId {
    type Error = WardenError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        ChannelId::new(value)
    }
}

impl From<ChannelId> for i64 {
    fn from(value: ChannelId) -> Self {
        value.0
    }
}

impl FromStr for ChannelId {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id: i64 = s
            .trim()
            .parse()
            .map_err(|_| WardenError::Roster(format!("not a numeric channel id: {}", s)))?;
        ChannelId::new(id)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier of a listener account.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Result<Self, WardenError> {
        let id = id.into();
        // ids end up as a metadata key segment
        if id.trim().is_empty() || id.contains('/') {
            return Err(WardenError::InvalidAccountId(id));
        }
        Ok(AccountId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for AccountId {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccountId::new(s)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_rejects_zero() {
        assert!(ChannelId::new(0).is_err());
        assert_eq!(ChannelId::new(-1001234).unwrap().get(), -1001234);
        assert!("@somechannel".parse::<ChannelId>().is_err());
        assert_eq!("42".parse::<ChannelId>().unwrap().get(), 42);
    }

    #[test]
    fn channel_id_serde_validates() {
        let id: ChannelId = serde_json::from_str("17").unwrap();
        assert_eq!(id.get(), 17);
        assert!(serde_json::from_str::<ChannelId>("0").is_err());
        assert_eq!(serde_json::to_string(&id).unwrap(), "17");
    }

    #[test]
    fn account_id_must_be_a_key_segment() {
        assert!(AccountId::new("").is_err());
        assert!(AccountId::new("acc/1").is_err());
        assert_eq!(AccountId::new("acc1").unwrap().as_str(), "acc1");
        assert_eq!(serde_json::to_string(&AccountId::new("acc1").unwrap()).unwrap(), "\"acc1\"");
    }
}
