//! Metadata store layout shared by the coordinator and the listeners.

use crate::AccountId;

pub const BASE_WARDEN_PATH: &str = "/warden";

/// Single composite record holding the current assignment.
pub const ASSIGNMENT_CURRENT_PATH: &str = "/warden/assignment/current";

/// Per-account reload topic, `/warden/notify/{account_id}`.
pub const BASE_NOTIFY_PATH: &str = "/warden/notify";

/// Per-account throughput reports, `/warden/accounts/load/{account_id}`.
pub const BASE_ACCOUNT_LOAD_PATH: &str = "/warden/accounts/load";

/// Audit trail of committed rebalances, `/warden/rebalance/history/{version}`.
pub const BASE_REBALANCE_HISTORY_PATH: &str = "/warden/rebalance/history";

pub fn join_path(parts: &[&str]) -> String {
    parts.join("/")
}

pub fn notify_path(account_id: &AccountId) -> String {
    join_path(&[BASE_NOTIFY_PATH, account_id.as_str()])
}

pub fn load_report_path(account_id: &AccountId) -> String {
    join_path(&[BASE_ACCOUNT_LOAD_PATH, account_id.as_str()])
}

pub fn history_path(version: u64) -> String {
    // zero padded so that prefix listings sort by version
    format!("{}/{:020}", BASE_REBALANCE_HISTORY_PATH, version)
}

/// Extracts the account id from a `/warden/accounts/load/{account_id}` key.
pub fn account_from_load_path(key: &str) -> Option<AccountId> {
    let id = key.strip_prefix(BASE_ACCOUNT_LOAD_PATH)?.strip_prefix('/')?;
    AccountId::new(id).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(
            join_path(&["/warden", "notify", "acc1"]),
            "/warden/notify/acc1"
        );
        assert_eq!(
            notify_path(&AccountId::new("acc1").unwrap()),
            "/warden/notify/acc1"
        );
    }

    #[test]
    fn test_account_from_load_path() {
        assert_eq!(
            account_from_load_path("/warden/accounts/load/acc7"),
            Some(AccountId::new("acc7").unwrap())
        );
        assert_eq!(account_from_load_path("/warden/accounts/loadacc7"), None);
        assert_eq!(account_from_load_path("/warden/notify/acc7"), None);
        assert_eq!(account_from_load_path("/warden/accounts/load/a/b"), None);
    }

    #[test]
    fn test_history_path_sorts_by_version() {
        assert!(history_path(9) < history_path(10));
        assert!(history_path(10).starts_with("/warden/rebalance/history/"));
    }
}
