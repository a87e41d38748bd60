//! Login accounts that may be bound to a client identity

use std::path::Path;

const DEFAULT_UID_MIN: u32 = 1000;
const DEFAULT_UID_MAX: u32 = 60000;

/// Regular login accounts: `/etc/passwd` entries whose UID lies in the
/// `UID_MIN..=UID_MAX` range of `/etc/login.defs`
pub fn login_users(passwd: &Path, login_defs: &Path) -> Vec<String> {
    let defs = std::fs::read_to_string(login_defs).unwrap_or_default();
    let (min, max) = uid_range(&defs);
    let accounts = std::fs::read_to_string(passwd).unwrap_or_default();
    accounts_in_range(&accounts, min, max)
}

/// UID range from login.defs content, with the usual defaults
pub fn uid_range(defs: &str) -> (u32, u32) {
    let value = |key: &str| -> Option<u32> {
        defs.lines().find_map(|line| {
            let mut parts = line.split_whitespace();
            if parts.next()? != key {
                return None;
            }
            parts.next()?.parse().ok()
        })
    };
    (
        value("UID_MIN").unwrap_or(DEFAULT_UID_MIN),
        value("UID_MAX").unwrap_or(DEFAULT_UID_MAX),
    )
}

/// Account names from passwd content whose UID is within `min..=max`
pub fn accounts_in_range(passwd: &str, min: u32, max: u32) -> Vec<String> {
    passwd
        .lines()
        .filter_map(|line| {
            let mut fields = line.split(':');
            let name = fields.next()?;
            let uid: u32 = fields.nth(1)?.parse().ok()?;
            (min..=max).contains(&uid).then(|| name.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSWD: &str = "root:x:0:0:root:/root:/bin/bash\n\
                          alice:x:1000:1000::/home/alice:/bin/bash\n\
                          nobody:x:65534:65534::/nonexistent:/usr/sbin/nologin\n\
                          bob:x:1001:1001::/home/bob:/bin/bash\n\
                          broken-line\n";

    #[test]
    fn test_uid_range() {
        assert_eq!(uid_range(""), (1000, 60000));
        assert_eq!(uid_range("# comment\nUID_MIN\t\t 500\nUID_MAX 2000\n"), (500, 2000));
        assert_eq!(uid_range("UID_MIN lots\n"), (1000, 60000));
    }

    #[test]
    fn test_accounts_in_range() {
        assert_eq!(accounts_in_range(PASSWD, 1000, 60000), vec!["alice", "bob"]);
        assert_eq!(accounts_in_range(PASSWD, 1001, 1001), vec!["bob"]);
    }

    #[test]
    fn test_login_users_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let passwd = dir.path().join("passwd");
        std::fs::write(&passwd, PASSWD).unwrap();
        assert_eq!(
            login_users(&passwd, &dir.path().join("missing.defs")),
            vec!["alice", "bob"]
        );
    }
}
