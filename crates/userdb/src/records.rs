//! Parsers for colon-delimited account database records.
//!
//! Handles the three classic formats:
//! ```text
//! alice:x:2001:2001:Alice:/home/alice:/bin/bash      # passwd
//! alice:$6$salt$hash:19000:0:99999:7:::               # shadow
//! developers:x:3000:alice,bob                         # group
//! ```

use crate::error::{Error, Result};
use crate::types::{GroupEntry, PasswdEntry, ShadowEntry};
use std::path::Path;

const PASSWD_FIELDS: usize = 7;
const GROUP_FIELDS: usize = 4;
const SHADOW_MIN_FIELDS: usize = 2;

/// Read and parse a passwd file.
pub fn read_passwd(path: &Path) -> Result<Vec<PasswdEntry>> {
    parse_passwd(&read(path)?)
}

/// Read and parse a shadow file.
pub fn read_shadow(path: &Path) -> Result<Vec<ShadowEntry>> {
    parse_shadow(&read(path)?)
}

/// Read and parse a group file.
pub fn read_group(path: &Path) -> Result<Vec<GroupEntry>> {
    parse_group(&read(path)?)
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::io(path, e))
}

/// Parse passwd records from a string.
pub fn parse_passwd(content: &str) -> Result<Vec<PasswdEntry>> {
    records(content)
        .map(|(line, fields)| {
            expect_fields("passwd", line, &fields, PASSWD_FIELDS)?;
            Ok(PasswdEntry {
                username: fields[0].to_string(),
                uid: parse_id("passwd", line, "uid", fields[2])?,
                gid: parse_id("passwd", line, "gid", fields[3])?,
                gecos: fields[4].to_string(),
                home: fields[5].to_string(),
                shell: fields[6].to_string(),
            })
        })
        .collect()
}

/// Parse shadow records from a string.
///
/// Only the login name and credential are kept; ageing fields may be absent.
pub fn parse_shadow(content: &str) -> Result<Vec<ShadowEntry>> {
    records(content)
        .map(|(line, fields)| {
            if fields.len() < SHADOW_MIN_FIELDS {
                return Err(Error::FieldCount {
                    source_name: "shadow",
                    line,
                    expected: SHADOW_MIN_FIELDS,
                    found: fields.len(),
                });
            }
            Ok(ShadowEntry {
                username: fields[0].to_string(),
                credential: fields[1].to_string(),
            })
        })
        .collect()
}

/// Parse group records from a string.
pub fn parse_group(content: &str) -> Result<Vec<GroupEntry>> {
    records(content)
        .map(|(line, fields)| {
            expect_fields("group", line, &fields, GROUP_FIELDS)?;
            let members = fields[3]
                .split(',')
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
            Ok(GroupEntry {
                name: fields[0].to_string(),
                gid: parse_id("group", line, "gid", fields[2])?,
                members,
            })
        })
        .collect()
}

/// Iterate over non-empty lines as (1-based line number, fields).
fn records(content: &str) -> impl Iterator<Item = (usize, Vec<&str>)> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| (idx + 1, line.split(':').collect()))
}

fn expect_fields(
    source_name: &'static str,
    line: usize,
    fields: &[&str],
    expected: usize,
) -> Result<()> {
    if fields.len() == expected {
        Ok(())
    } else {
        Err(Error::FieldCount {
            source_name,
            line,
            expected,
            found: fields.len(),
        })
    }
}

fn parse_id(source_name: &'static str, line: usize, field: &'static str, value: &str) -> Result<u32> {
    value.parse().map_err(|_| Error::InvalidNumber {
        source_name,
        line,
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_passwd() {
        let entries = parse_passwd(
            "user1:x:1001:1001:User 1:/tmp/home/user1:/bin/bash\nuser2:x:1002:1002:User 2:/home/user2:/bin/zsh",
        )
        .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].username, "user1");
        assert_eq!(entries[0].uid, 1001);
        assert_eq!(entries[0].gid, 1001);
        assert_eq!(entries[0].home, "/tmp/home/user1");
        assert_eq!(entries[1].shell, "/bin/zsh");
    }

    #[test]
    fn test_parse_passwd_skips_blank_lines() {
        let entries = parse_passwd("\nroot:x:0:0:root:/root:/bin/bash\n\n").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].uid, 0);
    }

    #[test]
    fn test_parse_passwd_wrong_field_count() {
        let err = parse_passwd("root:x:0:0:root:/root:/bin/bash\nbroken:x:1").unwrap_err();
        assert!(matches!(
            err,
            Error::FieldCount {
                source_name: "passwd",
                line: 2,
                expected: 7,
                found: 3
            }
        ));
    }

    #[test]
    fn test_parse_passwd_bad_uid() {
        let err = parse_passwd("bob:x:abc:100::/home/bob:/bin/sh").unwrap_err();
        assert_eq!(err.to_string(), "passwd:1: invalid uid 'abc'");
    }

    #[test]
    fn test_parse_shadow_short_and_full_records() {
        let entries = parse_shadow(
            "user1:$6$random_salt$encrypted_password1\nuser2:!:19000:0:99999:7:::",
        )
        .unwrap();
        assert_eq!(entries[0].credential, "$6$random_salt$encrypted_password1");
        assert_eq!(entries[1].username, "user2");
        assert_eq!(entries[1].credential, "!");
    }

    #[test]
    fn test_parse_shadow_rejects_bare_name() {
        assert!(parse_shadow("lonely").is_err());
    }

    #[test]
    fn test_parse_group_members() {
        let groups = parse_group("group1:x:1001:user1\ngroup2:x:1002:\ngroup3:x:1003:user1,user2").unwrap();
        assert_eq!(groups[0].members, vec!["user1"]);
        assert!(groups[1].members.is_empty());
        assert_eq!(groups[2].members, vec!["user1", "user2"]);
        assert_eq!(groups[2].gid, 1003);
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_group(Path::new("/nonexistent/group")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("passwd");
        std::fs::write(&path, "alice:x:2001:2001::/home/alice:/bin/bash\n").unwrap();
        let entries = read_passwd(&path).unwrap();
        assert_eq!(entries[0].username, "alice");
    }
}
