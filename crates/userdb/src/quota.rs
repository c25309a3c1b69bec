//! XFS quota report parsing and limit command rendering.
//!
//! Reports are produced by `xfs_quota -x -c "report -u -b -i -n -N" <path>`:
//! ```text
//! #0          0          0          0     00 [--------]      3      0      0     00 [--------]
//! #1000  204800    1048576    2097152     00 [--------]     12  10000  20000     00 [--------]
//! #1001   10240          0          0     00  [7 days]       1      0      0     00 [--------]
//! ```
//! Block columns are in 1 KiB units.

use crate::error::{Error, Result};
use crate::types::{QuotaLimits, QuotaReportEntry};
use regex::Regex;
use std::sync::LazyLock;

/// Unit of the block columns in an `xfs_quota` report.
pub const REPORT_BLOCK_SIZE: u64 = 1024;

/// Arguments passed to `xfs_quota -c` to produce a parseable user report.
pub const REPORT_COMMAND: &str = "report -u -b -i -n -N";

/// id, blocks used/soft/hard/warn, inodes used/soft/hard/warn
const REPORT_COLUMNS: usize = 9;

static GRACE_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]").expect("grace pattern is valid"));

/// Parse the output of a numeric user quota report.
///
/// Header lines (anything not starting with `#<id>`) are skipped.
pub fn parse_report(content: &str) -> Result<Vec<QuotaReportEntry>> {
    let mut entries = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if !line.starts_with('#') {
            continue;
        }

        let stripped = GRACE_FIELD.replace_all(line, " ");
        let tokens: Vec<&str> = stripped.split_whitespace().collect();
        if tokens.len() != REPORT_COLUMNS {
            return Err(Error::QuotaReport {
                line: idx + 1,
                message: format!("expected {REPORT_COLUMNS} columns, found {}", tokens.len()),
            });
        }

        let number = |pos: usize| -> Result<u64> {
            tokens[pos].parse().map_err(|_| Error::QuotaReport {
                line: idx + 1,
                message: format!("invalid number '{}'", tokens[pos]),
            })
        };

        let uid = tokens[0][1..].parse().map_err(|_| Error::QuotaReport {
            line: idx + 1,
            message: format!("invalid id '{}'", tokens[0]),
        })?;

        entries.push(QuotaReportEntry {
            uid,
            limits: QuotaLimits {
                bytes_soft: number(2)?.saturating_mul(REPORT_BLOCK_SIZE),
                bytes_hard: number(3)?.saturating_mul(REPORT_BLOCK_SIZE),
                inodes_soft: number(6)?,
                inodes_hard: number(7)?,
            },
        });
    }

    Ok(entries)
}

/// Render the `xfs_quota -c` argument that sets limits for one uid.
///
/// The reserved root identity carries the filesystem default quota and is
/// written with `-d` instead of an explicit id.
pub fn limit_command(uid: u32, limits: &QuotaLimits) -> String {
    let target = if uid == 0 {
        "-d".to_string()
    } else {
        uid.to_string()
    };
    format!(
        "limit -u bsoft={} bhard={} isoft={} ihard={} {}",
        limits.bytes_soft, limits.bytes_hard, limits.inodes_soft, limits.inodes_hard, target
    )
}
