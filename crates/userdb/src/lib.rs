//! # userdb
//!
//! Pure Rust parsers for the Linux local account database.
//!
//! This crate provides functionality for:
//! - Parsing `passwd`, `shadow` and `group` records
//! - Listing the systemd linger registry
//! - Reading and rendering `authorized_keys` files
//! - Parsing `xfs_quota` user reports and rendering `limit` commands
//! - Parsing human-readable quota sizes (binary bytes, decimal inodes)
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! let users = userdb::records::read_passwd(Path::new("/etc/passwd")).unwrap();
//! for user in &users {
//!     println!("{} ({})", user.username, user.uid);
//! }
//!
//! assert_eq!(userdb::parse_iec_size("1Gi").unwrap(), 1 << 30);
//! assert_eq!(userdb::parse_si_size("1g").unwrap(), 1_000_000_000);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod authorized_keys;
pub mod error;
pub mod linger;
pub mod quota;
pub mod records;
pub mod size;
pub mod types;

pub use error::{Error, Result};
pub use size::{parse_iec_size, parse_si_size};
pub use types::{GroupEntry, PasswdEntry, QuotaLimits, QuotaReportEntry, ShadowEntry};
