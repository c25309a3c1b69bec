//! JSON Schema for the desired-state document
//!
//! The schema is closed: unknown properties are rejected at every level.
//! Defaults are documented here and applied by the serde structs in
//! [`crate::config`].

use crate::error::{ProvisionError, Violation};
use jsonschema::Draft;
use serde_json::{Value, json};

const BYTES_PATTERN: &str = "^[0-9]+(Ki|Mi|Gi)?$";
const INODES_PATTERN: &str = "^[0-9]+(k|m|g|t)?$";
/// Login and group names, as accepted by shadow-utils in its default mode
const NAME_PATTERN: &str = "^[a-z_][a-z0-9_.-]*\\$?$";
/// One `user:hash` line for chpasswd
const CREDENTIAL_PATTERN: &str = "^[^:\\r\\n]*$";
/// A line that reads back unchanged from authorized_keys
const AUTHORIZED_KEY_PATTERN: &str = "^[^#\\s]([^\\r\\n]*[^\\s])?$";

fn id() -> Value {
    json!({ "type": "integer", "minimum": 0, "maximum": u32::MAX })
}

fn name() -> Value {
    json!({ "type": "string", "pattern": NAME_PATTERN, "maxLength": 32 })
}

fn id_range(what: &str) -> Value {
    json!({
        "description": format!(
            "Inclusive range of {what}s managed by the provisioner. Entries with ids \
             in this range are deleted when they are absent from the config."
        ),
        "type": "array",
        "items": id(),
        "minItems": 2,
        "maxItems": 2
    })
}

fn quota_spec() -> Value {
    let bytes = |kind: &str| {
        json!({
            "description": format!(
                "{kind} limit in bytes; `0` disables it. Suffixes: `Ki` (2^10), `Mi` (2^20), `Gi` (2^30)."
            ),
            "type": "string",
            "pattern": BYTES_PATTERN,
            "default": "0"
        })
    };
    let inodes = |kind: &str| {
        json!({
            "description": format!(
                "{kind} limit in inodes; `0` disables it. Suffixes: `k` (10^3), `m` (10^6), `g` (10^9), `t` (10^12)."
            ),
            "type": "string",
            "pattern": INODES_PATTERN,
            "default": "0"
        })
    };

    json!({
        "type": "object",
        "properties": {
            "path": {
                "description": "Mountpoint of an XFS filesystem with user quotas enabled.",
                "type": "string",
                "minLength": 1
            },
            "bytes_soft_limit": bytes("Soft"),
            "bytes_hard_limit": bytes("Hard"),
            "inodes_soft_limit": inodes("Soft"),
            "inodes_hard_limit": inodes("Hard")
        },
        "required": ["path"],
        "additionalProperties": false
    })
}

fn user() -> Value {
    json!({
        "type": "object",
        "properties": {
            "username": name(),
            "password": {
                "description": "Pre-hashed credential, written verbatim to the shadow database.",
                "type": "string",
                "pattern": CREDENTIAL_PATTERN
            },
            "update_password": { "enum": ["always", "on_create"] },
            "uid": id(),
            "primary_group": name(),
            "additional_groups": {
                "type": "array",
                "items": name(),
                "uniqueItems": true,
                "default": []
            },
            "shell": { "type": "string", "pattern": CREDENTIAL_PATTERN, "default": "/bin/bash" },
            "ssh_authorized_keys": {
                "description": "One key per entry, without comments or surrounding whitespace.",
                "type": "array",
                "items": { "type": "string", "pattern": AUTHORIZED_KEY_PATTERN },
                "default": []
            },
            "linger": { "type": "boolean", "default": false },
            "disk_quota": {
                "type": "array",
                "items": quota_spec(),
                "default": []
            }
        },
        "required": ["username", "password", "update_password", "uid", "primary_group"],
        "additionalProperties": false
    })
}

fn group() -> Value {
    json!({
        "type": "object",
        "properties": {
            "groupname": name(),
            "gid": id()
        },
        "required": ["groupname", "gid"],
        "additionalProperties": false
    })
}

/// The embedded configuration schema
pub fn config_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "provisioner configuration",
        "type": "object",
        "properties": {
            "users": { "type": "array", "items": user() },
            "groups": { "type": "array", "items": group() },
            "managed_uid_range": id_range("UID"),
            "managed_gid_range": id_range("GID"),
            "user_ssh_key_base_dir": {
                "description": "Directory holding each user's authorized_keys file. \
                                Supports %u (username) and %U (uid).",
                "type": "string",
                "default": "/home/%u/.ssh"
            },
            "ssh_authorized_keys_path": {
                "description": "Full path of each user's authorized_keys file. \
                                Supports %u and %U. Overrides user_ssh_key_base_dir.",
                "type": "string"
            },
            "use_strict_ssh_key_dir_permissions": {
                "description": "Make key directories and files root-owned so users can read \
                                but not modify their authorized keys.",
                "type": "boolean",
                "default": false
            },
            "managed_user_directories": {
                "description": "Per-user directories created with the user and removed with it. \
                                Supports %u and %U.",
                "type": "array",
                "items": { "type": "string", "minLength": 1 },
                "uniqueItems": true,
                "default": []
            },
            "home_dir": {
                "description": "Home directory template passed to useradd. Supports %u and %U.",
                "type": "string"
            },
            "xfs_default_user_quota": {
                "description": "Filesystem default user quota, per path.",
                "type": "array",
                "items": quota_spec(),
                "default": []
            }
        },
        "required": ["users", "groups", "managed_uid_range", "managed_gid_range"],
        "additionalProperties": false
    })
}

/// Validate a document against the schema, collecting every violation
pub fn validate(document: &Value) -> Result<(), ProvisionError> {
    let schema = config_schema();
    let validator = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|e| ProvisionError::ConfigValidation {
            violations: vec![Violation::new("", format!("embedded schema is invalid: {e}"))],
        })?;

    let violations: Vec<Violation> = validator
        .iter_errors(document)
        .map(|err| Violation::new(err.instance_path.to_string(), err.to_string()))
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ProvisionError::ConfigValidation { violations })
    }
}
