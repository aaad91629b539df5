use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

// ============================================================================
// Config Store
// ============================================================================

const REQUIRED_FIELDS: [&str; 5] = ["port", "mode", "proxies", "proxy-groups", "rules"];
const ARRAY_FIELDS: [&str; 3] = ["proxies", "proxy-groups", "rules"];

pub const BACKUP_PREFIX: &str = "config.yaml.backup.";
const MAX_BACKUPS: usize = 5;

/// Default mihomo configuration template.
pub fn default_config() -> Value {
    json!({
        "port": 7890,
        "socks-port": 7891,
        "redir-port": 7892,
        "tproxy-port": 7893,
        "mixed-port": 7890,
        "allow-lan": false,
        "bind-address": "*",
        "mode": "rule",
        "log-level": "info",
        "ipv6": true,
        "external-controller": "127.0.0.1:9090",
        "external-ui": "ui",
        "secret": "",
        "interface-name": "",
        "routing-mark": 6666,
        "tun": {
            "enable": false,
            "stack": "system",
            "dns-hijack": ["8.8.8.8:53", "8.8.4.4:53"],
            "auto-route": true,
            "auto-detect-interface": true
        },
        "dns": {
            "enable": true,
            "listen": "0.0.0.0:53",
            "default-nameserver": ["223.5.5.5", "119.29.29.29"],
            "enhanced_mode": "fake-ip",
            "fake-ip-range": "198.18.0.1/16",
            "use-hosts": true,
            "nameserver": ["https://doh.pub/dns-query", "https://dns.alidns.com/dns-query"],
            "fallback": ["https://1.1.1.1/dns-query", "https://dns.google/dns-query"],
            "fallback-filter": {
                "geoip": true,
                "geoip-code": "CN",
                "ipcidr": ["240.0.0.0/4"]
            }
        },
        "proxies": [],
        "proxy-groups": [
            {
                "name": "PROXY",
                "type": "select",
                "proxies": ["DIRECT"]
            }
        ],
        "rules": [
            "MATCH,PROXY"
        ]
    })
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Validate a configuration document without touching disk.
pub fn validate_config(config: &Value) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for field in REQUIRED_FIELDS {
        if config.get(field).is_none() {
            errors.push(format!("Missing required field: {}", field));
        }
    }

    for field in ARRAY_FIELDS {
        if let Some(value) = config.get(field) {
            if !value.is_array() {
                errors.push(format!("Field '{}' must be an array", field));
            }
        }
    }

    if let Some(port) = config.get("port").and_then(|p| p.as_i64()) {
        if !(1..=65535).contains(&port) {
            errors.push("Port must be between 1 and 65535".to_string());
        }
    }

    if let Some(mode) = config.get("mode") {
        let valid_mode = mode
            .as_str()
            .map(|m| ["rule", "global", "direct"].contains(&m))
            .unwrap_or(false);
        if !valid_mode {
            errors.push("Mode must be one of: rule, global, direct".to_string());
        }
    }

    if let Some(groups) = config.get("proxy-groups").and_then(|g| g.as_array()) {
        for (index, group) in groups.iter().enumerate() {
            let label = group
                .get("name")
                .and_then(|n| n.as_str())
                .map(|n| format!("\"{}\"", n))
                .unwrap_or_else(|| (index + 1).to_string());
            if group.get("name").and_then(|n| n.as_str()).is_none() {
                errors.push(format!("Proxy group {} missing name", index + 1));
            }
            if group.get("type").and_then(|t| t.as_str()).is_none() {
                errors.push(format!("Proxy group {} missing type", label));
            }
            if !group.get("proxies").map(|p| p.is_array()).unwrap_or(false) {
                errors.push(format!(
                    "Proxy group {} missing or invalid proxies array",
                    label
                ));
            }
        }
    }

    let tun_enabled = config
        .pointer("/tun/enable")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if tun_enabled && !cfg!(target_os = "windows") {
        warnings
            .push("TUN mode may require administrator privileges on non-Windows systems".to_string());
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

/// Merge top-level keys of `updates` into `base`. Nested objects are
/// replaced wholesale, matching the original shallow-merge behavior.
pub fn shallow_merge(base: &mut Value, updates: Value) {
    if let (Some(base_map), Value::Object(update_map)) = (base.as_object_mut(), updates) {
        for (key, value) in update_map {
            base_map.insert(key, value);
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BackupInfo {
    pub filename: String,
    pub path: String,
    pub created: String,
    pub size: u64,
}

/// Reads, writes, validates, and backs up the single mihomo config file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn config_path(&self) -> PathBuf {
        crate::paths::config_file(&self.dir)
    }

    pub fn exists(&self) -> bool {
        self.config_path().exists()
    }

    /// Parsed config document; the built-in default template when the file
    /// does not exist yet. Only malformed YAML is an error.
    pub async fn load(&self) -> AppResult<Value> {
        match tokio::fs::read_to_string(self.config_path()).await {
            Ok(text) => Ok(serde_yaml::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(default_config()),
            Err(e) => Err(e.into()),
        }
    }

    /// Validate required fields and overwrite the config file.
    pub async fn save(&self, config: &Value) -> AppResult<()> {
        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .filter(|field| config.get(**field).is_none())
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(AppError::Validation(format!(
                "Missing required field: {}",
                missing.join(", ")
            )));
        }
        self.write_yaml(config).await
    }

    /// Shallow-merge partial fields into the current (or default) document
    /// and persist. No required-field check, matching the original PATCH.
    pub async fn patch(&self, updates: Value) -> AppResult<Value> {
        let mut current = self.load().await?;
        shallow_merge(&mut current, updates);
        self.write_yaml(&current).await?;
        Ok(current)
    }

    /// Overwrite with the default template unconditionally.
    pub async fn reset(&self) -> AppResult<Value> {
        let config = default_config();
        self.write_yaml(&config).await?;
        Ok(config)
    }

    async fn write_yaml(&self, config: &Value) -> AppResult<()> {
        let yaml = serde_yaml::to_string(config)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.config_path(), yaml).await?;
        Ok(())
    }

    /// Copy the live config to a timestamped backup, then prune to the
    /// `MAX_BACKUPS` most recent.
    pub async fn backup(&self) -> AppResult<PathBuf> {
        let config_path = self.config_path();
        if !config_path.exists() {
            return Err(AppError::NotFound(
                "Configuration file not found".to_string(),
            ));
        }

        let filename = format!("{}{}", BACKUP_PREFIX, backup_timestamp());
        let backup_path = self.dir.join(&filename);
        tokio::fs::copy(&config_path, &backup_path).await?;
        prune_backups(&self.dir, MAX_BACKUPS);
        Ok(backup_path)
    }

    /// All backups in the config directory, newest first.
    pub async fn list_backups(&self) -> AppResult<Vec<BackupInfo>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name().to_string_lossy().to_string();
            if !filename.starts_with(BACKUP_PREFIX) {
                continue;
            }
            let metadata = entry.metadata().await?;
            let created = metadata
                .modified()
                .map(|t| DateTime::<Utc>::from(t).to_rfc3339())
                .unwrap_or_default();
            backups.push(BackupInfo {
                path: entry.path().display().to_string(),
                filename,
                created,
                size: metadata.len(),
            });
        }

        // The embedded timestamp sorts lexicographically.
        backups.sort_by(|a, b| b.filename.cmp(&a.filename));
        Ok(backups)
    }

    /// Overwrite the live config from `backup_filename`, keeping a safety
    /// copy of the current file first. Returns the restored document.
    pub async fn restore(&self, backup_filename: &str) -> AppResult<Value> {
        if !backup_filename.starts_with(BACKUP_PREFIX)
            || backup_filename.contains('/')
            || backup_filename.contains('\\')
        {
            return Err(AppError::Validation("Invalid backup file name".to_string()));
        }

        let backup_path = self.dir.join(backup_filename);
        if !backup_path.exists() {
            return Err(AppError::NotFound("Backup file not found".to_string()));
        }

        let config_path = self.config_path();
        if config_path.exists() {
            let safety = format!("{}before_restore_{}", BACKUP_PREFIX, backup_timestamp());
            tokio::fs::copy(&config_path, self.dir.join(safety)).await?;
        }

        tokio::fs::copy(&backup_path, &config_path).await?;
        prune_backups(&self.dir, MAX_BACKUPS);
        self.load().await
    }
}

fn backup_timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Delete backups beyond `keep`, oldest first. Best-effort: a backup that
/// cannot be removed is logged and skipped.
fn prune_backups(dir: &Path, keep: usize) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    let mut backups: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .map(|name| name.to_string_lossy().starts_with(BACKUP_PREFIX))
                .unwrap_or(false)
        })
        .collect();

    backups.sort_by(|a, b| b.file_name().cmp(&a.file_name()));

    for stale in backups.iter().skip(keep) {
        if let Err(e) = std::fs::remove_file(stale) {
            warn!("failed to remove old backup {}: {}", stale.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store(dir: &tempfile::TempDir) -> ConfigStore {
        ConfigStore::new(dir.path().to_path_buf())
    }

    fn minimal_config() -> Value {
        json!({
            "port": 7890,
            "mode": "rule",
            "proxies": [],
            "proxy-groups": [],
            "rules": []
        })
    }

    #[test]
    fn default_template_has_required_fields() {
        let config = default_config();
        for field in REQUIRED_FIELDS {
            assert!(config.get(field).is_some(), "missing {}", field);
        }
        assert_eq!(config.pointer("/tun/enable"), Some(&json!(false)));
    }

    #[test]
    fn default_template_is_valid() {
        let report = validate_config(&default_config());
        assert!(report.valid, "errors: {:?}", report.errors);
    }

    #[test]
    fn validate_rejects_out_of_range_port() {
        let mut config = minimal_config();
        config["port"] = json!(70000);
        let report = validate_config(&config);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("1 and 65535")));
    }

    #[test]
    fn validate_rejects_unknown_mode() {
        let mut config = minimal_config();
        config["mode"] = json!("tunnel");
        let report = validate_config(&config);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("rule, global, direct")));
    }

    #[test]
    fn validate_reports_missing_fields() {
        let report = validate_config(&json!({}));
        assert!(!report.valid);
        assert_eq!(report.errors.len(), REQUIRED_FIELDS.len());
    }

    #[test]
    fn validate_checks_group_shape() {
        let mut config = minimal_config();
        config["proxy-groups"] = json!([{"name": "A", "type": "select"}, {"type": "select", "proxies": []}]);
        let report = validate_config(&config);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("\"A\" missing or invalid proxies array")));
        assert!(report.errors.iter().any(|e| e.contains("group 2 missing name")));
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn validate_warns_about_tun_on_unix() {
        let mut config = minimal_config();
        config["tun"] = json!({"enable": true});
        let report = validate_config(&config);
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 1);
    }

    #[tokio::test]
    async fn load_without_file_returns_default() {
        let dir = tempdir().unwrap();
        let loaded = store(&dir).load().await.unwrap();
        assert_eq!(loaded, default_config());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        let mut config = minimal_config();
        config["log-level"] = json!("debug");
        config["allow-lan"] = json!(true);
        config["dns"] = json!({"enable": true, "nameserver": ["1.1.1.1", "8.8.8.8"]});
        config["proxies"] = json!([{"name": "p1", "type": "ss", "port": 8388}]);

        store.save(&config).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn save_rejects_missing_required_fields() {
        let dir = tempdir().unwrap();
        let err = store(&dir)
            .save(&json!({"port": 7890, "mode": "rule"}))
            .await
            .unwrap_err();
        match err {
            AppError::Validation(msg) => {
                assert!(msg.contains("proxies"));
                assert!(msg.contains("rules"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(!store(&dir).exists());
    }

    #[tokio::test]
    async fn patch_shallow_merges_into_default() {
        let dir = tempdir().unwrap();
        let patched = store(&dir)
            .patch(json!({"tun": {"enable": true}}))
            .await
            .unwrap();

        assert_eq!(patched.pointer("/tun/enable"), Some(&json!(true)));
        // Untouched top-level fields survive.
        assert_eq!(patched["port"], default_config()["port"]);
        assert_eq!(patched["mode"], default_config()["mode"]);

        let reloaded = store(&dir).load().await.unwrap();
        assert_eq!(reloaded, patched);
    }

    #[tokio::test]
    async fn reset_overwrites_with_default() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let mut config = minimal_config();
        config["port"] = json!(9999);
        store.save(&config).await.unwrap();

        store.reset().await.unwrap();
        assert_eq!(store.load().await.unwrap(), default_config());
    }

    #[tokio::test]
    async fn backup_without_config_fails() {
        let dir = tempdir().unwrap();
        let err = store(&dir).backup().await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn backup_copies_and_lists_newest_first() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        store.save(&minimal_config()).await.unwrap();

        let path = store.backup().await.unwrap();
        assert!(path.exists());

        let backups = store.list_backups().await.unwrap();
        assert_eq!(backups.len(), 1);
        assert!(backups[0].filename.starts_with(BACKUP_PREFIX));
        assert!(backups[0].size > 0);
    }

    #[test]
    fn rotation_keeps_the_five_newest() {
        let dir = tempdir().unwrap();
        for day in 1..=6 {
            let name = format!("{}202401{:02}_120000", BACKUP_PREFIX, day);
            std::fs::write(dir.path().join(name), "port: 7890\n").unwrap();
        }

        prune_backups(dir.path(), MAX_BACKUPS);

        let mut remaining: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        remaining.sort();

        assert_eq!(remaining.len(), 5);
        // The oldest (day 01) was evicted.
        assert_eq!(remaining[0], format!("{}20240102_120000", BACKUP_PREFIX));
    }

    #[tokio::test]
    async fn restore_returns_backed_up_document() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        let mut original = minimal_config();
        original["port"] = json!(1111);
        store.save(&original).await.unwrap();
        store.backup().await.unwrap();
        let backup_name = store.list_backups().await.unwrap()[0].filename.clone();

        let mut replacement = minimal_config();
        replacement["port"] = json!(2222);
        store.save(&replacement).await.unwrap();

        let restored = store.restore(&backup_name).await.unwrap();
        assert_eq!(restored["port"], json!(1111));
        assert_eq!(store.load().await.unwrap()["port"], json!(1111));

        // A pre-restore safety copy of the replaced config was kept.
        let backups = store.list_backups().await.unwrap();
        assert!(backups
            .iter()
            .any(|b| b.filename.contains("before_restore_")));
    }

    #[tokio::test]
    async fn restore_rejects_missing_or_invalid_names() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        let err = store
            .restore("config.yaml.backup.20240101_000000")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = store.restore("../etc/passwd").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
