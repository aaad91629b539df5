use std::path::PathBuf;

// ============================================================================
// Directory Resolution
// ============================================================================

/// Candidate config directories, in priority order.
fn candidate_config_dirs() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".config").join("mihomo"));
        candidates.push(home.join(".mihomo"));
    }
    candidates.push(PathBuf::from("config"));
    candidates
}

/// Resolve the mihomo config directory: first existing candidate wins,
/// otherwise the first candidate is created.
pub fn resolve_config_dir() -> std::io::Result<PathBuf> {
    let candidates = candidate_config_dirs();
    for dir in &candidates {
        if dir.exists() {
            return Ok(dir.clone());
        }
    }
    let default = candidates
        .into_iter()
        .next()
        .unwrap_or_else(|| PathBuf::from("config"));
    std::fs::create_dir_all(&default)?;
    Ok(default)
}

pub fn config_file(config_dir: &std::path::Path) -> PathBuf {
    config_dir.join("config.yaml")
}

pub fn subscriptions_file(config_dir: &std::path::Path) -> PathBuf {
    config_dir.join("subscriptions.json")
}
