//! Subcommand implementations and the helpers they share.

pub mod config_cmd;
pub mod providers;
pub mod run;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chorus_llm::scripted::ScriptedPool;
use chorus_llm::{Provider, RetryPolicy, ScriptedProvider};

/// Load the orchestration policy from an explicit path or by discovery.
pub fn load_policy(path: Option<&Path>) -> anyhow::Result<RetryPolicy> {
    RetryPolicy::load(path).context("failed to load orchestration policy")
}

/// Read a pool file of scripted providers.
pub fn load_pool(path: &Path) -> anyhow::Result<Vec<Arc<ScriptedProvider>>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read pool file {}", path.display()))?;
    let pool: ScriptedPool = serde_json::from_str(&raw)
        .with_context(|| format!("invalid pool file {}", path.display()))?;
    Ok(pool
        .providers
        .into_iter()
        .map(|spec| Arc::new(spec.into_provider()))
        .collect())
}

/// Upcast a loaded pool for the orchestrator.
pub fn as_dyn(pool: &[Arc<ScriptedProvider>]) -> Vec<Arc<dyn Provider>> {
    pool.iter()
        .map(|p| Arc::clone(p) as Arc<dyn Provider>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_pool_reads_scripted_providers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");
        std::fs::write(
            &path,
            r#"{"providers": [
                {"name": "a", "supportsStream": true, "script": [{"type": "text", "text": "hi"}]},
                {"name": "b"}
            ]}"#,
        )
        .unwrap();

        let pool = load_pool(&path).unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(as_dyn(&pool)[1].name(), "b");
    }

    #[test]
    fn load_pool_reports_missing_file() {
        let err = load_pool(Path::new("/nonexistent/pool.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read pool file"));
    }

    #[test]
    fn load_policy_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(&path, r#"{"maxRetries": 9}"#).unwrap();
        let policy = load_policy(Some(&path)).unwrap();
        assert_eq!(policy.max_retries, 9);
    }
}
