//! Supervisor Registrar (§4.G) — side-effect-only collaborator that makes
//! the managed PULSAR process visible to an external service supervisor
//! (TSM) by writing a process-descriptor directory.

use crate::config::Config;

const PROCESS_NAME: &str = "pulsar";

pub struct Supervisor {
    config: Config,
}

impl Supervisor {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Writes `processes/<name>/{<name>.pid, meta.json, current.out,
    /// current.err}`. Failures are logged and non-fatal to the hub.
    pub async fn register(&self, pid: u32, comm_type: &str, comm_path: Option<&str>) {
        if let Err(err) = self.try_register(pid, comm_type, comm_path).await {
            tracing::warn!(%err, "failed to write supervisor entry");
        }
    }

    async fn try_register(
        &self,
        pid: u32,
        comm_type: &str,
        comm_path: Option<&str>,
    ) -> std::io::Result<()> {
        let dir = self.config.processes_dir().join(PROCESS_NAME);
        tokio::fs::create_dir_all(&dir).await?;

        // On read failure, spec mandates a fixed fallback id; `next_id`
        // already degrades to 1 in that case.
        let tsm_id = self.next_id().await.unwrap_or(1);
        let (parent, parent_tsm_id) = self.read_parent_linkage().await;

        tokio::fs::write(dir.join(format!("{PROCESS_NAME}.pid")), pid.to_string()).await?;

        let meta = serde_json::json!({
            "tsm_id": tsm_id,
            "name": PROCESS_NAME,
            "pid": pid,
            "command": self.config.pulsar_bin.display().to_string(),
            "parent": parent,
            "parent_tsm_id": parent_tsm_id,
            "comm_type": comm_type,
            "comm_path": comm_path,
            "status": "running",
            "start_time": chrono::Utc::now().to_rfc3339(),
        });
        tokio::fs::write(dir.join("meta.json"), serde_json::to_vec_pretty(&meta)?).await?;

        tokio::fs::write(dir.join("current.out"), b"").await?;
        tokio::fs::write(dir.join("current.err"), b"").await?;
        Ok(())
    }

    async fn next_id(&self) -> std::io::Result<u64> {
        let path = self.config.runtime_dir.join("next_id");
        tokio::fs::create_dir_all(&self.config.runtime_dir).await?;
        let current: u64 = match tokio::fs::read_to_string(&path).await {
            Ok(s) => s.trim().parse().unwrap_or(0),
            Err(_) => 0,
        };
        let next = current + 1;
        tokio::fs::write(&path, next.to_string()).await?;
        Ok(next)
    }

    /// Parent linkage is filled from the hub's own supervisor entry if one
    /// exists; absence is acceptable (§4.G).
    async fn read_parent_linkage(&self) -> (Option<String>, Option<u64>) {
        let own_meta = self.config.processes_dir().join("quasar").join("meta.json");
        let Ok(bytes) = tokio::fs::read(&own_meta).await else {
            return (None, None);
        };
        match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(v) => {
                let name = v.get("name").and_then(|n| n.as_str()).map(str::to_string);
                let tsm_id = v.get("tsm_id").and_then(|n| n.as_u64());
                (name, tsm_id)
            }
            Err(_) => (None, None),
        }
    }

    /// Recursively removes `processes/<name>/`. Idempotent.
    pub async fn remove(&self) {
        let dir = self.config.processes_dir().join(PROCESS_NAME);
        if let Err(err) = tokio::fs::remove_dir_all(&dir).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(%err, "failed to remove supervisor entry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_config(dir: &tempfile::TempDir) -> Config {
        let mut config = Config::from_env();
        config.runtime_dir = dir.path().to_path_buf();
        config
    }

    #[tokio::test]
    async fn register_then_remove_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Supervisor::new(test_config(&dir));

        supervisor.register(1234, "pipe", None).await;

        let entry_dir = dir.path().join("processes").join(PROCESS_NAME);
        assert!(entry_dir.join("pulsar.pid").exists());
        assert!(entry_dir.join("meta.json").exists());
        assert!(entry_dir.join("current.out").exists());
        assert!(entry_dir.join("current.err").exists());

        supervisor.remove().await;
        assert!(!entry_dir.exists());
    }

    #[tokio::test]
    async fn remove_without_prior_register_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Supervisor::new(test_config(&dir));
        supervisor.remove().await;
    }
}
