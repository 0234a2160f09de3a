use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct BanList {
    #[serde(default)]
    pub banned: Vec<u64>,
}

/// Guilds that may not use the bot, persisted as JSON.
#[derive(Debug)]
pub(crate) struct BanStore {
    path: PathBuf,
    list: RwLock<BanList>,
}

async fn write_list(path: &Path, list: &BanList) -> anyhow::Result<()> {
    let json = serde_json::to_string(list)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("writing ban list to {}", path.display()))?;
    Ok(())
}

impl BanStore {
    /// Loads the list at `path`, replacing an unreadable file with defaults.
    pub async fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let read = async {
            let raw = tokio::fs::read_to_string(&path).await?;
            anyhow::Ok(serde_json::from_str::<BanList>(&raw)?)
        };

        let list = match read.await {
            Ok(list) => {
                tracing::info!("loaded data from {}", path.display());
                list
            }
            Err(err) => {
                tracing::warn!(
                    "failed to load data from {} ({err}), \
                     creating a new file with default settings",
                    path.display()
                );
                let list = BanList::default();
                write_list(&path, &list).await?;
                list
            }
        };

        Ok(Self {
            path,
            list: RwLock::new(list),
        })
    }

    pub async fn is_banned(&self, guild_id: u64) -> bool {
        self.list.read().await.banned.contains(&guild_id)
    }

    pub async fn banned(&self) -> Vec<u64> {
        self.list.read().await.banned.clone()
    }

    /// Returns `false` if the guild was already banned.
    pub async fn ban(&self, guild_id: u64) -> anyhow::Result<bool> {
        let mut list = self.list.write().await;
        if list.banned.contains(&guild_id) {
            return Ok(false);
        }
        let mut updated = list.clone();
        updated.banned.push(guild_id);
        write_list(&self.path, &updated).await?;
        *list = updated;
        Ok(true)
    }

    /// Returns `false` if the guild was not banned.
    pub async fn unban(&self, guild_id: u64) -> anyhow::Result<bool> {
        let mut list = self.list.write().await;
        let Some(index) = list.banned.iter().position(|id| *id == guild_id) else {
            return Ok(false);
        };
        let mut updated = list.clone();
        updated.banned.remove(index);
        write_list(&self.path, &updated).await?;
        *list = updated;
        Ok(true)
    }

    pub async fn save(&self) -> anyhow::Result<()> {
        let list = self.list.read().await;
        write_list(&self.path, &list).await
    }

    /// Whether banning `target` would leave the owner without any usable guild.
    pub async fn would_softlock(&self, author_guilds: &[u64], target: u64) -> bool {
        let list = self.list.read().await;
        !author_guilds
            .iter()
            .any(|id| *id != target && !list.banned.contains(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_file(path: &Path) -> BanList {
        let raw = tokio::fs::read_to_string(path).await.unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[tokio::test]
    async fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gman.data");

        let store = BanStore::load(&path).await.unwrap();
        assert!(store.banned().await.is_empty());
        assert_eq!(read_file(&path).await, BanList::default());
    }

    #[tokio::test]
    async fn corrupt_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gman.data");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let store = BanStore::load(&path).await.unwrap();
        assert!(store.banned().await.is_empty());
        assert_eq!(
            tokio::fs::read_to_string(&path).await.unwrap(),
            r#"{"banned":[]}"#
        );
    }

    #[tokio::test]
    async fn missing_key_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gman.data");
        tokio::fs::write(&path, "{}").await.unwrap();

        let store = BanStore::load(&path).await.unwrap();
        assert!(store.banned().await.is_empty());
    }

    #[tokio::test]
    async fn bans_persist_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gman.data");

        let store = BanStore::load(&path).await.unwrap();
        assert!(store.ban(10).await.unwrap());
        assert!(store.ban(20).await.unwrap());
        assert!(!store.ban(10).await.unwrap());
        assert!(store.unban(10).await.unwrap());
        assert!(!store.unban(30).await.unwrap());

        let reloaded = BanStore::load(&path).await.unwrap();
        assert_eq!(reloaded.banned().await, vec![20]);
        assert!(reloaded.is_banned(20).await);
        assert!(!reloaded.is_banned(10).await);
    }

    #[tokio::test]
    async fn failed_write_leaves_list_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gman.data");
        let store = BanStore::load(&path).await.unwrap();
        assert!(store.ban(7).await.unwrap());

        // A directory in place of the file makes every write fail.
        tokio::fs::remove_file(&path).await.unwrap();
        tokio::fs::create_dir(&path).await.unwrap();

        assert!(store.ban(42).await.is_err());
        assert!(!store.is_banned(42).await);
        assert!(store.unban(7).await.is_err());
        assert!(store.is_banned(7).await);
        assert_eq!(store.banned().await, vec![7]);
    }

    #[tokio::test]
    async fn refuses_softlock() {
        let dir = tempfile::tempdir().unwrap();
        let store = BanStore::load(dir.path().join("gman.data")).await.unwrap();

        assert!(store.would_softlock(&[], 1).await);
        assert!(store.would_softlock(&[1], 1).await);
        assert!(!store.would_softlock(&[1, 2], 1).await);

        store.ban(2).await.unwrap();
        assert!(store.would_softlock(&[1, 2], 1).await);
    }
}
