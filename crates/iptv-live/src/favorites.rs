//! Favorites collaborator used by the favorite key.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use iptv_proto::protocol::{Channel, ChannelId};

use crate::error::{LiveError, LiveResult};

pub trait FavoritesStore: Send {
    fn is_favorite(&self, channel: ChannelId) -> bool;
    /// Flip membership of `channel`.  Returns the new state.
    fn toggle(&mut self, channel: &Channel) -> LiveResult<bool>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryFavorites {
    channels: BTreeMap<ChannelId, Channel>,
}

impl MemoryFavorites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }
}

impl FavoritesStore for MemoryFavorites {
    fn is_favorite(&self, channel: ChannelId) -> bool {
        self.channels.contains_key(&channel)
    }

    fn toggle(&mut self, channel: &Channel) -> LiveResult<bool> {
        if self.channels.remove(&channel.id).is_some() {
            Ok(false)
        } else {
            self.channels.insert(channel.id, channel.clone());
            Ok(true)
        }
    }
}

/// Favorites kept in a JSON file, rewritten on every toggle.
pub struct FileFavorites {
    path: PathBuf,
    inner: MemoryFavorites,
}

impl FileFavorites {
    /// Load from `path`; a missing or unreadable file starts empty.
    pub fn open(path: PathBuf) -> Self {
        let inner = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("favorites: ignoring unreadable {:?}: {}", path, e);
                MemoryFavorites::new()
            }),
            Err(_) => MemoryFavorites::new(),
        };
        Self { path, inner }
    }

    fn save(&self) -> LiveResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.inner)
            .map_err(|e| LiveError::Favorites(e.to_string()))?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl FavoritesStore for FileFavorites {
    fn is_favorite(&self, channel: ChannelId) -> bool {
        self.inner.is_favorite(channel)
    }

    fn toggle(&mut self, channel: &Channel) -> LiveResult<bool> {
        let now_favorite = self.inner.toggle(channel)?;
        self.save()?;
        Ok(now_favorite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(id: u32) -> Channel {
        Channel {
            id,
            name: format!("ch{}", id),
            ..Channel::default()
        }
    }

    #[test]
    fn test_memory_toggle() {
        let mut fav = MemoryFavorites::new();
        assert!(fav.toggle(&ch(7)).unwrap());
        assert!(fav.is_favorite(7));
        assert!(!fav.toggle(&ch(7)).unwrap());
        assert!(fav.is_empty());
    }

    #[test]
    fn test_file_favorites_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("favorites.json");
        {
            let mut fav = FileFavorites::open(path.clone());
            fav.toggle(&ch(3)).unwrap();
            fav.toggle(&ch(4)).unwrap();
            fav.toggle(&ch(3)).unwrap();
        }
        let fav = FileFavorites::open(path);
        assert!(fav.is_favorite(4));
        assert!(!fav.is_favorite(3));
    }
}
