//! Channel catalog loaders.
//!
//! Panel catalog sync lives outside the live engine; the daemon instead reads
//! a prepared catalog from `channels.toml` or, failing that, an extended M3U.

use std::collections::HashSet;

use crate::protocol::{Category, Channel, ChannelId};

/// A loaded catalog: channels in catalog order plus their categories.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub categories: Vec<Category>,
    pub channels: Vec<Channel>,
}

impl Catalog {
    pub fn category_name(&self, id: &str) -> Option<&str> {
        self.categories
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.as_str())
    }
}

// ── TOML catalog ──────────────────────────────────────────────────────────────

/// Matches the `[[category]]` / `[[channel]]` tables.  Kept separate from the
/// wire structs so the file schema can evolve on its own.
#[derive(Debug, serde::Deserialize)]
struct TomlCatalogFile {
    #[serde(default)]
    category: Vec<TomlCategory>,
    #[serde(default)]
    channel: Vec<TomlChannel>,
}

#[derive(Debug, serde::Deserialize)]
struct TomlCategory {
    id: String,
    name: String,
}

#[derive(Debug, serde::Deserialize)]
struct TomlChannel {
    id: u32,
    name: String,
    #[serde(default)]
    category_id: Option<String>,
    #[serde(default)]
    number: Option<u32>,
    #[serde(default)]
    icon: Option<String>,
}

pub fn load_catalog_from_toml(path: &std::path::Path) -> anyhow::Result<Catalog> {
    let content = std::fs::read_to_string(path)?;
    parse_catalog_from_toml_str(&content)
}

pub fn parse_catalog_from_toml_str(content: &str) -> anyhow::Result<Catalog> {
    let file: TomlCatalogFile = toml::from_str(content)?;
    let categories = file
        .category
        .into_iter()
        .map(|c| Category {
            id: c.id,
            name: c.name,
        })
        .collect();
    let channels = file
        .channel
        .into_iter()
        .map(|c| Channel {
            id: c.id,
            name: c.name,
            category_id: c.category_id,
            number: c.number,
            icon: c.icon,
        })
        .collect();
    Ok(Catalog {
        categories,
        channels,
    })
}

// ── M3U catalog ───────────────────────────────────────────────────────────────

pub fn load_catalog_from_m3u(path: &std::path::Path) -> anyhow::Result<Catalog> {
    let content = std::fs::read_to_string(path)?;
    parse_catalog_from_m3u_str(&content)
}

/// Parse an extended M3U.  `group-title` becomes the category (its name doubles
/// as id), `tvg-id` the channel id when numeric, `tvg-chno` the number.
/// Entries without a usable id get a synthetic one from their position,
/// bumped past any id used elsewhere in the file.
pub fn parse_catalog_from_m3u_str(content: &str) -> anyhow::Result<Catalog> {
    let mut catalog = Catalog::default();
    let mut pending: Option<Channel> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("#EXTINF:") {
            // the name follows the first comma after the quoted attributes
            let attrs_end = rest.rfind('"').map_or(0, |q| q + 1);
            let (attrs, name) = match rest[attrs_end..].find(',') {
                Some(idx) => (&rest[..attrs_end + idx], rest[attrs_end + idx + 1..].trim()),
                None => (rest, ""),
            };
            let group = extinf_attr(attrs, "group-title");
            if let Some(ref g) = group {
                if !catalog.categories.iter().any(|c| &c.id == g) {
                    catalog.categories.push(Category {
                        id: g.clone(),
                        name: g.clone(),
                    });
                }
            }
            pending = Some(Channel {
                id: extinf_attr(attrs, "tvg-id")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0),
                name: name.to_string(),
                category_id: group,
                number: extinf_attr(attrs, "tvg-chno").and_then(|v| v.parse().ok()),
                icon: extinf_attr(attrs, "tvg-logo").filter(|v| !v.is_empty()),
            });
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        // URL line closes the entry
        let mut channel = pending.take().unwrap_or_else(|| Channel {
            name: line.to_string(),
            ..Channel::default()
        });
        if channel.id == 0 {
            channel.id = stream_id_from_url(line).unwrap_or(0);
        }
        if channel.name.is_empty() {
            channel.name = line.to_string();
        }
        catalog.channels.push(channel);
    }

    assign_missing_ids(&mut catalog.channels);
    Ok(catalog)
}

fn assign_missing_ids(channels: &mut [Channel]) {
    let mut used: HashSet<ChannelId> = channels
        .iter()
        .map(|c| c.id)
        .filter(|id| *id != 0)
        .collect();
    for (pos, channel) in channels.iter_mut().enumerate() {
        if channel.id != 0 {
            continue;
        }
        let mut candidate = pos as ChannelId + 1;
        while used.contains(&candidate) {
            candidate += 1;
        }
        used.insert(candidate);
        channel.id = candidate;
    }
}

fn extinf_attr(attrs: &str, key: &str) -> Option<String> {
    let needle = format!("{}=\"", key);
    let start = attrs.find(&needle)? + needle.len();
    let end = attrs[start..].find('"')? + start;
    Some(attrs[start..end].to_string())
}

/// Panel URLs end in `/<id>.<ext>` (or just `/<id>`).
fn stream_id_from_url(url: &str) -> Option<u32> {
    let last = url.rsplit('/').next()?;
    let stem = last.split('.').next()?;
    stem.parse().ok()
}
