use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::platform;
use crate::radio::Station;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Favorite {
    pub uuid: String,
    pub name: String,
    pub country: String,
    pub tags: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct FavoritesFile {
    stations: Vec<Favorite>,
}

/// Persistent set of favorite stations, keyed by station uuid.
/// Writes go back to disk on every toggle.
#[derive(Debug)]
pub struct Favorites {
    path: PathBuf,
    items: HashMap<String, Favorite>,
}

impl Favorites {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(platform::config_dir().join("favorites.json"))
    }

    pub fn load_from(path: PathBuf) -> anyhow::Result<Self> {
        let mut favs = Self {
            path,
            items: HashMap::new(),
        };

        let data = match std::fs::read(&favs.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(favs),
            Err(e) => return Err(e.into()),
        };

        let stored: FavoritesFile = serde_json::from_slice(&data)?;
        for fav in stored.stations {
            if !fav.uuid.is_empty() {
                favs.items.insert(fav.uuid.clone(), fav);
            }
        }
        Ok(favs)
    }

    /// Add the station if absent, remove it if present.  Returns whether the
    /// station is a favorite afterwards.
    pub fn toggle(&mut self, station: &Station) -> anyhow::Result<bool> {
        if station.uuid.is_empty() {
            bail!("station uuid is required");
        }

        let now_favorite = if self.items.remove(&station.uuid).is_some() {
            false
        } else {
            self.items.insert(
                station.uuid.clone(),
                Favorite {
                    uuid: station.uuid.clone(),
                    name: station.name.clone(),
                    country: station.country.clone(),
                    tags: station.tags.clone(),
                },
            );
            true
        };

        self.save()?;
        Ok(now_favorite)
    }

    pub fn is_favorite(&self, uuid: &str) -> bool {
        self.items.contains_key(uuid)
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Favorites sorted by lowercased name, uuid as tiebreak.
    pub fn list(&self) -> Vec<Favorite> {
        let mut list: Vec<Favorite> = self.items.values().cloned().collect();
        list.sort_by(|a, b| {
            let na = a.name.trim().to_lowercase();
            let nb = b.name.trim().to_lowercase();
            na.cmp(&nb).then_with(|| a.uuid.cmp(&b.uuid))
        });
        list
    }

    fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = FavoritesFile {
            stations: self.list(),
        };
        let data = serde_json::to_vec_pretty(&file)?;
        std::fs::write(&self.path, data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(uuid: &str, name: &str) -> Station {
        Station {
            uuid: uuid.into(),
            name: name.into(),
            country: "US".into(),
            tags: "rock".into(),
            ..Default::default()
        }
    }

    #[test]
    fn missing_file_is_empty_store() {
        let tmp = tempfile::tempdir().unwrap();
        let favs = Favorites::load_from(tmp.path().join("favorites.json")).unwrap();
        assert_eq!(favs.count(), 0);
    }

    #[test]
    fn toggle_adds_then_removes() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("favorites.json");
        let mut favs = Favorites::load_from(path.clone()).unwrap();

        assert!(favs.toggle(&station("abc", "Test FM")).unwrap());
        assert!(favs.is_favorite("abc"));
        assert_eq!(favs.count(), 1);

        // Survives a reload.
        let mut favs = Favorites::load_from(path.clone()).unwrap();
        assert!(favs.is_favorite("abc"));

        assert!(!favs.toggle(&station("abc", "Test FM")).unwrap());
        assert!(!favs.is_favorite("abc"));

        let favs = Favorites::load_from(path).unwrap();
        assert_eq!(favs.count(), 0);
    }

    #[test]
    fn toggle_requires_uuid() {
        let tmp = tempfile::tempdir().unwrap();
        let mut favs = Favorites::load_from(tmp.path().join("favorites.json")).unwrap();
        assert!(favs.toggle(&station("", "Nameless")).is_err());
    }

    #[test]
    fn list_sorted_by_name_then_uuid() {
        let tmp = tempfile::tempdir().unwrap();
        let mut favs = Favorites::load_from(tmp.path().join("favorites.json")).unwrap();
        favs.toggle(&station("b", "zulu radio")).unwrap();
        favs.toggle(&station("a", "Alpha FM")).unwrap();
        favs.toggle(&station("c", "alpha fm")).unwrap();

        let names: Vec<(String, String)> = favs
            .list()
            .into_iter()
            .map(|f| (f.name, f.uuid))
            .collect();
        assert_eq!(
            names,
            vec![
                ("Alpha FM".to_string(), "a".to_string()),
                ("alpha fm".to_string(), "c".to_string()),
                ("zulu radio".to_string(), "b".to_string()),
            ]
        );
    }
}
