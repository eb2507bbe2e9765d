use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use time::macros::format_description;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::LibraryError;
use crate::reconcile::OrderedTagEntry;

const TEMPLATE_JSON: &str = include_str!("templates/prompts.json");
const JSON_INDENT: &[u8] = b"    ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryPrompt {
    pub en: String,
    #[serde(default)]
    pub zh: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prompts: Vec<LibraryPrompt>,
}

impl Category {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            prompts: Vec::new(),
        }
    }
}

/// On-disk shape: category key to category, in file order.
pub type LibraryData = IndexMap<String, Category>;

pub type SharedLibrary = Arc<RwLock<TagLibrary>>;

pub fn category_key(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// Categorized tag collection persisted as one JSON file.
///
/// Every mutation rewrites the whole file. A failed write is reported to the
/// caller but the in-memory change is kept.
#[derive(Debug, Clone, Default)]
pub struct TagLibrary {
    path: Option<PathBuf>,
    categories: LibraryData,
}

impl TagLibrary {
    pub fn in_memory(categories: LibraryData) -> Self {
        Self {
            path: None,
            categories,
        }
    }

    /// Loads the library, degrading to an empty one on any read or parse error.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let categories = match read_library(&path) {
            Ok(categories) => {
                info!(
                    "loaded {} categories from {}",
                    categories.len(),
                    path.display()
                );
                categories
            }
            Err(err) => {
                warn!("{}; starting with an empty library", err);
                LibraryData::new()
            }
        };
        Self {
            path: Some(path),
            categories,
        }
    }

    /// Opens `path`, first creating it as an empty library when it does not exist.
    pub fn open_or_create(path: impl Into<PathBuf>) -> Result<Self, LibraryError> {
        let path = path.into();
        if !path.exists() {
            let library = Self {
                path: Some(path),
                categories: LibraryData::new(),
            };
            library.save()?;
            return Ok(library);
        }
        Ok(Self::load(path))
    }

    pub fn into_shared(self) -> SharedLibrary {
        Arc::new(RwLock::new(self))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn categories(&self) -> impl Iterator<Item = (&String, &Category)> {
        self.categories.iter()
    }

    pub fn category(&self, key: &str) -> Option<&Category> {
        self.categories.get(key)
    }

    pub fn find_category(&self, name: &str) -> Option<&Category> {
        self.categories.values().find(|category| category.name == name)
    }

    fn find_category_mut(&mut self, name: &str) -> Option<&mut Category> {
        self.categories
            .values_mut()
            .find(|category| category.name == name)
    }

    /// Adds unknown categories and appends every incoming prompt. No dedup.
    pub fn merge(&mut self, incoming: LibraryData) -> Result<(), LibraryError> {
        for (key, category) in incoming {
            let local = self
                .categories
                .entry(key)
                .or_insert_with(|| {
                    Category::new(category.name.clone(), category.description.clone())
                });
            local.prompts.extend(category.prompts);
        }
        self.persist()
    }

    /// Returns `false` when a category with the derived key already exists.
    pub fn add_category(&mut self, name: &str, description: &str) -> Result<bool, LibraryError> {
        let key = category_key(name);
        if self.categories.contains_key(&key) {
            return Ok(false);
        }
        self.categories.insert(key, Category::new(name, description));
        self.persist()?;
        Ok(true)
    }

    /// Returns `false` when no category has that display name.
    pub fn add_prompt(
        &mut self,
        category_name: &str,
        en: &str,
        zh: &str,
    ) -> Result<bool, LibraryError> {
        let Some(category) = self.find_category_mut(category_name) else {
            return Ok(false);
        };
        category.prompts.push(LibraryPrompt {
            en: en.to_string(),
            zh: zh.to_string(),
        });
        self.persist()?;
        Ok(true)
    }

    /// Appends reconciled entries as `{en: text, zh: translation}` with one write.
    pub fn add_entries(
        &mut self,
        category_name: &str,
        entries: &[OrderedTagEntry],
    ) -> Result<usize, LibraryError> {
        let Some(category) = self.find_category_mut(category_name) else {
            return Ok(0);
        };
        category
            .prompts
            .extend(entries.iter().map(|entry| LibraryPrompt {
                en: entry.text.clone(),
                zh: entry.translation.clone(),
            }));
        self.persist()?;
        Ok(entries.len())
    }

    pub fn delete_prompt(&mut self, category_name: &str, en: &str) -> Result<bool, LibraryError> {
        let Some(category) = self.find_category_mut(category_name) else {
            return Ok(false);
        };
        let before = category.prompts.len();
        category.prompts.retain(|prompt| prompt.en != en);
        let removed = category.prompts.len() != before;
        self.persist()?;
        Ok(removed)
    }

    pub fn delete_category(&mut self, name: &str) -> Result<bool, LibraryError> {
        let Some(key) = self
            .categories
            .iter()
            .find(|(_, category)| category.name == name)
            .map(|(key, _)| key.clone())
        else {
            return Ok(false);
        };
        self.categories.shift_remove(&key);
        self.persist()?;
        Ok(true)
    }

    pub fn export(&self) -> serde_json::Value {
        serde_json::to_value(&self.categories).unwrap_or_default()
    }

    pub fn data(&self) -> &LibraryData {
        &self.categories
    }

    /// Writes the full library next to its target and renames it into place.
    pub fn save(&self) -> Result<(), LibraryError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        write_library(path, &self.categories)
    }

    fn persist(&self) -> Result<(), LibraryError> {
        self.save().inspect_err(|err| {
            warn!("{}; in-memory library kept", err);
        })
    }
}

pub fn parse_library(content: &str) -> Result<LibraryData, serde_json::Error> {
    serde_json::from_str(content)
}

pub fn read_library(path: &Path) -> Result<LibraryData, LibraryError> {
    let content = fs::read_to_string(path).map_err(|source| LibraryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_library(&content).map_err(|source| LibraryError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn write_library(path: &Path, data: &LibraryData) -> Result<(), LibraryError> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(JSON_INDENT);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    data.serialize(&mut serializer)?;

    let io_error = |source: std::io::Error| LibraryError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(io_error)?;
    file.write_all(&buffer).map_err(io_error)?;
    file.persist(path).map_err(|err| io_error(err.error))?;
    Ok(())
}

/// Writes a timestamped copy of the bundled starter library into `dir`.
pub fn create_from_template(dir: &Path) -> Result<PathBuf, LibraryError> {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let stamp = now
        .format(format_description!("[year][month][day][hour][minute]"))
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    let path = dir.join(format!("prompts-{}.json", stamp));
    let data = parse_library(TEMPLATE_JSON)?;
    write_library(&path, &data)?;
    info!("created tag library {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn prompt(en: &str, zh: &str) -> LibraryPrompt {
        LibraryPrompt {
            en: en.to_string(),
            zh: zh.to_string(),
        }
    }

    fn data(entries: &[(&str, &str, &[(&str, &str)])]) -> LibraryData {
        entries
            .iter()
            .map(|(key, name, prompts)| {
                let mut category = Category::new(*name, "");
                category.prompts = prompts.iter().map(|(en, zh)| prompt(en, zh)).collect();
                (key.to_string(), category)
            })
            .collect()
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempdir().expect("tempdir");
        let library = TagLibrary::load(dir.path().join("absent.json"));
        assert!(library.is_empty());
    }

    #[test]
    fn malformed_file_loads_empty() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").expect("write");
        let library = TagLibrary::load(&path);
        assert!(library.is_empty());
        assert_eq!(library.path(), Some(path.as_path()));
    }

    #[test]
    fn add_category_derives_key_and_persists() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("prompts.json");
        let mut library = TagLibrary::load(&path);

        assert!(library.add_category("Hair Style", "hair").unwrap());
        assert!(!library.add_category("hair style", "again").unwrap());

        let reloaded = TagLibrary::load(&path);
        let category = reloaded.category("hair_style").expect("category");
        assert_eq!(category.name, "Hair Style");
        assert_eq!(category.description, "hair");
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn prompts_are_added_and_deleted_by_display_name() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("prompts.json");
        let mut library = TagLibrary::load(&path);
        library.add_category("Expression", "").unwrap();

        assert!(library.add_prompt("Expression", "smile", "微笑").unwrap());
        assert!(library.add_prompt("Expression", "smile", "笑").unwrap());
        assert!(library.add_prompt("Expression", "frown", "皱眉").unwrap());
        assert!(!library.add_prompt("Nope", "x", "y").unwrap());

        assert!(library.delete_prompt("Expression", "smile").unwrap());
        let reloaded = TagLibrary::load(&path);
        assert_eq!(
            reloaded.find_category("Expression").unwrap().prompts,
            vec![prompt("frown", "皱眉")]
        );

        assert!(!library.delete_category("Nope").unwrap());
        assert!(library.delete_category("Expression").unwrap());
        assert!(TagLibrary::load(&path).is_empty());
    }

    #[test]
    fn merge_appends_duplicates() {
        let mut library = TagLibrary::in_memory(data(&[(
            "quality",
            "Quality",
            &[("masterpiece", "杰作")],
        )]));

        library
            .merge(data(&[
                ("quality", "Quality", &[("masterpiece", "杰作")]),
                ("style", "Style", &[("anime", "动漫")]),
            ]))
            .unwrap();

        assert_eq!(library.category("quality").unwrap().prompts.len(), 2);
        assert_eq!(
            library.category("style").unwrap().prompts,
            vec![prompt("anime", "动漫")]
        );
    }

    #[test]
    fn merge_order_does_not_change_category_set() {
        let a = data(&[("a", "A", &[("x", "")]), ("shared", "Shared", &[("one", "")])]);
        let b = data(&[("b", "B", &[("y", "")]), ("shared", "Shared", &[("two", "")])]);

        let mut ab = TagLibrary::default();
        ab.merge(a.clone()).unwrap();
        ab.merge(b.clone()).unwrap();
        let mut ba = TagLibrary::default();
        ba.merge(b).unwrap();
        ba.merge(a).unwrap();

        let keys = |library: &TagLibrary| {
            library
                .categories()
                .map(|(key, _)| key.clone())
                .collect::<std::collections::BTreeSet<_>>()
        };
        assert_eq!(keys(&ab), keys(&ba));
        assert_eq!(ab.category("shared").unwrap().prompts.len(), 2);
        assert_eq!(ba.category("shared").unwrap().prompts.len(), 2);
    }

    #[test]
    fn save_keeps_file_order_and_appends_new_categories() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("prompts.json");
        fs::write(
            &path,
            r#"{"zeta": {"name": "Zeta", "prompts": []}, "alpha": {"name": "Alpha", "prompts": []}}"#,
        )
        .expect("write");

        let mut library = TagLibrary::load(&path);
        library.add_prompt("Zeta", "smile", "微笑").unwrap();
        library.add_category("Middle", "").unwrap();

        let reloaded = TagLibrary::load(&path);
        let keys = reloaded
            .categories()
            .map(|(key, _)| key.as_str())
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["zeta", "alpha", "middle"]);
        let raw = fs::read_to_string(&path).expect("read");
        assert!(raw.find("\"zeta\"") < raw.find("\"alpha\""));
    }

    #[test]
    fn first_matching_name_follows_file_order() {
        let mut library = TagLibrary::in_memory(data(&[
            ("z_hair", "Hair", &[("long hair", "")]),
            ("a_hair", "Hair", &[("short hair", "")]),
        ]));

        assert_eq!(
            library.find_category("Hair").unwrap().prompts[0].en,
            "long hair"
        );
        assert!(library.delete_category("Hair").unwrap());
        let keys = library
            .categories()
            .map(|(key, _)| key.as_str())
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["a_hair"]);
    }

    #[test]
    fn export_mirrors_file_shape() {
        let library = TagLibrary::in_memory(data(&[("hair", "Hair", &[("long hair", "长发")])]));
        insta::assert_json_snapshot!(library.export(), @r###"
        {
          "hair": {
            "name": "Hair",
            "description": "",
            "prompts": [
              {
                "en": "long hair",
                "zh": "长发"
              }
            ]
          }
        }
        "###);
    }

    #[test]
    fn saved_file_is_pretty_printed_utf8() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("prompts.json");
        let mut library = TagLibrary::load(&path);
        library.add_category("Hair", "").unwrap();
        library.add_prompt("Hair", "long hair", "长发").unwrap();

        let raw = fs::read_to_string(&path).expect("read");
        assert!(raw.contains("长发"));
        assert!(raw.contains("\n    \"hair\": {"));
    }

    #[test]
    fn failed_save_keeps_memory_and_reports() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("missing").join("prompts.json");
        let mut library = TagLibrary::load(&path);

        let err = library.add_category("Hair", "").unwrap_err();

        assert!(matches!(err, LibraryError::Io { .. }));
        assert!(library.category("hair").is_some());
    }

    #[test]
    fn add_entries_stores_text_and_translation() {
        let mut library = TagLibrary::in_memory(data(&[("saved", "Saved", &[])]));
        let entries = vec![
            OrderedTagEntry::new(0, "1girl", ""),
            OrderedTagEntry::new(1, "long hair", "长发"),
        ];
        assert_eq!(library.add_entries("Saved", &entries).unwrap(), 2);
        assert_eq!(library.add_entries("Missing", &entries).unwrap(), 0);
        assert_eq!(
            library.category("saved").unwrap().prompts,
            vec![prompt("1girl", ""), prompt("long hair", "长发")]
        );
    }

    #[test]
    fn open_or_create_writes_empty_object() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("new.json");
        let library = TagLibrary::open_or_create(&path).unwrap();
        assert!(library.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap().trim(), "{}");
    }

    #[test]
    fn template_copy_is_timestamped_and_loadable() {
        let dir = tempdir().expect("tempdir");
        let path = create_from_template(dir.path()).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("prompts-") && name.ends_with(".json"));
        assert_eq!(name.len(), "prompts-YYYYMMDDHHMM.json".len());
        let library = TagLibrary::load(&path);
        assert!(library.find_category("Quality").is_some());
    }
}
