use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One kind of tracked record and where its database lives relative to the
/// project root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityType {
    pub subdirectory: String,
    pub dbfilename: String,
    pub caption: String,
    #[serde(default)]
    pub ganttable: bool,
    #[serde(default)]
    pub traceable: bool,
}

/// Named entity types for one project. Loadable from a JSON file so projects
/// can carry their own set; `builtin` covers the common case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry {
    entities: BTreeMap<String, EntityType>,
}

impl Registry {
    pub fn builtin() -> Registry {
        let mut entities = BTreeMap::new();
        entities.insert(
            "milestone".to_string(),
            EntityType {
                subdirectory: "milestones".to_string(),
                dbfilename: "milestones.db".to_string(),
                caption: "Milestone".to_string(),
                ganttable: true,
                traceable: true,
            },
        );
        entities.insert(
            "task".to_string(),
            EntityType {
                subdirectory: "tasks".to_string(),
                dbfilename: "tasks.db".to_string(),
                caption: "Task".to_string(),
                ganttable: true,
                traceable: true,
            },
        );
        entities.insert(
            "reqspec".to_string(),
            EntityType {
                subdirectory: "reqspecs".to_string(),
                dbfilename: "reqspecs.db".to_string(),
                caption: "Requirement".to_string(),
                ganttable: false,
                traceable: true,
            },
        );
        entities.insert(
            "interface".to_string(),
            EntityType {
                subdirectory: "interfaces".to_string(),
                dbfilename: "interfaces.db".to_string(),
                caption: "Interface".to_string(),
                ganttable: false,
                traceable: true,
            },
        );
        entities.insert(
            "risk".to_string(),
            EntityType {
                subdirectory: "risks".to_string(),
                dbfilename: "risks.db".to_string(),
                caption: "Risk".to_string(),
                ganttable: false,
                traceable: false,
            },
        );
        Registry { entities }
    }

    pub fn from_file(path: &Path) -> Result<Registry, RegistryError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| RegistryError::Io(path.display().to_string(), err))?;
        let entities: BTreeMap<String, EntityType> = serde_json::from_str(&raw)
            .map_err(|err| RegistryError::Json(path.display().to_string(), err))?;
        Ok(Registry { entities })
    }

    pub fn entity(&self, name: &str) -> Result<&EntityType, RegistryError> {
        self.entities
            .get(name)
            .ok_or_else(|| RegistryError::UnknownEntity {
                name: name.to_string(),
                known: self.entity_names().join(", "),
            })
    }

    pub fn entity_names(&self) -> Vec<&str> {
        self.entities.keys().map(String::as_str).collect()
    }

    /// Entity names whose records may appear as trace targets.
    pub fn traceable_names(&self) -> Vec<&str> {
        self.entities
            .iter()
            .filter(|(_, entity)| entity.traceable)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn db_path(&self, root: &Path, name: &str) -> Result<PathBuf, RegistryError> {
        let entity = self.entity(name)?;
        Ok(root.join(&entity.subdirectory).join(&entity.dbfilename))
    }
}

#[derive(Debug)]
pub enum RegistryError {
    Io(String, std::io::Error),
    Json(String, serde_json::Error),
    UnknownEntity { name: String, known: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Io(path, err) => write!(f, "cannot read registry {path}: {err}"),
            RegistryError::Json(path, err) => write!(f, "registry {path} is not valid JSON: {err}"),
            RegistryError::UnknownEntity { name, known } => {
                write!(f, "unknown entity type '{name}' (known: {known})")
            }
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RegistryError::Io(_, err) => Some(err),
            RegistryError::Json(_, err) => Some(err),
            RegistryError::UnknownEntity { .. } => None,
        }
    }
}
