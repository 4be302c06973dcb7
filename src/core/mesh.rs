use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

use crate::core::pipeline;
use crate::models::PipelineDef;

/// The named table of externally defined pipelines, read once at startup
/// from `<dir>/<name>.json` files (file stem = pipeline name) and immutable
/// afterwards.
#[derive(Debug, Default)]
pub struct Mesh {
    pipelines: HashMap<String, PipelineDef>,
}

impl Mesh {
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let mut pipelines = HashMap::new();
        let Some(dir) = dir else {
            return Ok(Mesh { pipelines });
        };
        for entry in
            std::fs::read_dir(dir).with_context(|| format!("reading pipelines dir {:?}", dir))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
            else {
                continue;
            };
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading pipeline {:?}", path))?;
            let def: PipelineDef = serde_json::from_str(&text)
                .with_context(|| format!("parsing pipeline {:?}", path))?;
            pipeline::validate(&def)
                .map_err(|m| anyhow::anyhow!("pipeline {:?}: {}", path, m))?;
            tracing::debug!(pipeline = %name, "loaded pipeline definition");
            pipelines.insert(name, def);
        }
        Ok(Mesh { pipelines })
    }

    pub fn get(&self, name: &str) -> Option<&PipelineDef> {
        self.pipelines.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, def: PipelineDef) {
        self.pipelines.insert(name.into(), def);
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("enrich.json")).unwrap();
        write!(
            f,
            r#"{{"processors":{{"a":{{"type":"static","value":{{"id":1}}}}}},
                 "connections":[{{"from":"a.id","to":"_out.id"}}]}}"#
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mesh = Mesh::load(Some(dir.path())).unwrap();
        assert_eq!(mesh.len(), 1);
        assert!(mesh.get("enrich").is_some());
        assert!(mesh.get("notes").is_none());
    }

    #[test]
    fn test_invalid_pipeline_aborts_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("bad.json"),
            r#"{"processors":{},"connections":[{"from":"ghost.x","to":"_out.x"}]}"#,
        )
        .unwrap();
        assert!(Mesh::load(Some(dir.path())).is_err());
    }

    #[test]
    fn test_bad_sql_template_aborts_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("bad.json"),
            r#"{"processors":{"q":{"type":"sql","query":""}},"connections":[]}"#,
        )
        .unwrap();
        assert!(Mesh::load(Some(dir.path())).is_err());
    }

    #[test]
    fn test_missing_dir_is_empty_mesh() {
        let mesh = Mesh::load(None).unwrap();
        assert!(mesh.is_empty());
    }
}
