use std::fmt;

use serde_yaml::{Mapping, Value};

use crate::error::SettingsError;

/// Key path of the one list field the panel is allowed to rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPath(Vec<String>);

impl TargetPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Parent segments and the final key. `None` for an empty path.
    pub fn split_last(&self) -> Option<(&[String], &str)> {
        self.0
            .split_last()
            .map(|(last, parents)| (parents, last.as_str()))
    }
}

impl Default for TargetPath {
    fn default() -> Self {
        Self::new(["ScraperSettings", "usernames"])
    }
}

impl fmt::Display for TargetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Parsed `settings.yaml` plus the exact text it was parsed from.
///
/// Everything outside the target list is opaque: the panel never interprets
/// credentials, timeouts or report paths, it only carries them through.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDocument {
    raw: String,
    root: Value,
}

impl ConfigDocument {
    pub fn parse(raw: impl Into<String>) -> Result<Self, SettingsError> {
        let raw = raw.into();
        let root = serde_yaml::from_str::<Value>(&raw).map_err(|e| SettingsError::from_yaml(&e))?;
        Ok(Self { raw, root })
    }

    pub fn empty() -> Self {
        Self {
            raw: String::new(),
            root: Value::Null,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn lookup(&self, path: &TargetPath) -> Option<&Value> {
        let mut cur = &self.root;
        for seg in path.segments() {
            cur = cur.as_mapping()?.get(seg.as_str())?;
        }
        Some(cur)
    }

    /// Current target list; `None` when the field is absent or not a list of strings.
    pub fn targets(&self, path: &TargetPath) -> Option<Vec<String>> {
        let seq = self.lookup(path)?.as_sequence()?;
        seq.iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    /// The document with the target field removed: the part a patch must not touch.
    pub fn rest(&self, path: &TargetPath) -> Value {
        let mut root = self.root.clone();
        if let Some((parents, key)) = path.split_last() {
            let mut cur = Some(&mut root);
            for seg in parents {
                cur = cur
                    .and_then(Value::as_mapping_mut)
                    .and_then(|m| m.get_mut(seg.as_str()));
            }
            if let Some(map) = cur.and_then(Value::as_mapping_mut) {
                map.remove(key);
            }
        }
        root
    }

    /// Returns a copy of the tree with the target field set, creating parent
    /// mappings as needed.
    pub(crate) fn with_targets(
        &self,
        path: &TargetPath,
        names: &[String],
    ) -> Result<Value, SettingsError> {
        let Some((parents, key)) = path.split_last() else {
            return Err(SettingsError::Validation("target path is empty".into()));
        };
        let mut root = self.root.clone();
        if root.is_null() {
            root = Value::Mapping(Mapping::new());
        }
        let mut cur = &mut root;
        for seg in parents {
            let map = cur.as_mapping_mut().ok_or_else(|| {
                SettingsError::Validation(format!("`{seg}` cannot be nested under a non-mapping"))
            })?;
            let entry = map
                .entry(Value::String(seg.clone()))
                .or_insert_with(|| Value::Mapping(Mapping::new()));
            if entry.is_null() {
                *entry = Value::Mapping(Mapping::new());
            }
            cur = entry;
        }
        let map = cur.as_mapping_mut().ok_or_else(|| {
            SettingsError::Validation(format!("parent of `{path}` is not a mapping"))
        })?;
        map.insert(
            Value::String(key.to_string()),
            Value::Sequence(names.iter().cloned().map(Value::String).collect()),
        );
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
ScraperSettings:
  base_url: https://www.threads.net
  usernames:
    - alice
    - bob
  timeouts:
    page_load: 20
AnalysisSettings:
  input_file: data/profiles.json
";

    #[test]
    fn reads_target_list() {
        let doc = ConfigDocument::parse(SAMPLE).unwrap();
        assert_eq!(
            doc.targets(&TargetPath::default()),
            Some(vec!["alice".to_string(), "bob".to_string()])
        );
    }

    #[test]
    fn rest_drops_only_the_target_field() {
        let doc = ConfigDocument::parse(SAMPLE).unwrap();
        let rest = doc.rest(&TargetPath::default());
        let scraper = rest.get("ScraperSettings").unwrap();
        assert!(scraper.get("usernames").is_none());
        assert!(scraper.get("timeouts").is_some());
        assert!(rest.get("AnalysisSettings").is_some());
    }

    #[test]
    fn empty_text_is_null_document() {
        let doc = ConfigDocument::parse("# only a comment\n").unwrap();
        assert!(doc.root().is_null());
        assert_eq!(doc.targets(&TargetPath::default()), None);
    }

    #[test]
    fn with_targets_creates_missing_sections() {
        let doc = ConfigDocument::empty();
        let root = doc
            .with_targets(&TargetPath::default(), &["carol".to_string()])
            .unwrap();
        let list = root["ScraperSettings"]["usernames"].as_sequence().unwrap();
        assert_eq!(list.len(), 1);
    }
}
