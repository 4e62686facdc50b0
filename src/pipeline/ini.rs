//! Minimal INI reader/writer for the record side files.
//!
//! Format: `[section]` headers, `key = value` (or `key: value`) lines,
//! `#`/`;` comments. Section names may contain spaces and URIs
//! (`[image http://host/foo.jpg]`). Keys are kept verbatim; values are
//! trimmed. Sections and keys are written back in sorted order.

use std::collections::BTreeMap;
use std::path::Path;

/// Parsed INI document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniFile {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl IniFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `path`; a missing file is an empty document.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e),
        }
    }

    /// Parse INI text. Lines before the first section and malformed lines are ignored.
    pub fn parse(text: &str) -> Self {
        let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        let mut current: Option<String> = None;

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let name = name.trim().to_string();
                sections.entry(name.clone()).or_default();
                current = Some(name);
                continue;
            }
            let Some(section) = current.as_ref() else {
                continue;
            };
            // Keys never contain `=` or `:`, values (URLs) may.
            if let Some(pos) = line.find(['=', ':']) {
                let key = line[..pos].trim();
                let value = line[pos + 1..].trim();
                if !key.is_empty() {
                    sections
                        .entry(section.clone())
                        .or_default()
                        .insert(key.to_string(), value.to_string());
                }
            }
        }

        Self { sections }
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
    }

    pub fn has(&self, section: &str, key: &str) -> bool {
        self.get(section, key).is_some()
    }

    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Serialise to INI text.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (name, entries) in &self.sections {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("[{name}]\n"));
            for (key, value) in entries {
                out.push_str(&format!("{key} = {value}\n"));
            }
        }
        out
    }

    /// Write to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_with_uri_names_and_url_values() {
        let text = "\
# records
[image http://example.com/foo.jpg]
uploaded = http://blog/wp-content/foo.jpg
uploaded-rot90: http://blog/wp-content/foo-rot90.jpg

[post /home/me/post.md]
id = 42
";
        let ini = IniFile::parse(text);
        assert_eq!(
            ini.get("image http://example.com/foo.jpg", "uploaded"),
            Some("http://blog/wp-content/foo.jpg")
        );
        assert_eq!(
            ini.get("image http://example.com/foo.jpg", "uploaded-rot90"),
            Some("http://blog/wp-content/foo-rot90.jpg")
        );
        assert_eq!(ini.get("post /home/me/post.md", "id"), Some("42"));
        assert!(!ini.has("post /home/me/post.md", "title"));
    }

    #[test]
    fn set_then_reparse_keeps_other_keys() {
        let mut ini = IniFile::parse("[image U]\nuploaded = http://host/x.jpg\n");
        ini.set("image U", "uploaded-rot90", "http://host/x-90.jpg");
        let again = IniFile::parse(&ini.to_text());
        assert_eq!(again.get("image U", "uploaded"), Some("http://host/x.jpg"));
        assert_eq!(again.get("image U", "uploaded-rot90"), Some("http://host/x-90.jpg"));
        assert_eq!(again, ini);
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ini = IniFile::load(&dir.path().join("nope.ini")).unwrap();
        assert_eq!(ini.sections().count(), 0);
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("images.ini");
        let mut ini = IniFile::new();
        ini.set("image a.png", "uploaded", "http://host/a.png");
        ini.save(&path).unwrap();
        assert_eq!(IniFile::load(&path).unwrap(), ini);
    }
}
