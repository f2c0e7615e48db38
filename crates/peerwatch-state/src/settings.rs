//! INI-style settings file.
//!
//! A minimal reader/writer for the `key = value` format used by the tunnel
//! dashboard's settings file. Section and entry order is preserved so that
//! rewriting the file only changes the entries Peerwatch touches. Comments
//! are dropped on save.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{StateError, StateResult};

#[derive(Debug, Clone, PartialEq)]
struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

/// In-memory copy of an INI settings file bound to its path.
#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
    sections: Vec<Section>,
}

impl SettingsFile {
    /// Load the file at `path`. A missing file yields an empty document.
    pub fn open(path: &Path) -> StateResult<Self> {
        match fs::read_to_string(path) {
            Ok(text) => {
                let settings = Self::parse(path, &text)?;
                debug!(?path, sections = settings.sections.len(), "settings file loaded");
                Ok(settings)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(?path, "settings file absent, starting empty");
                Ok(Self {
                    path: path.to_path_buf(),
                    sections: Vec::new(),
                })
            }
            Err(e) => Err(StateError::Read(format!("{}: {e}", path.display()))),
        }
    }

    /// Parse INI text. Keys are lower-cased; indented lines continue the
    /// previous value.
    pub fn parse(path: &Path, text: &str) -> StateResult<Self> {
        let mut sections: Vec<Section> = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            if raw.starts_with([' ', '\t']) {
                let Some((_, value)) = sections.last_mut().and_then(|s| s.entries.last_mut())
                else {
                    return Err(StateError::Parse {
                        line: line_no,
                        reason: "continuation line without a preceding key".to_string(),
                    });
                };
                value.push('\n');
                value.push_str(trimmed);
                continue;
            }

            if let Some(name) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                sections.push(Section {
                    name: name.trim().to_string(),
                    entries: Vec::new(),
                });
                continue;
            }

            let Some(split) = trimmed.find(['=', ':']) else {
                return Err(StateError::Parse {
                    line: line_no,
                    reason: format!("expected `key = value`, found `{trimmed}`"),
                });
            };
            let key = trimmed[..split].trim().to_lowercase();
            let value = trimmed[split + 1..].trim().to_string();

            let Some(section) = sections.last_mut() else {
                return Err(StateError::Parse {
                    line: line_no,
                    reason: "entry outside of any section".to_string(),
                });
            };
            match section.entries.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = value,
                None => section.entries.push((key, value)),
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            sections,
        })
    }

    /// Names of all sections, in file order.
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.name.as_str())
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        let key = key.to_lowercase();
        self.sections
            .iter()
            .find(|s| s.name == section)?
            .entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Insert or replace a value, creating the section if needed.
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        let key = key.to_lowercase();
        let index = match self.sections.iter().position(|s| s.name == section) {
            Some(index) => index,
            None => {
                self.sections.push(Section {
                    name: section.to_string(),
                    entries: Vec::new(),
                });
                self.sections.len() - 1
            }
        };
        let entries = &mut self.sections[index].entries;
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => entries.push((key, value.to_string())),
        }
    }

    /// Render the document back to INI text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&format!("[{}]\n", section.name));
            for (key, value) in &section.entries {
                let value = value.replace('\n', "\n\t");
                out.push_str(&format!("{key} = {value}\n"));
            }
        }
        out
    }

    /// Write the document to its path via a temporary file and rename.
    pub fn save(&self) -> StateResult<()> {
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, self.render())
            .map_err(|e| StateError::Write(format!("{}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| StateError::Write(format!("{}: {e}", self.path.display())))?;
        debug!(path = ?self.path, "settings file saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
[Server]
app_port = 10086
# dashboard comment
Log_Level = INFO

[Health:wg0]
enabled = false
ping_interval = 60
";

    #[test]
    fn parse_reads_sections_and_lowercases_keys() {
        let s = SettingsFile::parse(Path::new("x.ini"), SAMPLE).unwrap();
        let names: Vec<_> = s.section_names().collect();
        assert_eq!(names, vec!["Server", "Health:wg0"]);
        assert_eq!(s.get("Server", "log_level"), Some("INFO"));
        assert_eq!(s.get("Health:wg0", "ping_interval"), Some("60"));
        assert_eq!(s.get("Health:wg0", "missing"), None);
    }

    #[test]
    fn parse_rejects_entry_outside_section() {
        let err = SettingsFile::parse(Path::new("x.ini"), "key = value\n").unwrap_err();
        assert!(matches!(err, StateError::Parse { line: 1, .. }));
    }

    #[test]
    fn parse_rejects_garbage_line() {
        let err = SettingsFile::parse(Path::new("x.ini"), "[a]\nnot an entry\n").unwrap_err();
        assert!(matches!(err, StateError::Parse { line: 2, .. }));
    }

    #[test]
    fn continuation_lines_extend_value() {
        let s = SettingsFile::parse(Path::new("x.ini"), "[a]\nlist = one\n\ttwo\n").unwrap();
        assert_eq!(s.get("a", "list"), Some("one\ntwo"));
        let again = SettingsFile::parse(Path::new("x.ini"), &s.render()).unwrap();
        assert_eq!(again.get("a", "list"), Some("one\ntwo"));
    }

    #[test]
    fn set_preserves_foreign_sections() {
        let mut s = SettingsFile::parse(Path::new("x.ini"), SAMPLE).unwrap();
        s.set("Health:wg1", "enabled", "true");
        s.set("Health:wg0", "enabled", "true");

        let rendered = s.render();
        assert!(rendered.contains("[Server]\napp_port = 10086\nlog_level = INFO\n"));
        assert!(rendered.contains("[Health:wg0]\nenabled = true\nping_interval = 60\n"));
        assert!(rendered.ends_with("[Health:wg1]\nenabled = true\n"));
    }

    #[test]
    fn open_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let s = SettingsFile::open(&dir.path().join("absent.ini")).unwrap();
        assert_eq!(s.section_names().count(), 0);
    }

    #[test]
    fn save_then_open_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.ini");

        let mut s = SettingsFile::open(&path).unwrap();
        s.set("Health:wg0", "keepalive_value", "25");
        s.save().unwrap();

        let reopened = SettingsFile::open(&path).unwrap();
        assert_eq!(reopened.get("Health:wg0", "keepalive_value"), Some("25"));
        assert!(!path.with_extension("tmp").exists());
    }
}
