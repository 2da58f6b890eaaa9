//! Lookup of vendor XML configuration files.
//!
//! Multi-device sessions are described by an XML file shipped with the
//! vendor library. These helpers locate such files by name in a list of
//! search directories.

use crate::error::{GlazError, GlazResult};
use std::fs;
use std::path::PathBuf;

/// Files tried, in order, when no configuration name is given.
pub const DEFAULT_CONFIGS: [&str; 2] = ["single_spectrometer.xml", "double_spectrometer.xml"];

/// `./configs`, then the current directory.
pub fn default_search_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("configs"), PathBuf::from(".")]
}

fn has_xml_extension(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".xml")
}

fn first_match<'a>(
    names: impl IntoIterator<Item = &'a str>,
    search_dirs: &[PathBuf],
) -> Option<PathBuf> {
    names.into_iter().find_map(|name| {
        search_dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    })
}

/// Find a vendor configuration file.
///
/// `name` may omit the `.xml` extension. With no name, the first of
/// [`DEFAULT_CONFIGS`] found in any search directory is returned; each
/// default is looked for in every directory before the next one is tried.
///
/// # Errors
///
/// `GlazError::ConfigFileNotFound` if nothing matches.
pub fn find_config_file(name: Option<&str>, search_dirs: &[PathBuf]) -> GlazResult<PathBuf> {
    let found = match name {
        None => first_match(DEFAULT_CONFIGS, search_dirs).ok_or_else(|| {
            GlazError::ConfigFileNotFound(format!(
                "none of the default configurations ({}) in {}",
                DEFAULT_CONFIGS.join(", "),
                describe(search_dirs)
            ))
        })?,
        Some(name) => {
            let file_name = if has_xml_extension(name) {
                name.to_string()
            } else {
                format!("{name}.xml")
            };
            first_match([file_name.as_str()], search_dirs).ok_or_else(|| {
                GlazError::ConfigFileNotFound(format!("{file_name} in {}", describe(search_dirs)))
            })?
        }
    };
    tracing::debug!(path = %found.display(), "Found vendor configuration");
    Ok(found)
}

/// Every `.xml` file directly inside the search directories.
///
/// Missing directories are skipped. Files are sorted within each directory;
/// directories keep their search order.
pub fn list_available_configs(search_dirs: &[PathBuf]) -> GlazResult<Vec<PathBuf>> {
    let mut configs = Vec::new();
    for dir in search_dirs.iter().filter(|dir| dir.is_dir()) {
        let mut found = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_xml = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(has_xml_extension);
            if is_xml && path.is_file() {
                found.push(path);
            }
        }
        found.sort();
        configs.extend(found);
    }
    Ok(configs)
}

fn describe(search_dirs: &[PathBuf]) -> String {
    let dirs: Vec<String> = search_dirs
        .iter()
        .map(|dir| dir.display().to_string())
        .collect();
    format!("[{}]", dirs.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "<config/>").expect("write fixture");
        path
    }

    #[test]
    fn test_extension_is_optional() {
        let dir = TempDir::new().expect("tempdir");
        let expected = touch(dir.path(), "lab.xml");
        let dirs = vec![dir.path().to_path_buf()];

        assert_eq!(find_config_file(Some("lab"), &dirs).expect("by stem"), expected);
        assert_eq!(find_config_file(Some("lab.xml"), &dirs).expect("by name"), expected);
    }

    #[test]
    fn test_uppercase_extension_is_kept() {
        let dir = TempDir::new().expect("tempdir");
        let expected = touch(dir.path(), "LAB.XML");
        let dirs = vec![dir.path().to_path_buf()];
        assert_eq!(find_config_file(Some("LAB.XML"), &dirs).expect("found"), expected);
    }

    #[test]
    fn test_default_preference_order() {
        let first = TempDir::new().expect("tempdir");
        let second = TempDir::new().expect("tempdir");
        touch(first.path(), "double_spectrometer.xml");
        let single = touch(second.path(), "single_spectrometer.xml");
        let dirs = vec![first.path().to_path_buf(), second.path().to_path_buf()];

        // single_spectrometer wins even though it sits in a later directory.
        assert_eq!(find_config_file(None, &dirs).expect("default"), single);
    }

    #[test]
    fn test_missing_config() {
        let dir = TempDir::new().expect("tempdir");
        let err = find_config_file(Some("absent"), &[dir.path().to_path_buf()])
            .expect_err("should be missing");
        assert!(matches!(err, GlazError::ConfigFileNotFound(_)));
        assert!(err.to_string().contains("absent.xml"));
    }

    #[test]
    fn test_list_skips_other_files_and_missing_dirs() {
        let dir = TempDir::new().expect("tempdir");
        let b = touch(dir.path(), "b.xml");
        let a = touch(dir.path(), "a.XML");
        touch(dir.path(), "notes.txt");
        let dirs = vec![dir.path().join("missing"), dir.path().to_path_buf()];

        assert_eq!(list_available_configs(&dirs).expect("list"), vec![a, b]);
    }
}
