//! Class name ordering
//!
//! The classifier's output index `i` means the `i`-th class directory of the
//! training split, sorted alphabetically. That ordering is persisted as a
//! newline-delimited text file next to the weights, since the weight file
//! itself carries no labels.

use std::fs;
use std::path::Path;

use tracing::warn;

use crate::utils::error::{PlantDiseaseError, Result};

/// Default file name for the persisted class ordering
pub const CLASS_NAMES_FILE: &str = "class_names.txt";

/// Read a class-name file: one name per line, blank lines skipped, whitespace trimmed
pub fn read_class_names_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

/// Write a class-name file, newline-joined without a trailing newline
pub fn write_class_names_file(path: &Path, class_names: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, class_names.join("\n"))?;
    Ok(())
}

/// Alphabetically sorted subdirectory names of a directory
pub fn sorted_subdirectories(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Err(PlantDiseaseError::PathNotFound(dir.to_path_buf()));
    }

    let mut names: Vec<String> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().to_str().map(String::from))
        .collect();
    names.sort();

    Ok(names)
}

/// Class names of a split dataset: the sorted class folders of `<data_dir>/train`
pub fn class_names_from_dataset(data_dir: &Path) -> Result<Vec<String>> {
    sorted_subdirectories(&data_dir.join("train"))
}

/// Generic `Class_<i>` names for indices `start..end`
pub fn placeholder_class_names(start: usize, end: usize) -> Vec<String> {
    (start..end).map(|i| format!("Class_{}", i)).collect()
}

/// Force the class list to exactly `num_classes` entries.
///
/// Extra names are dropped from the end; missing ones are filled with
/// `Class_<i>` placeholders. Either correction is logged as a warning.
pub fn reconcile_class_names(mut class_names: Vec<String>, num_classes: usize) -> Vec<String> {
    let found = class_names.len();
    if found == num_classes {
        return class_names;
    }

    warn!(
        "Class name count ({}) doesn't match model output classes ({})",
        found, num_classes
    );

    if found > num_classes {
        class_names.truncate(num_classes);
        warn!("Trimmed to first {} class names", num_classes);
    } else {
        class_names.extend(placeholder_class_names(found, num_classes));
        warn!("Added generic names for classes {}..{}", found, num_classes);
    }

    class_names
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_skips_blank_lines_and_trims() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CLASS_NAMES_FILE);
        fs::write(&path, "  Apple___scab \n\n Tomato___healthy\n   \n").unwrap();

        let names = read_class_names_file(&path).unwrap();
        assert_eq!(names, vec!["Apple___scab", "Tomato___healthy"]);
    }

    #[test]
    fn test_write_has_no_trailing_newline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(CLASS_NAMES_FILE);
        let names = vec!["a".to_string(), "b".to_string()];

        write_class_names_file(&path, &names).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "a\nb");
        assert_eq!(read_class_names_file(&path).unwrap(), names);
    }

    #[test]
    fn test_class_names_from_dataset_sorted() {
        let dir = tempdir().unwrap();
        for name in ["Tomato___healthy", "Apple___scab", "Corn___rust"] {
            fs::create_dir_all(dir.path().join("train").join(name)).unwrap();
        }
        // Stray files are not classes
        fs::write(dir.path().join("train").join("README.txt"), "x").unwrap();

        let names = class_names_from_dataset(dir.path()).unwrap();
        assert_eq!(names, vec!["Apple___scab", "Corn___rust", "Tomato___healthy"]);
    }

    #[test]
    fn test_class_names_from_dataset_missing_train() {
        let dir = tempdir().unwrap();
        let result = class_names_from_dataset(dir.path());
        assert!(matches!(result, Err(PlantDiseaseError::PathNotFound(_))));
    }

    #[test]
    fn test_reconcile_pads_with_placeholders() {
        let names = vec!["a".to_string(), "b".to_string()];
        let names = reconcile_class_names(names, 4);
        assert_eq!(names, vec!["a", "b", "Class_2", "Class_3"]);
    }

    #[test]
    fn test_reconcile_truncates() {
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(reconcile_class_names(names, 2), vec!["a", "b"]);
    }

    #[test]
    fn test_reconcile_exact_is_unchanged() {
        let names = vec!["x".to_string()];
        assert_eq!(reconcile_class_names(names.clone(), 1), names);
    }
}
