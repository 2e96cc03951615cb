use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

use serde::{
    Deserialize,
    Serialize,
};

use crate::core::KiokuError;

const APP_NAME: &str = "kioku";

pub fn get_app_data_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_local_dir() {
        let app_dir = data_dir.join(APP_NAME);
        let _ = fs::create_dir_all(&app_dir);
        app_dir
    } else {
        PathBuf::from(".")
    }
}

pub fn get_data_file_path(filename: &str) -> PathBuf {
    get_app_data_dir().join(filename)
}

pub fn save_json<T: Serialize>(data: &T, filename: &str) -> Result<(), KiokuError> {
    save_json_to(data, &get_data_file_path(filename))
}

pub fn save_json_to<T: Serialize>(data: &T, path: &Path) -> Result<(), KiokuError> {
    write_atomically(&serde_json::to_string_pretty(data)?, path)
}

/// Single-line variant for files rewritten on every change.
pub fn save_json_compact_to<T: Serialize>(data: &T, path: &Path) -> Result<(), KiokuError> {
    write_atomically(&serde_json::to_string(data)?, path)
}

fn write_atomically(json: &str, path: &Path) -> Result<(), KiokuError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Readers only ever see a complete file.
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, path)?;
    tracing::debug!(path = %path.display(), "data saved");
    Ok(())
}

pub fn load_json_from<T: for<'de> Deserialize<'de> + Default>(
    path: &Path,
) -> Result<T, KiokuError> {
    if !path.exists() {
        return Ok(T::default());
    }

    let json = fs::read_to_string(path)?;
    let data: T = serde_json::from_str(&json)?;
    tracing::debug!(path = %path.display(), "data loaded");
    Ok(data)
}

pub fn load_json_or_default<T: for<'de> Deserialize<'de> + Default>(filename: &str) -> T {
    load_json_from_or_default(&get_data_file_path(filename))
}

pub fn load_json_from_or_default<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> T {
    match load_json_from::<T>(path) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to load, using defaults");
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_round_trip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.json");

        let missing: BTreeMap<String, u32> = load_json_from(&path).unwrap();
        assert!(missing.is_empty());

        let mut data = BTreeMap::new();
        data.insert("a".to_string(), 1u32);
        save_json_to(&data, &path).unwrap();

        let loaded: BTreeMap<String, u32> = load_json_from(&path).unwrap();
        assert_eq!(loaded, data);

        data.insert("b".to_string(), 2u32);
        save_json_compact_to(&data, &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), r#"{"a":1,"b":2}"#);
        let loaded: BTreeMap<String, u32> = load_json_from(&path).unwrap();
        assert_eq!(loaded, data);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(load_json_from::<BTreeMap<String, u32>>(&path).is_err());
        let loaded: BTreeMap<String, u32> = load_json_from_or_default(&path);
        assert!(loaded.is_empty());
    }
}
