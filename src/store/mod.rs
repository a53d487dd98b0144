//! Persistence store for exercises, completions and settings.
//!
//! Three fixed keys, each holding one JSON document. Reads never fail:
//! missing or corrupt data falls back to an empty list or default settings
//! and is logged. Writes are last-write-wins with no locking.

pub mod kv;
pub mod models;

use crate::error::{PhysioError, Result};
use crate::stats::{CompletionStats, DayHistory, compute_stats, history_by_day};
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub use kv::{FileStore, KeyValueStore, MemoryStore};
pub use models::{
    CompletionEvent, CompletionSource, Exercise, Settings, SettingsPatch, ThemePreference,
};

/// Storage key for the exercise list.
pub const KEY_EXERCISES: &str = "physio_exercises";

/// Storage key for the completion log.
pub const KEY_COMPLETIONS: &str = "physio_completions";

/// Storage key for the settings record.
pub const KEY_SETTINGS: &str = "physio_settings";

/// Typed access to the persisted app state.
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn KeyValueStore>,
}

impl Storage {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// File-backed storage rooted at `dir`.
    pub fn open_dir(dir: impl Into<std::path::PathBuf>) -> Self {
        Self::new(Arc::new(FileStore::new(dir)))
    }

    /// Ephemeral storage that lives as long as this value.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Read `key`, substituting `T::default()` for missing or corrupt data.
    pub fn get<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let raw = match self.backend.read(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return T::default(),
            Err(e) => {
                warn!(key, error = %e, "cannot read stored value; using default");
                return T::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "stored value is corrupt; using default");
                T::default()
            }
        }
    }

    /// Serialize `value` and overwrite `key`.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.backend.write(key, &json)?;
        debug!(key, bytes = json.len(), "stored value");
        Ok(())
    }

    // -- exercises ---------------------------------------------------------

    /// Exercises ordered by `position`.
    pub fn list_exercises(&self) -> Vec<Exercise> {
        let mut exercises: Vec<Exercise> = self.get(KEY_EXERCISES);
        exercises.sort_by_key(|e| e.position);
        exercises
    }

    /// Replace the whole exercise list. Ids must be unique.
    pub fn save_exercises(&self, exercises: &[Exercise]) -> Result<()> {
        let mut seen = HashSet::with_capacity(exercises.len());
        if let Some(dup) = exercises.iter().find(|e| !seen.insert(e.id.as_str())) {
            return Err(PhysioError::Validation(format!(
                "duplicate exercise id: {}",
                dup.id
            )));
        }
        self.store_exercises(exercises)
    }

    fn store_exercises(&self, exercises: &[Exercise]) -> Result<()> {
        self.set(KEY_EXERCISES, exercises)
    }

    /// Append a new exercise at the end of the routine.
    pub fn add_exercise(&self, name: &str, note: Option<&str>) -> Result<Exercise> {
        let name = validate_name(name)?;
        let mut exercises = self.list_exercises();
        let exercise = Exercise::new(name, normalize_note(note), exercises.len() as u32);
        exercises.push(exercise.clone());
        self.store_exercises(&exercises)?;
        Ok(exercise)
    }

    /// Rename an exercise and replace its note.
    pub fn update_exercise(&self, id: &str, name: &str, note: Option<&str>) -> Result<Exercise> {
        let name = validate_name(name)?;
        let mut exercises = self.list_exercises();
        let exercise = exercises
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| PhysioError::NotFound(format!("exercise {id}")))?;
        exercise.name = name;
        exercise.note = normalize_note(note);
        let updated = exercise.clone();
        self.store_exercises(&exercises)?;
        Ok(updated)
    }

    /// Remove an exercise and close the gap in positions.
    pub fn delete_exercise(&self, id: &str) -> Result<()> {
        let mut exercises = self.list_exercises();
        let before = exercises.len();
        exercises.retain(|e| e.id != id);
        if exercises.len() == before {
            return Err(PhysioError::NotFound(format!("exercise {id}")));
        }
        renumber(&mut exercises);
        self.store_exercises(&exercises)
    }

    /// Move the exercise at index `from` to index `to`, renumbering positions.
    pub fn move_exercise(&self, from: usize, to: usize) -> Result<Vec<Exercise>> {
        let mut exercises = self.list_exercises();
        if from >= exercises.len() || to >= exercises.len() {
            return Err(PhysioError::Validation(format!(
                "move {from} -> {to} out of range for {} exercises",
                exercises.len()
            )));
        }
        let moved = exercises.remove(from);
        exercises.insert(to, moved);
        renumber(&mut exercises);
        self.store_exercises(&exercises)?;
        Ok(exercises)
    }

    // -- completions -------------------------------------------------------

    /// The completion log in insertion order.
    pub fn get_completions(&self) -> Vec<CompletionEvent> {
        self.get(KEY_COMPLETIONS)
    }

    /// Append a completion stamped now.
    pub fn add_completion(&self, source: CompletionSource) -> Result<CompletionEvent> {
        self.add_completion_at(source, Utc::now())
    }

    /// Append a completion with an explicit timestamp.
    pub fn add_completion_at(
        &self,
        source: CompletionSource,
        timestamp: DateTime<Utc>,
    ) -> Result<CompletionEvent> {
        let mut completions = self.get_completions();
        let completion = CompletionEvent::new(source, timestamp);
        completions.push(completion.clone());
        self.set(KEY_COMPLETIONS, &completions)?;
        Ok(completion)
    }

    // -- settings ----------------------------------------------------------

    /// Stored settings overlaid on defaults.
    pub fn get_settings(&self) -> Settings {
        self.get(KEY_SETTINGS)
    }

    /// Merge `patch` into the stored settings and persist the result.
    pub fn save_settings(&self, patch: &SettingsPatch) -> Result<Settings> {
        let updated = self.get_settings().merged(patch);
        self.set(KEY_SETTINGS, &updated)?;
        Ok(updated)
    }

    // -- stats -------------------------------------------------------------

    /// Completion counts relative to `now`.
    pub fn get_stats<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> CompletionStats {
        compute_stats(&self.get_completions(), now)
    }

    /// Completion history grouped by calendar day in `tz`.
    pub fn get_history<Tz: TimeZone>(&self, tz: &Tz) -> Vec<DayHistory> {
        history_by_day(&self.get_completions(), tz)
    }
}

fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(PhysioError::Validation(
            "exercise name cannot be empty".to_owned(),
        ));
    }
    Ok(trimmed.to_owned())
}

fn normalize_note(note: Option<&str>) -> Option<String> {
    note.map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_owned)
}

fn renumber(exercises: &mut [Exercise]) {
    for (index, exercise) in exercises.iter_mut().enumerate() {
        exercise.position = index as u32;
    }
}
