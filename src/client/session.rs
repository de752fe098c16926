use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// One independently persisted piece of client state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Prompt,
    InputImage,
    ActiveJob,
    Results,
}

impl Slot {
    pub fn key(self) -> &'static str {
        match self {
            Slot::Prompt => "thumbnail_prompt",
            Slot::InputImage => "thumbnail_input_image",
            Slot::ActiveJob => "thumbnail_active_job",
            Slot::Results => "thumbnail_results",
        }
    }
}

/// Durable key/value storage for the client slots. Each slot is written and
/// cleared on its own; no operation touches more than one slot.
pub trait SessionStore: Send + Sync {
    fn read(&self, slot: Slot) -> Result<Option<String>, SessionError>;
    fn write(&self, slot: Slot, value: &str) -> Result<(), SessionError>;
    fn clear(&self, slot: Slot) -> Result<(), SessionError>;
}

/// Stores each slot as its own file in a state directory.
///
/// Writes go to a temporary file that is renamed over the slot file, so a
/// crash mid-write leaves the previous value intact.
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, SessionError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, slot: Slot) -> PathBuf {
        self.dir.join(slot.key())
    }
}

impl SessionStore for FileSessionStore {
    fn read(&self, slot: Slot) -> Result<Option<String>, SessionError> {
        match fs::read_to_string(self.path(slot)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, slot: Slot, value: &str) -> Result<(), SessionError> {
        let path = self.path(slot);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn clear(&self, slot: Slot) -> Result<(), SessionError> {
        match fs::remove_file(self.path(slot)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    slots: Mutex<HashMap<Slot, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn read(&self, slot: Slot) -> Result<Option<String>, SessionError> {
        let slots = self.slots.lock().map_err(|_| SessionError::Poisoned)?;
        Ok(slots.get(&slot).cloned())
    }

    fn write(&self, slot: Slot, value: &str) -> Result<(), SessionError> {
        let mut slots = self.slots.lock().map_err(|_| SessionError::Poisoned)?;
        slots.insert(slot, value.to_string());
        Ok(())
    }

    fn clear(&self, slot: Slot) -> Result<(), SessionError> {
        let mut slots = self.slots.lock().map_err(|_| SessionError::Poisoned)?;
        slots.remove(&slot);
        Ok(())
    }
}

/// All four slots read at once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub prompt: Option<String>,
    pub input_image: Option<String>,
    pub active_job: Option<Uuid>,
    pub results: Vec<String>,
}

/// Typed access to the client slots.
#[derive(Clone)]
pub struct ClientSession {
    store: Arc<dyn SessionStore>,
}

impl ClientSession {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        Ok(SessionSnapshot {
            prompt: self.prompt()?,
            input_image: self.input_image()?,
            active_job: self.active_job()?,
            results: self.results()?,
        })
    }

    pub fn prompt(&self) -> Result<Option<String>, SessionError> {
        self.store.read(Slot::Prompt)
    }

    pub fn set_prompt(&self, prompt: &str) -> Result<(), SessionError> {
        self.store.write(Slot::Prompt, prompt)
    }

    pub fn input_image(&self) -> Result<Option<String>, SessionError> {
        self.store.read(Slot::InputImage)
    }

    pub fn set_input_image(&self, image: Option<&str>) -> Result<(), SessionError> {
        match image {
            Some(image) => self.store.write(Slot::InputImage, image),
            None => self.store.clear(Slot::InputImage),
        }
    }

    /// Forget the prompt and reference image, leaving job and results alone.
    pub fn clear_draft(&self) -> Result<(), SessionError> {
        self.store.clear(Slot::Prompt)?;
        self.store.clear(Slot::InputImage)
    }

    /// The job currently being tracked. An unreadable marker is discarded.
    pub fn active_job(&self) -> Result<Option<Uuid>, SessionError> {
        let Some(raw) = self.store.read(Slot::ActiveJob)? else {
            return Ok(None);
        };
        match Uuid::parse_str(raw.trim()) {
            Ok(id) => Ok(Some(id)),
            Err(e) => {
                tracing::warn!(value = %raw, error = %e, "Discarding corrupt active job marker");
                self.store.clear(Slot::ActiveJob)?;
                Ok(None)
            }
        }
    }

    pub fn set_active_job(&self, job_id: Uuid) -> Result<(), SessionError> {
        self.store.write(Slot::ActiveJob, &job_id.to_string())
    }

    pub fn clear_active_job(&self) -> Result<(), SessionError> {
        self.store.clear(Slot::ActiveJob)
    }

    pub fn results(&self) -> Result<Vec<String>, SessionError> {
        match self.store.read(Slot::Results)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    /// Append images not already cached. Returns how many were added.
    pub fn merge_results(&self, images: &[String]) -> Result<usize, SessionError> {
        let mut cached = self.results()?;
        let before = cached.len();
        for image in images {
            if !cached.contains(image) {
                cached.push(image.clone());
            }
        }
        let added = cached.len() - before;
        if added > 0 {
            self.write_results(&cached)?;
        }
        Ok(added)
    }

    pub fn remove_result(&self, index: usize) -> Result<Option<String>, SessionError> {
        let mut cached = self.results()?;
        if index >= cached.len() {
            return Ok(None);
        }
        let removed = cached.remove(index);
        if cached.is_empty() {
            self.store.clear(Slot::Results)?;
        } else {
            self.write_results(&cached)?;
        }
        Ok(Some(removed))
    }

    pub fn clear_results(&self) -> Result<(), SessionError> {
        self.store.clear(Slot::Results)
    }

    fn write_results(&self, results: &[String]) -> Result<(), SessionError> {
        let raw = serde_json::to_string(results)?;
        self.store.write(Slot::Results, &raw)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session data is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Session storage lock poisoned")]
    Poisoned,
}
