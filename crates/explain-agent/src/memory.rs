use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use explain_core::{ExplainError, RepositoryRef};
use serde::{Deserialize, Serialize};

use crate::llm::ChatMessage;

/// Conversation history of one repository, persisted between sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMemory {
    /// Repository the conversation is about.
    pub repo: RepositoryRef,

    /// When the memory was last written.
    pub updated_at: DateTime<Utc>,

    /// User and assistant turns, oldest first.
    ///
    /// Tool observations are not kept; they can be fetched again.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl ConversationMemory {
    /// An empty memory for `repo`.
    pub fn new(repo: RepositoryRef) -> Self {
        Self {
            repo,
            updated_at: Utc::now(),
            messages: Vec::new(),
        }
    }

    /// Location of the memory file for `repo` under `storage_dir`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::Path;
    /// use explain_core::RepositoryRef;
    /// use explain_agent::memory::ConversationMemory;
    ///
    /// let path = ConversationMemory::path_for(Path::new(".explain_cache"), &RepositoryRef::new("a", "b"));
    /// assert_eq!(path, Path::new(".explain_cache/memory/a__b.json"));
    /// ```
    pub fn path_for(storage_dir: &Path, repo: &RepositoryRef) -> PathBuf {
        storage_dir.join("memory").join(format!("{}.json", repo.slug()))
    }

    /// Load a memory file.
    ///
    /// Returns `Ok(None)` if the file does not exist.
    pub fn load(path: &Path) -> explain_core::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ExplainError::Agent(format!(
                "failed to read conversation memory from {}: {e}",
                path.display()
            ))
        })?;
        let memory = serde_json::from_str(&content).map_err(|e| {
            ExplainError::Agent(format!("failed to parse conversation memory: {e}"))
        })?;
        Ok(Some(memory))
    }

    /// Write the memory file, creating parent directories as needed.
    pub fn save(&mut self, path: &Path) -> explain_core::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ExplainError::Agent(format!(
                    "failed to create memory directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        self.updated_at = Utc::now();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| {
            ExplainError::Agent(format!(
                "failed to write conversation memory to {}: {e}",
                path.display()
            ))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = ConversationMemory::load(&dir.path().join("nope.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn save_then_load_keeps_turns() {
        let dir = tempfile::tempdir().unwrap();
        let repo = RepositoryRef::new("octocat", "hello-world");
        let path = ConversationMemory::path_for(dir.path(), &repo);

        let mut memory = ConversationMemory::new(repo.clone());
        memory.messages.push(ChatMessage::user("What is this?"));
        memory.messages.push(ChatMessage::assistant("A greeting."));
        memory.save(&path).unwrap();

        assert!(dir.path().join("memory/octocat__hello-world.json").is_file());
        let loaded = ConversationMemory::load(&path).unwrap().unwrap();
        assert_eq!(loaded.repo, repo);
        assert_eq!(loaded.messages, memory.messages);
    }

    #[test]
    fn corrupt_file_is_an_agent_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            ConversationMemory::load(&path),
            Err(ExplainError::Agent(_))
        ));
    }
}
