//! Event knowledge: schedule and rules, hot-reloaded from a JSON file.
//!
//! Readers take a snapshot (`Arc<EventKnowledge>`) and keep it for the whole
//! pipeline run. A reload publishes a fresh `Arc`; existing snapshots are
//! never mutated.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::chatbot::debounce::Debouncer;

/// Quiet period before a burst of file events turns into one reload.
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(250);

/// Immutable snapshot of the event schedule and rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventKnowledge {
    /// Day label ("1", "2", ...) to description.
    #[serde(default)]
    pub days: BTreeMap<String, String>,
    #[serde(default)]
    pub rules: Vec<String>,
}

impl EventKnowledge {
    pub fn day(&self, label: &str) -> Option<&str> {
        self.days.get(label).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty() && self.rules.is_empty()
    }
}

/// Errors from reading an event knowledge file.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Failed to read event knowledge {path:?}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("Failed to parse event knowledge {path:?}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
}

/// Strict load: any read or parse failure is returned to the caller.
pub fn try_load(path: &Path) -> Result<EventKnowledge, KnowledgeError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| KnowledgeError::Read { path: path.to_path_buf(), source: e })?;
    serde_json::from_str::<EventKnowledge>(&content)
        .map_err(|e| KnowledgeError::Parse { path: path.to_path_buf(), source: e })
}

/// Load knowledge from disk. Never fails: unreadable or malformed input
/// yields an empty value so the bot keeps answering with what it has.
pub fn load(path: &Path) -> EventKnowledge {
    match try_load(path) {
        Ok(k) => {
            info!("📚 Loaded event knowledge: {} day(s), {} rule(s)", k.days.len(), k.rules.len());
            k
        }
        Err(e) => {
            warn!("{e}");
            EventKnowledge::default()
        }
    }
}

/// Holder of the current snapshot.
pub struct KnowledgeStore {
    current: RwLock<Arc<EventKnowledge>>,
}

impl KnowledgeStore {
    pub fn new(initial: EventKnowledge) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    pub fn snapshot(&self) -> Arc<EventKnowledge> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a new snapshot. Runs holding the old one are unaffected.
    pub fn publish(&self, knowledge: EventKnowledge) -> Arc<EventKnowledge> {
        let next = Arc::new(knowledge);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
        next
    }
}

/// Keeps the file watcher alive. Dropping it stops reloads.
pub struct KnowledgeWatcher {
    _watcher: RecommendedWatcher,
    _debouncer: Arc<Debouncer>,
}

/// Watch `path` and call `on_change` with a freshly loaded snapshot after
/// each modification. Bursts are coalesced, but the callback may still see
/// the same content more than once and must tolerate that.
///
/// Must be called from within a tokio runtime.
pub fn watch<F>(path: PathBuf, on_change: F) -> notify::Result<KnowledgeWatcher>
where
    F: Fn(EventKnowledge) + Send + Sync + 'static,
{
    let reload_path = path.clone();
    let debouncer = Arc::new(Debouncer::new(RELOAD_DEBOUNCE, move || {
        info!("📝 Event knowledge changed, reloading");
        on_change(load(&reload_path));
    }));

    let file_name = path.file_name().map(|n| n.to_os_string());
    let trigger = debouncer.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            let relevant = matches!(
                event.kind,
                EventKind::Modify(_) | EventKind::Create(_)
            ) && event
                .paths
                .iter()
                .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
            if relevant {
                debug!(paths = ?event.paths, "knowledge file event");
                trigger.trigger();
            }
        }
        Err(e) => error!(error = %e, "Knowledge watcher error"),
    })?;

    // Watch the directory so editors that replace the file are still seen.
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    info!("👀 Watching {:?} for knowledge changes", path);

    Ok(KnowledgeWatcher {
        _watcher: watcher,
        _debouncer: debouncer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"{
        "days": { "1": "Build bases", "2": "Diplomacy" },
        "rules": ["No griefing"]
    }"#;

    #[test]
    fn test_load_valid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("event.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let k = load(&path);
        assert_eq!(k.day("1"), Some("Build bases"));
        assert_eq!(k.rules, vec!["No griefing".to_string()]);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let k = load(Path::new("/nonexistent/event.json"));
        assert!(k.is_empty());
    }

    #[test]
    fn test_load_malformed_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("event.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(load(&path), EventKnowledge::default());
    }

    #[test]
    fn test_try_load_rejects_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("event.json");
        std::fs::write(&path, r#"{ "days": ["not", "a", "map"] }"#).unwrap();
        assert!(matches!(try_load(&path), Err(KnowledgeError::Parse { .. })));

        std::fs::write(&path, "{ not json").unwrap();
        let err = try_load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse event knowledge"));
    }

    #[test]
    fn test_try_load_missing_file() {
        let err = try_load(Path::new("/nonexistent/event.json")).unwrap_err();
        assert!(matches!(err, KnowledgeError::Read { .. }));
    }

    #[test]
    fn test_try_load_valid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("event.json");
        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(try_load(&path).unwrap(), load(&path));
    }

    #[test]
    fn test_load_partial_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("event.json");
        std::fs::write(&path, r#"{ "rules": ["Be nice"] }"#).unwrap();
        let k = load(&path);
        assert!(k.days.is_empty());
        assert_eq!(k.rules.len(), 1);
    }

    #[test]
    fn test_publish_keeps_old_snapshot_intact() {
        let store = KnowledgeStore::new(serde_json::from_str(SAMPLE).unwrap());
        let before = store.snapshot();

        let mut next = EventKnowledge::default();
        next.days.insert("1".into(), "Gather resources".into());
        store.publish(next);

        assert_eq!(before.day("1"), Some("Build bases"));
        assert_eq!(store.snapshot().day("1"), Some("Gather resources"));
    }

    #[test]
    fn test_store_usable_after_panic_while_locked() {
        let store = KnowledgeStore::new(serde_json::from_str(SAMPLE).unwrap());
        std::thread::scope(|s| {
            let joined = s
                .spawn(|| {
                    let _guard = store.current.write().unwrap();
                    panic!("panic while publishing");
                })
                .join();
            assert!(joined.is_err());
        });
        assert!(store.current.is_poisoned());

        assert_eq!(store.snapshot().day("1"), Some("Build bases"));
        store.publish(EventKnowledge::default());
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_watch_reloads_on_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("event.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let seen: Arc<Mutex<Vec<EventKnowledge>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _watcher = watch(path.clone(), move |k| sink.lock().unwrap().push(k)).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(&path, r#"{ "days": { "1": "Changed" }, "rules": [] }"#).unwrap();

        let mut reloaded = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let last = seen.lock().unwrap().last().cloned();
            if last.is_some_and(|k| k.day("1") == Some("Changed")) {
                reloaded = true;
                break;
            }
        }
        assert!(reloaded, "watcher never delivered the new snapshot");
    }
}
