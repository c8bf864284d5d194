//! Cache persistant des métadonnées OpenHome (URI → DIDL).
//!
//! Le fichier contient une ligne `clé=valeur` par entrée ; `%`, `=` et les
//! caractères de contrôle (dont les fins de ligne) sont encodés en `%XX`.
//! Les sauvegardes passent par une [`WorkQueue`] coalescente : seul le
//! dernier instantané en attente est écrit.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use tracing::{debug, error, warn};
use upmupnp::WorkQueue;

/// Nom du fichier dans le répertoire de cache
pub const CACHE_FILE_NAME: &str = "metacache";

const CACHE_ESCAPES: &AsciiSet = &CONTROLS.add(b'%').add(b'=');

pub type MetaCache = BTreeMap<String, String>;

fn escape(value: &str) -> String {
    utf8_percent_encode(value, CACHE_ESCAPES).to_string()
}

fn unescape(value: &str) -> Option<String> {
    percent_decode_str(value)
        .decode_utf8()
        .ok()
        .map(|s| s.into_owned())
}

pub fn encode_cache(cache: &MetaCache) -> String {
    let mut out = String::new();
    for (key, value) in cache {
        out.push_str(&escape(key));
        out.push('=');
        out.push_str(&escape(value));
        out.push('\n');
    }
    out
}

/// Les lignes illisibles sont ignorées.
pub fn decode_cache(text: &str) -> MetaCache {
    let mut cache = MetaCache::new();
    for (lineno, line) in text.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        let decoded = line
            .split_once('=')
            .and_then(|(key, value)| Some((unescape(key)?, unescape(value)?)));
        match decoded {
            Some((key, value)) => {
                cache.insert(key, value);
            }
            None => warn!("metadata cache: bad line {}", lineno + 1),
        }
    }
    cache
}

/// Charge le cache ; un fichier absent donne un cache vide.
pub fn load_cache(path: &Path) -> io::Result<MetaCache> {
    match fs::read_to_string(path) {
        Ok(text) => {
            let cache = decode_cache(&text);
            debug!("metadata cache: {} entries from {}", cache.len(), path.display());
            Ok(cache)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(MetaCache::new()),
        Err(e) => Err(e),
    }
}

/// Écrit dans un fichier temporaire puis le renomme.
pub fn write_cache(path: &Path, cache: &MetaCache) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    fs::write(&tmp, encode_cache(cache))?;
    fs::rename(&tmp, path)
}

/// Écrivain asynchrone du cache.
pub struct CacheSaver {
    queue: Arc<WorkQueue<MetaCache>>,
}

impl CacheSaver {
    /// Sauvegarde dans `path`.
    pub fn start(path: PathBuf) -> io::Result<Self> {
        Self::with_writer(move |cache| write_cache(&path, cache))
    }

    pub fn with_writer<F>(mut writer: F) -> io::Result<Self>
    where
        F: FnMut(&MetaCache) -> io::Result<()> + Send + 'static,
    {
        let queue = Arc::new(WorkQueue::coalescing("metacache"));
        queue.start(move |cache: MetaCache| {
            if let Err(e) = writer(&cache) {
                error!("❌ Cannot save metadata cache: {}", e);
            }
        })?;
        Ok(Self { queue })
    }

    /// Dépose un instantané ; il remplace ceux qui attendent encore.
    pub fn save(&self, cache: MetaCache) {
        if !self.queue.put(cache) {
            warn!("metadata cache saver is stopped");
        }
    }

    /// Attend la fin des écritures en cours.
    pub fn flush(&self) {
        self.queue.wait_idle();
    }
}

impl Drop for CacheSaver {
    fn drop(&mut self) {
        self.queue.set_terminate_and_wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::mpsc;

    fn sample() -> MetaCache {
        MetaCache::from([
            ("http://a/1.flac?x=1".to_string(), "<DIDL-Lite>\n<item/>\n</DIDL-Lite>".to_string()),
            ("http://a/%41".to_string(), "50% = half".to_string()),
        ])
    }

    #[test]
    fn test_escaped_layout() {
        let text = encode_cache(&MetaCache::from([("a=b".to_string(), "x\ny%".to_string())]));
        assert_eq!(text, "a%3Db=x%0Ay%25\n");
        assert_eq!(decode_cache(&text)["a=b"], "x\ny%");
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join(CACHE_FILE_NAME);
        assert!(load_cache(&path).unwrap().is_empty());

        write_cache(&path, &sample()).unwrap();
        assert_eq!(load_cache(&path).unwrap(), sample());
        assert!(!path.with_file_name("metacache.tmp").exists());
    }

    #[test]
    fn test_bad_lines_are_skipped() {
        let cache = decode_cache("novalue\nk=v\n");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache["k"], "v");
    }

    #[test]
    fn test_saves_coalesce_while_writing() {
        let written = Arc::new(Mutex::new(Vec::<MetaCache>::new()));
        let (started_tx, started_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let record = Arc::clone(&written);
        let mut first = true;
        let saver = CacheSaver::with_writer(move |cache| {
            if first {
                first = false;
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            }
            record.lock().push(cache.clone());
            Ok(())
        })
        .unwrap();

        let snapshot = |n: &str| MetaCache::from([("uri".to_string(), n.to_string())]);
        saver.save(snapshot("0"));
        started_rx.recv().unwrap();

        saver.save(snapshot("1"));
        saver.save(snapshot("2"));
        saver.save(snapshot("3"));
        release_tx.send(()).unwrap();
        saver.flush();

        let written = written.lock();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0], snapshot("0"));
        assert_eq!(written[1], snapshot("3"));
    }
}
