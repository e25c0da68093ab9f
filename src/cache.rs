//! Content-addressed store for converted artifacts.
//!
//! Artifacts live in a scratch directory shared by every rsvg-convert process on the
//! machine:
//!
//! ```text
//! <root>/<digest[0..2]>/<digest>.<ext>            ready artifact
//! <root>/<digest[0..2]>/<digest>.partial.<ext>    being written by the renderer
//! <root>/<digest[0..2]>/<digest>.lock             a process is building this key
//! <root>/stdin/<fingerprint>.svg                  SVG data that arrived on stdin
//! ```
//!
//! A key goes through `Absent -> Pending -> Ready`, or `Absent -> Pending -> Failed`
//! after which anyone may try again.  Within a process, `Pending` is an entry in a map
//! of wait handles; across processes it is the lock file.  Only the renderer's
//! finished, validated output is ever renamed to the ready name, so a reader can
//! never see a partial artifact.

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};

use crate::error::ConversionError;
use crate::request::{ConversionRequest, Format, Sizing};
use crate::runner::CancelToken;
use crate::translate::TRANSLATION_VERSION;

/// How often to look at a lock held by another process, or at a cancellation request.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Bytes examined when checking that an artifact has the right format.
const MAGIC_WINDOW: u64 = 4096;

const STDIN_DIR: &str = "stdin";

/// SHA-256 of the input document.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of_bytes(data: &[u8]) -> Fingerprint {
        Fingerprint(format!("{:x}", Sha256::digest(data)))
    }

    /// Hashes a file without loading it into memory.
    pub fn of_file(path: &Path) -> io::Result<Fingerprint> {
        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher)?;
        Ok(Fingerprint(format!("{:x}", hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Things outside the request that change the renderer's output.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyContext {
    /// Which renderer is installed; see [`Renderer::identity`](crate::runner::Renderer::identity).
    pub renderer: String,

    /// Inkscape stamps PDF and PostScript files with this instead of the current time.
    pub source_date_epoch: Option<i64>,
}

/// Digest of everything that determines the bytes of an artifact.
///
/// The input and output paths are deliberately not part of the key: the same document
/// converted from two places, or to two places, is the same artifact.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(request: &ConversionRequest, context: &KeyContext) -> CacheKey {
        let mut h = Sha256::new();

        field(&mut h, "translation", TRANSLATION_VERSION);
        field(&mut h, "renderer", &context.renderer);
        field(&mut h, "source-date-epoch", OptionDisplay(context.source_date_epoch));
        field(&mut h, "input", &request.fingerprint);
        field(&mut h, "format", request.format);

        let sizing = match request.sizing {
            Sizing::Default => String::from("default"),
            Sizing::Dpi { x, y } => format!("dpi {:016x} {:016x}", bits(x), bits(y)),
            Sizing::Size { width, height } => format!(
                "size {} {}",
                OptionDisplay(width),
                OptionDisplay(height)
            ),
            Sizing::Zoom(scale) => {
                format!("zoom {:016x} {:016x}", bits(scale.x), bits(scale.y))
            }
        };
        field(&mut h, "sizing", sizing);

        field(&mut h, "keep-aspect-ratio", request.keep_aspect_ratio);
        field(
            &mut h,
            "background",
            OptionDisplay(request.background.map(|b| b.to_hex())),
        );
        field(&mut h, "export-id", OptionDisplay(request.export_id.as_deref()));
        field(&mut h, "page", OptionDisplay(request.page));

        let placement = request.placement;
        let page_size = placement
            .page_size
            .map(|(w, h)| format!("{:016x} {:016x}", bits(w), bits(h)));
        field(&mut h, "page-size", OptionDisplay(page_size));
        field(&mut h, "left", format!("{:016x}", bits(placement.left)));
        field(&mut h, "top", format!("{:016x}", bits(placement.top)));

        CacheKey(format!("{:x}", h.finalize()))
    }

    pub fn digest(&self) -> &str {
        &self.0
    }

    fn prefix(&self) -> &str {
        &self.0[..2]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

fn field(h: &mut Sha256, name: &str, value: impl fmt::Display) {
    h.update(format!("{name}={value}\n"));
}

// -0.0 and 0.0 render the same
fn bits(v: f64) -> u64 {
    (v + 0.0).to_bits()
}

struct OptionDisplay<T>(Option<T>);

impl<T: fmt::Display> fmt::Display for OptionDisplay<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(ref v) => write!(f, "some {v}"),
            None => write!(f, "none"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CacheOptions {
    pub root: PathBuf,

    /// When set, [`Cache::close`] removes ready artifacts that have not been used for this long.
    pub max_age: Option<Duration>,

    /// A lock file older than this is assumed to belong to a process that died.
    pub lock_stale_after: Duration,
}

impl CacheOptions {
    pub fn new(root: impl Into<PathBuf>) -> CacheOptions {
        CacheOptions {
            root: root.into(),
            max_age: None,
            lock_stale_after: Duration::from_secs(240),
        }
    }
}

/// Result of [`Cache::get_or_compute`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lookup {
    /// The ready artifact.
    pub path: PathBuf,

    /// Whether the artifact was already there, or built by somebody else while we waited.
    pub hit: bool,
}

#[derive(Clone, Debug)]
enum Outcome {
    Ready(PathBuf),
    Failed,
    Cancelled,
}

/// Wait handle for a key that is being built by another thread of this process.
struct InFlight {
    outcome: Mutex<Option<Outcome>>,
    cv: Condvar,
}

impl InFlight {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            cv: Condvar::new(),
        }
    }

    fn set(&self, outcome: Outcome) {
        *lock(&self.outcome) = Some(outcome);
        self.cv.notify_all();
    }

    fn wait(&self, cancel: &CancelToken) -> Result<Outcome, ConversionError> {
        let mut guard = lock(&self.outcome);

        loop {
            if let Some(ref outcome) = *guard {
                return Ok(outcome.clone());
            }

            if cancel.is_cancelled() {
                return Err(ConversionError::Cancelled);
            }

            guard = self
                .cv
                .wait_timeout(guard, POLL_INTERVAL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

// A panic while holding one of these locks leaves nothing half-updated
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ownership of the `Pending` state of a key within this process.
///
/// Whatever happens to the owner, dropping this publishes an outcome and wakes up the
/// waiters; if nothing was published explicitly, they are told the build was cancelled.
struct Owner<'a> {
    cache: &'a Cache,
    key: &'a CacheKey,
    flight: Arc<InFlight>,
    outcome: Outcome,
}

impl Drop for Owner<'_> {
    fn drop(&mut self) {
        self.flight.set(self.outcome.clone());
        lock(&self.cache.in_flight).remove(self.key);
    }
}

/// The `Pending` marker on disk.  Removed on drop.
struct DiskLock {
    path: PathBuf,
}

impl DiskLock {
    fn acquire(
        path: PathBuf,
        stale_after: Duration,
        cancel: &CancelToken,
    ) -> Result<DiskLock, ConversionError> {
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    // The pid is only informative; staleness is decided by age.
                    let _ = writeln!(file, "{}", std::process::id());
                    return Ok(DiskLock { path });
                }

                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if is_older_than(&path, stale_after) {
                        convert_log!("removing stale lock {}", path.display());
                        let _ = fs::remove_file(&path);
                        continue;
                    }

                    if cancel.is_cancelled() {
                        return Err(ConversionError::Cancelled);
                    }

                    thread::sleep(POLL_INTERVAL);
                }

                Err(e) => return Err(ConversionError::cache_io(path, e)),
            }
        }
    }
}

impl Drop for DiskLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn is_older_than(path: &Path, age: Duration) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .map_or(false, |elapsed| elapsed > age)
}

/// The artifact cache.
///
/// Open one per process and share it between threads; [`get_or_compute`](Self::get_or_compute)
/// takes `&self`.
pub struct Cache {
    options: CacheOptions,
    in_flight: Mutex<HashMap<CacheKey, Arc<InFlight>>>,
}

impl Cache {
    /// Opens the cache, creating its directory if needed.
    pub fn open(options: CacheOptions) -> Result<Cache, ConversionError> {
        fs::create_dir_all(&options.root)
            .map_err(|e| ConversionError::cache_io(&options.root, e))?;

        convert_log!("cache at {}", options.root.display());

        Ok(Cache {
            options,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.options.root
    }

    /// Runs the configured age sweep, if any.
    pub fn close(self) -> Result<(), ConversionError> {
        if let Some(max_age) = self.options.max_age {
            let removed = self.sweep(max_age)?;
            convert_log!("removed {} expired artifacts", removed);
        }

        Ok(())
    }

    /// Where the ready artifact for `key` lives, whether or not it exists yet.
    pub fn artifact_path(&self, key: &CacheKey, format: Format) -> PathBuf {
        self.options
            .root
            .join(key.prefix())
            .join(format!("{}.{}", key.digest(), format.extension()))
    }

    fn partial_path(&self, key: &CacheKey, format: Format) -> PathBuf {
        self.options
            .root
            .join(key.prefix())
            .join(format!("{}.partial.{}", key.digest(), format.extension()))
    }

    fn lock_path(&self, key: &CacheKey) -> PathBuf {
        self.options
            .root
            .join(key.prefix())
            .join(format!("{}.lock", key.digest()))
    }

    /// Returns the artifact for `key`, running `compute` to build it if needed.
    ///
    /// `compute` is given the path to write to.  At most one `compute` runs at a time for
    /// a key, in this process or any other using the same directory; everybody else
    /// waits for it.  If it fails, the error goes to its caller and the waiters try
    /// again on their own.
    pub fn get_or_compute<F>(
        &self,
        key: &CacheKey,
        format: Format,
        cancel: &CancelToken,
        compute: F,
    ) -> Result<Lookup, ConversionError>
    where
        F: FnOnce(&Path) -> Result<(), ConversionError>,
    {
        let ready = self.artifact_path(key, format);

        loop {
            if cancel.is_cancelled() {
                return Err(ConversionError::Cancelled);
            }

            if self.probe(&ready)? {
                convert_log!("cache hit for {}", key);
                return Ok(Lookup {
                    path: ready,
                    hit: true,
                });
            }

            let (flight, is_owner) = self.join(key);

            if !is_owner {
                convert_log!("waiting for another conversion of {}", key);

                match flight.wait(cancel)? {
                    Outcome::Ready(path) => return Ok(Lookup { path, hit: true }),
                    Outcome::Failed | Outcome::Cancelled => continue,
                }
            }

            let mut owner = Owner {
                cache: self,
                key,
                flight,
                outcome: Outcome::Cancelled,
            };

            let result = self.build(key, format, &ready, cancel, compute);

            owner.outcome = match result {
                Ok(_) => Outcome::Ready(ready.clone()),
                Err(ConversionError::Cancelled) => Outcome::Cancelled,
                Err(_) => Outcome::Failed,
            };

            return result.map(|hit| Lookup { path: ready, hit });
        }
    }

    fn join(&self, key: &CacheKey) -> (Arc<InFlight>, bool) {
        let mut map = lock(&self.in_flight);
        if let Some(existing) = map.get(key) {
            return (Arc::clone(existing), false);
        }

        let flight = Arc::new(InFlight::new());
        map.insert(key.clone(), Arc::clone(&flight));
        (flight, true)
    }

    /// Builds the artifact under the on-disk lock.  Returns whether another process
    /// built it in the meantime.
    fn build<F>(
        &self,
        key: &CacheKey,
        format: Format,
        ready: &Path,
        cancel: &CancelToken,
        compute: F,
    ) -> Result<bool, ConversionError>
    where
        F: FnOnce(&Path) -> Result<(), ConversionError>,
    {
        let dir = self.options.root.join(key.prefix());
        fs::create_dir_all(&dir).map_err(|e| ConversionError::cache_io(&dir, e))?;

        let _lock = DiskLock::acquire(self.lock_path(key), self.options.lock_stale_after, cancel)?;

        if self.probe(ready)? {
            convert_log!("{} was built by another process", key);
            return Ok(true);
        }

        let partial = self.partial_path(key, format);
        remove_if_exists(&partial)?;

        convert_log!("building {}", key);

        let result = compute(&partial)
            .and_then(|()| validate(&partial, format))
            .and_then(|()| {
                fs::rename(&partial, ready).map_err(|e| ConversionError::cache_io(ready, e))
            });

        if result.is_err() {
            let _ = fs::remove_file(&partial);
        }

        result.map(|()| false)
    }

    /// Checks for a ready artifact, refreshing its modification time so that the age
    /// sweep treats it as recently used.
    fn probe(&self, ready: &Path) -> Result<bool, ConversionError> {
        match fs::metadata(ready) {
            Ok(m) if m.is_file() && m.len() > 0 => {
                let touched = File::options()
                    .write(true)
                    .open(ready)
                    .and_then(|f| f.set_modified(SystemTime::now()));

                if let Err(e) = touched {
                    convert_log!("could not refresh {}: {}", ready.display(), e);
                }

                Ok(true)
            }

            Ok(_) => Ok(false),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ConversionError::cache_io(ready, e)),
        }
    }

    /// Stores SVG data that came from stdin, so that the renderer can read it from a file.
    pub fn spool_input(&self, fingerprint: &Fingerprint, data: &[u8]) -> Result<PathBuf, ConversionError> {
        let dir = self.options.root.join(STDIN_DIR);
        fs::create_dir_all(&dir).map_err(|e| ConversionError::cache_io(&dir, e))?;

        let path = dir.join(format!("{fingerprint}.svg"));

        let mut tmp =
            tempfile::NamedTempFile::new_in(&dir).map_err(|e| ConversionError::cache_io(&dir, e))?;
        tmp.write_all(data)
            .map_err(|e| ConversionError::cache_io(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| ConversionError::cache_io(&path, e.error))?;

        Ok(path)
    }

    /// Deletes ready artifacts and spooled inputs not used for `max_age`.  In-progress
    /// files and locks are never touched.  Returns the number of files removed.
    pub fn sweep(&self, max_age: Duration) -> Result<usize, ConversionError> {
        let root = &self.options.root;
        let mut removed = 0;

        for entry in fs::read_dir(root).map_err(|e| ConversionError::cache_io(root, e))? {
            let entry = entry.map_err(|e| ConversionError::cache_io(root, e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();

            let is_bucket = name.len() == 2 && name.chars().all(|c| c.is_ascii_hexdigit());
            if !(is_bucket || name == STDIN_DIR) || !entry.path().is_dir() {
                continue;
            }

            let dir = entry.path();
            for file in fs::read_dir(&dir).map_err(|e| ConversionError::cache_io(&dir, e))? {
                let file = file.map_err(|e| ConversionError::cache_io(&dir, e))?;
                let path = file.path();

                if is_sweepable(&path) && is_older_than(&path, max_age) {
                    match fs::remove_file(&path) {
                        Ok(()) => removed += 1,
                        Err(e) if e.kind() == io::ErrorKind::NotFound => (),
                        Err(e) => return Err(ConversionError::cache_io(&path, e)),
                    }
                }
            }
        }

        Ok(removed)
    }
}

/// Only `<64 hex digits>.<ext>` is a finished file.
fn is_sweepable(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };

    match name.split_once('.') {
        Some((stem, ext)) => {
            stem.len() == 64
                && stem.chars().all(|c| c.is_ascii_hexdigit())
                && !ext.is_empty()
                && !ext.contains('.')
                && ext != "lock"
        }
        None => false,
    }
}

fn remove_if_exists(path: &Path) -> Result<(), ConversionError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ConversionError::cache_io(path, e)),
    }
}

fn validate(path: &Path, format: Format) -> Result<(), ConversionError> {
    let invalid = |reason: String| ConversionError::InvalidArtifact {
        path: path.to_owned(),
        reason,
    };

    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(invalid(String::from("the renderer did not write it")))
        }
        Err(e) => return Err(ConversionError::cache_io(path, e)),
    };

    let mut head = Vec::new();
    file.take(MAGIC_WINDOW)
        .read_to_end(&mut head)
        .map_err(|e| ConversionError::cache_io(path, e))?;

    if head.is_empty() {
        return Err(invalid(String::from("the file is empty")));
    }

    if !has_magic(format, &head) {
        return Err(invalid(format!(
            "the file does not look like {}",
            format.extension().to_uppercase()
        )));
    }

    Ok(())
}

/// Checks the beginning of a file for the signature of `format`.
pub fn has_magic(format: Format, head: &[u8]) -> bool {
    match format {
        Format::Png => head.starts_with(b"\x89PNG\r\n\x1a\n"),

        Format::Pdf | Format::Pdf1_7 | Format::Pdf1_6 | Format::Pdf1_5 | Format::Pdf1_4 => {
            head.starts_with(b"%PDF-")
        }

        Format::Ps => head.starts_with(b"%!PS"),

        Format::Eps => {
            let first_line = head.split(|&b| b == b'\n').next().unwrap_or_default();
            head.starts_with(b"%!PS") && first_line.windows(4).any(|w| w == b"EPSF")
        }

        Format::Svg => head.windows(4).any(|w| w == b"<svg"),
    }
}
