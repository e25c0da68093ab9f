//! Running the external renderer, and delivering its artifacts.

use std::env;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, UNIX_EPOCH};

use crate::error::ConversionError;
use crate::request::Output;
use crate::translate::TranslatedArgs;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Shared flag that asks running conversions to stop.
///
/// Clones refer to the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a finished renderer process left behind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Turns an unsuccessful exit into [`ConversionError::RendererFailed`].
    pub fn check(self) -> Result<ProcessOutput, ConversionError> {
        if self.success() {
            Ok(self)
        } else {
            Err(ConversionError::RendererFailed {
                exit_code: self.exit_code,
                stderr: String::from_utf8_lossy(&self.stderr).trim_end().to_string(),
            })
        }
    }
}

/// Something that turns a translated command line into an artifact on disk.
pub trait Renderer: Send + Sync {
    /// Runs one conversion to completion, or until `cancel` is set.
    fn render(
        &self,
        args: &TranslatedArgs,
        cancel: &CancelToken,
    ) -> Result<ProcessOutput, ConversionError>;

    /// Identifies the installed renderer, so that upgrading it invalidates cached artifacts.
    fn identity(&self) -> String;
}

/// Inkscape 1.x, run as a subprocess.
#[derive(Clone, Debug)]
pub struct Inkscape {
    program: PathBuf,
    timeout: Duration,
}

impl Inkscape {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Inkscape {
        Inkscape {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn spawn_error(&self, source: io::Error) -> ConversionError {
        ConversionError::Spawn {
            program: self.program.clone(),
            source,
        }
    }
}

impl Renderer for Inkscape {
    fn render(
        &self,
        args: &TranslatedArgs,
        cancel: &CancelToken,
    ) -> Result<ProcessOutput, ConversionError> {
        if crate::log::log_enabled() {
            let line: Vec<_> = args.iter().map(OsStr::to_string_lossy).collect();
            convert_log!("running {} {}", self.program.display(), line.join(" "));
        }

        let mut child = Command::new(&self.program)
            .args(args.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        // Both pipes are drained concurrently so that a chatty renderer cannot
        // block on a full pipe while we wait for it to exit.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now().checked_add(self.timeout);

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => (),
                Err(e) => {
                    terminate(&mut child);
                    return Err(self.spawn_error(e));
                }
            }

            if cancel.is_cancelled() {
                convert_log!("interrupted; terminating renderer");
                terminate(&mut child);
                return Err(ConversionError::Cancelled);
            }

            if deadline.map_or(false, |d| Instant::now() >= d) {
                convert_log!("renderer timed out after {:?}", self.timeout);
                terminate(&mut child);
                return Err(ConversionError::RendererTimeout {
                    timeout: self.timeout,
                });
            }

            thread::sleep(POLL_INTERVAL);
        };

        let output = ProcessOutput {
            exit_code: status.code(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        };

        convert_log!("renderer exited with {:?}", output.exit_code);

        Ok(output)
    }

    fn identity(&self) -> String {
        // Changes whenever the executable is replaced
        match resolve_program(&self.program).and_then(|p| fs::metadata(&p).ok().map(|m| (p, m))) {
            Some((path, meta)) => {
                let mtime = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map_or(0, |d| d.as_secs());

                format!("{} {} {}", path.display(), meta.len(), mtime)
            }

            None => self.program.display().to_string(),
        }
    }
}

fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Finds the executable that `Command` would run for `program`.
fn resolve_program(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return Some(program.to_owned());
    }

    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// Copies a ready artifact to where the user asked for it.
///
/// Files are written under a temporary name in the destination directory and renamed
/// into place, so a failure never leaves a truncated file behind.
pub fn materialize(artifact: &Path, output: &Output) -> Result<(), ConversionError> {
    let mut source =
        File::open(artifact).map_err(|e| ConversionError::cache_io(artifact, e))?;

    let output_error = |source: io::Error| ConversionError::Output {
        output: output.to_string(),
        source,
    };

    match output {
        Output::Stdout => {
            let stdout = io::stdout();
            let mut stdout = stdout.lock();
            io::copy(&mut source, &mut stdout).map_err(output_error)?;
            stdout.flush().map_err(output_error)?;
        }

        Output::Path(path) => {
            let dir = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p,
                _ => Path::new("."),
            };

            let mut tmp = tempfile::Builder::new()
                .prefix(".rsvg-convert")
                .tempfile_in(dir)
                .map_err(output_error)?;

            io::copy(&mut source, tmp.as_file_mut()).map_err(output_error)?;
            tmp.as_file().sync_all().map_err(output_error)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o644))
                    .map_err(output_error)?;
            }

            tmp.persist(path).map_err(|e| output_error(e.error))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Fingerprint;
    use crate::request::{ConversionRequest, Input};
    use crate::translate::translate;
    use tempfile::TempDir;

    pub(super) fn png_args() -> TranslatedArgs {
        let request = ConversionRequest::new(
            Input::Path(PathBuf::from("in.svg")),
            Fingerprint::of_bytes(b"<svg/>"),
        );
        translate(&request).command_line(Path::new("in.svg"), Path::new("out.png"))
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn nonzero_exit_is_renderer_failure() {
        let output = ProcessOutput {
            exit_code: Some(1),
            stdout: Vec::new(),
            stderr: b"Can't open file\n".to_vec(),
        };

        match output.check() {
            Err(ConversionError::RendererFailed { exit_code, stderr }) => {
                assert_eq!(exit_code, Some(1));
                assert_eq!(stderr, "Can't open file");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn killed_by_signal_is_renderer_failure() {
        let output = ProcessOutput {
            exit_code: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
        };
        assert!(output.check().is_err());
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let inkscape = Inkscape::new("/nonexistent/inkscape", Duration::from_secs(1));
        let args = png_args();

        assert!(matches!(
            inkscape.render(&args, &CancelToken::new()),
            Err(ConversionError::Spawn { .. })
        ));
    }

    #[test]
    fn materialize_replaces_destination() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("artifact.pdf");
        let dest = dir.path().join("out.pdf");

        fs::write(&artifact, b"%PDF-new").unwrap();
        fs::write(&dest, b"old contents that are longer").unwrap();

        materialize(&artifact, &Output::Path(dest.clone())).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"%PDF-new");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn materialize_missing_artifact_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.pdf");

        assert!(materialize(&dir.path().join("gone.pdf"), &Output::Path(dest.clone())).is_err());
        assert!(!dest.exists());
    }

    #[test]
    fn identity_of_explicit_path_includes_size() {
        let dir = TempDir::new().unwrap();
        let program = dir.path().join("inkscape");
        fs::write(&program, b"#!/bin/sh\n").unwrap();

        let identity = Inkscape::new(&program, Duration::from_secs(1)).identity();
        assert!(identity.starts_with(&program.display().to_string()));
        assert!(identity.contains(" 10 "));
    }
}
