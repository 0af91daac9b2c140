//! Template rendering with tracked Vault lookups.
//!
//! Templates use Jinja syntax. Besides the builtin filters they get `quote`,
//! `squote`, `b64enc` and `b64dec`, and a `vault(name)` function returning
//! the secret stored under `name`:
//!
//! ```text
//! {%- set s = vault("secret/my/key") %}
//! user={{ s.data.username | quote }}
//! ```
//!
//! Rendering runs on a blocking thread. Lookups hop back onto the runtime
//! through its handle.

use crate::error::{SecretError, TemplateError};
use crate::secrets::{SecretReader, SecretSnapshot};
use crate::tracker::SecretTracker;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use minijinja::{AutoEscape, Environment, ErrorKind, Value, context};
use parking_lot::Mutex;
use std::fs::{self, DirEntry, Permissions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info};

/// Renders template files and directories, tracking every secret used.
#[derive(Clone)]
pub struct TemplateRenderer {
    inner: Arc<RendererInner>,
}

struct RendererInner {
    tracker: SecretTracker,
    failed_lookup: Mutex<Option<SecretError>>,
}

impl TemplateRenderer {
    /// Create a renderer whose `vault` function reads from `reader`.
    #[must_use]
    pub fn new(reader: Arc<dyn SecretReader>) -> Self {
        Self {
            inner: Arc::new(RendererInner {
                tracker: SecretTracker::new(reader),
                failed_lookup: Mutex::new(None),
            }),
        }
    }

    /// Secrets fetched so far.
    #[must_use]
    pub fn snapshot(&self) -> SecretSnapshot {
        self.inner.tracker.snapshot()
    }

    /// Render a file or a directory tree.
    ///
    /// Without an output path a single file is written to stdout. Directory
    /// trees are mirrored below `output`. Returns the secrets fetched.
    ///
    /// # Errors
    ///
    /// Fails on the first template that cannot be read, rendered or written.
    pub async fn render_path(
        &self,
        input: &Path,
        output: Option<&Path>,
    ) -> Result<SecretSnapshot, TemplateError> {
        let renderer = self.clone();
        let input = input.to_path_buf();
        let output = output.map(Path::to_path_buf);
        let handle = Handle::current();

        tokio::task::spawn_blocking(move || {
            let env = renderer.environment(handle);
            renderer.render_tree(&env, &input, output.as_deref())
        })
        .await
        .map_err(|e| TemplateError::Task(e.to_string()))??;

        Ok(self.snapshot())
    }

    /// Render template text held in memory.
    ///
    /// # Errors
    ///
    /// Fails if the template cannot be rendered.
    pub async fn render_str(&self, name: &str, source: &str) -> Result<String, TemplateError> {
        let renderer = self.clone();
        let name = name.to_string();
        let source = source.to_string();
        let handle = Handle::current();

        tokio::task::spawn_blocking(move || {
            let env = renderer.environment(handle);
            renderer.render_source(&env, &name, &source)
        })
        .await
        .map_err(|e| TemplateError::Task(e.to_string()))?
    }

    fn environment(&self, handle: Handle) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_keep_trailing_newline(true);
        env.add_filter("quote", quote);
        env.add_filter("squote", squote);
        env.add_filter("b64enc", b64enc);
        env.add_filter("b64dec", b64dec);

        let inner = Arc::clone(&self.inner);
        env.add_function("vault", move |name: String| inner.lookup(&handle, &name));
        env
    }

    fn render_tree(
        &self,
        env: &Environment<'_>,
        input: &Path,
        output: Option<&Path>,
    ) -> Result<(), TemplateError> {
        let metadata = fs::metadata(input).map_err(TemplateError::io(input))?;
        match output {
            _ if !metadata.is_dir() => self.render_file(env, input, output),
            Some(output) => self.render_dir(env, input, output),
            None => Err(TemplateError::DirectoryToStdout(input.to_path_buf())),
        }
    }

    fn render_dir(
        &self,
        env: &Environment<'_>,
        input: &Path,
        output: &Path,
    ) -> Result<(), TemplateError> {
        let permissions = fs::metadata(input)
            .map_err(TemplateError::io(input))?
            .permissions();

        fs::create_dir_all(output).map_err(TemplateError::io(output))?;
        fs::set_permissions(output, owner_writable(&permissions))
            .map_err(TemplateError::io(output))?;

        let mut entries = fs::read_dir(input)
            .and_then(|entries| entries.collect::<Result<Vec<_>, _>>())
            .map_err(TemplateError::io(input))?;
        entries.sort_by_key(DirEntry::file_name);

        for entry in entries {
            let source = entry.path();
            let target = output.join(entry.file_name());
            if fs::metadata(&source).map_err(TemplateError::io(&source))?.is_dir() {
                self.render_dir(env, &source, &target)?;
            } else {
                self.render_file(env, &source, Some(&target))?;
            }
        }

        fs::set_permissions(output, permissions).map_err(TemplateError::io(output))
    }

    fn render_file(
        &self,
        env: &Environment<'_>,
        input: &Path,
        output: Option<&Path>,
    ) -> Result<(), TemplateError> {
        info!(template = %input.display(), "Rendering template");
        let source = fs::read_to_string(input).map_err(TemplateError::io(input))?;
        let rendered = self.render_source(env, &input.display().to_string(), &source)?;

        match output {
            Some(path) => {
                write_private(path, rendered.as_bytes())?;
                debug!(output = %path.display(), bytes = rendered.len(), "Wrote rendered template");
                Ok(())
            }
            None => {
                let mut stdout = std::io::stdout().lock();
                stdout
                    .write_all(rendered.as_bytes())
                    .and_then(|()| stdout.flush())
                    .map_err(TemplateError::io("<stdout>"))
            }
        }
    }

    fn render_source(
        &self,
        env: &Environment<'_>,
        name: &str,
        source: &str,
    ) -> Result<String, TemplateError> {
        self.inner.failed_lookup.lock().take();
        env.render_named_str(name, source, context! {})
            .map_err(|err| match self.inner.failed_lookup.lock().take() {
                Some(source) => TemplateError::Lookup {
                    template: name.to_string(),
                    source,
                },
                None => TemplateError::Render {
                    template: name.to_string(),
                    source: err,
                },
            })
    }
}

impl RendererInner {
    fn lookup(&self, handle: &Handle, name: &str) -> Result<Value, minijinja::Error> {
        match handle.block_on(self.tracker.get(name)) {
            Ok(secret) => Ok(Value::from_serialize(&secret)),
            Err(err) => {
                let message = err.to_string();
                *self.failed_lookup.lock() = Some(err);
                Err(minijinja::Error::new(ErrorKind::InvalidOperation, message))
            }
        }
    }
}

/// Write `contents` to `path`, readable by the owner only.
fn write_private(path: &Path, contents: &[u8]) -> Result<(), TemplateError> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(TemplateError::io(path))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(Permissions::from_mode(0o600))
            .map_err(TemplateError::io(path))?;
    }
    file.write_all(contents).map_err(TemplateError::io(path))
}

#[cfg(unix)]
fn owner_writable(permissions: &Permissions) -> Permissions {
    use std::os::unix::fs::PermissionsExt;
    Permissions::from_mode((permissions.mode() & 0o7777) | 0o700)
}

#[cfg(not(unix))]
fn owner_writable(permissions: &Permissions) -> Permissions {
    let mut permissions = permissions.clone();
    permissions.set_readonly(false);
    permissions
}

fn quote(value: Value) -> String {
    if value.is_undefined() || value.is_none() {
        return String::new();
    }
    format!("{:?}", value.to_string())
}

fn squote(value: Value) -> String {
    if value.is_undefined() || value.is_none() {
        return String::new();
    }
    format!("'{value}'")
}

fn b64enc(value: Value) -> String {
    STANDARD.encode(value.to_string())
}

fn b64dec(value: Value) -> Result<String, minijinja::Error> {
    let bytes = STANDARD.decode(value.to_string()).map_err(|e| {
        minijinja::Error::new(ErrorKind::InvalidOperation, format!("b64dec: {e}"))
    })?;
    String::from_utf8(bytes)
        .map_err(|e| minijinja::Error::new(ErrorKind::InvalidOperation, format!("b64dec: {e}")))
}
