//! JSON (de)serialization of configuration and metadata files.

use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;

/// Default directory holding sample configuration files.
pub const TEMPLATES_DIR: &str = "templates";

/// Reads a JSON-encoded file from `path` and deserializes it into `T`.
///
/// # Errors
///
/// Returns an `anyhow::Error` if the file is missing, unreadable, or not
/// valid JSON for `T`.
pub fn load_json<P, T>(path: P) -> anyhow::Result<T>
where
    P: AsRef<Path>,
    T: DeserializeOwned,
{
    let path = path.as_ref();
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            anyhow::bail!(
                "Config file {:?} not found.
                Copy one from /{} or pass --config explicitly.",
                path,
                TEMPLATES_DIR
            );
        }
        Err(e) => return Err(e).context(format!("opening file {:?}", path)),
    };
    serde_json::from_reader(file).with_context(|| format!("parsing JSON from {:?}", path))
}
