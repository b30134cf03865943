//! brine-proto
//!
//! Protocol Buffers without code generation. Load `.proto` text (or its JSON
//! form) into a [Builder], build a [RuntimeType] per message, and encode or
//! decode wire bytes against it.
//!
//! - `load_proto` / `load_proto_file` / `load_json` / `load_json_file`
//! - `decode_to_json` for quick inspection of a buffer
//! - Re-exports of the compiler and schema crates
//!
//! ```
//! use brine_proto::{load_proto, Value};
//!
//! let builder = load_proto("message Ping { optional uint32 seq = 1; }", None, None).unwrap();
//! let ping = builder.build("Ping").unwrap();
//!
//! let mut message = ping.new_message();
//! ping.set(&mut message, "seq", Value::Uint32(7)).unwrap();
//! let bytes = ping.encode(&message).unwrap();
//! assert_eq!(bytes, [0x08, 0x07]);
//! assert_eq!(ping.decode(&bytes).unwrap(), message);
//! ```

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

pub use brine_proto_compiler::{compile_schema, parse_schema, Builder, ProtoError, Schema};
pub use brine_proto_schema::{
    value_to_json, ByteBuffer, ByteBufferMut, DecodeError, EncodeError, MapKey, Message, Options,
    RuntimeType, Translator, Value,
};

/// Creates an empty builder with `options`.
pub fn new_builder(options: Options) -> Builder {
    Builder::new(options)
}

/// Parses `.proto` text, imports it into `builder` (or a fresh one) and
/// resolves everything imported so far.
///
/// With a `filename`, the file's imports are read relative to its directory
/// and the file itself is recorded under that name. Without one, imports are
/// expected to be present in `builder` already.
pub fn load_proto(text: &str, builder: Option<Builder>, filename: Option<&str>) -> Result<Builder, ProtoError> {
    let schema = parse_schema(text)?;
    load_schema(&schema, builder, filename)
}

/// Reads a `.proto` file and loads it, following its imports.
pub fn load_proto_file(path: impl AsRef<Path>, builder: Option<Builder>) -> Result<Builder, ProtoError> {
    load_file(path.as_ref(), builder)
}

/// Same as [load_proto] for a schema in its JSON form.
pub fn load_json(text: &str, builder: Option<Builder>, filename: Option<&str>) -> Result<Builder, ProtoError> {
    let schema = Schema::from_json(text)?;
    load_schema(&schema, builder, filename)
}

pub fn load_json_file(path: impl AsRef<Path>, builder: Option<Builder>) -> Result<Builder, ProtoError> {
    load_file(path.as_ref(), builder)
}

/// Decode `bytes` as the message `type_name` into pretty-printed JSON.
pub fn decode_to_json(builder: &Builder, type_name: &str, bytes: &[u8]) -> Result<String, ProtoError> {
    let runtime = builder.build(type_name)?;
    let message = runtime.decode(bytes)?;
    Ok(serde_json::to_string_pretty(&runtime.to_json(&message))?)
}

fn load_file(path: &Path, builder: Option<Builder>) -> Result<Builder, ProtoError> {
    let mut loader = Loader::new(builder);
    loader.import_file(path.to_path_buf(), false)?;
    loader.finish()
}

fn load_schema(schema: &Schema, builder: Option<Builder>, filename: Option<&str>) -> Result<Builder, ProtoError> {
    let mut loader = Loader::new(builder);
    loader.import_schema(schema, filename.map(Path::new))?;
    loader.finish()
}

/// Walks a file's imports depth first, so that every dependency is imported
/// before the file that needs it.
struct Loader {
    builder: Builder,
    pending: HashSet<PathBuf>,
}

impl Loader {
    fn new(builder: Option<Builder>) -> Loader {
        Loader {
            builder: builder.unwrap_or_default(),
            pending: HashSet::new(),
        }
    }

    fn finish(mut self) -> Result<Builder, ProtoError> {
        self.builder.resolve_all()?;
        Ok(self.builder)
    }

    fn import_schema(&mut self, schema: &Schema, origin: Option<&Path>) -> Result<(), ProtoError> {
        match origin {
            Some(origin) => {
                let base = origin.parent().unwrap_or_else(|| Path::new(""));
                for import in &schema.imports {
                    self.import_file(base.join(import), false)?;
                }
                for import in &schema.weak_imports {
                    self.import_file(base.join(import), true)?;
                }
            }
            None if !schema.imports.is_empty() => {
                debug!(imports = ?schema.imports, "no file name given, imports must already be loaded");
            }
            None => {}
        }
        let origin = origin.map(|path| path.to_string_lossy());
        self.builder.import(schema, origin.as_deref())
    }

    fn import_file(&mut self, path: PathBuf, weak: bool) -> Result<(), ProtoError> {
        let origin = path.to_string_lossy().into_owned();
        if self.builder.is_imported(&origin) || self.pending.contains(&path) {
            return Ok(());
        }

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if weak && err.kind() == io::ErrorKind::NotFound => {
                warn!(path = %origin, "weak import not found, skipping");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        let schema = if path.extension().is_some_and(|ext| ext == "json") {
            Schema::from_json(&text)?
        } else {
            parse_schema(&text)?
        };

        debug!(path = %origin, "loading schema file");
        self.pending.insert(path.clone());
        let result = self.import_schema(&schema, Some(&path));
        self.pending.remove(&path);
        result
    }
}

pub mod error {
    pub use brine_proto_compiler::error::ProtoError;
    pub use brine_proto_schema::{BuildError, DecodeError, EncodeError};
}

pub mod schema {
    pub use brine_proto_schema::*;
}
