use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{DecodeError, EncodeError};
use crate::value::{Message, Value};

/// Maps an application-level representation onto a message type and back.
///
/// Registered under a message's full name, a translator is consulted for every
/// field of that message type: `encode` runs before the value is verified and
/// written, `decode` runs on each freshly decoded instance.
pub trait Translator: Send + Sync {
    fn encode(&self, value: &Value) -> Result<Message, EncodeError>;

    fn decode(&self, message: Message) -> Result<Value, DecodeError>;
}

/// Session-wide settings, fixed when a builder is created.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Rename fields from `under_score` to `camelCase` when importing.
    pub convert_fields_to_camel_case: bool,
    /// Register named accessors (field name, camelCase and snake_case aliases).
    pub populate_accessors: bool,
    /// Fill in schema defaults for fields missing from decoded input.
    pub populate_defaults: bool,
    /// Keep the raw bytes of unknown fields on decoded messages.
    pub retain_unknown_fields: bool,
    /// Silently skip an import whose origin was imported before.
    pub allow_duplicate_imports: bool,
    #[serde(skip)]
    pub translators: HashMap<String, Arc<dyn Translator>>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            convert_fields_to_camel_case: false,
            populate_accessors: true,
            populate_defaults: true,
            retain_unknown_fields: false,
            allow_duplicate_imports: false,
            translators: HashMap::new(),
        }
    }
}

impl Options {
    /// Reads options from a JSON document; absent keys keep their defaults.
    pub fn from_json_str(text: &str) -> Result<Options, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Registers `translator` for the message type `type_name` (leading dot
    /// optional).
    pub fn with_translator(mut self, type_name: &str, translator: Arc<dyn Translator>) -> Options {
        let name = type_name.strip_prefix('.').unwrap_or(type_name);
        self.translators.insert(name.to_owned(), translator);
        self
    }

    pub fn translator(&self, type_name: &str) -> Option<&Arc<dyn Translator>> {
        self.translators.get(type_name)
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut translators: Vec<_> = self.translators.keys().collect();
        translators.sort();
        f.debug_struct("Options")
            .field("convert_fields_to_camel_case", &self.convert_fields_to_camel_case)
            .field("populate_accessors", &self.populate_accessors)
            .field("populate_defaults", &self.populate_defaults)
            .field("retain_unknown_fields", &self.retain_unknown_fields)
            .field("allow_duplicate_imports", &self.allow_duplicate_imports)
            .field("translators", &translators)
            .finish()
    }
}
