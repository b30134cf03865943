//! The schema AST. Parsed `.proto` text and JSON schema documents share this
//! shape; both feed [Builder::import](crate::resolver::Builder::import).

use brine_proto_schema::{OptionMap, Rule, Syntax};
use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Schema {
    pub package:      Option<String>,
    pub syntax:       Syntax,
    pub options:      OptionMap,
    pub imports:      Vec<String>,
    pub weak_imports: Vec<String>,
    pub messages:     Vec<MessageDecl>,
    pub enums:        Vec<EnumDecl>,
    pub services:     Vec<ServiceDecl>,
    pub extends:      Vec<ExtendDecl>,
}

impl Schema {
    pub fn from_json(text: &str) -> Result<Schema, ProtoError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_value(value: serde_json::Value) -> Result<Schema, ProtoError> {
        Ok(serde_json::from_value(value)?)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageDecl {
    pub name:            String,
    pub fields:          Vec<FieldDecl>,
    /// Oneof names in declaration order; members point here by name.
    pub oneofs:          Vec<String>,
    pub enums:           Vec<EnumDecl>,
    pub messages:        Vec<MessageDecl>,
    pub extends:         Vec<ExtendDecl>,
    pub extensions:      Vec<(i64, i64)>,
    pub reserved_ranges: Vec<(i64, i64)>,
    pub reserved_names:  Vec<String>,
    pub options:         OptionMap,
    pub is_group:        bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldDecl {
    pub rule:     Rule,
    #[serde(rename = "type")]
    pub type_:    String,
    pub key_type: Option<String>,
    pub name:     String,
    pub id:       i64,
    pub options:  OptionMap,
    pub oneof:    Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnumDecl {
    pub name:            String,
    pub values:          Vec<EnumValueDecl>,
    pub reserved_ranges: Vec<(i64, i64)>,
    pub reserved_names:  Vec<String>,
    pub options:         OptionMap,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnumValueDecl {
    pub name:    String,
    pub id:      i64,
    pub options: OptionMap,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceDecl {
    pub name:    String,
    pub methods: Vec<MethodDecl>,
    pub options: OptionMap,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodDecl {
    pub name:            String,
    pub request:         String,
    pub response:        String,
    pub request_stream:  bool,
    pub response_stream: bool,
    pub options:         OptionMap,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtendDecl {
    #[serde(rename = "ref")]
    pub ref_:   String,
    pub fields: Vec<FieldDecl>,
}
