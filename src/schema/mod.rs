//! Typed memory schemas
//!
//! Schemas declare named, typed fields with optional validation rules.
//! Typed stores validate structured content against the schema before the
//! entry is written; typed searches filter on structured fields with
//! equality and comparison operators.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::{MnemoError, Result};
use crate::memory::{MemoryService, StoreRequest};
use crate::storage::queries::{self, MEMORY_COLUMNS};
use crate::storage::Storage;
use crate::types::*;

static SCHEMA_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_]{1,128}$").expect("schema name regex"));
static FIELD_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_]{1,64}$").expect("field name regex"));

/// Parameters for `SchemaService::store_typed`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypedStoreRequest {
    pub schema_name: String,
    pub namespace: Option<String>,
    pub structured_content: HashMap<String, serde_json::Value>,
    /// Free-text content; defaults to the serialized structured fields
    pub content: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A structured-field predicate for typed search: either a bare value
/// (equality) or an object with `$gte` / `$lte` / `$gt` / `$lt`
pub type TypedFilters = HashMap<String, serde_json::Value>;

/// Service for managing memory schemas
#[derive(Clone)]
pub struct SchemaService {
    storage: Storage,
    memory: MemoryService,
}

impl SchemaService {
    pub fn new(storage: Storage, memory: MemoryService) -> Self {
        Self { storage, memory }
    }

    /// Register a new schema
    pub async fn register_schema(
        &self,
        name: &str,
        namespace: Option<&str>,
        fields: Vec<SchemaField>,
    ) -> Result<MemorySchema> {
        if !SCHEMA_NAME_RE.is_match(name) {
            return Err(MnemoError::Validation(format!(
                "invalid schema name: {} (1-128 alphanumeric or underscore)",
                name
            )));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for field in &fields {
            if !FIELD_NAME_RE.is_match(&field.name) {
                return Err(MnemoError::Validation(format!(
                    "invalid field name: {} (1-64 alphanumeric or underscore)",
                    field.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(MnemoError::Validation(format!(
                    "duplicate field name: {}",
                    field.name
                )));
            }
        }

        let namespace = self.memory.resolver().resolve(namespace);

        self.storage.with_transaction(|conn| {
            if Self::find_schema(conn, &namespace, name, None)?.is_some() {
                return Err(MnemoError::Conflict(format!(
                    "schema '{}' already exists in namespace '{}'",
                    name, namespace
                )));
            }

            let now = Utc::now();
            let schema = MemorySchema {
                id: new_id(),
                name: name.to_string(),
                namespace: namespace.clone(),
                version: 1,
                fields,
                created_at: now,
                updated_at: now,
            };

            conn.execute(
                "INSERT INTO memory_schemas (
                    id, name, namespace, version, fields, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    schema.id,
                    schema.name,
                    schema.namespace,
                    schema.version,
                    serde_json::to_string(&schema.fields)?,
                    schema.created_at.to_rfc3339(),
                    schema.updated_at.to_rfc3339(),
                ],
            )?;

            Ok(schema)
        })
    }

    fn schema_from_row(row: &Row) -> rusqlite::Result<MemorySchema> {
        let fields_str: String = row.get("fields")?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;

        Ok(MemorySchema {
            id: row.get("id")?,
            name: row.get("name")?,
            namespace: row.get("namespace")?,
            version: row.get("version")?,
            fields: serde_json::from_str(&fields_str).unwrap_or_default(),
            created_at: queries::parse_dt(&created_at),
            updated_at: queries::parse_dt(&updated_at),
        })
    }

    fn find_schema(
        conn: &Connection,
        namespace: &str,
        name: &str,
        version: Option<i64>,
    ) -> Result<Option<MemorySchema>> {
        let result = match version {
            Some(version) => conn
                .query_row(
                    "SELECT id, name, namespace, version, fields, created_at, updated_at
                     FROM memory_schemas
                     WHERE namespace = ?1 AND name = ?2 AND version = ?3",
                    params![namespace, name, version],
                    Self::schema_from_row,
                )
                .optional()?,
            None => conn
                .query_row(
                    "SELECT id, name, namespace, version, fields, created_at, updated_at
                     FROM memory_schemas
                     WHERE namespace = ?1 AND name = ?2
                     ORDER BY version DESC
                     LIMIT 1",
                    params![namespace, name],
                    Self::schema_from_row,
                )
                .optional()?,
        };
        Ok(result)
    }

    /// Latest (or specific) version of a schema
    pub async fn get_schema(
        &self,
        namespace: Option<&str>,
        name: &str,
        version: Option<i64>,
    ) -> Result<Option<MemorySchema>> {
        let namespace = self.memory.resolver().resolve(namespace);
        self.storage
            .with_connection(|conn| Self::find_schema(conn, &namespace, name, version))
    }

    /// List schemas, optionally restricted to a namespace
    pub async fn list_schemas(&self, namespace: Option<&str>) -> Result<Vec<MemorySchema>> {
        self.storage.with_connection(|conn| {
            let mut schemas = Vec::new();

            if let Some(namespace) = namespace {
                let mut stmt = conn.prepare_cached(
                    "SELECT id, name, namespace, version, fields, created_at, updated_at
                     FROM memory_schemas
                     WHERE namespace = ?1
                     ORDER BY name, version DESC",
                )?;
                let rows = stmt.query_map(params![namespace], Self::schema_from_row)?;
                for row in rows {
                    schemas.push(row?);
                }
            } else {
                let mut stmt = conn.prepare_cached(
                    "SELECT id, name, namespace, version, fields, created_at, updated_at
                     FROM memory_schemas
                     ORDER BY namespace, name, version DESC",
                )?;
                let rows = stmt.query_map([], Self::schema_from_row)?;
                for row in rows {
                    schemas.push(row?);
                }
            }

            Ok(schemas)
        })
    }

    /// Validate structured data against a schema
    pub fn validate_data(
        schema: &MemorySchema,
        data: &HashMap<String, serde_json::Value>,
    ) -> (bool, Vec<String>) {
        let mut errors = Vec::new();

        for field in &schema.fields {
            if field.required && !data.contains_key(&field.name) {
                errors.push(format!("required field missing: {}", field.name));
            }
        }

        for field in &schema.fields {
            let Some(value) = data.get(&field.name) else {
                continue;
            };

            if value.is_null() {
                if field.required {
                    errors.push(format!("field '{}' cannot be null", field.name));
                }
                continue;
            }

            let type_ok = match field.field_type {
                FieldType::String | FieldType::Datetime => value.is_string(),
                FieldType::Number => value.is_number(),
                FieldType::Boolean => value.is_boolean(),
                FieldType::Array => value.is_array(),
                FieldType::Object => value.is_object(),
            };
            if !type_ok {
                errors.push(format!(
                    "field '{}' has invalid type, expected {}",
                    field.name,
                    field.field_type.as_str()
                ));
                continue;
            }

            if let Some(ref rules) = field.validation {
                Self::apply_validation_rules(field, value, rules, &mut errors);
            }
        }

        (errors.is_empty(), errors)
    }

    fn apply_validation_rules(
        field: &SchemaField,
        value: &serde_json::Value,
        rules: &HashMap<String, serde_json::Value>,
        errors: &mut Vec<String>,
    ) {
        if field.field_type == FieldType::Number {
            if let Some(number) = value.as_f64() {
                if let Some(min) = rules.get("min").and_then(|v| v.as_f64()) {
                    if number < min {
                        errors.push(format!("field '{}' must be >= {}", field.name, min));
                    }
                }
                if let Some(max) = rules.get("max").and_then(|v| v.as_f64()) {
                    if number > max {
                        errors.push(format!("field '{}' must be <= {}", field.name, max));
                    }
                }
            }
        }

        if field.field_type == FieldType::String {
            if let Some(s) = value.as_str() {
                let len = s.chars().count() as f64;
                if let Some(min) = rules.get("min").and_then(|v| v.as_f64()) {
                    if len < min {
                        errors.push(format!(
                            "field '{}' must have length >= {}",
                            field.name, min
                        ));
                    }
                }
                if let Some(max) = rules.get("max").and_then(|v| v.as_f64()) {
                    if len > max {
                        errors.push(format!(
                            "field '{}' must have length <= {}",
                            field.name, max
                        ));
                    }
                }
                if let Some(pattern) = rules.get("pattern").and_then(|v| v.as_str()) {
                    match Regex::new(pattern) {
                        Ok(re) => {
                            if !re.is_match(s) {
                                errors.push(format!(
                                    "field '{}' does not match pattern: {}",
                                    field.name, pattern
                                ));
                            }
                        }
                        Err(_) => {
                            errors.push(format!(
                                "field '{}' has an invalid pattern rule",
                                field.name
                            ));
                        }
                    }
                }
            }
        }

        if let Some(allowed) = rules.get("enum").and_then(|v| v.as_array()) {
            if !allowed.contains(value) {
                errors.push(format!(
                    "field '{}' must be one of the enum values",
                    field.name
                ));
            }
        }
    }

    /// Store a typed memory after schema validation
    pub async fn store_typed(&self, req: TypedStoreRequest) -> Result<Memory> {
        let namespace = self.memory.resolver().resolve(req.namespace.as_deref());

        let schema = self
            .storage
            .with_connection(|conn| Self::find_schema(conn, &namespace, &req.schema_name, None))?
            .ok_or_else(|| {
                MnemoError::NotFound(format!(
                    "schema '{}' in namespace '{}'",
                    req.schema_name, namespace
                ))
            })?;

        let (ok, errors) = Self::validate_data(&schema, &req.structured_content);
        if !ok {
            return Err(MnemoError::Validation(format!(
                "schema validation failed: {}",
                errors.join("; ")
            )));
        }

        let content = match req.content {
            Some(content) => content,
            None => serde_json::to_string(&req.structured_content)?,
        };

        let store_req = StoreRequest {
            content,
            content_type: ContentType::Json,
            tier: MemoryTier::LongTerm,
            tags: req.tags,
            metadata: req.metadata,
            agent_id: None,
            ttl_seconds: None,
            namespace: Some(namespace),
        };

        self.memory
            .store_with_schema(store_req, schema.id, req.structured_content)
            .await
    }

    /// Search typed memories by structured fields
    ///
    /// A filter value is either a bare value (equality) or an object with
    /// comparison operators: `$gte`, `$lte`, `$gt`, `$lt`. Filter keys must
    /// name fields declared by the schema.
    pub async fn search_typed(
        &self,
        schema_name: &str,
        namespace: Option<&str>,
        filters: &TypedFilters,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        let namespace = self.memory.resolver().resolve(namespace);

        let schema = self
            .storage
            .with_connection(|conn| Self::find_schema(conn, &namespace, schema_name, None))?
            .ok_or_else(|| {
                MnemoError::NotFound(format!(
                    "schema '{}' in namespace '{}'",
                    schema_name, namespace
                ))
            })?;

        let known_fields: HashSet<&str> =
            schema.fields.iter().map(|f| f.name.as_str()).collect();

        let mut sql = format!(
            "SELECT {MEMORY_COLUMNS} FROM memories m WHERE m.schema_id = ?"
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(schema.id.clone())];

        for (field, predicate) in filters {
            if !known_fields.contains(field.as_str()) {
                return Err(MnemoError::Validation(format!(
                    "unknown filter field: {}",
                    field
                )));
            }

            match predicate {
                serde_json::Value::Object(ops) => {
                    for (op, value) in ops {
                        let sql_op = match op.as_str() {
                            "$gte" => ">=",
                            "$lte" => "<=",
                            "$gt" => ">",
                            "$lt" => "<",
                            other => {
                                return Err(MnemoError::Validation(format!(
                                    "unknown operator: {}",
                                    other
                                )))
                            }
                        };
                        sql.push_str(&format!(
                            " AND json_extract(m.structured_content, '$.{}') {} ?",
                            field, sql_op
                        ));
                        params.push(json_param(value)?);
                    }
                }
                value => {
                    sql.push_str(&format!(
                        " AND json_extract(m.structured_content, '$.{}') = ?",
                        field
                    ));
                    params.push(json_param(value)?);
                }
            }
        }

        sql.push_str(" ORDER BY m.created_at DESC LIMIT ?");
        params.push(Box::new(limit.min(1000) as i64));

        self.storage.with_connection(|conn| {
            let param_refs: Vec<&dyn rusqlite::ToSql> =
                params.iter().map(|b| b.as_ref()).collect();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(param_refs.as_slice(), queries::memory_from_row)?;

            let mut memories = Vec::new();
            for row in rows {
                memories.push(row?);
            }
            Ok(memories)
        })
    }
}

fn json_param(value: &serde_json::Value) -> Result<Box<dyn rusqlite::ToSql>> {
    match value {
        serde_json::Value::String(s) => Ok(Box::new(s.clone())),
        serde_json::Value::Bool(b) => Ok(Box::new(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Box::new(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Box::new(f))
            } else {
                Err(MnemoError::Validation("unsupported number".to_string()))
            }
        }
        _ => Err(MnemoError::Validation(
            "filter values must be scalars".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_with(fields: Vec<SchemaField>) -> MemorySchema {
        MemorySchema {
            id: "s1".to_string(),
            name: "task".to_string(),
            namespace: "default".to_string(),
            version: 1,
            fields,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn field(name: &str, field_type: FieldType, required: bool) -> SchemaField {
        SchemaField {
            name: name.to_string(),
            field_type,
            required,
            indexed: false,
            validation: None,
        }
    }

    #[test]
    fn test_required_field_enforced() {
        let schema = schema_with(vec![field("title", FieldType::String, true)]);
        let (ok, errors) = SchemaService::validate_data(&schema, &HashMap::new());
        assert!(!ok);
        assert!(errors[0].contains("title"));
    }

    #[test]
    fn test_type_mismatch() {
        let schema = schema_with(vec![field("count", FieldType::Number, true)]);
        let mut data = HashMap::new();
        data.insert("count".to_string(), serde_json::json!("three"));

        let (ok, errors) = SchemaService::validate_data(&schema, &data);
        assert!(!ok);
        assert!(errors[0].contains("invalid type"));
    }

    #[test]
    fn test_validation_rules() {
        let mut priority = field("priority", FieldType::Number, true);
        priority.validation = Some(HashMap::from([
            ("min".to_string(), serde_json::json!(1)),
            ("max".to_string(), serde_json::json!(5)),
        ]));
        let schema = schema_with(vec![priority]);

        let mut ok_data = HashMap::new();
        ok_data.insert("priority".to_string(), serde_json::json!(3));
        assert!(SchemaService::validate_data(&schema, &ok_data).0);

        let mut bad_data = HashMap::new();
        bad_data.insert("priority".to_string(), serde_json::json!(9));
        let (ok, errors) = SchemaService::validate_data(&schema, &bad_data);
        assert!(!ok);
        assert!(errors[0].contains("<= 5"));
    }

    #[test]
    fn test_enum_rule() {
        let mut status = field("status", FieldType::String, true);
        status.validation = Some(HashMap::from([(
            "enum".to_string(),
            serde_json::json!(["open", "closed"]),
        )]));
        let schema = schema_with(vec![status]);

        let mut data = HashMap::new();
        data.insert("status".to_string(), serde_json::json!("pending"));
        let (ok, _) = SchemaService::validate_data(&schema, &data);
        assert!(!ok);

        data.insert("status".to_string(), serde_json::json!("open"));
        assert!(SchemaService::validate_data(&schema, &data).0);
    }

    #[test]
    fn test_pattern_rule() {
        let mut code = field("code", FieldType::String, true);
        code.validation = Some(HashMap::from([(
            "pattern".to_string(),
            serde_json::json!("^[A-Z]{3}-\\d+$"),
        )]));
        let schema = schema_with(vec![code]);

        let mut data = HashMap::new();
        data.insert("code".to_string(), serde_json::json!("ABC-42"));
        assert!(SchemaService::validate_data(&schema, &data).0);

        data.insert("code".to_string(), serde_json::json!("abc"));
        assert!(!SchemaService::validate_data(&schema, &data).0);
    }
}
