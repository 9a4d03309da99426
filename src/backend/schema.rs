use schemars::JsonSchema;
use serde_json::{Map, Value};

/// String formats the Responses API accepts inside a strict schema.
const SUPPORTED_FORMATS: &[&str] = &[
    "date-time", "time", "date", "duration", "email", "hostname", "ipv4", "ipv6", "uuid",
];

/// Max length of a `json_schema` format name.
const MAX_NAME_LEN: usize = 64;

/// Build the `text.format` parameter for a structured-output request targeting `T`.
///
/// Shape: `{"type": "json_schema", "name": ..., "schema": ..., "strict": true}`.
pub fn text_format<T: JsonSchema>() -> Value {
    let mut schema = schemars::schema_for!(T).to_value();
    if let Value::Object(root) = &mut schema {
        root.remove("$schema");
    }
    make_strict(&mut schema);

    serde_json::json!({
        "type": "json_schema",
        "name": format_name(&T::schema_name()),
        "schema": schema,
        "strict": true,
    })
}

/// Prefix of local definition references emitted by schemars.
const DEFS_PREFIX: &str = "#/$defs/";

/// Keywords whose value is a single subschema.
const SUBSCHEMA_KEYS: &[&str] = &["items", "not"];

/// Keywords whose value is a list of subschemas.
const SUBSCHEMA_LIST_KEYS: &[&str] = &["anyOf", "allOf", "oneOf", "prefixItems"];

/// Keywords whose value maps names to subschemas.
const SUBSCHEMA_MAP_KEYS: &[&str] = &["properties", "$defs", "definitions"];

/// Rewrite a generated schema into the subset strict mode accepts: every object closes
/// `additionalProperties` and lists all of its properties as required (optional fields
/// stay nullable through their type), a `$ref` with sibling keywords is replaced by
/// its definition, and unsupported `format` hints are dropped.
fn make_strict(schema: &mut Value) {
    let definitions = schema
        .get("$defs")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    Strictifier {
        definitions,
        expanding: Vec::new(),
    }
    .walk(schema);
}

/// Walks schema keywords only, so data that merely looks like a keyword (a field
/// called `properties`, say) is left alone.
struct Strictifier {
    definitions: Map<String, Value>,
    /// Definitions currently being inlined, to stop on recursive types.
    expanding: Vec<String>,
}

impl Strictifier {
    fn walk(&mut self, schema: &mut Value) {
        let Value::Object(map) = schema else {
            return;
        };
        let inlined = self.inline_ref(map);

        drop_unsupported_format(map);
        for key in SUBSCHEMA_KEYS {
            if let Some(child) = map.get_mut(*key) {
                self.walk(child);
            }
        }
        for key in SUBSCHEMA_LIST_KEYS {
            if let Some(Value::Array(children)) = map.get_mut(*key) {
                children.iter_mut().for_each(|child| self.walk(child));
            }
        }
        for key in SUBSCHEMA_MAP_KEYS {
            if let Some(Value::Object(children)) = map.get_mut(*key) {
                children.values_mut().for_each(|child| self.walk(child));
            }
        }
        close_object(map);

        if inlined {
            self.expanding.pop();
        }
    }

    /// Strict mode rejects `$ref` next to other keywords (schemars emits that for a
    /// documented struct field). Merge the definition in, the sibling keywords winning.
    fn inline_ref(&mut self, map: &mut Map<String, Value>) -> bool {
        if map.len() < 2 {
            return false;
        }
        let Some(reference) = map.get("$ref").and_then(Value::as_str) else {
            return false;
        };
        let name = reference
            .strip_prefix(DEFS_PREFIX)
            .unwrap_or_default()
            .to_string();

        let definition = match self.definitions.get(&name) {
            Some(Value::Object(definition)) if !self.expanding.contains(&name) => {
                definition.clone()
            }
            _ => {
                // Recursive, root (`#`) or unknown: keep the bare reference.
                map.retain(|key, _| key == "$ref");
                return false;
            }
        };

        map.remove("$ref");
        for (key, value) in definition {
            map.entry(key).or_insert(value);
        }
        self.expanding.push(name);
        true
    }
}

fn drop_unsupported_format(map: &mut Map<String, Value>) {
    let unsupported = matches!(
        map.get("format"),
        Some(Value::String(format)) if !SUPPORTED_FORMATS.contains(&format.as_str())
    );
    if unsupported {
        map.remove("format");
    }
}

fn close_object(map: &mut Map<String, Value>) {
    let Some(Value::Object(properties)) = map.get("properties") else {
        return;
    };
    let required: Vec<Value> = properties.keys().cloned().map(Value::String).collect();
    map.insert("required".to_string(), Value::Array(required));
    map.insert("additionalProperties".to_string(), Value::Bool(false));
}

/// Sanitize a schema name: only alphanumerics, `-` and `_`, capped in length.
pub fn format_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_LEN)
        .collect();
    if sanitized.is_empty() {
        "response".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    #[derive(JsonSchema)]
    struct Author {
        name: String,
        affiliation: Option<String>,
    }

    #[allow(dead_code)]
    #[derive(JsonSchema)]
    struct Summary {
        title: String,
        pages: u32,
        authors: Vec<Author>,
    }

    #[test]
    fn format_wraps_schema_in_strict_envelope() {
        let format = text_format::<Summary>();
        assert_eq!(format["type"], "json_schema");
        assert_eq!(format["name"], "Summary");
        assert_eq!(format["strict"], true);
        assert!(format["schema"].get("$schema").is_none());
    }

    #[test]
    fn every_object_is_closed_and_fully_required() {
        let format = text_format::<Summary>();
        let schema = &format["schema"];
        assert_eq!(schema["additionalProperties"], false);
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert!(required.contains(&"title"));
        assert!(required.contains(&"pages"));
        assert!(required.contains(&"authors"));

        let author = &schema["$defs"]["Author"];
        assert_eq!(author["additionalProperties"], false);
        assert_eq!(author["required"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn unsupported_formats_are_dropped() {
        let format = text_format::<Summary>();
        assert!(format["schema"]["properties"]["pages"].get("format").is_none());
    }

    #[allow(dead_code)]
    #[derive(JsonSchema)]
    struct Paper {
        /// First author of the paper.
        author: Author,
        properties: Vec<String>,
    }

    #[allow(dead_code)]
    #[derive(JsonSchema)]
    struct Thread {
        /// Replies to this post.
        replies: Vec<Thread>,
        /// The post being replied to.
        parent: Option<Box<Thread>>,
    }

    fn keys(value: &Value) -> Vec<&str> {
        value.as_object().unwrap().keys().map(String::as_str).collect()
    }

    #[test]
    fn field_named_properties_is_not_a_schema() {
        let format = text_format::<Paper>();
        let schema = &format["schema"];

        let mut fields = keys(&schema["properties"]);
        fields.sort();
        assert_eq!(fields, vec!["author", "properties"]);

        let field = &schema["properties"]["properties"];
        assert_eq!(field["type"], "array");
        assert_eq!(field["items"]["type"], "string");
        assert!(field.get("required").is_none());
        assert!(field.get("additionalProperties").is_none());
    }

    #[test]
    fn documented_struct_field_inlines_its_definition() {
        let format = text_format::<Paper>();
        let author = &format["schema"]["properties"]["author"];

        assert!(author.get("$ref").is_none(), "got: {author}");
        assert_eq!(author["description"], "First author of the paper.");
        assert_eq!(author["additionalProperties"], false);
        let mut fields = keys(&author["properties"]);
        fields.sort();
        assert_eq!(fields, vec!["affiliation", "name"]);
        assert_eq!(author["required"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn recursive_types_terminate() {
        let format = text_format::<Thread>();
        let schema = &format["schema"];
        assert_eq!(schema["additionalProperties"], false);

        fn has_ref_with_siblings(value: &Value) -> bool {
            match value {
                Value::Object(map) => {
                    (map.contains_key("$ref") && map.len() > 1)
                        || map.values().any(has_ref_with_siblings)
                }
                Value::Array(items) => items.iter().any(has_ref_with_siblings),
                _ => false,
            }
        }
        assert!(!has_ref_with_siblings(schema), "got: {schema}");
    }

    #[test]
    fn names_are_sanitized() {
        assert_eq!(format_name("Wrapper<Item>"), "Wrapper_Item_");
        assert_eq!(format_name(""), "response");
        assert_eq!(format_name(&"x".repeat(100)).len(), MAX_NAME_LEN);
    }
}
