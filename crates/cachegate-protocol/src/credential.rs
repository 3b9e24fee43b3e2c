//! The credential carrier: the identity material a client presents.
//!
//! A [`CredentialCarrier`] is an ordered list of named fields. Which
//! fields exist is up to the authentication scheme; the password scheme
//! uses [`PRINCIPAL_FIELD`] and [`SECRET_FIELD`], a token scheme might
//! carry a single secret `token` field.
//!
//! Carriers are immutable once built. Every structural rule (field
//! count, names, duplicates) is checked both by [`CredentialBuilder`]
//! and when a carrier is deserialized off the wire, so a carrier value
//! in memory is always well-formed.
//!
//! Secret fields are redacted from `Debug` output and wiped from memory
//! when the carrier is dropped. A field named [`SECRET_FIELD`] is always
//! secret, no matter how the client flagged it.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use zeroize::Zeroize;

/// Field carrying the principal (user) name.
pub const PRINCIPAL_FIELD: &str = "principal";

/// Field carrying the principal's secret (password).
pub const SECRET_FIELD: &str = "secret";

/// Maximum number of fields in one carrier.
pub const MAX_CREDENTIAL_FIELDS: usize = 32;

/// Maximum length of a field name, in bytes.
pub const MAX_FIELD_NAME_BYTES: usize = 128;

// ---------------------------------------------------------------------------
// CarrierError
// ---------------------------------------------------------------------------

/// Structural problems with a credential carrier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CarrierError {
    /// The carrier has no fields at all.
    #[error("credential carries no fields")]
    Empty,

    /// More fields than [`MAX_CREDENTIAL_FIELDS`].
    #[error("credential carries {count} fields, limit is {max}")]
    TooManyFields { count: usize, max: usize },

    /// A field with an empty name.
    #[error("credential field name is empty")]
    EmptyFieldName,

    /// A field name longer than [`MAX_FIELD_NAME_BYTES`].
    #[error("credential field name of {len} bytes exceeds {max}")]
    FieldNameTooLong { len: usize, max: usize },

    /// Two fields with the same name.
    #[error("credential field `{0}` appears more than once")]
    DuplicateField(String),
}

// ---------------------------------------------------------------------------
// FieldValue / CredentialField
// ---------------------------------------------------------------------------

/// The value of one credential field.
///
/// Externally tagged on the wire: `{"text": "super-user"}` or
/// `{"bytes": [1, 2, 3]}`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    /// UTF-8 text (names, passwords).
    Text(String),
    /// Raw bytes (tokens, signatures).
    Bytes(Vec<u8>),
}

impl FieldValue {
    /// Returns the value as text, or `None` for byte values.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Bytes(_) => None,
        }
    }

    /// Returns the raw bytes of the value (UTF-8 bytes for text).
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FieldValue::Text(s) => s.as_bytes(),
            FieldValue::Bytes(b) => b,
        }
    }
}

impl Zeroize for FieldValue {
    fn zeroize(&mut self) {
        match self {
            FieldValue::Text(s) => s.zeroize(),
            FieldValue::Bytes(b) => b.zeroize(),
        }
    }
}

/// One named field of a carrier.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialField {
    name: String,
    value: FieldValue,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    secret: bool,
}

impl CredentialField {
    /// The field's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The field's value.
    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    /// Whether the field holds secret material.
    pub fn is_secret(&self) -> bool {
        self.secret
    }
}

impl fmt::Debug for CredentialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("CredentialField");
        s.field("name", &self.name);
        if self.secret {
            s.field("value", &"<redacted>");
        } else {
            match &self.value {
                FieldValue::Text(t) => s.field("value", t),
                FieldValue::Bytes(b) => s.field("value", &format_args!("<{} bytes>", b.len())),
            };
        }
        s.field("secret", &self.secret).finish()
    }
}

impl Drop for CredentialField {
    fn drop(&mut self) {
        if self.secret {
            self.value.zeroize();
        }
    }
}

// ---------------------------------------------------------------------------
// CredentialCarrier
// ---------------------------------------------------------------------------

/// An immutable, ordered bundle of credential fields.
///
/// # Example
///
/// ```rust
/// use cachegate_protocol::CredentialCarrier;
///
/// let carrier = CredentialCarrier::password("super-user", "1234567");
/// assert_eq!(carrier.principal(), Some("super-user"));
/// // Secrets never show up in debug output.
/// assert!(!format!("{carrier:?}").contains("1234567"));
/// ```
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Vec<CredentialField>")]
pub struct CredentialCarrier {
    fields: Vec<CredentialField>,
}

impl CredentialCarrier {
    /// Starts building a carrier.
    pub fn builder() -> CredentialBuilder {
        CredentialBuilder::default()
    }

    /// Shorthand for the password scheme: a public `principal` field
    /// followed by a secret `secret` field.
    pub fn password(principal: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            fields: vec![
                CredentialField {
                    name: PRINCIPAL_FIELD.to_string(),
                    value: FieldValue::Text(principal.into()),
                    secret: false,
                },
                CredentialField {
                    name: SECRET_FIELD.to_string(),
                    value: FieldValue::Text(secret.into()),
                    secret: true,
                },
            ],
        }
    }

    /// Looks up a field by name.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Looks up a text field by name. Byte fields return `None`.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    /// The value of the [`PRINCIPAL_FIELD`], if present and textual.
    pub fn principal(&self) -> Option<&str> {
        self.text(PRINCIPAL_FIELD)
    }

    /// Iterates over the fields in wire order.
    pub fn fields(&self) -> impl Iterator<Item = &CredentialField> {
        self.fields.iter()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Always `false` for a validated carrier; provided for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn validate(fields: &[CredentialField]) -> Result<(), CarrierError> {
        if fields.is_empty() {
            return Err(CarrierError::Empty);
        }
        if fields.len() > MAX_CREDENTIAL_FIELDS {
            return Err(CarrierError::TooManyFields {
                count: fields.len(),
                max: MAX_CREDENTIAL_FIELDS,
            });
        }
        for (i, field) in fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(CarrierError::EmptyFieldName);
            }
            if field.name.len() > MAX_FIELD_NAME_BYTES {
                return Err(CarrierError::FieldNameTooLong {
                    len: field.name.len(),
                    max: MAX_FIELD_NAME_BYTES,
                });
            }
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(CarrierError::DuplicateField(field.name.clone()));
            }
        }
        Ok(())
    }
}

impl TryFrom<Vec<CredentialField>> for CredentialCarrier {
    type Error = CarrierError;

    /// The [`SECRET_FIELD`] is secret whatever the sender flagged, so it
    /// is redacted and wiped even when a client leaves `secret` off. The
    /// flag is fixed up before validation so rejected carriers are wiped
    /// as well.
    fn try_from(mut fields: Vec<CredentialField>) -> Result<Self, Self::Error> {
        for field in fields.iter_mut().filter(|f| f.name == SECRET_FIELD) {
            field.secret = true;
        }
        Self::validate(&fields)?;
        Ok(Self { fields })
    }
}

impl Serialize for CredentialCarrier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.fields)
    }
}

impl fmt::Debug for CredentialCarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.fields).finish()
    }
}

// ---------------------------------------------------------------------------
// CredentialBuilder
// ---------------------------------------------------------------------------

/// Builds a [`CredentialCarrier`] field by field.
#[derive(Default)]
pub struct CredentialBuilder {
    fields: Vec<CredentialField>,
}

impl CredentialBuilder {
    /// Appends a public text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name.into(), FieldValue::Text(value.into()), false);
        self
    }

    /// Appends a secret text field.
    pub fn secret_text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name.into(), FieldValue::Text(value.into()), true);
        self
    }

    /// Appends a public byte field.
    pub fn bytes(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.push(name.into(), FieldValue::Bytes(value.into()), false);
        self
    }

    /// Appends a secret byte field.
    pub fn secret_bytes(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.push(name.into(), FieldValue::Bytes(value.into()), true);
        self
    }

    /// Validates the fields and freezes them into a carrier.
    ///
    /// # Errors
    /// Returns a [`CarrierError`] if the fields break a structural rule.
    pub fn build(self) -> Result<CredentialCarrier, CarrierError> {
        CredentialCarrier::try_from(self.fields)
    }

    fn push(&mut self, name: String, value: FieldValue, secret: bool) {
        self.fields.push(CredentialField {
            name,
            value,
            secret,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_builds_principal_and_secret_fields() {
        let carrier = CredentialCarrier::password("super-user", "1234567");

        assert_eq!(carrier.len(), 2);
        assert_eq!(carrier.principal(), Some("super-user"));
        assert_eq!(carrier.text(SECRET_FIELD), Some("1234567"));

        let secret = carrier.fields().find(|f| f.name() == SECRET_FIELD).unwrap();
        assert!(secret.is_secret());
    }

    #[test]
    fn test_debug_redacts_secret_values() {
        let carrier = CredentialCarrier::builder()
            .text(PRINCIPAL_FIELD, "alice")
            .secret_text(SECRET_FIELD, "hunter2")
            .secret_bytes("token", vec![0xde, 0xad])
            .build()
            .unwrap();

        let rendered = format!("{carrier:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("222"), "raw token bytes leaked: {rendered}");
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_builder_rejects_empty_carrier() {
        let result = CredentialCarrier::builder().build();
        assert_eq!(result.unwrap_err(), CarrierError::Empty);
    }

    #[test]
    fn test_builder_rejects_duplicate_field() {
        let result = CredentialCarrier::builder()
            .text(PRINCIPAL_FIELD, "a")
            .text(PRINCIPAL_FIELD, "b")
            .build();
        assert_eq!(
            result.unwrap_err(),
            CarrierError::DuplicateField(PRINCIPAL_FIELD.into())
        );
    }

    #[test]
    fn test_builder_rejects_too_many_fields() {
        let mut builder = CredentialCarrier::builder();
        for i in 0..=MAX_CREDENTIAL_FIELDS {
            builder = builder.text(format!("f{i}"), "v");
        }
        assert!(matches!(
            builder.build(),
            Err(CarrierError::TooManyFields { .. })
        ));
    }

    #[test]
    fn test_builder_rejects_long_field_name() {
        let result = CredentialCarrier::builder()
            .text("n".repeat(MAX_FIELD_NAME_BYTES + 1), "v")
            .build();
        assert!(matches!(result, Err(CarrierError::FieldNameTooLong { .. })));
    }

    #[test]
    fn test_serialize_is_ordered_field_list() {
        let carrier = CredentialCarrier::password("bob", "pw");
        let json = serde_json::to_value(&carrier).unwrap();

        assert_eq!(json[0]["name"], "principal");
        assert_eq!(json[0]["value"]["text"], "bob");
        // `secret: false` is omitted on the wire.
        assert!(json[0].get("secret").is_none());
        assert_eq!(json[1]["name"], "secret");
        assert_eq!(json[1]["secret"], true);
    }

    #[test]
    fn test_deserialize_applies_structural_rules() {
        let dup = r#"[
            {"name": "principal", "value": {"text": "a"}},
            {"name": "principal", "value": {"text": "b"}}
        ]"#;
        assert!(serde_json::from_str::<CredentialCarrier>(dup).is_err());

        assert!(serde_json::from_str::<CredentialCarrier>("[]").is_err());
    }

    #[test]
    fn test_deserialize_rejects_unknown_field_keys() {
        let json = r#"[{"name": "principal", "value": {"text": "a"}, "extra": 1}]"#;
        assert!(serde_json::from_str::<CredentialCarrier>(json).is_err());
    }

    #[test]
    fn test_deserialize_unflagged_secret_field_is_still_secret() {
        let json = r#"[
            {"name": "principal", "value": {"text": "super-user"}},
            {"name": "secret", "value": {"text": "1234567"}}
        ]"#;

        let carrier: CredentialCarrier = serde_json::from_str(json).unwrap();

        let secret = carrier.fields().find(|f| f.name() == SECRET_FIELD).unwrap();
        assert!(secret.is_secret());
        assert_eq!(carrier.text(SECRET_FIELD), Some("1234567"));
        assert!(!format!("{carrier:?}").contains("1234567"));
    }

    #[test]
    fn test_builder_public_text_under_secret_name_is_secret() {
        let carrier = CredentialCarrier::builder()
            .text(PRINCIPAL_FIELD, "alice")
            .text(SECRET_FIELD, "hunter2")
            .build()
            .unwrap();

        assert!(!format!("{carrier:?}").contains("hunter2"));
    }

    #[test]
    fn test_text_returns_none_for_byte_field() {
        let carrier = CredentialCarrier::builder()
            .bytes("token", b"abc".to_vec())
            .build()
            .unwrap();
        assert_eq!(carrier.text("token"), None);
        assert_eq!(carrier.get("token").unwrap().as_bytes(), b"abc");
    }
}
