use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::ValidationError;

const DOCUMENT_MAX: usize = 50;
const NAME_MAX: usize = 100;
const ADDRESS_MAX: usize = 500;
const PHONE_MAX: usize = 20;
const PHONE_MIN: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Customer {
    /// Document id, the primary key.
    #[schema(example = "12345678")]
    pub document: String,
    pub firstname: String,
    pub lastname: String,
    pub address: String,
    pub phone: String,
    #[schema(example = "juan.perez@email.com")]
    pub email: String,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Payload for creating a customer. Missing fields deserialize as empty and
/// are rejected by [`CustomerDraft::validate`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct CustomerDraft {
    pub document: String,
    pub firstname: String,
    pub lastname: String,
    pub address: String,
    pub phone: String,
    pub email: String,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CustomerPatch {
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl Customer {
    pub fn from_draft(draft: CustomerDraft, now: u64) -> Self {
        Self {
            document: draft.document,
            firstname: draft.firstname,
            lastname: draft.lastname,
            address: draft.address,
            phone: draft.phone,
            email: draft.email,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, patch: CustomerPatch, now: u64) {
        if let Some(v) = patch.firstname {
            self.firstname = v;
        }
        if let Some(v) = patch.lastname {
            self.lastname = v;
        }
        if let Some(v) = patch.address {
            self.address = v;
        }
        if let Some(v) = patch.phone {
            self.phone = v;
        }
        if let Some(v) = patch.email {
            self.email = v;
        }
        self.updated_at = now;
    }
}

impl CustomerDraft {
    /// Checks required fields and normalizes them: trims everything,
    /// title-cases the names and lower-cases the email.
    pub fn validate(self) -> Result<Self, ValidationError> {
        Ok(Self {
            document: required("document", &self.document, DOCUMENT_MAX)?,
            firstname: title_case(&required("firstname", &self.firstname, NAME_MAX)?),
            lastname: title_case(&required("lastname", &self.lastname, NAME_MAX)?),
            address: required("address", &self.address, ADDRESS_MAX)?,
            phone: phone(&required("phone", &self.phone, PHONE_MAX)?)?,
            email: email(&required("email", &self.email, NAME_MAX)?)?,
        })
    }
}

impl CustomerPatch {
    pub fn validate(self) -> Result<Self, ValidationError> {
        Ok(Self {
            firstname: self
                .firstname
                .map(|v| required("firstname", &v, NAME_MAX).map(|v| title_case(&v)))
                .transpose()?,
            lastname: self
                .lastname
                .map(|v| required("lastname", &v, NAME_MAX).map(|v| title_case(&v)))
                .transpose()?,
            address: self
                .address
                .map(|v| required("address", &v, ADDRESS_MAX))
                .transpose()?,
            phone: self
                .phone
                .map(|v| required("phone", &v, PHONE_MAX).and_then(|v| phone(&v)))
                .transpose()?,
            email: self
                .email
                .map(|v| required("email", &v, NAME_MAX).and_then(|v| email(&v)))
                .transpose()?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.firstname.is_none()
            && self.lastname.is_none()
            && self.address.is_none()
            && self.phone.is_none()
            && self.email.is_none()
    }
}

fn required(field: &'static str, value: &str, max: usize) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Required(field));
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(value.to_string())
}

fn phone(value: &str) -> Result<String, ValidationError> {
    if value.chars().count() < PHONE_MIN {
        return Err(ValidationError::PhoneTooShort);
    }
    Ok(value.to_string())
}

fn email(value: &str) -> Result<String, ValidationError> {
    let invalid = || ValidationError::InvalidEmail(value.to_string());
    let (local, domain) = value.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') || value.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(invalid());
    }
    Ok(value.to_lowercase())
}

/// Upper-cases the first letter of every alphabetic run, lower-cases the rest.
fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_word = false;
    for c in value.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> CustomerDraft {
        CustomerDraft {
            document: " 12345678 ".into(),
            firstname: "juan carlos".into(),
            lastname: "PÉREZ".into(),
            address: "Calle 123 #45-67".into(),
            phone: "+57-300-123-4567".into(),
            email: "juan.perez@email.com".into(),
        }
    }

    #[test]
    fn draft_is_trimmed_and_title_cased() {
        let d = draft().validate().unwrap();
        assert_eq!(d.document, "12345678");
        assert_eq!(d.firstname, "Juan Carlos");
        assert_eq!(d.lastname, "Pérez");
    }

    #[test]
    fn missing_field_is_reported_by_name() {
        let mut d = draft();
        d.address = "   ".into();
        assert_eq!(d.validate().unwrap_err(), ValidationError::Required("address"));

        let empty: CustomerDraft = serde_json::from_str(r#"{"document":"1"}"#).unwrap();
        assert_eq!(empty.validate().unwrap_err(), ValidationError::Required("firstname"));
    }

    #[test]
    fn rejects_short_phone_and_bad_email() {
        let mut d = draft();
        d.phone = "12345".into();
        assert_eq!(d.validate().unwrap_err(), ValidationError::PhoneTooShort);

        for bad in ["no-at-sign", "a@b", "@x.com", "a b@x.com", "a@x..com"] {
            let mut d = draft();
            d.email = bad.into();
            assert!(matches!(d.validate(), Err(ValidationError::InvalidEmail(_))), "{bad}");
        }
    }

    #[test]
    fn email_is_lower_cased() {
        let mut d = draft();
        d.email = " Juan.Perez@Email.COM ".into();
        assert_eq!(d.validate().unwrap().email, "juan.perez@email.com");

        let patch = CustomerPatch {
            email: Some("ANA@X.co".into()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(patch.email.as_deref(), Some("ana@x.co"));
    }

    #[test]
    fn patch_validates_only_present_fields() {
        let patch = CustomerPatch {
            firstname: Some("  maria ".into()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(patch.firstname.as_deref(), Some("Maria"));
        assert!(patch.email.is_none());

        let bad = CustomerPatch {
            phone: Some("123".into()),
            ..Default::default()
        };
        assert_eq!(bad.validate().unwrap_err(), ValidationError::PhoneTooShort);
    }

    #[test]
    fn apply_touches_updated_at_only() {
        let mut c = Customer::from_draft(draft().validate().unwrap(), 10);
        c.apply(
            CustomerPatch {
                address: Some("Carrera 7".into()),
                ..Default::default()
            },
            20,
        );
        assert_eq!(c.address, "Carrera 7");
        assert_eq!(c.created_at, 10);
        assert_eq!(c.updated_at, 20);
    }
}
