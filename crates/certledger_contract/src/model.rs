//! Certificate documents and the request/response shapes around them.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Doc type of certificate documents
pub const CERT_DOC_TYPE: &str = "CERT";

/// Workflow status of a certificate, stored as a small integer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Status {
    /// Revoked, with a reason
    Invalid,
    /// No signatures yet
    #[default]
    New,
    /// Signed by the secretary
    SignedS,
    /// Signed by the secretary and the dean
    SignedSD,
    /// Signed by all three
    Valid,
}

impl Status {
    /// Integer form used in stored documents
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Invalid => 0,
            Self::New => 1,
            Self::SignedS => 2,
            Self::SignedSD => 3,
            Self::Valid => 4,
        }
    }

    /// Parse the integer form
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Invalid),
            1 => Some(Self::New),
            2 => Some(Self::SignedS),
            3 => Some(Self::SignedSD),
            4 => Some(Self::Valid),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Invalid => "Invalid",
            Self::New => "New",
            Self::SignedS => "SignedS",
            Self::SignedSD => "SignedSD",
            Self::Valid => "Valid",
        };
        f.write_str(name)
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        Self::from_u8(raw).ok_or_else(|| de::Error::custom(format!("unknown status {raw}")))
    }
}

/// Role of a signer, sent as a small integer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ValidatorRole {
    /// No signing role
    #[default]
    None,
    /// Faculty secretary, signs first
    Secretary,
    /// Dean, signs second
    Dean,
    /// Rector, signs last
    Rector,
}

impl ValidatorRole {
    /// Integer form used in requests
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Secretary => 1,
            Self::Dean => 2,
            Self::Rector => 3,
        }
    }

    /// Parse the integer form
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Secretary),
            2 => Some(Self::Dean),
            3 => Some(Self::Rector),
            _ => None,
        }
    }
}

impl fmt::Display for ValidatorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "None",
            Self::Secretary => "Secretary",
            Self::Dean => "Dean",
            Self::Rector => "Rector",
        };
        f.write_str(name)
    }
}

impl Serialize for ValidatorRole {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for ValidatorRole {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        Self::from_u8(raw).ok_or_else(|| de::Error::custom(format!("unknown validator type {raw}")))
    }
}

/// An academic certificate as stored
///
/// Every member is required when decoding; callers build certificates
/// through [`CertificateRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    /// Discriminator tag, always [`CERT_DOC_TYPE`] once stored
    pub doc_type: String,
    /// Logical id: doc type followed by the key segments
    #[serde(alias = "ID")]
    pub id: String,
    /// Degree or title certified
    pub certification: String,
    /// Gold certificate flag
    pub gold_certificate: bool,
    /// Issuing institution
    pub emitter: String,
    /// Person the certificate is issued to
    pub accredited: String,
    /// Issue date, free text
    pub date: String,
    /// Creator identity
    pub created_by: String,
    /// Secretary signer, empty until signed
    pub secretary_validating: String,
    /// Dean signer, empty until signed
    pub dean_validating: String,
    /// Rector signer, empty until signed
    pub rector_validating: String,
    /// Faculty registry volume and folio
    pub faculty_volume_folio: String,
    /// University registry volume and folio
    pub university_volume_folio: String,
    /// Revocation reason, empty unless invalid
    pub invalid_reason: String,
    /// Workflow status
    pub status: Status,
}

/// Certificate fields supplied by a caller to create or update
///
/// Missing members take their defaults. Workflow members are optional:
/// create ignores them and update accepts them only unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CertificateRequest {
    /// Logical id
    #[serde(alias = "ID")]
    pub id: String,
    /// Degree or title certified
    pub certification: String,
    /// Gold certificate flag
    pub gold_certificate: bool,
    /// Issuing institution
    pub emitter: String,
    /// Person the certificate is issued to
    pub accredited: String,
    /// Issue date, free text
    pub date: String,
    /// Creator identity
    pub created_by: String,
    /// Faculty registry volume and folio
    pub faculty_volume_folio: String,
    /// University registry volume and folio
    pub university_volume_folio: String,
    /// Secretary signer; must equal the stored value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secretary_validating: Option<String>,
    /// Dean signer; must equal the stored value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dean_validating: Option<String>,
    /// Rector signer; must equal the stored value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rector_validating: Option<String>,
    /// Revocation reason; must equal the stored value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    /// Workflow status; must equal the stored value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

impl CertificateRequest {
    /// Descriptive fields of the request over the workflow fields of `base`
    #[must_use]
    pub fn apply_to(self, base: &Certificate) -> Certificate {
        Certificate {
            doc_type: base.doc_type.clone(),
            id: self.id,
            certification: self.certification,
            gold_certificate: self.gold_certificate,
            emitter: self.emitter,
            accredited: self.accredited,
            date: self.date,
            created_by: self.created_by,
            secretary_validating: base.secretary_validating.clone(),
            dean_validating: base.dean_validating.clone(),
            rector_validating: base.rector_validating.clone(),
            faculty_volume_folio: self.faculty_volume_folio,
            university_volume_folio: self.university_volume_folio,
            invalid_reason: base.invalid_reason.clone(),
            status: base.status,
        }
    }

    /// Wire name of the first workflow member that differs from `stored`
    #[must_use]
    pub fn workflow_change(&self, stored: &Certificate) -> Option<&'static str> {
        if self.status.is_some_and(|status| status != stored.status) {
            return Some("status");
        }
        [
            ("secretaryValidating", &self.secretary_validating, &stored.secretary_validating),
            ("deanValidating", &self.dean_validating, &stored.dean_validating),
            ("rectorValidating", &self.rector_validating, &stored.rector_validating),
            ("invalidReason", &self.invalid_reason, &stored.invalid_reason),
        ]
        .into_iter()
        .find(|(_, requested, current)| requested.as_ref().is_some_and(|r| r != *current))
        .map(|(name, ..)| name)
    }
}

/// Request naming one document by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRequest {
    /// Logical id
    #[serde(alias = "ID")]
    pub id: String,
}

/// Signature request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateRequest {
    /// Certificate id
    #[serde(rename = "ID", alias = "id")]
    pub id: String,
    /// Signer identity
    pub validator: String,
    /// Signer role
    pub validator_type: ValidatorRole,
}

/// Revocation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidateRequest {
    /// Certificate id
    #[serde(rename = "ID", alias = "id")]
    pub id: String,
    /// Revocation reason
    #[serde(default)]
    pub description: String,
}

/// History request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequest {
    /// Doc type of the document
    pub doc_type: String,
    /// Logical id
    #[serde(alias = "ID")]
    pub id: String,
}

/// Tombstone listing request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TombstoneRequest {
    /// Doc type whose deletions to list
    pub doc_type: String,
}

/// Paginated query request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationRequest {
    /// Query document
    #[serde(default)]
    pub query_string: Value,
    /// Maximum records per page
    pub page_size: i32,
    /// Resume point, empty for the first page
    #[serde(default)]
    pub bookmark: String,
}

/// One page of query results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedQueryResponse {
    /// Records in key order
    pub records: Vec<Value>,
    /// Number of records in this page
    pub fetched_records_count: i32,
    /// Resume point, empty after the last page
    pub bookmark: String,
}

/// One past version of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    /// Transaction that wrote this version
    pub tx_id: String,
    /// Commit time, RFC3339
    pub time: String,
    /// Document as written, `None` for a deletion
    ///
    /// Kept as an open mapping: past versions need not match the current
    /// schema.
    pub asset: Option<Map<String, Value>>,
}

impl HistoryRecord {
    /// Check if this version was a deletion
    #[must_use]
    pub fn is_delete(&self) -> bool {
        self.asset.is_none()
    }
}

/// Marker left behind when a document is deleted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    /// Doc type of the deleted document
    pub tombstone_of: String,
    /// Logical id of the deleted document
    pub id: String,
    /// Hex of the deleted primary key
    pub key: String,
    /// Deleting transaction
    pub tx_id: String,
    /// Deletion time, RFC3339
    pub deleted_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_is_ordered_integer() {
        assert!(Status::Invalid < Status::New);
        assert!(Status::SignedSD < Status::Valid);
        assert_eq!(serde_json::to_value(Status::SignedSD).unwrap(), json!(3));
        assert_eq!(serde_json::from_value::<Status>(json!(4)).unwrap(), Status::Valid);
        assert!(serde_json::from_value::<Status>(json!(5)).is_err());
        assert!(serde_json::from_value::<Status>(json!("Valid")).is_err());
    }

    #[test]
    fn test_role_integer() {
        assert_eq!(serde_json::to_value(ValidatorRole::Dean).unwrap(), json!(2));
        assert_eq!(
            serde_json::from_value::<ValidatorRole>(json!(0)).unwrap(),
            ValidatorRole::None
        );
        assert!(serde_json::from_value::<ValidatorRole>(json!(9)).is_err());
    }

    #[test]
    fn test_certificate_field_names() {
        let cert = Certificate {
            doc_type: CERT_DOC_TYPE.to_string(),
            id: "CERT20221122103001".to_string(),
            gold_certificate: true,
            ..Certificate::default()
        };
        let value = serde_json::to_value(&cert).unwrap();
        let obj = value.as_object().unwrap();
        for field in [
            "docType",
            "id",
            "certification",
            "goldCertificate",
            "emitter",
            "accredited",
            "date",
            "createdBy",
            "secretaryValidating",
            "deanValidating",
            "rectorValidating",
            "facultyVolumeFolio",
            "universityVolumeFolio",
            "invalidReason",
            "status",
        ] {
            assert!(obj.contains_key(field), "missing {field}");
        }
        assert_eq!(obj.len(), 15);
        assert_eq!(obj["status"], json!(1));
    }

    #[test]
    fn test_requests_accept_both_id_spellings() {
        let a: GetRequest = serde_json::from_value(json!({"ID": "X"})).unwrap();
        let b: GetRequest = serde_json::from_value(json!({"id": "X"})).unwrap();
        assert_eq!(a, b);

        let v: ValidateRequest = serde_json::from_value(
            json!({"ID": "X", "validator": "S", "validator_type": 1}),
        )
        .unwrap();
        assert_eq!(v.validator_type, ValidatorRole::Secretary);
    }

    #[test]
    fn test_partial_certificate_request() {
        let request: CertificateRequest =
            serde_json::from_value(json!({"ID": "CERT1", "emitter": "UH"})).unwrap();
        assert_eq!(request.id, "CERT1");
        assert_eq!(request.status, None);

        let cert = request.apply_to(&Certificate::default());
        assert_eq!(cert.emitter, "UH");
        assert_eq!(cert.status, Status::New);
    }

    #[test]
    fn test_stored_certificate_is_strict() {
        assert!(serde_json::from_value::<Certificate>(json!({})).is_err());

        let mut full = serde_json::to_value(Certificate::default()).unwrap();
        assert!(serde_json::from_value::<Certificate>(full.clone()).is_ok());
        full.as_object_mut().unwrap().remove("status");
        assert!(serde_json::from_value::<Certificate>(full).is_err());
    }

    #[test]
    fn test_request_workflow_change() {
        let stored = Certificate {
            secretary_validating: "S".to_string(),
            status: Status::SignedS,
            ..Certificate::default()
        };
        let same: CertificateRequest = serde_json::from_value(
            json!({"status": 2, "secretaryValidating": "S", "deanValidating": ""}),
        )
        .unwrap();
        assert_eq!(same.workflow_change(&stored), None);

        let jump: CertificateRequest = serde_json::from_value(json!({"status": 4})).unwrap();
        assert_eq!(jump.workflow_change(&stored), Some("status"));

        let forged: CertificateRequest =
            serde_json::from_value(json!({"rectorValidating": "R"})).unwrap();
        assert_eq!(forged.workflow_change(&stored), Some("rectorValidating"));
    }
}
