use chrono::{Datelike, NaiveDate};
use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;

use super::role::Section;

/// Advances an expiry date by one calendar year. Feb 29 lands on Feb 28.
pub fn renew_one_year(expiry: NaiveDate) -> NaiveDate {
    let year = expiry.year() + 1;
    expiry
        .with_year(year)
        .or_else(|| NaiveDate::from_ymd_opt(year, expiry.month(), 28))
        .unwrap_or(expiry)
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PersonType {
    Director,
    Shareholder,
    Secretary,
    Sef,
}

impl PersonType {
    pub fn parse(raw: &str) -> Option<PersonType> {
        match raw.to_lowercase().as_str() {
            "director" | "directors" => Some(PersonType::Director),
            "shareholder" | "shareholders" => Some(PersonType::Shareholder),
            "secretary" | "secretaries" => Some(PersonType::Secretary),
            "sef" => Some(PersonType::Sef),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PersonType::Director => "director",
            PersonType::Shareholder => "shareholder",
            PersonType::Secretary => "secretary",
            PersonType::Sef => "sef",
        }
    }

    /// Permission section guarding records of this type.
    pub fn section(self) -> Section {
        match self {
            PersonType::Director => Section::DirectorDetails,
            PersonType::Shareholder => Section::ShareholderDetails,
            PersonType::Secretary => Section::SecretaryDetails,
            PersonType::Sef => Section::SefDetails,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum CompanyCredential {
    License,
    EstablishmentCard,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum PersonCredential {
    Passport,
    EmiratesId,
    Visa,
}

impl CompanyCredential {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "license" => Some(CompanyCredential::License),
            "establishmentCard" | "establishment-card" => Some(CompanyCredential::EstablishmentCard),
            _ => None,
        }
    }
}

impl PersonCredential {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "passport" => Some(PersonCredential::Passport),
            "emiratesId" | "emirates-id" => Some(PersonCredential::EmiratesId),
            "visa" => Some(PersonCredential::Visa),
            _ => None,
        }
    }
}

/// Editable company fields, shared by the stored record and the request body.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CompanyFields {
    pub company_name: String,
    pub registration_number: Option<String>,
    pub license_number: Option<String>,
    pub license_issue_date: Option<NaiveDate>,
    pub license_expiry: Option<NaiveDate>,
    pub establishment_card_number: Option<String>,
    pub establishment_card_issue_date: Option<NaiveDate>,
    pub establishment_card_expiry: Option<NaiveDate>,
    pub registered_address: Option<String>,
    pub activities: Option<String>,
    pub trade_license_document: Option<String>,
    pub establishment_card_document: Option<String>,
    pub moa_document: Option<String>,
}

impl CompanyFields {
    pub fn expiry_mut(&mut self, credential: CompanyCredential) -> &mut Option<NaiveDate> {
        match credential {
            CompanyCredential::License => &mut self.license_expiry,
            CompanyCredential::EstablishmentCard => &mut self.establishment_card_expiry,
        }
    }

    /// Renews the credential's expiry in place and returns the new date.
    pub fn renew(&mut self, credential: CompanyCredential) -> Option<NaiveDate> {
        let slot = self.expiry_mut(credential);
        *slot = slot.map(renew_one_year);
        *slot
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CompanyDetails {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub job_id: ObjectId,
    #[serde(flatten)]
    pub fields: CompanyFields,
    pub updated_by: Option<ObjectId>,
    pub updated_at: DateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonFields {
    pub name: String,
    pub nationality: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub passport_number: Option<String>,
    pub passport_issue_date: Option<NaiveDate>,
    pub passport_expiry: Option<NaiveDate>,
    pub emirates_id_number: Option<String>,
    pub emirates_id_issue_date: Option<NaiveDate>,
    pub emirates_id_expiry: Option<NaiveDate>,
    pub visa_number: Option<String>,
    pub visa_issue_date: Option<NaiveDate>,
    pub visa_expiry: Option<NaiveDate>,
    pub share_percentage: Option<f64>,
    pub passport_document: Option<String>,
    pub emirates_id_document: Option<String>,
    pub visa_document: Option<String>,
}

impl PersonFields {
    pub fn expiry_mut(&mut self, credential: PersonCredential) -> &mut Option<NaiveDate> {
        match credential {
            PersonCredential::Passport => &mut self.passport_expiry,
            PersonCredential::EmiratesId => &mut self.emirates_id_expiry,
            PersonCredential::Visa => &mut self.visa_expiry,
        }
    }

    pub fn renew(&mut self, credential: PersonCredential) -> Option<NaiveDate> {
        let slot = self.expiry_mut(credential);
        *slot = slot.map(renew_one_year);
        *slot
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PersonDetail {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub job_id: ObjectId,
    pub person_type: PersonType,
    #[serde(flatten)]
    pub fields: PersonFields,
    pub updated_by: Option<ObjectId>,
    pub updated_at: DateTime,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PersonDetailsDto {
    pub persons: Vec<PersonFields>,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompanyDetailsResponse {
    pub job_id: String,
    #[serde(flatten)]
    pub fields: CompanyFields,
    pub updated_at: String,
}

impl From<CompanyDetails> for CompanyDetailsResponse {
    fn from(details: CompanyDetails) -> Self {
        CompanyDetailsResponse {
            job_id: details.job_id.to_hex(),
            fields: details.fields,
            updated_at: super::to_rfc3339(details.updated_at),
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PersonDetailResponse {
    pub id: String,
    pub person_type: PersonType,
    #[serde(flatten)]
    pub fields: PersonFields,
    pub updated_at: String,
}

impl From<PersonDetail> for PersonDetailResponse {
    fn from(person: PersonDetail) -> Self {
        PersonDetailResponse {
            id: person.id.map(|id| id.to_hex()).unwrap_or_default(),
            person_type: person.person_type,
            fields: person.fields,
            updated_at: super::to_rfc3339(person.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn renew_adds_one_year() {
        assert_eq!(renew_one_year(date(2025, 6, 30)), date(2026, 6, 30));
    }

    #[test]
    fn renew_from_leap_day_clamps_to_feb_28() {
        assert_eq!(renew_one_year(date(2024, 2, 29)), date(2025, 2, 28));
    }

    #[test]
    fn renewing_without_an_expiry_is_a_no_op() {
        let mut person = PersonFields { name: "R. Patel".into(), ..Default::default() };
        assert_eq!(person.renew(PersonCredential::Visa), None);
        assert_eq!(person.visa_expiry, None);
    }

    #[test]
    fn renew_touches_only_the_named_credential() {
        let mut company = CompanyFields {
            company_name: "Acme FZ-LLC".into(),
            license_expiry: Some(date(2025, 1, 15)),
            establishment_card_expiry: Some(date(2025, 3, 1)),
            ..Default::default()
        };
        assert_eq!(company.renew(CompanyCredential::License), Some(date(2026, 1, 15)));
        assert_eq!(company.establishment_card_expiry, Some(date(2025, 3, 1)));
    }

    #[test]
    fn person_type_maps_to_section() {
        assert_eq!(PersonType::parse("Shareholders"), Some(PersonType::Shareholder));
        assert_eq!(PersonType::parse("sef").map(PersonType::section), Some(Section::SefDetails));
        assert_eq!(PersonType::parse("auditor"), None);
    }

    #[test]
    fn dates_use_iso_strings_on_the_wire() {
        let fields: CompanyFields = serde_json::from_value(serde_json::json!({
            "companyName": "Acme",
            "licenseExpiry": "2026-04-01"
        }))
        .unwrap();
        assert_eq!(fields.license_expiry, Some(date(2026, 4, 1)));
        assert!(fields.trade_license_document.is_none());
    }
}
