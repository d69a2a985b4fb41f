use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;

use super::to_rfc3339;

/// Name of the built-in role that can never be deleted.
pub const ADMIN_ROLE_NAME: &str = "Admin";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, JsonSchema)]
pub struct SectionAccess {
    #[serde(default)]
    pub editor: bool,
    #[serde(default)]
    pub viewer: bool,
}

impl SectionAccess {
    pub const FULL: SectionAccess = SectionAccess { editor: true, viewer: true };

    pub fn can_view(self) -> bool {
        self.editor || self.viewer
    }

    pub fn can_edit(self) -> bool {
        self.editor
    }
}

/// Operation sections carrying separate editor/viewer rights.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Section {
    CompanyDetails,
    DirectorDetails,
    ShareholderDetails,
    SecretaryDetails,
    SefDetails,
    KycDocuments,
    EngagementLetter,
}

/// Flat on/off feature toggles.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Feature {
    JobCreation,
    ComplianceManagement,
    OperationManagement,
    DocumentManagement,
    UserManagement,
    RoleManagement,
    MonthlyPayments,
}

impl Feature {
    pub fn label(self) -> &'static str {
        match self {
            Feature::JobCreation => "job creation",
            Feature::ComplianceManagement => "compliance management",
            Feature::OperationManagement => "operation management",
            Feature::DocumentManagement => "document management",
            Feature::UserManagement => "user management",
            Feature::RoleManagement => "role management",
            Feature::MonthlyPayments => "monthly payments",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Permissions {
    pub company_details: SectionAccess,
    pub director_details: SectionAccess,
    pub shareholder_details: SectionAccess,
    pub secretary_details: SectionAccess,
    pub sef_details: SectionAccess,
    pub kyc_documents: SectionAccess,
    pub engagement_letter: SectionAccess,

    pub job_creation: bool,
    pub compliance_management: bool,
    pub operation_management: bool,
    pub document_management: bool,
    pub user_management: bool,
    pub role_management: bool,
    pub monthly_payments: bool,
}

/// A single edit to a permission matrix.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum PermissionUpdate {
    SetSection {
        section: Section,
        editor: Option<bool>,
        viewer: Option<bool>,
    },
    SetFeature {
        feature: Feature,
        enabled: bool,
    },
    GrantAll,
    RevokeAll,
}

impl Permissions {
    pub fn all() -> Self {
        Permissions {
            company_details: SectionAccess::FULL,
            director_details: SectionAccess::FULL,
            shareholder_details: SectionAccess::FULL,
            secretary_details: SectionAccess::FULL,
            sef_details: SectionAccess::FULL,
            kyc_documents: SectionAccess::FULL,
            engagement_letter: SectionAccess::FULL,
            job_creation: true,
            compliance_management: true,
            operation_management: true,
            document_management: true,
            user_management: true,
            role_management: true,
            monthly_payments: true,
        }
    }

    pub fn section(&self, section: Section) -> SectionAccess {
        match section {
            Section::CompanyDetails => self.company_details,
            Section::DirectorDetails => self.director_details,
            Section::ShareholderDetails => self.shareholder_details,
            Section::SecretaryDetails => self.secretary_details,
            Section::SefDetails => self.sef_details,
            Section::KycDocuments => self.kyc_documents,
            Section::EngagementLetter => self.engagement_letter,
        }
    }

    pub fn feature(&self, feature: Feature) -> bool {
        match feature {
            Feature::JobCreation => self.job_creation,
            Feature::ComplianceManagement => self.compliance_management,
            Feature::OperationManagement => self.operation_management,
            Feature::DocumentManagement => self.document_management,
            Feature::UserManagement => self.user_management,
            Feature::RoleManagement => self.role_management,
            Feature::MonthlyPayments => self.monthly_payments,
        }
    }

    fn with_section(mut self, section: Section, access: SectionAccess) -> Self {
        let slot = match section {
            Section::CompanyDetails => &mut self.company_details,
            Section::DirectorDetails => &mut self.director_details,
            Section::ShareholderDetails => &mut self.shareholder_details,
            Section::SecretaryDetails => &mut self.secretary_details,
            Section::SefDetails => &mut self.sef_details,
            Section::KycDocuments => &mut self.kyc_documents,
            Section::EngagementLetter => &mut self.engagement_letter,
        };
        *slot = access;
        self
    }

    fn with_feature(mut self, feature: Feature, enabled: bool) -> Self {
        let slot = match feature {
            Feature::JobCreation => &mut self.job_creation,
            Feature::ComplianceManagement => &mut self.compliance_management,
            Feature::OperationManagement => &mut self.operation_management,
            Feature::DocumentManagement => &mut self.document_management,
            Feature::UserManagement => &mut self.user_management,
            Feature::RoleManagement => &mut self.role_management,
            Feature::MonthlyPayments => &mut self.monthly_payments,
        };
        *slot = enabled;
        self
    }

    /// Returns the matrix with `update` applied; `self` is left untouched.
    pub fn apply(&self, update: &PermissionUpdate) -> Permissions {
        match update {
            PermissionUpdate::SetSection { section, editor, viewer } => {
                let current = self.section(*section);
                let access = SectionAccess {
                    editor: editor.unwrap_or(current.editor),
                    viewer: viewer.unwrap_or(current.viewer),
                };
                self.with_section(*section, access)
            }
            PermissionUpdate::SetFeature { feature, enabled } => {
                self.with_feature(*feature, *enabled)
            }
            PermissionUpdate::GrantAll => Permissions::all(),
            PermissionUpdate::RevokeAll => Permissions::default(),
        }
    }

    pub fn apply_all(&self, updates: &[PermissionUpdate]) -> Permissions {
        updates.iter().fold(*self, |acc, update| acc.apply(update))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Permissions,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Role {
    /// Protection is by name only.
    pub fn is_protected(&self) -> bool {
        self.name == ADMIN_ROLE_NAME
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleDto {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Permissions,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdatePermissionsDto {
    pub updates: Vec<PermissionUpdate>,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub permissions: Permissions,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Role> for RoleResponse {
    fn from(role: Role) -> Self {
        RoleResponse {
            id: role.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: role.name,
            description: role.description,
            permissions: role.permissions,
            created_at: to_rfc3339(role.created_at),
            updated_at: to_rfc3339(role.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn editor_implies_view() {
        let access = SectionAccess { editor: true, viewer: false };
        assert!(access.can_view());
        assert!(access.can_edit());
        assert!(!SectionAccess::default().can_view());
    }

    #[test]
    fn set_section_keeps_unspecified_flags() {
        let base = Permissions::default().apply(&PermissionUpdate::SetSection {
            section: Section::DirectorDetails,
            editor: None,
            viewer: Some(true),
        });
        let next = base.apply(&PermissionUpdate::SetSection {
            section: Section::DirectorDetails,
            editor: Some(true),
            viewer: None,
        });

        assert_eq!(base.director_details, SectionAccess { editor: false, viewer: true });
        assert_eq!(next.director_details, SectionAccess::FULL);
        assert_eq!(next.company_details, SectionAccess::default());
    }

    #[test]
    fn updates_do_not_mutate_the_original() {
        let original = Permissions::default();
        let updated = original.apply(&PermissionUpdate::SetFeature {
            feature: Feature::UserManagement,
            enabled: true,
        });
        assert!(!original.user_management);
        assert!(updated.feature(Feature::UserManagement));
    }

    #[test]
    fn apply_all_runs_in_order() {
        let perms = Permissions::default().apply_all(&[
            PermissionUpdate::GrantAll,
            PermissionUpdate::SetFeature { feature: Feature::RoleManagement, enabled: false },
        ]);
        assert!(perms.job_creation);
        assert!(!perms.role_management);

        let revoked = perms.apply_all(&[PermissionUpdate::RevokeAll]);
        assert_eq!(revoked, Permissions::default());
    }

    #[test]
    fn matrix_uses_camel_case_and_tolerates_missing_keys() {
        let perms: Permissions = serde_json::from_value(serde_json::json!({
            "companyDetails": { "editor": true },
            "userManagement": true
        }))
        .unwrap();
        assert!(perms.company_details.can_edit());
        assert!(perms.user_management);
        assert!(!perms.sef_details.can_view());

        let json = serde_json::to_value(Permissions::all()).unwrap();
        assert_eq!(json["sefDetails"]["viewer"], true);
        assert_eq!(json["monthlyPayments"], true);
    }

    #[test]
    fn updates_parse_from_tagged_json() {
        let update: PermissionUpdate = serde_json::from_value(serde_json::json!({
            "op": "setSection",
            "section": "kycDocuments",
            "viewer": true
        }))
        .unwrap();
        assert_eq!(
            update,
            PermissionUpdate::SetSection {
                section: Section::KycDocuments,
                editor: None,
                viewer: Some(true),
            }
        );
    }

    #[test]
    fn only_the_admin_name_is_protected() {
        let now = DateTime::now();
        let mut role = Role {
            id: None,
            name: ADMIN_ROLE_NAME.into(),
            description: None,
            permissions: Permissions::all(),
            created_at: now,
            updated_at: now,
        };
        assert!(role.is_protected());
        role.name = "Administrator".into();
        assert!(!role.is_protected());
    }
}
