//! # Actor profiles
//!
//! Exporters, QA agencies and administrators. Profiles carry the
//! organization data that ends up in credential subjects; authentication
//! itself is bearer-token based and lives in the API layer.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use agricert_core::{ActorId, AgriError, Timestamp};
use agricert_vc::PartyClaims;

/// The role an actor acts under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Exporter,
    QaAgency,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exporter => "exporter",
            Self::QaAgency => "qa_agency",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AgriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exporter" => Ok(Self::Exporter),
            "qa_agency" => Ok(Self::QaAgency),
            "admin" => Ok(Self::Admin),
            other => Err(AgriError::invalid(format!(
                "Invalid role {other:?}. Must be: exporter, qa_agency, or admin"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorProfile {
    pub id: ActorId,
    pub role: Role,
    pub name: String,
    pub email: Option<String>,
    pub organization: Option<String>,
    pub registration_number: Option<String>,
    pub license_number: Option<String>,
    pub address: Option<String>,
    pub country: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Registration payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewActor {
    pub role: Option<Role>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub organization: Option<String>,
    pub registration_number: Option<String>,
    pub license_number: Option<String>,
    pub address: Option<String>,
    pub country: Option<String>,
}

/// Profile update. The role of an existing actor never changes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ActorPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub organization: Option<String>,
    pub registration_number: Option<String>,
    pub license_number: Option<String>,
    pub address: Option<String>,
    pub country: Option<String>,
}

fn check_email(email: &Option<String>, errors: &mut Vec<String>) {
    if let Some(e) = email {
        let valid = e
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !valid {
            errors.push("Email address is invalid".to_string());
        }
    }
}

impl ActorProfile {
    pub fn create(id: ActorId, input: NewActor) -> Result<Self, AgriError> {
        let mut errors = Vec::new();
        if input.role.is_none() {
            errors.push("Role is required".to_string());
        }
        let name = input.name.unwrap_or_default().trim().to_string();
        if name.is_empty() {
            errors.push("Name is required".to_string());
        }
        check_email(&input.email, &mut errors);
        let role = match input.role {
            Some(role) if errors.is_empty() => role,
            _ => return Err(AgriError::Validation(errors)),
        };

        let now = Timestamp::now();
        Ok(Self {
            id,
            role,
            name,
            email: input.email,
            organization: input.organization,
            registration_number: input.registration_number,
            license_number: input.license_number,
            address: input.address,
            country: input.country,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply(&mut self, patch: ActorPatch) -> Result<(), AgriError> {
        let mut errors = Vec::new();
        if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            errors.push("Name is required".to_string());
        }
        check_email(&patch.email, &mut errors);
        if !errors.is_empty() {
            return Err(AgriError::Validation(errors));
        }

        if let Some(name) = patch.name {
            self.name = name.trim().to_string();
        }
        macro_rules! merge {
            ($($field:ident),*) => { $( if patch.$field.is_some() { self.$field = patch.$field; } )* };
        }
        merge!(email, organization, registration_number, license_number, address, country);
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Projection used when building credential subjects.
    pub fn party_claims(&self) -> PartyClaims {
        PartyClaims {
            id: self.id.get(),
            name: self.name.clone(),
            organization: self.organization.clone(),
            registration_number: self.registration_number.clone(),
            license_number: self.license_number.clone(),
            address: self.address.clone(),
        }
    }
}
