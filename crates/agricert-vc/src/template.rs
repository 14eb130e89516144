//! # Credential template
//!
//! The fixed parts of every issued certificate (context and type markers,
//! issuer identity, validity period, quality standard) and the policy used
//! to annotate measurements (limits, grade bands, QR options).
//!
//! Parsed once at process start from YAML and shared as
//! `Arc<CredentialTemplate>`; nothing mutates it afterwards.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::VcError;

const BUILTIN_TEMPLATE: &str = include_str!("../templates/credential.yaml");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialTemplate {
    pub context: Vec<String>,
    pub types: Vec<String>,
    pub subject_type: String,
    pub issuer: IssuerTemplate,
    pub validity_months: u32,
    pub quality_standard: QualityStandard,
    #[serde(default)]
    pub quality_limits: Vec<QualityLimit>,
    #[serde(default)]
    pub grade_bands: Vec<GradeBand>,
    pub qr: QrOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IssuerTemplate {
    /// Host part of every `did:web` identifier we mint.
    pub did_domain: String,
    pub name: String,
    /// Fragment of the signing key's verification method.
    pub key_fragment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityStandard {
    pub standard: String,
    pub version: String,
}

/// An acceptance bound for one quality parameter. A parameter has a `max`
/// (contaminants, moisture) or a `min` (scores), rarely both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityLimit {
    pub parameter: String,
    pub unit: String,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub min: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GradeBand {
    pub grade: String,
    pub min_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QrOptions {
    pub version: String,
    pub format: String,
    pub min_dimension: u32,
}

impl CredentialTemplate {
    /// The template compiled into the binary.
    pub fn builtin() -> Result<Self, VcError> {
        Self::from_yaml(BUILTIN_TEMPLATE)
    }

    pub fn from_yaml(source: &str) -> Result<Self, VcError> {
        let template: Self =
            serde_yaml::from_str(source).map_err(|e| VcError::Template(e.to_string()))?;
        template.validate()?;
        Ok(template)
    }

    pub fn from_path(path: &Path) -> Result<Self, VcError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| VcError::Template(format!("{}: {e}", path.display())))?;
        Self::from_yaml(&source)
    }

    /// Load from `path` when given, else the built-in template.
    pub fn load(path: Option<&Path>) -> Result<Self, VcError> {
        match path {
            Some(p) => {
                tracing::info!(path = %p.display(), "loading credential template");
                Self::from_path(p)
            }
            None => Self::builtin(),
        }
    }

    fn validate(&self) -> Result<(), VcError> {
        let mut problems = Vec::new();
        if self.context.is_empty() {
            problems.push("context must not be empty".to_string());
        }
        if !self.types.iter().any(|t| t == "VerifiableCredential") {
            problems.push("types must include VerifiableCredential".to_string());
        }
        if self.issuer.did_domain.is_empty() {
            problems.push("issuer.did_domain must not be empty".to_string());
        }
        if self.validity_months == 0 {
            problems.push("validity_months must be positive".to_string());
        }
        for limit in &self.quality_limits {
            if limit.max.is_none() && limit.min.is_none() {
                problems.push(format!("quality limit {} has neither min nor max", limit.parameter));
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(VcError::Template(problems.join("; ")))
        }
    }

    pub fn limit_for(&self, parameter: &str) -> Option<&QualityLimit> {
        self.quality_limits.iter().find(|l| l.parameter == parameter)
    }

    /// Grade for a grain quality score: the first band (highest first)
    /// whose floor the score reaches.
    pub fn grade_for(&self, score: Option<f64>) -> Option<&str> {
        let score = score?;
        let mut bands: Vec<&GradeBand> = self.grade_bands.iter().collect();
        bands.sort_by(|a, b| b.min_score.total_cmp(&a.min_score));
        bands
            .into_iter()
            .find(|b| score >= b.min_score)
            .map(|b| b.grade.as_str())
    }

    /// `did:web:<domain>#<fragment>`
    pub fn verification_method(&self) -> String {
        format!("did:web:{}#{}", self.issuer.did_domain, self.issuer.key_fragment)
    }
}

impl QualityLimit {
    /// The bound reported as `limit` in the credential.
    pub fn reported_limit(&self) -> Option<f64> {
        self.max.or(self.min)
    }

    pub fn accepts(&self, value: f64) -> bool {
        self.max.map_or(true, |max| value <= max) && self.min.map_or(true, |min| value >= min)
    }
}
