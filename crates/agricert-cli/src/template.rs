//! # Template Subcommand
//!
//! Loads a credential template the way the API does at startup and
//! prints the effective result, so a custom `CREDENTIAL_TEMPLATE` can be
//! checked before deployment.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use agricert_vc::CredentialTemplate;

#[derive(Args, Debug)]
pub struct TemplateArgs {
    /// YAML template to check. Prints the built-in template when omitted.
    #[arg(long)]
    pub path: Option<PathBuf>,
}

pub fn run_template(args: &TemplateArgs) -> Result<u8> {
    let template = CredentialTemplate::load(args.path.as_deref())
        .context("credential template is invalid")?;
    print!("{}", render(&template)?);
    Ok(0)
}

fn render(template: &CredentialTemplate) -> Result<String> {
    let yaml = serde_yaml::to_string(template).context("failed to render template")?;
    Ok(format!(
        "# verification method: {}\n{yaml}",
        template.verification_method()
    ))
}
