use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ANONYMOUS_EMAIL: &str = "anonymous";

/// The signed-in user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub anonymous: bool,
}

impl Identity {
    pub fn guest() -> Self {
        Self {
            email: ANONYMOUS_EMAIL.to_string(),
            display_name: "Guest".to_string(),
            anonymous: true,
        }
    }

    /// Guests play, but nothing they do is written anywhere.
    pub fn persists_progress(&self) -> bool {
        !self.anonymous
    }

    pub fn domain(&self) -> Option<&str> {
        email_domain(&self.email)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("`{0}` is not a valid email address")]
    MalformedEmail(String),
    #[error("accounts from `{domain}` are not allowed (allowed: {allowed})")]
    DomainNotAllowed { domain: String, allowed: String },
    #[error("sign-in is required")]
    AnonymousDisabled,
}

fn email_domain(email: &str) -> Option<&str> {
    let (local, domain) = email.rsplit_once('@')?;
    (!local.is_empty() && !domain.is_empty()).then_some(domain)
}

/// Who may sign in. Emails and domains compare case-insensitively.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AccessPolicy {
    pub require_auth: bool,
    pub restrict_domain: bool,
    pub allowed_domains: Vec<String>,
    pub admin_emails: Vec<String>,
}

impl AccessPolicy {
    pub fn is_admin(&self, email: &str, remote_admins: &[String]) -> bool {
        self.admin_emails
            .iter()
            .chain(remote_admins)
            .any(|admin| admin.trim().eq_ignore_ascii_case(email))
    }

    /// Exact match or any subdomain of an allowed domain.
    pub fn domain_allowed(&self, domain: &str) -> bool {
        let domain = domain.to_ascii_lowercase();
        self.allowed_domains.iter().any(|allowed| {
            let allowed = allowed.trim().to_ascii_lowercase();
            domain == allowed || domain.ends_with(&format!(".{allowed}"))
        })
    }

    pub fn authorize(
        &self,
        email: &str,
        display_name: &str,
        remote_admins: &[String],
    ) -> Result<Identity, AccessError> {
        let email = email.trim();
        let domain =
            email_domain(email).ok_or_else(|| AccessError::MalformedEmail(email.to_string()))?;

        if self.require_auth
            && self.restrict_domain
            && !self.domain_allowed(domain)
            && !self.is_admin(email, remote_admins)
        {
            return Err(AccessError::DomainNotAllowed {
                domain: domain.to_string(),
                allowed: self.allowed_domains.join(", "),
            });
        }

        let display_name = match display_name.trim() {
            "" => email.split('@').next().unwrap_or(email).to_string(),
            name => name.to_string(),
        };
        Ok(Identity {
            email: email.to_string(),
            display_name,
            anonymous: false,
        })
    }

    pub fn anonymous(&self) -> Result<Identity, AccessError> {
        if self.require_auth {
            return Err(AccessError::AnonymousDisabled);
        }
        Ok(Identity::guest())
    }
}
