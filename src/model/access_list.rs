//! Access lists attached to sites.

use serde::{Deserialize, Serialize};

use crate::model::{FieldError, RecordId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Directive {
    #[default]
    Allow,
    Deny,
}

impl Directive {
    pub fn as_str(self) -> &'static str {
        match self {
            Directive::Allow => "allow",
            Directive::Deny => "deny",
        }
    }
}

/// One entry of an access list: an address rule, a credential, or both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessListClient {
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// IP address or CIDR the directive applies to.
    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    pub directive: Directive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessList {
    #[serde(default)]
    pub id: RecordId,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Forward the client's `Authorization` header to the backend.
    #[serde(default)]
    pub pass_auth: bool,

    #[serde(default)]
    pub clients: Vec<AccessListClient>,
}

impl AccessList {
    /// True when any client carries credentials, i.e. basic auth is required.
    pub fn requires_auth(&self) -> bool {
        self.clients.iter().any(|c| c.username.is_some())
    }

    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", "must not be empty"));
        }

        for (i, client) in self.clients.iter().enumerate() {
            if client.address.is_none() && client.username.is_none() {
                errors.push(FieldError::new(
                    format!("clients[{}]", i),
                    "needs an address or a username",
                ));
            }
            if client.username.is_some() && client.password.is_none() {
                errors.push(FieldError::new(
                    format!("clients[{}].password", i),
                    "required with a username",
                ));
            }
            if let Some(address) = &client.address {
                if address.trim().is_empty() || address.contains(char::is_whitespace) {
                    errors.push(FieldError::new(
                        format!("clients[{}].address", i),
                        "must be an address or CIDR",
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
