//! Authentication Models

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account roles. An advertiser uploads ads; a publisher streams them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    #[serde(rename = "advertiser")]
    Advertiser,
    #[serde(rename = "publisher")]
    Publisher,
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Advertiser => "advertiser",
            Role::Publisher => "publisher",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "advertiser" => Some(Role::Advertiser),
            "publisher" => Some(Role::Publisher),
            _ => None,
        }
    }
}

/// JWT Claims payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // account id
    pub email: String,
    pub role: Role,
    pub exp: usize, // expiration timestamp
}

impl Claims {
    pub fn account_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

/// Advertiser signup request body
#[derive(Debug, Deserialize)]
pub struct AdvertiserSignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub company: String,
}

/// Publisher signup request body
#[derive(Debug, Deserialize)]
pub struct PublisherSignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub category: String,
}

/// Login request body (both roles)
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Login/signup response
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub expires_in: usize, // seconds until expiration
    pub role: Role,
    pub account: AccountResponse,
}

/// Account response (sanitized)
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        let advertiser = Role::Advertiser;
        let json = serde_json::to_string(&advertiser).unwrap();
        assert_eq!(json, r#""advertiser""#);

        let publisher: Role = serde_json::from_str(r#""publisher""#).unwrap();
        assert_eq!(publisher, Role::Publisher);
    }

    #[test]
    fn test_role_string_conversion() {
        assert_eq!(Role::Advertiser.as_str(), "advertiser");
        assert_eq!(Role::Publisher.as_str(), "publisher");

        assert_eq!(Role::from_str("advertiser"), Some(Role::Advertiser));
        assert_eq!(Role::from_str("PUBLISHER"), Some(Role::Publisher));
        assert_eq!(Role::from_str("viewer"), None);
    }

    #[test]
    fn test_claims_account_id_parsing() {
        let id = Uuid::new_v4();
        let claims = Claims {
            sub: id.to_string(),
            email: "a@b.test".to_string(),
            role: Role::Publisher,
            exp: 0,
        };
        assert_eq!(claims.account_id(), Some(id));

        let bad = Claims {
            sub: "not-a-uuid".to_string(),
            email: "a@b.test".to_string(),
            role: Role::Publisher,
            exp: 0,
        };
        assert!(bad.account_id().is_none());
    }
}
