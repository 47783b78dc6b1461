//! Payment gateway settings documents
//!
//! Exactly one gateway is active per process, chosen by the `paymentGateway`
//! field of the base settings document.

use super::schema::{validate, SchemaErrors};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

/// Supported payment gateways
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentGateway {
    Paypal,
    Stripe,
    Authorizenet,
}

impl PaymentGateway {
    #[cfg(test)]
    pub const ALL: [PaymentGateway; 3] = [
        PaymentGateway::Paypal,
        PaymentGateway::Stripe,
        PaymentGateway::Authorizenet,
    ];

    /// File name of this gateway's settings document
    pub fn document_name(&self) -> &'static str {
        match self {
            PaymentGateway::Paypal => "paypal.json",
            PaymentGateway::Stripe => "stripe.json",
            PaymentGateway::Authorizenet => "authorizenet.json",
        }
    }

    /// Route prefix the gateway's collaborator router is mounted under
    pub fn mount_prefix(&self) -> &'static str {
        match self {
            PaymentGateway::Paypal => "/paypal",
            PaymentGateway::Stripe => "/stripe",
            PaymentGateway::Authorizenet => "/authorizenet",
        }
    }
}

impl std::fmt::Display for PaymentGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentGateway::Paypal => write!(f, "PayPal"),
            PaymentGateway::Stripe => write!(f, "Stripe"),
            PaymentGateway::Authorizenet => write!(f, "Authorizenet"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaypalMode {
    Sandbox,
    Live,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PaypalSettings {
    pub mode: PaypalMode,
    #[serde(rename = "client_id")]
    #[validate(length(min = 1, message = "must not be empty"))]
    pub client_id: String,
    #[serde(rename = "client_secret")]
    #[validate(length(min = 1, message = "must not be empty"))]
    pub client_secret: String,
    #[serde(default)]
    pub paypal_cart_description: String,
    #[serde(default = "default_paypal_currency")]
    #[validate(length(equal = 3, message = "must be a 3 letter currency code"))]
    pub paypal_currency: String,
}

fn default_paypal_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StripeSettings {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub secret_key: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub public_key: String,
    #[serde(default = "default_stripe_currency")]
    #[validate(length(equal = 3, message = "must be a 3 letter currency code"))]
    pub stripe_currency: String,
    #[serde(default)]
    pub stripe_description: String,
    #[serde(default, rename = "stripeLogoURL")]
    pub stripe_logo_url: String,
}

fn default_stripe_currency() -> String {
    "usd".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizenetMode {
    #[default]
    Test,
    Live,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizenetSettings {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub login_id: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub transaction_key: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub client_key: String,
    #[serde(default)]
    pub mode: AuthorizenetMode,
}

/// The validated settings of the active gateway
#[derive(Debug, Clone, PartialEq)]
pub enum GatewaySettings {
    Paypal(PaypalSettings),
    Stripe(StripeSettings),
    Authorizenet(AuthorizenetSettings),
}

impl GatewaySettings {
    /// Validate `document` against the schema of `gateway`
    pub fn validate_for(gateway: PaymentGateway, document: Value) -> Result<Self, SchemaErrors> {
        Ok(match gateway {
            PaymentGateway::Paypal => GatewaySettings::Paypal(validate(document)?),
            PaymentGateway::Stripe => GatewaySettings::Stripe(validate(document)?),
            PaymentGateway::Authorizenet => GatewaySettings::Authorizenet(validate(document)?),
        })
    }

    #[cfg(test)]
    pub fn gateway(&self) -> PaymentGateway {
        match self {
            GatewaySettings::Paypal(_) => PaymentGateway::Paypal,
            GatewaySettings::Stripe(_) => PaymentGateway::Stripe,
            GatewaySettings::Authorizenet(_) => PaymentGateway::Authorizenet,
        }
    }

    /// Fields a checkout page may see; secrets are never included
    pub fn public_config(&self) -> Value {
        match self {
            GatewaySettings::Paypal(paypal) => json!({
                "mode": paypal.mode,
                "currency": paypal.paypal_currency,
                "description": paypal.paypal_cart_description,
            }),
            GatewaySettings::Stripe(stripe) => json!({
                "publicKey": stripe.public_key,
                "currency": stripe.stripe_currency,
                "description": stripe.stripe_description,
                "logoUrl": stripe.stripe_logo_url,
            }),
            GatewaySettings::Authorizenet(authorizenet) => json!({
                "loginId": authorizenet.login_id,
                "clientKey": authorizenet.client_key,
                "mode": authorizenet.mode,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_paypal_defaults() {
        let settings = GatewaySettings::validate_for(
            PaymentGateway::Paypal,
            json!({ "mode": "sandbox", "client_id": "id", "client_secret": "secret" }),
        )
        .unwrap();
        match settings {
            GatewaySettings::Paypal(paypal) => {
                assert_eq!(paypal.paypal_currency, "USD");
                assert_eq!(paypal.mode, PaypalMode::Sandbox);
            }
            other => panic!("unexpected variant {:?}", other),
        }
    }

    #[test]
    fn test_stripe_requires_keys() {
        let err = GatewaySettings::validate_for(
            PaymentGateway::Stripe,
            json!({ "publicKey": "pk_test" }),
        )
        .unwrap_err();
        assert!(err.to_string().contains("secretKey"));
    }

    #[test]
    fn test_authorizenet_rejects_unknown_mode() {
        let result = GatewaySettings::validate_for(
            PaymentGateway::Authorizenet,
            json!({
                "loginId": "login",
                "transactionKey": "key",
                "clientKey": "client",
                "mode": "staging"
            }),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_variant_matches_selector() {
        for gateway in PaymentGateway::ALL {
            let document = match gateway {
                PaymentGateway::Paypal => {
                    json!({ "mode": "live", "client_id": "a", "client_secret": "b" })
                }
                PaymentGateway::Stripe => json!({ "secretKey": "a", "publicKey": "b" }),
                PaymentGateway::Authorizenet => {
                    json!({ "loginId": "a", "transactionKey": "b", "clientKey": "c" })
                }
            };
            let settings = GatewaySettings::validate_for(gateway, document).unwrap();
            assert_eq!(settings.gateway(), gateway);
        }
    }

    #[test]
    fn test_public_config_hides_secrets() {
        let stripe = GatewaySettings::validate_for(
            PaymentGateway::Stripe,
            json!({ "secretKey": "sk_live_hidden", "publicKey": "pk_live" }),
        )
        .unwrap();
        let public = stripe.public_config();
        assert_eq!(public["publicKey"], "pk_live");
        assert_eq!(public["currency"], "usd");
        assert!(!public.to_string().contains("sk_live_hidden"));

        let paypal = GatewaySettings::validate_for(
            PaymentGateway::Paypal,
            json!({ "mode": "live", "client_id": "a", "client_secret": "hidden" }),
        )
        .unwrap();
        assert_eq!(paypal.public_config()["mode"], "live");
        assert!(!paypal.public_config().to_string().contains("hidden"));
    }
}
