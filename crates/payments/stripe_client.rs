use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use sha2::Sha256;
use tracing::error;

type HmacSha256 = Hmac<Sha256>;

pub const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Events signed more than this many seconds ago are rejected as replays.
pub const WEBHOOK_TOLERANCE_SECONDS: i64 = 300;

/// Minimal Stripe client built on reqwest.
pub struct StripeClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
    webhook_secret: String,
}

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    pub created: Option<i64>,
    pub livemode: Option<bool>,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// A field Stripe returns either as an id or, when expanded, as the full object.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    pub fn id(&self) -> &str {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object { id } => id,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct StripeCustomerDetails {
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub customer: Option<Expandable>,
    pub subscription: Option<Expandable>,
    pub customer_email: Option<String>,
    pub customer_details: Option<StripeCustomerDetails>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub url: Option<String>,
}

impl StripeCheckoutSession {
    /// Email typed at checkout, falling back to the one passed when the session was created.
    pub fn details_email_first(&self) -> Option<String> {
        self.customer_details
            .as_ref()
            .and_then(|details| details.email.clone())
            .or_else(|| self.customer_email.clone())
    }

    /// Email passed when the session was created, falling back to the one typed at checkout.
    pub fn customer_email_first(&self) -> Option<String> {
        self.customer_email.clone().or_else(|| {
            self.customer_details
                .as_ref()
                .and_then(|details| details.email.clone())
        })
    }

    pub fn customer_name(&self) -> Option<String> {
        self.customer_details
            .as_ref()
            .and_then(|details| details.name.clone())
    }

    pub fn is_paid(&self) -> bool {
        self.status.as_deref() == Some("complete") && self.payment_status.as_deref() == Some("paid")
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    #[serde(rename = "type")]
    type_: Option<String>,
    code: Option<String>,
    message: Option<String>,
    param: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub status: String,
    pub customer: Option<Expandable>,
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub items: StripeSubscriptionItems,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StripeSubscriptionItems {
    pub data: Vec<StripeSubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscriptionItem {
    pub current_period_end: Option<i64>,
}

impl StripeSubscription {
    /// Returns the subscription period end timestamp, falling back to the first item when needed.
    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end.or_else(|| {
            self.items
                .data
                .first()
                .and_then(|item| item.current_period_end)
        })
    }

    pub fn period_end_at(&self) -> Option<DateTime<Utc>> {
        self.period_end().and_then(ts_to_datetime)
    }
}

/// The invoice fields the webhook handler reads.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeInvoice {
    pub id: Option<String>,
    pub customer: Option<Expandable>,
    pub subscription: Option<Expandable>,
}

pub fn ts_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0).single()
}

/// Parameters of a subscription-mode Checkout Session.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSessionParams {
    pub price_id: String,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutSessionParams {
    fn into_form(self) -> Vec<(String, String)> {
        let mut body: Vec<(String, String)> = vec![
            ("mode".to_string(), "subscription".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("line_items[0][price]".to_string(), self.price_id.clone()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), self.success_url),
            ("cancel_url".to_string(), self.cancel_url),
            ("allow_promotion_codes".to_string(), "true".to_string()),
            ("metadata[priceId]".to_string(), self.price_id),
        ];

        if let Some(email) = self.customer_email {
            body.push(("customer_email".to_string(), email));
        }

        body
    }
}

impl StripeClient {
    pub fn new(secret_key: String, webhook_secret: String) -> Self {
        Self::with_api_base(STRIPE_API_BASE.to_string(), secret_key, webhook_secret)
    }

    pub fn with_api_base(api_base: String, secret_key: String, webhook_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base,
            secret_key,
            webhook_secret,
        }
    }

    /// Builds `<api_base>/<segments..>`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.api_base)?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("stripe api base {} cannot carry a path", self.api_base))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn ensure_success(
        resp: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let request_id = resp
            .headers()
            .get("request-id")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        let details = serde_json::from_str::<StripeErrorEnvelope>(&body)
            .ok()
            .map(|envelope| envelope.error);

        error!(
            status = %status,
            stripe_request_id = ?request_id,
            stripe_error_type = ?details.as_ref().and_then(|d| d.type_.as_deref()),
            stripe_error_code = ?details.as_ref().and_then(|d| d.code.as_deref()),
            stripe_error_param = ?details.as_ref().and_then(|d| d.param.as_deref()),
            context = %context,
            "stripe api request failed"
        );

        match details.and_then(|d| d.message) {
            Some(message) => anyhow::bail!("{message}"),
            None => anyhow::bail!(
                "Stripe API request failed: {} (status {}, request_id={:?})",
                context,
                status,
                request_id
            ),
        }
    }

    /// Creates a subscription-mode Checkout Session and returns its URL.
    pub async fn create_checkout_session(&self, params: CheckoutSessionParams) -> Result<String> {
        // https://stripe.com/docs/api/checkout/sessions/create
        let resp = self
            .http
            .post(self.endpoint(&["checkout", "sessions"])?)
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .form(&params.into_form())
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "create checkout session").await?;

        let session: StripeCheckoutSession = resp.json().await?;
        session
            .url
            .ok_or_else(|| anyhow::anyhow!("Failed to create checkout session"))
    }

    pub async fn retrieve_checkout_session(
        &self,
        session_id: &str,
        expand_subscription: bool,
    ) -> Result<StripeCheckoutSession> {
        // https://stripe.com/docs/api/checkout/sessions/retrieve
        let session_id = object_id(session_id, "checkout session")?;
        let mut request = self
            .http
            .get(self.endpoint(&["checkout", "sessions", session_id])?)
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key));
        if expand_subscription {
            request = request.query(&[("expand[]", "subscription")]);
        }

        let resp = Self::ensure_success(request.send().await?, "retrieve checkout session").await?;
        let session: StripeCheckoutSession = resp.json().await?;
        Ok(session)
    }

    pub async fn retrieve_subscription(&self, subscription_id: &str) -> Result<StripeSubscription> {
        // https://stripe.com/docs/api/subscriptions/retrieve
        let subscription_id = object_id(subscription_id, "subscription")?;
        let resp = self
            .http
            .get(self.endpoint(&["subscriptions", subscription_id])?)
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "retrieve subscription").await?;

        let subscription: StripeSubscription = resp.json().await?;
        Ok(subscription)
    }

    /// Verifies the webhook signature. https://stripe.com/docs/webhooks/signatures
    pub fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent> {
        verify_signature_at(
            &self.webhook_secret,
            payload,
            signature_header,
            Utc::now().timestamp(),
        )
    }
}

/// Stripe object ids are ASCII letters, digits and underscores (`cs_test_a1`, `sub_1Nx`).
fn object_id<'a>(id: &'a str, kind: &str) -> Result<&'a str> {
    let id = id.trim();
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        anyhow::bail!("invalid {kind} id");
    }
    Ok(id)
}

pub(crate) fn verify_signature_at(
    webhook_secret: &str,
    payload: &[u8],
    signature_header: &str,
    now: i64,
) -> Result<StripeEvent> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in signature_header.split(',') {
        let part = part.trim();
        if let Some(rest) = part.strip_prefix("t=") {
            timestamp = Some(rest);
        } else if let Some(rest) = part.strip_prefix("v1=") {
            signatures.push(rest);
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| anyhow::anyhow!("missing timestamp in stripe-signature"))?;
    if signatures.is_empty() {
        anyhow::bail!("missing v1 in stripe-signature");
    }

    let signed_at: i64 = timestamp
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid timestamp in stripe-signature"))?;
    if (now - signed_at).abs() > WEBHOOK_TOLERANCE_SECONDS {
        anyhow::bail!("stripe-signature timestamp outside tolerance");
    }

    let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes())?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    let matched = signatures.iter().any(|signature| {
        hex::decode(signature)
            .map(|provided| mac.clone().verify_slice(&provided).is_ok())
            .unwrap_or(false)
    });
    if !matched {
        anyhow::bail!("invalid webhook signature");
    }

    let event: StripeEvent = serde_json::from_slice(payload)?;
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test123secret456";
    const NOW: i64 = 1_700_000_000;

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    const PAYLOAD: &[u8] =
        br#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"id":"cs_1"}}}"#;

    #[test]
    fn accepts_valid_signature() {
        let header = format!("t={},v1={}", NOW, sign(PAYLOAD, SECRET, NOW));

        let event = verify_signature_at(SECRET, PAYLOAD, &header, NOW + 5).unwrap();

        assert_eq!(event.type_, "checkout.session.completed");
        assert_eq!(event.data.object["id"], "cs_1");
    }

    #[test]
    fn accepts_any_of_several_v1_signatures() {
        let header = format!(
            "t={}, v1={}, v1={}",
            NOW,
            sign(PAYLOAD, "whsec_rotated_out", NOW),
            sign(PAYLOAD, SECRET, NOW)
        );

        assert!(verify_signature_at(SECRET, PAYLOAD, &header, NOW).is_ok());
    }

    #[test]
    fn rejects_wrong_secret() {
        let header = format!("t={},v1={}", NOW, sign(PAYLOAD, "wrong_secret", NOW));

        assert!(verify_signature_at(SECRET, PAYLOAD, &header, NOW).is_err());
    }

    #[test]
    fn rejects_modified_payload() {
        let header = format!("t={},v1={}", NOW, sign(PAYLOAD, SECRET, NOW));
        let tampered = br#"{"id":"evt_1","type":"customer.subscription.deleted","data":{"object":{}}}"#;

        assert!(verify_signature_at(SECRET, tampered, &header, NOW).is_err());
    }

    #[test]
    fn rejects_stale_timestamp() {
        let signed_at = NOW - WEBHOOK_TOLERANCE_SECONDS - 1;
        let header = format!("t={},v1={}", signed_at, sign(PAYLOAD, SECRET, signed_at));

        assert!(verify_signature_at(SECRET, PAYLOAD, &header, NOW).is_err());
    }

    #[test]
    fn rejects_malformed_headers() {
        let signature = sign(PAYLOAD, SECRET, NOW);

        assert!(verify_signature_at(SECRET, PAYLOAD, &format!("v1={signature}"), NOW).is_err());
        assert!(verify_signature_at(SECRET, PAYLOAD, &format!("t={NOW}"), NOW).is_err());
        assert!(verify_signature_at(SECRET, PAYLOAD, &format!("t={NOW},v1=zz"), NOW).is_err());
        assert!(
            verify_signature_at(SECRET, PAYLOAD, &format!("t=abc,v1={signature}"), NOW).is_err()
        );
    }

    fn client() -> StripeClient {
        // Port 9 (discard) keeps any request that slips through from reaching Stripe.
        StripeClient::with_api_base(
            "http://127.0.0.1:9/v1".to_string(),
            "sk_test_key".to_string(),
            SECRET.to_string(),
        )
    }

    #[test]
    fn endpoint_encodes_each_segment() {
        let client = client();

        assert_eq!(
            client
                .endpoint(&["checkout", "sessions", "cs_test_a1"])
                .unwrap()
                .as_str(),
            "http://127.0.0.1:9/v1/checkout/sessions/cs_test_a1"
        );

        let smuggled = client
            .endpoint(&["subscriptions", "../customers/cus_1?expand=x"])
            .unwrap();
        assert!(smuggled.query().is_none());
        assert_eq!(smuggled.path_segments().map(|s| s.count()), Some(3));
        assert!(smuggled.path().starts_with("/v1/subscriptions/..%2Fcustomers%2Fcus_1%3F"));
    }

    #[tokio::test]
    async fn retrieve_checkout_session_rejects_path_and_query_ids() {
        let client = client();

        for id in ["../../customers/cus_victim", "cs_1?expand[]=customer", "", ".."] {
            let err = client.retrieve_checkout_session(id, true).await.unwrap_err();
            assert_eq!(err.to_string(), "invalid checkout session id", "id {id:?}");
        }
    }

    #[tokio::test]
    async fn retrieve_subscription_rejects_path_and_query_ids() {
        let client = client();

        for id in ["../customers/cus_victim", "sub_1#frag", "sub 1", "."] {
            let err = client.retrieve_subscription(id).await.unwrap_err();
            assert_eq!(err.to_string(), "invalid subscription id", "id {id:?}");
        }
    }

    #[test]
    fn object_ids_accept_stripe_shapes() {
        assert_eq!(object_id(" cs_test_a1B2c3 ", "checkout session").unwrap(), "cs_test_a1B2c3");
        assert_eq!(object_id("sub_1NxYz", "subscription").unwrap(), "sub_1NxYz");
    }

    #[test]
    fn period_end_falls_back_to_first_item() {
        let subscription: StripeSubscription = serde_json::from_value(serde_json::json!({
            "id": "sub_1",
            "status": "active",
            "items": { "data": [{ "current_period_end": 1_735_689_600 }] }
        }))
        .unwrap();

        assert_eq!(subscription.period_end(), Some(1_735_689_600));
        assert_eq!(
            subscription.period_end_at().unwrap().to_rfc3339(),
            "2025-01-01T00:00:00+00:00"
        );
    }

    #[test]
    fn checkout_session_accepts_expanded_subscription() {
        let session: StripeCheckoutSession = serde_json::from_value(serde_json::json!({
            "id": "cs_1",
            "status": "complete",
            "payment_status": "paid",
            "customer": "cus_1",
            "subscription": { "id": "sub_1", "object": "subscription", "status": "active" },
            "customer_email": null,
            "customer_details": { "email": "buyer@example.com", "name": "Buyer" }
        }))
        .unwrap();

        assert!(session.is_paid());
        assert_eq!(session.subscription.as_ref().map(Expandable::id), Some("sub_1"));
        assert_eq!(session.customer.as_ref().map(Expandable::id), Some("cus_1"));
        assert_eq!(
            session.details_email_first().as_deref(),
            Some("buyer@example.com")
        );
        assert_eq!(session.customer_name().as_deref(), Some("Buyer"));
    }

    #[test]
    fn email_precedence_differs_by_caller() {
        let session = StripeCheckoutSession {
            id: "cs_1".to_string(),
            status: None,
            payment_status: None,
            customer: None,
            subscription: None,
            customer_email: Some("prefilled@example.com".to_string()),
            customer_details: Some(StripeCustomerDetails {
                email: Some("typed@example.com".to_string()),
                name: None,
            }),
            amount_total: None,
            currency: None,
            url: None,
        };

        assert_eq!(
            session.customer_email_first().as_deref(),
            Some("prefilled@example.com")
        );
        assert_eq!(
            session.details_email_first().as_deref(),
            Some("typed@example.com")
        );
    }

    #[test]
    fn checkout_form_carries_subscription_settings() {
        let form = CheckoutSessionParams {
            price_id: "price_pro".to_string(),
            customer_email: Some("buyer@example.com".to_string()),
            success_url: "https://app.test/success?session_id={CHECKOUT_SESSION_ID}".to_string(),
            cancel_url: "https://app.test/pricing".to_string(),
        }
        .into_form();

        let get = |key: &str| {
            form.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("mode"), Some("subscription"));
        assert_eq!(get("line_items[0][price]"), Some("price_pro"));
        assert_eq!(get("allow_promotion_codes"), Some("true"));
        assert_eq!(get("metadata[priceId]"), Some("price_pro"));
        assert_eq!(get("customer_email"), Some("buyer@example.com"));
    }
}
