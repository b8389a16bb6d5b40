use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use thiserror::Error;

use crate::config::GatewayConfig;

type HmacSha512 = Hmac<Sha512>;

const SECURE_HASH_KEY: &str = "vnp_SecureHash";
const SECURE_HASH_TYPE_KEY: &str = "vnp_SecureHashType";

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("gateway configuration error: {0}")]
    Configuration(String),
}

/// Everything needed to initiate one payment. `amount` is in whole currency
/// units; the gateway's minor-unit scaling (x100) happens inside the signer.
#[derive(Debug, Clone)]
pub struct PaymentParams {
    pub order_ref: String,
    pub amount: i64,
    pub bank_code: Option<String>,
    pub locale: String,
    pub client_ip: String,
    pub created_at: DateTime<Utc>,
}

/// Builds signed redirect URLs for the gateway and verifies its signed
/// callbacks. Pure over its inputs plus the injected config; no I/O.
#[derive(Clone)]
pub struct GatewaySigner {
    config: GatewayConfig,
    mac: HmacSha512,
}

/// Canonical form the gateway signs: pairs already sorted by key, each value
/// x-www-form-urlencoded (spaces become `+`). Signing and verification must
/// run this exact function or signatures will not match.
pub fn canonical_query<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut ser = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        ser.append_pair(k, v);
    }
    ser.finish()
}

impl GatewaySigner {
    pub fn new(config: GatewayConfig) -> Result<Self, SignerError> {
        if config.merchant_code.trim().is_empty() {
            return Err(SignerError::Configuration("merchant code missing".into()));
        }
        if config.hash_secret.trim().is_empty() {
            return Err(SignerError::Configuration("hash secret missing".into()));
        }
        let mac = HmacSha512::new_from_slice(config.hash_secret.as_bytes())
            .map_err(|e| SignerError::Configuration(e.to_string()))?;
        Ok(Self { config, mac })
    }

    /// HMAC-SHA-512 hex digest over an already-canonical query string.
    pub fn sign(&self, data: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(data.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Assembles the sorted, encoded, HMAC-SHA-512-signed redirect URL.
    pub fn build_payment_request(&self, params: &PaymentParams) -> Result<String, SignerError> {
        let amount = (params.amount * 100).to_string();
        let create_date = params.created_at.format("%Y%m%d%H%M%S").to_string();
        let order_info = format!("Payment for order {}", params.order_ref);

        let mut map = BTreeMap::new();
        map.insert("vnp_Version", "2.1.0".to_string());
        map.insert("vnp_Command", "pay".to_string());
        map.insert("vnp_TmnCode", self.config.merchant_code.clone());
        map.insert("vnp_Locale", params.locale.clone());
        map.insert("vnp_CurrCode", "VND".to_string());
        map.insert("vnp_TxnRef", params.order_ref.clone());
        map.insert("vnp_OrderInfo", order_info);
        map.insert("vnp_OrderType", "other".to_string());
        map.insert("vnp_Amount", amount);
        map.insert("vnp_ReturnUrl", self.config.return_url.clone());
        map.insert("vnp_IpAddr", params.client_ip.clone());
        map.insert("vnp_CreateDate", create_date);
        if let Some(bank) = &params.bank_code {
            map.insert("vnp_BankCode", bank.clone());
        }

        // BTreeMap iteration is the lexicographic key order the gateway
        // validates against.
        let query = canonical_query(map.iter().map(|(k, v)| (*k, v.as_str())));
        let signature = self.sign(&query);
        Ok(format!(
            "{}?{}&{}={}",
            self.config.base_url, query, SECURE_HASH_KEY, signature
        ))
    }

    /// Recomputes the canonical signature over every callback parameter
    /// except the hash fields and compares in constant time. Safe on
    /// attacker-controlled input: returns false, never panics.
    pub fn verify_callback<S: std::hash::BuildHasher>(
        &self,
        params: &std::collections::HashMap<String, String, S>,
    ) -> bool {
        let Some(supplied) = params.get(SECURE_HASH_KEY) else {
            return false;
        };
        let Ok(supplied_bytes) = hex::decode(supplied) else {
            return false;
        };

        let sorted: BTreeMap<&str, &str> = params
            .iter()
            .filter(|(k, _)| k.as_str() != SECURE_HASH_KEY && k.as_str() != SECURE_HASH_TYPE_KEY)
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let query = canonical_query(sorted);

        let mut mac = self.mac.clone();
        mac.update(query.as_bytes());
        mac.verify_slice(&supplied_bytes).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn signer() -> GatewaySigner {
        GatewaySigner::new(GatewayConfig {
            merchant_code: "TESTTMN1".into(),
            hash_secret: "topsecretkey".into(),
            base_url: "https://sandbox.gateway.test/paymentv2/vpcpay.html".into(),
            return_url: "https://x/cb".into(),
        })
        .unwrap()
    }

    fn params() -> PaymentParams {
        PaymentParams {
            order_ref: "ORD1".into(),
            amount: 200_000,
            bank_code: None,
            locale: "vn".into(),
            client_ip: "1.2.3.4".into(),
            created_at: Utc.with_ymd_and_hms(2026, 3, 10, 9, 30, 0).unwrap(),
        }
    }

    fn query_pairs(url: &str) -> HashMap<String, String> {
        let qs = url.split_once('?').unwrap().1;
        url::form_urlencoded::parse(qs.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn missing_config_is_rejected() {
        let err = GatewaySigner::new(GatewayConfig {
            merchant_code: "".into(),
            hash_secret: "s".into(),
            base_url: "https://g".into(),
            return_url: "https://r".into(),
        });
        assert!(matches!(err, Err(SignerError::Configuration(_))));

        let err = GatewaySigner::new(GatewayConfig {
            merchant_code: "T".into(),
            hash_secret: "  ".into(),
            base_url: "https://g".into(),
            return_url: "https://r".into(),
        });
        assert!(matches!(err, Err(SignerError::Configuration(_))));
    }

    #[test]
    fn canonical_query_encodes_spaces_as_plus() {
        let q = canonical_query(vec![("a", "x y"), ("b", "1/2")]);
        assert_eq!(q, "a=x+y&b=1%2F2");
    }

    #[test]
    fn built_url_has_sorted_keys_scaled_amount_and_trailing_hash() {
        let url = signer().build_payment_request(&params()).unwrap();
        let qs = url.split_once('?').unwrap().1;

        let keys: Vec<&str> = qs.split('&').map(|p| p.split_once('=').unwrap().0).collect();
        let (body, last) = keys.split_at(keys.len() - 1);
        assert_eq!(last, [SECURE_HASH_KEY]);
        let mut sorted = body.to_vec();
        sorted.sort_unstable();
        assert_eq!(body, sorted.as_slice());

        let pairs = query_pairs(&url);
        assert_eq!(pairs["vnp_Amount"], "20000000"); // 200_000 x 100
        assert_eq!(pairs["vnp_TxnRef"], "ORD1");
        assert_eq!(pairs["vnp_CreateDate"], "20260310093000");
        // encoded spaces render as '+', not %20
        assert!(qs.contains("vnp_OrderInfo=Payment+for+order+ORD1"));
    }

    #[test]
    fn signature_round_trip() {
        let s = signer();
        let url = s.build_payment_request(&params()).unwrap();
        let pairs = query_pairs(&url);
        assert!(s.verify_callback(&pairs));
    }

    #[test]
    fn any_tampered_parameter_fails_verification() {
        let s = signer();
        let url = s.build_payment_request(&params()).unwrap();
        let good = query_pairs(&url);

        for key in ["vnp_Amount", "vnp_TxnRef", "vnp_OrderInfo"] {
            let mut bad = good.clone();
            bad.insert(key.into(), format!("{}x", good[key]));
            assert!(!s.verify_callback(&bad), "tampered {key} slipped through");
        }

        let mut extra = good.clone();
        extra.insert("vnp_Injected".into(), "1".into());
        assert!(!s.verify_callback(&extra));
    }

    #[test]
    fn malformed_callbacks_are_rejected_not_fatal() {
        let s = signer();
        assert!(!s.verify_callback(&HashMap::<String, String>::new()));

        let mut no_hex = HashMap::new();
        no_hex.insert(SECURE_HASH_KEY.to_string(), "not-hex!".to_string());
        assert!(!s.verify_callback(&no_hex));

        let mut short = HashMap::new();
        short.insert(SECURE_HASH_KEY.to_string(), "abcd".to_string());
        short.insert("vnp_TxnRef".to_string(), "ORD1".to_string());
        assert!(!s.verify_callback(&short));
    }

    #[test]
    fn secure_hash_type_is_excluded_from_the_signed_set() {
        let s = signer();
        let url = s.build_payment_request(&params()).unwrap();
        let mut pairs = query_pairs(&url);
        pairs.insert(SECURE_HASH_TYPE_KEY.into(), "HmacSHA512".into());
        assert!(s.verify_callback(&pairs));
    }

    #[test]
    fn different_secret_rejects() {
        let url = signer().build_payment_request(&params()).unwrap();
        let other = GatewaySigner::new(GatewayConfig {
            merchant_code: "TESTTMN1".into(),
            hash_secret: "othersecret".into(),
            base_url: "https://sandbox.gateway.test/paymentv2/vpcpay.html".into(),
            return_url: "https://x/cb".into(),
        })
        .unwrap();
        assert!(!other.verify_callback(&query_pairs(&url)));
    }

    #[test]
    fn bank_code_is_signed_when_present() {
        let s = signer();
        let mut p = params();
        p.bank_code = Some("NCB".into());
        let url = s.build_payment_request(&p).unwrap();
        let pairs = query_pairs(&url);
        assert_eq!(pairs["vnp_BankCode"], "NCB");
        assert!(s.verify_callback(&pairs));
    }
}
