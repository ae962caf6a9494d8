use {
    crate::{
        canonical::{build_signature_base, ComponentIdentifier, Fields, Message},
        header::serialize_member,
        sfv::{self, BareItem, InnerList, Item, Member, Parameters},
        signing_key::{Algorithm, SigningKey},
        SignatureError,
    },
    chrono::Utc,
    derive_builder::Builder,
    http::HeaderValue,
    log::trace,
};

/// A signature carried on an associated request, identified by the label it arrived under
/// and its raw signature octets.
///
/// A server signing a response passes this in [SignConfig] to cover the client's request
/// signature; the client passes the same value in
/// [VerifyConfig](crate::VerifyConfig) to require that the response is bound to the
/// signature it sent.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestResponse {
    label: String,
    signature: Vec<u8>,
}

impl RequestResponse {
    /// Describe a request signature by its label and raw octets.
    pub fn new(label: impl Into<String>, signature: Vec<u8>) -> Self {
        RequestResponse {
            label: label.into(),
            signature,
        }
    }

    /// The label the signature arrived under.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The raw signature octets.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub(crate) fn identifier(&self) -> Result<ComponentIdentifier, SignatureError> {
        Ok(ComponentIdentifier::new("@request-response")?.with_key(&self.label))
    }

    /// The canonical component value this signature resolves to.
    pub(crate) fn serialized_value(&self) -> Result<String, SignatureError> {
        sfv::serialize_item(&Item::new(BareItem::ByteSeq(self.signature.clone())))
    }
}

/// Configuration of the signature parameters a [Signer] emits.
///
/// The default configuration emits `created`, the key id, and `alg`. All fields are
/// optional; build one with [SignConfig::builder].
#[derive(Builder, Clone, Debug)]
#[builder(derive(Debug))]
pub struct SignConfig {
    /// Include the `alg` signature parameter.
    #[builder(default = "true")]
    sign_alg: bool,

    /// Include the `created` signature parameter.
    #[builder(default = "true")]
    sign_created: bool,

    /// Use this Unix timestamp for `created` instead of the current time. Zero means use the
    /// real clock. Only useful for tests.
    #[builder(default)]
    fake_created: i64,

    /// Emit an `expires` parameter with this Unix timestamp. Zero omits the parameter.
    #[builder(default)]
    expires: i64,

    /// Emit a `nonce` parameter with this value. Empty omits the parameter.
    #[builder(default, setter(into))]
    nonce: String,

    /// Cover the signature that arrived on the associated request, binding this (response)
    /// signature to it.
    #[builder(default, setter(strip_option))]
    request_response: Option<RequestResponse>,
}

impl SignConfig {
    /// Create a builder with all options at their defaults.
    pub fn builder() -> SignConfigBuilder {
        SignConfigBuilder::default()
    }
}

impl Default for SignConfig {
    fn default() -> Self {
        SignConfig::builder().build().expect("all fields are defaulted")
    }
}

/// Signs HTTP requests and responses, producing the `Signature-Input` and `Signature`
/// header values for one label per call.
///
/// A `Signer` owns its key, algorithm, covered field list, and configuration, and is
/// immutable after construction: it may be shared freely across threads and reused for many
/// messages until the key is rotated.
#[derive(Debug)]
pub struct Signer {
    key_id: String,
    key: SigningKey,
    fields: Fields,
    config: SignConfig,
}

impl Signer {
    /// Create an HMAC-SHA256 signer. The shared key must be at least 64 bytes long.
    pub fn new_hmac_sha256(
        key_id: &str,
        key: &[u8],
        config: SignConfig,
        fields: Fields,
    ) -> Result<Self, SignatureError> {
        Self::new(key_id, SigningKey::hmac_sha256(key)?, config, fields)
    }

    /// Create an RSASSA-PKCS1-v1_5 SHA-256 signer from an unencrypted PKCS#8 DER private key.
    pub fn new_rsa_v1_5_sha256(
        key_id: &str,
        private_key: &[u8],
        config: SignConfig,
        fields: Fields,
    ) -> Result<Self, SignatureError> {
        Self::new(key_id, SigningKey::rsa_v1_5_sha256(private_key)?, config, fields)
    }

    /// Create an RSASSA-PSS SHA-512 signer from an unencrypted PKCS#8 DER private key.
    pub fn new_rsa_pss_sha512(
        key_id: &str,
        private_key: &[u8],
        config: SignConfig,
        fields: Fields,
    ) -> Result<Self, SignatureError> {
        Self::new(key_id, SigningKey::rsa_pss_sha512(private_key)?, config, fields)
    }

    /// Create an ECDSA P-256 SHA-256 signer from an unencrypted PKCS#8 DER private key.
    /// Signatures are emitted as the raw 64-byte concatenation of `r` and `s`.
    pub fn new_ecdsa_p256_sha256(
        key_id: &str,
        private_key: &[u8],
        config: SignConfig,
        fields: Fields,
    ) -> Result<Self, SignatureError> {
        Self::new(key_id, SigningKey::ecdsa_p256_sha256(private_key)?, config, fields)
    }

    fn new(key_id: &str, key: SigningKey, config: SignConfig, fields: Fields) -> Result<Self, SignatureError> {
        if key_id.is_empty() {
            return Err(SignatureError::InvalidConfig("key id must not be empty".to_string()));
        }
        Ok(Signer {
            key_id: key_id.to_string(),
            key,
            fields,
            config,
        })
    }

    /// The algorithm this signer signs under.
    pub fn algorithm(&self) -> Algorithm {
        self.key.algorithm()
    }

    /// The key id emitted in the `keyid` parameter.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// The covered components, in base order.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Sign a request, returning the `Signature-Input` and `Signature` header values for
    /// the given signature name.
    pub fn sign_request(
        &self,
        name: &str,
        request: &http::request::Parts,
    ) -> Result<(HeaderValue, HeaderValue), SignatureError> {
        self.sign_message(name, &Message::request(request))
    }

    /// Sign a response, in the context of the request it answers.
    pub fn sign_response(
        &self,
        name: &str,
        response: &http::response::Parts,
        request: &http::request::Parts,
    ) -> Result<(HeaderValue, HeaderValue), SignatureError> {
        let request = Message::request(request);
        self.sign_message(name, &Message::response(response).with_request(&request))
    }

    fn sign_message(&self, name: &str, message: &Message<'_>) -> Result<(HeaderValue, HeaderValue), SignatureError> {
        if name.is_empty() {
            return Err(SignatureError::InvalidConfig("signature name must not be empty".to_string()));
        }

        let mut identifiers: Vec<ComponentIdentifier> = Vec::with_capacity(self.fields.len() + 1);
        if let Some(request_response) = &self.config.request_response {
            identifiers.push(request_response.identifier()?);
        }
        identifiers.extend(self.fields.iter().cloned());
        for (i, identifier) in identifiers.iter().enumerate() {
            if identifiers[..i].contains(identifier) {
                return Err(SignatureError::InvalidConfig(format!(
                    "component {} is covered more than once",
                    identifier
                )));
            }
        }

        // The configured signature value and the one on the associated request must agree,
        // or the two peers would build different bases for the same header.
        if let Some(request_response) = &self.config.request_response {
            let resolved = message.resolve(&request_response.identifier()?)?;
            if resolved != request_response.serialized_value()? {
                return Err(SignatureError::InvalidConfig(format!(
                    "request signature '{}' does not match the configured value",
                    request_response.label()
                )));
            }
        }

        let created = if self.config.sign_created {
            Some(if self.config.fake_created != 0 {
                self.config.fake_created
            } else {
                Utc::now().timestamp()
            })
        } else {
            None
        };
        let expires = if self.config.expires != 0 {
            Some(self.config.expires)
        } else {
            None
        };
        if let (Some(created), Some(expires)) = (created, expires) {
            if created > expires {
                return Err(SignatureError::InvalidConfig(format!(
                    "'created' ({}) is later than 'expires' ({})",
                    created, expires
                )));
            }
        }

        let mut params = Parameters::new();
        if let Some(created) = created {
            params.push(("created".to_string(), BareItem::Integer(created)));
        }
        if let Some(expires) = expires {
            params.push(("expires".to_string(), BareItem::Integer(expires)));
        }
        params.push(("keyid".to_string(), BareItem::String(self.key_id.clone())));
        if self.config.sign_alg {
            params.push(("alg".to_string(), BareItem::String(self.algorithm().as_str().to_string())));
        }
        if !self.config.nonce.is_empty() {
            params.push(("nonce".to_string(), BareItem::String(self.config.nonce.clone())));
        }

        let inner_list = InnerList {
            items: identifiers.iter().map(ComponentIdentifier::to_item).collect(),
            params,
        };

        let base = build_signature_base(message, &identifiers, &inner_list)?;
        let signature = self.key.sign(&base)?;
        trace!("signed {} bytes of base under label '{}'", base.len(), name);

        // One serializer path: the inner list in the emitted header is the same
        // serialization that just went into the base.
        let signature_input = serialize_member(name, Member::InnerList(inner_list))?;
        let signature_value = serialize_member(name, Member::Item(Item::new(BareItem::ByteSeq(signature))))?;

        Ok((
            HeaderValue::from_str(&signature_input).expect("serialized structured fields are ASCII"),
            HeaderValue::from_str(&signature_value).expect("serialized structured fields are ASCII"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{SignConfig, Signer};
    use crate::{
        canonical::Fields,
        unittest::{get_request, TEST_HMAC_KEY},
        SignatureError,
    };

    #[test_log::test]
    fn test_fixed_created_header_values() {
        let config = SignConfig::builder().fake_created(1618884475).build().unwrap();
        let fields = Fields::from_names(&["@method"]).unwrap();
        let signer = Signer::new_hmac_sha256("key1", &TEST_HMAC_KEY, config, fields).unwrap();

        let parts = get_request("https://example.com/foo");
        let (signature_input, _) = signer.sign_request("sig1", &parts).unwrap();
        assert_eq!(
            signature_input.to_str().unwrap(),
            r#"sig1=("@method");created=1618884475;keyid="key1";alg="hmac-sha256""#
        );
    }

    #[test_log::test]
    fn test_empty_signature_name() {
        let fields = Fields::from_names(&["@method"]).unwrap();
        let signer = Signer::new_hmac_sha256("key1", &TEST_HMAC_KEY, SignConfig::default(), fields).unwrap();
        let parts = get_request("https://example.com/foo");
        let err = signer.sign_request("", &parts).unwrap_err();
        assert!(matches!(err, SignatureError::InvalidConfig(_)), "got {}", err);
    }

    #[test_log::test]
    fn test_invalid_signature_name() {
        let fields = Fields::from_names(&["@method"]).unwrap();
        let signer = Signer::new_hmac_sha256("key1", &TEST_HMAC_KEY, SignConfig::default(), fields).unwrap();
        let parts = get_request("https://example.com/foo");
        let err = signer.sign_request("Sig One", &parts).unwrap_err();
        assert!(matches!(err, SignatureError::InvalidConfig(_)), "got {}", err);
    }

    #[test_log::test]
    fn test_empty_key_id() {
        let fields = Fields::from_names(&["@method"]).unwrap();
        let err = Signer::new_hmac_sha256("", &TEST_HMAC_KEY, SignConfig::default(), fields).unwrap_err();
        assert!(matches!(err, SignatureError::InvalidConfig(_)), "got {}", err);
    }

    #[test_log::test]
    fn test_duplicate_field_rejected() {
        let fields = Fields::from_names(&["@method", "@path", "@method"]).unwrap();
        let signer = Signer::new_hmac_sha256("key1", &TEST_HMAC_KEY, SignConfig::default(), fields).unwrap();
        let parts = get_request("https://example.com/foo");
        let err = signer.sign_request("sig1", &parts).unwrap_err();
        assert!(matches!(err, SignatureError::InvalidConfig(_)), "got {}", err);
    }

    #[test_log::test]
    fn test_created_after_expires_rejected() {
        let config = SignConfig::builder().fake_created(2000).expires(1000).build().unwrap();
        let fields = Fields::from_names(&["@method"]).unwrap();
        let signer = Signer::new_hmac_sha256("key1", &TEST_HMAC_KEY, config, fields).unwrap();
        let parts = get_request("https://example.com/foo");
        let err = signer.sign_request("sig1", &parts).unwrap_err();
        assert!(matches!(err, SignatureError::InvalidConfig(_)), "got {}", err);
    }

    #[test_log::test]
    fn test_optional_parameters() {
        let config = SignConfig::builder()
            .sign_alg(false)
            .fake_created(1618884475)
            .expires(1618884775)
            .nonce("abc123")
            .build()
            .unwrap();
        let fields = Fields::from_names(&["@method"]).unwrap();
        let signer = Signer::new_hmac_sha256("key1", &TEST_HMAC_KEY, config, fields).unwrap();
        let parts = get_request("https://example.com/foo");
        let (signature_input, _) = signer.sign_request("sig1", &parts).unwrap();
        assert_eq!(
            signature_input.to_str().unwrap(),
            r#"sig1=("@method");created=1618884475;expires=1618884775;keyid="key1";nonce="abc123""#
        );
    }

    #[test_log::test]
    fn test_unsigned_created() {
        let config = SignConfig::builder().sign_created(false).build().unwrap();
        let fields = Fields::from_names(&["@method"]).unwrap();
        let signer = Signer::new_hmac_sha256("key1", &TEST_HMAC_KEY, config, fields).unwrap();
        let parts = get_request("https://example.com/foo");
        let (signature_input, _) = signer.sign_request("sig1", &parts).unwrap();
        assert_eq!(signature_input.to_str().unwrap(), r#"sig1=("@method");keyid="key1";alg="hmac-sha256""#);
    }
}
