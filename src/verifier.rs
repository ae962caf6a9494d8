use {
    crate::{
        canonical::{build_signature_base, ComponentIdentifier, Fields, Message},
        chronoutil::ParseHTTPDate,
        header::{SignatureHeader, SignatureInput, SIGNATURE_INPUT},
        sfv::InnerList,
        signer::RequestResponse,
        signing_key::{Algorithm, VerifyingKey},
        SignatureError,
    },
    chrono::{DateTime, Duration, Utc},
    derive_builder::Builder,
    http::header::DATE,
    log::{debug, trace},
};

/// Configuration of the policy a [Verifier] enforces before checking the cryptographic
/// signature.
///
/// The default configuration requires a `created` parameter no more than 10 seconds old and
/// no more than 2 seconds in the future, rejects expired signatures, and requires the
/// `keyid` parameter (when present) to match the verifier's. Build one with
/// [VerifyConfig::builder].
#[derive(Builder, Clone, Debug)]
#[builder(derive(Debug))]
pub struct VerifyConfig {
    /// Require a `created` parameter and bound its age.
    #[builder(default = "true")]
    verify_created: bool,

    /// Maximum allowed future skew of `created`.
    #[builder(default = "Duration::seconds(2)")]
    not_newer_than: Duration,

    /// Maximum allowed age of `created`.
    #[builder(default = "Duration::seconds(10)")]
    not_older_than: Duration,

    /// Reject signatures whose `expires` parameter is in the past.
    #[builder(default = "true")]
    reject_expired: bool,

    /// When non-empty, the `alg` parameter (if present) must name one of these algorithms.
    #[builder(default)]
    allowed_algs: Vec<Algorithm>,

    /// Require the `keyid` parameter (when present) to equal the verifier's key id.
    #[builder(default = "true")]
    verify_key_id: bool,

    /// Maximum allowed difference between the `Date` header and the `created` parameter.
    /// Zero disables the check. Only enforced when `created` itself is verified.
    #[builder(default = "Duration::zero()")]
    date_within: Duration,

    /// Require the signature to cover this request signature via `@request-response`, and
    /// require the covered value to match.
    #[builder(default, setter(strip_option))]
    request_response: Option<RequestResponse>,
}

impl VerifyConfig {
    /// Create a builder with all options at their defaults.
    pub fn builder() -> VerifyConfigBuilder {
        VerifyConfigBuilder::default()
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        VerifyConfig::builder().build().expect("all fields are defaulted")
    }
}

/// Verifies HTTP message signatures: parses the signature headers, enforces policy,
/// rebuilds the signature base, and checks the cryptographic signature.
///
/// A `Verifier` owns its key, algorithm, required field list, and configuration, and is
/// immutable after construction: it may be shared freely across threads.
#[derive(Debug)]
pub struct Verifier {
    key_id: String,
    key: VerifyingKey,
    fields: Fields,
    config: VerifyConfig,
}

impl Verifier {
    /// Create an HMAC-SHA256 verifier. The shared key must be at least 64 bytes long.
    pub fn new_hmac_sha256(
        key_id: &str,
        key: &[u8],
        config: VerifyConfig,
        fields: Fields,
    ) -> Result<Self, SignatureError> {
        Self::new(key_id, VerifyingKey::hmac_sha256(key)?, config, fields)
    }

    /// Create an RSASSA-PKCS1-v1_5 SHA-256 verifier from a DER `RSAPublicKey`.
    pub fn new_rsa_v1_5_sha256(
        key_id: &str,
        public_key: &[u8],
        config: VerifyConfig,
        fields: Fields,
    ) -> Result<Self, SignatureError> {
        Self::new(key_id, VerifyingKey::rsa_v1_5_sha256(public_key)?, config, fields)
    }

    /// Create an RSASSA-PSS SHA-512 verifier from a DER `RSAPublicKey`.
    pub fn new_rsa_pss_sha512(
        key_id: &str,
        public_key: &[u8],
        config: VerifyConfig,
        fields: Fields,
    ) -> Result<Self, SignatureError> {
        Self::new(key_id, VerifyingKey::rsa_pss_sha512(public_key)?, config, fields)
    }

    /// Create an ECDSA P-256 SHA-256 verifier from an uncompressed SEC1 public point
    /// (65 bytes). Signatures must be the raw 64-byte concatenation of `r` and `s`.
    pub fn new_ecdsa_p256_sha256(
        key_id: &str,
        public_key: &[u8],
        config: VerifyConfig,
        fields: Fields,
    ) -> Result<Self, SignatureError> {
        Self::new(key_id, VerifyingKey::ecdsa_p256_sha256(public_key)?, config, fields)
    }

    fn new(key_id: &str, key: VerifyingKey, config: VerifyConfig, fields: Fields) -> Result<Self, SignatureError> {
        if key_id.is_empty() {
            return Err(SignatureError::InvalidConfig("key id must not be empty".to_string()));
        }
        Ok(Verifier {
            key_id: key_id.to_string(),
            key,
            fields,
            config,
        })
    }

    /// The algorithm this verifier accepts.
    pub fn algorithm(&self) -> Algorithm {
        self.key.algorithm()
    }

    /// The key id signatures are expected to name.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Verify a request signature against the current clock. Pass a label to select one
    /// signature by name, or `None` to accept the first label present.
    pub fn verify_request(&self, name: Option<&str>, request: &http::request::Parts) -> Result<(), SignatureError> {
        self.verify_request_at(name, request, Utc::now())
    }

    /// Verify a request signature as of `verification_time`.
    pub fn verify_request_at(
        &self,
        name: Option<&str>,
        request: &http::request::Parts,
        verification_time: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        self.verify_message(name, &Message::request(request), verification_time)
    }

    /// Verify a response signature in the context of the request it answers, against the
    /// current clock.
    pub fn verify_response(
        &self,
        name: Option<&str>,
        response: &http::response::Parts,
        request: &http::request::Parts,
    ) -> Result<(), SignatureError> {
        self.verify_response_at(name, response, request, Utc::now())
    }

    /// Verify a response signature as of `verification_time`.
    pub fn verify_response_at(
        &self,
        name: Option<&str>,
        response: &http::response::Parts,
        request: &http::request::Parts,
        verification_time: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        let request = Message::request(request);
        self.verify_message(name, &Message::response(response).with_request(&request), verification_time)
    }

    fn verify_message(
        &self,
        name: Option<&str>,
        message: &Message<'_>,
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        let input = SignatureInput::from_headers(message.headers())?;
        let signatures = SignatureHeader::from_headers(message.headers())?;

        let (label, inner_list) = match name {
            Some(label) => (
                label,
                input.get(label).ok_or_else(|| SignatureError::UnknownLabel(label.to_string()))?,
            ),
            None => input.first().ok_or_else(|| {
                SignatureError::MissingSignatureHeaders(format!("'{}' header has no members", SIGNATURE_INPUT))
            })?,
        };
        let signature =
            signatures.get(label).ok_or_else(|| SignatureError::UnknownLabel(label.to_string()))?;
        trace!("verifying signature '{}' covering {} components", label, inner_list.items.len());

        let identifiers = inner_list
            .items
            .iter()
            .map(ComponentIdentifier::from_item)
            .collect::<Result<Vec<_>, _>>()?;
        for (i, identifier) in identifiers.iter().enumerate() {
            if identifiers[..i].contains(identifier) {
                return Err(SignatureError::MalformedComponent(format!(
                    "component {} is covered more than once",
                    identifier
                )));
            }
        }

        let params = ReceivedParams::from_inner_list(inner_list)?;
        self.enforce_policy(message, &identifiers, &params, now)?;

        let base = build_signature_base(message, &identifiers, inner_list)?;
        match self.key.verify(&base, signature) {
            Ok(()) => Ok(()),
            Err(e) => {
                debug!("signature '{}' failed verification: {}", label, e);
                Err(e)
            }
        }
    }

    fn enforce_policy(
        &self,
        message: &Message<'_>,
        identifiers: &[ComponentIdentifier],
        params: &ReceivedParams,
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        if self.config.verify_key_id {
            if let Some(keyid) = &params.keyid {
                if *keyid != self.key_id {
                    return Err(SignatureError::PolicyFailure(format!(
                        "key id '{}' does not match expected '{}'",
                        keyid, self.key_id
                    )));
                }
            }
        }

        if let Some(alg) = &params.alg {
            if alg != self.algorithm().as_str() {
                return Err(SignatureError::PolicyFailure(format!(
                    "algorithm '{}' does not match the verifier's '{}'",
                    alg,
                    self.algorithm()
                )));
            }
            if !self.config.allowed_algs.is_empty()
                && !self.config.allowed_algs.iter().any(|allowed| allowed.as_str() == alg)
            {
                return Err(SignatureError::PolicyFailure(format!("algorithm '{}' is not allowed", alg)));
            }
        }

        if self.config.verify_created {
            let created = params.created.ok_or_else(|| {
                SignatureError::PolicyFailure("the 'created' parameter is required but not present".to_string())
            })?;
            let age = now.timestamp() - created;
            if age > self.config.not_older_than.num_seconds() {
                return Err(SignatureError::PolicyFailure(format!(
                    "signature created {} seconds ago, older than the allowed {}",
                    age,
                    self.config.not_older_than.num_seconds()
                )));
            }
            if -age > self.config.not_newer_than.num_seconds() {
                return Err(SignatureError::PolicyFailure(format!(
                    "signature created {} seconds in the future, newer than the allowed {}",
                    -age,
                    self.config.not_newer_than.num_seconds()
                )));
            }

            if self.config.date_within > Duration::zero() {
                if let Some(value) = message.headers().get(DATE) {
                    let value = value.to_str().map_err(|_| {
                        SignatureError::MalformedComponent("'date' header contains non-ASCII bytes".to_string())
                    })?;
                    let date = DateTime::<Utc>::parse_from_http_date(value.trim()).map_err(|_| {
                        SignatureError::MalformedComponent(format!("'date' header is not an HTTP-date: '{}'", value))
                    })?;
                    let drift = (date.timestamp() - created).abs();
                    if drift > self.config.date_within.num_seconds() {
                        return Err(SignatureError::PolicyFailure(format!(
                            "'date' header differs from 'created' by {} seconds, more than the allowed {}",
                            drift,
                            self.config.date_within.num_seconds()
                        )));
                    }
                }
            }
        }

        if self.config.reject_expired {
            if let Some(expires) = params.expires {
                if let Some(created) = params.created {
                    if created > expires {
                        return Err(SignatureError::PolicyFailure(format!(
                            "'created' ({}) is later than 'expires' ({})",
                            created, expires
                        )));
                    }
                }
                if now.timestamp() > expires {
                    return Err(SignatureError::PolicyFailure(format!("signature expired at {}", expires)));
                }
            }
        }

        for required in self.fields.iter() {
            if !identifiers.contains(required) {
                return Err(SignatureError::PolicyFailure(format!("missing required field {}", required.name())));
            }
        }

        if let Some(request_response) = &self.config.request_response {
            let identifier = request_response.identifier()?;
            if !identifiers.contains(&identifier) {
                return Err(SignatureError::PolicyFailure(format!(
                    "signature does not cover the request signature '{}'",
                    request_response.label()
                )));
            }
            let resolved = message.resolve(&identifier)?;
            if resolved != request_response.serialized_value()? {
                return Err(SignatureError::PolicyFailure(format!(
                    "request signature '{}' does not match the expected value",
                    request_response.label()
                )));
            }
        }

        Ok(())
    }
}

/// Signature parameters extracted from a received inner list. Unknown parameters are left
/// alone; they still participate in the rebuilt base through the inner list itself.
#[derive(Debug, Default)]
struct ReceivedParams {
    created: Option<i64>,
    expires: Option<i64>,
    keyid: Option<String>,
    alg: Option<String>,
}

impl ReceivedParams {
    fn from_inner_list(inner_list: &InnerList) -> Result<Self, SignatureError> {
        let mut params = ReceivedParams::default();
        for (key, value) in &inner_list.params {
            match key.as_str() {
                "created" => {
                    params.created = Some(value.as_integer().ok_or_else(|| {
                        SignatureError::MalformedComponent("'created' must be an integer".to_string())
                    })?)
                }
                "expires" => {
                    params.expires = Some(value.as_integer().ok_or_else(|| {
                        SignatureError::MalformedComponent("'expires' must be an integer".to_string())
                    })?)
                }
                "keyid" => {
                    params.keyid = Some(
                        value
                            .as_string()
                            .ok_or_else(|| {
                                SignatureError::MalformedComponent("'keyid' must be a string".to_string())
                            })?
                            .to_string(),
                    )
                }
                "alg" => {
                    params.alg = Some(
                        value
                            .as_string()
                            .ok_or_else(|| SignatureError::MalformedComponent("'alg' must be a string".to_string()))?
                            .to_string(),
                    )
                }
                _ => {}
            }
        }
        Ok(params)
    }
}
