use {
    http::status::StatusCode,
    std::{
        error::Error,
        fmt::{Display, Formatter, Result as FmtResult},
    },
};

/// Error returned when signing a message or validating a message signature fails.
#[derive(Debug)]
#[non_exhaustive]
pub enum SignatureError {
    /// The underlying cryptographic primitive failed (e.g. an RSA internal error).
    Crypto(/* message */ String),

    /// A signer or verifier was misconfigured: bad or too-short key material, an empty key id,
    /// an empty or invalid signature name, a repeated covered component, or `created` later
    /// than `expires`.
    InvalidConfig(/* message */ String),

    /// A covered component could not be canonicalized -- an `sf` or `key` parameter was applied
    /// to an unparseable value, a header value was not ASCII, or a received identifier list was
    /// not usable (e.g. repeated identifiers).
    MalformedComponent(/* message */ String),

    /// A value could not be parsed as a Structured Field.
    MalformedStructuredField {
        /// What was being parsed and what was found instead.
        message: String,
        /// Byte offset into the parsed input at which parsing failed.
        offset: usize,
    },

    /// A covered component is absent from the message: a header is not present, a query
    /// parameter does not occur exactly once, a derived component does not apply to this
    /// message, or the associated request is missing.
    MissingComponent(/* message */ String),

    /// The `Signature-Input` or `Signature` header is absent from the message.
    MissingSignatureHeaders(/* message */ String),

    /// A signature parameter violated the verifier's policy: key id mismatch, algorithm not
    /// allowed, `created` outside the permitted window, signature expired, `Date` header drift
    /// too large, or a required covered component not signed.
    PolicyFailure(/* message */ String),

    /// Cryptographic verification returned false: the signature does not match the rebuilt
    /// signature base.
    SignatureMismatch(Option</* message */ String>),

    /// The requested signature label is not present in the `Signature-Input` and `Signature`
    /// dictionaries.
    UnknownLabel(/* label */ String),
}

impl SignatureError {
    /// A suggested HTTP status for a server rejecting a request with this error.
    ///
    /// Callers embedding verification in a handler typically map verification failures to
    /// `401 Unauthorized`, malformed messages to `400 Bad Request`, and internal failures to
    /// `500 Internal Server Error`. This is a hint only; the library itself never writes a
    /// response.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::MalformedComponent(_)
            | Self::MalformedStructuredField {
                ..
            }
            | Self::MissingComponent(_) => StatusCode::BAD_REQUEST,
            Self::MissingSignatureHeaders(_)
            | Self::UnknownLabel(_)
            | Self::PolicyFailure(_)
            | Self::SignatureMismatch(_) => StatusCode::UNAUTHORIZED,
            Self::Crypto(_) | Self::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl Display for SignatureError {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::Crypto(msg) => write!(f, "Cryptographic operation failed: {}", msg),
            Self::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Self::MalformedComponent(msg) => write!(f, "Malformed component: {}", msg),
            Self::MalformedStructuredField {
                message,
                offset,
            } => write!(f, "Malformed structured field at offset {}: {}", offset, message),
            Self::MissingComponent(msg) => write!(f, "Missing component: {}", msg),
            Self::MissingSignatureHeaders(msg) => write!(f, "Missing signature headers: {}", msg),
            Self::PolicyFailure(msg) => write!(f, "Policy failure: {}", msg),
            Self::SignatureMismatch(msg) => {
                if let Some(msg) = msg {
                    write!(f, "Signature mismatch: {}", msg)
                } else {
                    f.write_str("Signature mismatch")
                }
            }
            Self::UnknownLabel(label) => write!(f, "No signature found under label '{}'", label),
        }
    }
}

impl Error for SignatureError {}
