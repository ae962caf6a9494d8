use {
    hmac::{Hmac, Mac},
    sha2::Sha256,
    subtle::ConstantTimeEq,
};

/// Number of bytes in a SHA-256 digest.
pub(crate) const SHA256_OUTPUT_LEN: usize = 32;

/// Wrapper function to form a HMAC-SHA256 operation.
#[inline(always)]
pub(crate) fn hmac_sha256(key: &[u8], value: &[u8]) -> [u8; SHA256_OUTPUT_LEN] {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC can take arbitrary key lengths");
    mac.update(value);
    mac.finalize().into_bytes().into()
}

/// Compare an expected MAC against a received one without leaking timing information.
#[inline(always)]
pub(crate) fn mac_equal(expected: &[u8], received: &[u8]) -> bool {
    expected.ct_eq(received).into()
}

#[cfg(test)]
mod tests {
    use super::{hmac_sha256, mac_equal};

    #[test_log::test]
    fn test_hmac_sha256() {
        // RFC 4231 test case 2.
        let digest = hmac_sha256(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            digest.to_vec(),
            vec![
                0x5b, 0xdc, 0xc1, 0x46, 0xbf, 0x60, 0x75, 0x4e, 0x6a, 0x04, 0x24, 0x26, 0x08, 0x95, 0x75, 0xc7,
                0x5a, 0x00, 0x3f, 0x08, 0x9d, 0x27, 0x39, 0x83, 0x9d, 0xec, 0x58, 0xb9, 0x64, 0xec, 0x38, 0x43,
            ]
        );
    }

    #[test_log::test]
    fn test_mac_equal() {
        assert!(mac_equal(b"abc", b"abc"));
        assert!(!mac_equal(b"abc", b"abd"));
        assert!(!mac_equal(b"abc", b"abcd"));
    }
}
