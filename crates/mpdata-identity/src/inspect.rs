//! Parsing and chain verification of persisted certificates.

use chrono::{DateTime, TimeZone, Utc};
use ring::digest::{digest, SHA256};
use x509_parser::certificate::X509Certificate;

use crate::{CertificateInfo, CertificateType, IdentityError, Result};

/// SHA-256 of DER bytes, lowercase hex.
pub fn fingerprint(der: &[u8]) -> String {
    hex::encode(digest(&SHA256, der).as_ref())
}

/// Decode a single PEM `CERTIFICATE` block to DER.
fn decode_certificate(pem_text: &str) -> Result<Vec<u8>> {
    let block = pem::parse(pem_text).map_err(|e| IdentityError::PemDecode(e.to_string()))?;
    if block.tag() != "CERTIFICATE" {
        return Err(IdentityError::PemDecode(format!(
            "expected CERTIFICATE block, found {}",
            block.tag()
        )));
    }
    Ok(block.into_contents())
}

fn parse_der(der: &[u8]) -> Result<X509Certificate<'_>> {
    let (_, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|e| IdentityError::CertParse(e.to_string()))?;
    Ok(cert)
}

fn is_ca(cert: &X509Certificate<'_>) -> Result<bool> {
    Ok(cert
        .basic_constraints()
        .map_err(|e| IdentityError::CertParse(e.to_string()))?
        .is_some_and(|bc| bc.value.ca))
}

/// Extract metadata from a PEM certificate.
pub fn inspect_certificate(pem_text: &str) -> Result<CertificateInfo> {
    let der = decode_certificate(pem_text)?;
    let cert = parse_der(&der)?;

    let cert_type = if is_ca(&cert)? {
        CertificateType::Authority
    } else {
        CertificateType::Leaf
    };

    let key_usage = cert
        .key_usage()
        .map_err(|e| IdentityError::CertParse(e.to_string()))?;
    let (key_cert_sign, digital_signature, key_encipherment) =
        key_usage.map_or((false, false, false), |ku| {
            (
                ku.value.key_cert_sign(),
                ku.value.digital_signature(),
                ku.value.key_encipherment(),
            )
        });

    let server_auth = cert
        .extended_key_usage()
        .map_err(|e| IdentityError::CertParse(e.to_string()))?
        .is_some_and(|eku| eku.value.server_auth);

    let organization = cert
        .subject()
        .iter_organization()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_owned);
    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_owned);

    Ok(CertificateInfo {
        serial: format!("{:x}", cert.serial),
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        organization,
        common_name,
        not_before: asn1_to_utc(cert.validity().not_before)?,
        not_after: asn1_to_utc(cert.validity().not_after)?,
        cert_type,
        key_cert_sign,
        digital_signature,
        key_encipherment,
        server_auth,
        fingerprint: fingerprint(&der),
    })
}

/// Check that `leaf_pem` was issued by the CA in `ca_pem`.
///
/// Verifies the CA flag, the CA's self-signature, issuer/subject linkage and
/// the leaf signature against the CA public key.
pub fn verify_chain(leaf_pem: &str, ca_pem: &str) -> Result<()> {
    let ca_der = decode_certificate(ca_pem)?;
    let leaf_der = decode_certificate(leaf_pem)?;
    let ca = parse_der(&ca_der)?;
    let leaf = parse_der(&leaf_der)?;

    if !is_ca(&ca)? {
        return Err(IdentityError::ChainVerification(
            "issuer certificate is not a CA".into(),
        ));
    }

    ca.verify_signature(None).map_err(|e| {
        IdentityError::ChainVerification(format!("CA self-signature invalid: {e}"))
    })?;

    if leaf.issuer().as_raw() != ca.subject().as_raw() {
        return Err(IdentityError::ChainVerification(format!(
            "leaf issuer '{}' does not match CA subject '{}'",
            leaf.issuer(),
            ca.subject()
        )));
    }

    leaf.verify_signature(Some(ca.public_key())).map_err(|e| {
        IdentityError::ChainVerification(format!("leaf signature invalid: {e}"))
    })?;

    Ok(())
}

/// Convert an ASN.1 `GeneralizedTime` / `UTCTime` to `DateTime<Utc>`.
fn asn1_to_utc(t: x509_parser::time::ASN1Time) -> Result<DateTime<Utc>> {
    let epoch = t.timestamp();
    Utc.timestamp_opt(epoch, 0)
        .single()
        .ok_or_else(|| IdentityError::CertParse(format!("timestamp {epoch} out of range")))
}
